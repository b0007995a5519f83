use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::application::{CommandReceipt, IngestSummary, LogQuery, NewActuator, NewPlant};
use crate::domain::entities::{
    ActionLogRecord, ActuatorRecord, EnvironmentalReport, PlantRecord, SensorReadingRecord,
    Thresholds,
};
use crate::domain::types::{ActuatorKind, ActuatorState, SensorKind};

use super::{AppState, error::ApiError};

const DEFAULT_ENVIRONMENT_LIMIT: usize = 24;

pub async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn create_plant(
    State(state): State<AppState>,
    Json(new_plant): Json<NewPlant>,
) -> Result<(StatusCode, Json<PlantRecord>), ApiError> {
    let plant = state.plants.create(new_plant).await?;
    Ok((StatusCode::CREATED, Json(plant)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPlantsQuery {
    user_id: Option<String>,
}

pub async fn list_plants(
    State(state): State<AppState>,
    Query(query): Query<ListPlantsQuery>,
) -> Result<Json<Vec<PlantRecord>>, ApiError> {
    let plants = state.plants.list(query.user_id.as_deref()).await?;
    Ok(Json(plants))
}

pub async fn get_plant(
    State(state): State<AppState>,
    Path(plant_id): Path<String>,
) -> Result<Json<PlantRecord>, ApiError> {
    Ok(Json(state.plants.get(&plant_id).await?))
}

pub async fn update_thresholds(
    State(state): State<AppState>,
    Path(plant_id): Path<String>,
    Json(thresholds): Json<Thresholds>,
) -> Result<Json<PlantRecord>, ApiError> {
    let plant = state.plants.update_thresholds(&plant_id, thresholds).await?;
    Ok(Json(plant))
}

pub async fn delete_plant(
    State(state): State<AppState>,
    Path(plant_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.plants.delete(&plant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ingest_telemetry(
    State(state): State<AppState>,
    Json(report): Json<EnvironmentalReport>,
) -> Result<(StatusCode, Json<IngestSummary>), ApiError> {
    let summary = state.telemetry.ingest(report).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    #[serde(rename = "type")]
    kind: Option<SensorKind>,
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

pub async fn list_logs(
    State(state): State<AppState>,
    Path(plant_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<SensorReadingRecord>>, ApiError> {
    let logs = state
        .telemetry
        .logs(
            &plant_id,
            LogQuery {
                kind: query.kind,
                since: query.since,
                limit: query.limit,
            },
        )
        .await?;
    Ok(Json(logs))
}

#[derive(Debug, Deserialize)]
pub struct EnvironmentQuery {
    limit: Option<usize>,
}

pub async fn list_environment(
    State(state): State<AppState>,
    Path(plant_id): Path<String>,
    Query(query): Query<EnvironmentQuery>,
) -> Result<Json<Vec<EnvironmentalReport>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ENVIRONMENT_LIMIT);
    let reports = state.telemetry.recent_reports(&plant_id, limit).await?;
    Ok(Json(reports))
}

pub async fn register_actuator(
    State(state): State<AppState>,
    Path(plant_id): Path<String>,
    Json(new_actuator): Json<NewActuator>,
) -> Result<(StatusCode, Json<ActuatorRecord>), ApiError> {
    let actuator = state.control.register_actuator(&plant_id, new_actuator).await?;
    Ok((StatusCode::CREATED, Json(actuator)))
}

pub async fn list_actuators(
    State(state): State<AppState>,
    Path(plant_id): Path<String>,
) -> Result<Json<Vec<ActuatorRecord>>, ApiError> {
    Ok(Json(state.control.list_actuators(&plant_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(rename = "type")]
    pub kind: ActuatorKind,
    pub state: ActuatorState,
}

/// Accepted, not completed: the receipt points at the action-log entry
/// that will settle once the device answers or the timeout fires.
pub async fn issue_command(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Result<(StatusCode, Json<CommandReceipt>), ApiError> {
    let receipt = state
        .control
        .issue_command(&device_id, request.kind, request.state)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

pub async fn get_action(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
) -> Result<Json<ActionLogRecord>, ApiError> {
    Ok(Json(state.actions.get(&action_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionsQuery {
    device_id: Option<String>,
    limit: Option<usize>,
}

pub async fn list_actions(
    State(state): State<AppState>,
    Query(query): Query<ActionsQuery>,
) -> Result<Json<Vec<ActionLogRecord>>, ApiError> {
    let actions = state
        .actions
        .list(query.device_id.as_deref(), query.limit)
        .await?;
    Ok(Json(actions))
}
