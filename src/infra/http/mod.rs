//! HTTP surface: one versioned JSON API over the application services.

mod error;
mod handlers;

pub use error::{ApiError, ApiErrorBody};

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::application::{
    ActionLogService, DeviceControlService, PlantService, TelemetryService,
};

#[derive(Clone)]
pub struct AppState {
    pub plants: Arc<PlantService>,
    pub telemetry: Arc<TelemetryService>,
    pub control: Arc<DeviceControlService>,
    pub actions: Arc<ActionLogService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route(
            "/api/v1/plants",
            post(handlers::create_plant).get(handlers::list_plants),
        )
        .route(
            "/api/v1/plants/{plant_id}",
            get(handlers::get_plant).delete(handlers::delete_plant),
        )
        .route(
            "/api/v1/plants/{plant_id}/thresholds",
            put(handlers::update_thresholds),
        )
        .route("/api/v1/plants/{plant_id}/logs", get(handlers::list_logs))
        .route(
            "/api/v1/plants/{plant_id}/environment",
            get(handlers::list_environment),
        )
        .route(
            "/api/v1/plants/{plant_id}/actuators",
            post(handlers::register_actuator).get(handlers::list_actuators),
        )
        .route("/api/v1/telemetry", post(handlers::ingest_telemetry))
        .route(
            "/api/v1/devices/{device_id}/commands",
            post(handlers::issue_command),
        )
        .route("/api/v1/actions", get(handlers::list_actions))
        .route("/api/v1/actions/{action_id}", get(handlers::get_action))
        .with_state(state)
}
