//! End-to-end tests of the JSON API over an in-memory document store.
//!
//! The command sink is a ledger-only double, so issued commands settle
//! exactly the way the broker path would without needing MQTT.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use verdant::application::{
    ActionLogService, DeviceControlService, PlantService, TelemetryService,
};
use verdant::bridge::{ActuatorCommand, BridgeError, CommandLedger, CommandSink};
use verdant::cache::{CacheConfig, QueryCache, ReadThrough};
use verdant::infra::http::{AppState, build_router};
use verdant::store::memory::MemoryStore;

struct LedgerOnlySink {
    ledger: Arc<CommandLedger>,
}

#[async_trait]
impl CommandSink for LedgerOnlySink {
    async fn issue(&self, command: ActuatorCommand) -> Result<String, BridgeError> {
        self.ledger.record_issued(&command).await
    }
}

fn build_app() -> (Arc<MemoryStore>, Arc<CommandLedger>, Router) {
    let store = Arc::new(MemoryStore::new());
    let reads = Arc::new(ReadThrough::new(
        Arc::new(QueryCache::new(&CacheConfig::default())),
        true,
    ));
    let ledger = Arc::new(CommandLedger::new(store.clone(), reads.clone()));
    let sink: Arc<dyn CommandSink> = Arc::new(LedgerOnlySink {
        ledger: ledger.clone(),
    });

    let state = AppState {
        plants: Arc::new(PlantService::new(store.clone(), reads.clone())),
        telemetry: Arc::new(TelemetryService::new(
            store.clone(),
            reads.clone(),
            ledger.clone(),
        )),
        control: Arc::new(DeviceControlService::new(
            store.clone(),
            reads.clone(),
            sink,
        )),
        actions: Arc::new(ActionLogService::new(store.clone(), reads)),
    };
    (store, ledger.clone(), build_router(state))
}

async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, json)
}

async fn create_plant(router: &Router, user_id: &str, name: &str) -> String {
    let (status, body) = request(
        router,
        "POST",
        "/api/v1/plants",
        Some(serde_json::json!({ "userId": user_id, "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["plantId"].as_str().expect("plantId").to_string()
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (_, _, router) = build_app();
    let (status, body) = request(&router, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn plant_lifecycle_create_get_list_delete() {
    let (_, _, router) = build_app();
    let plant_id = create_plant(&router, "user_1", "basil").await;
    create_plant(&router, "user_2", "mint").await;

    let (status, body) =
        request(&router, "GET", &format!("/api/v1/plants/{plant_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "basil");

    let (status, body) = request(&router, "GET", "/api/v1/plants?userId=user_1", None).await;
    assert_eq!(status, StatusCode::OK);
    let plants = body.as_array().expect("plant list");
    assert_eq!(plants.len(), 1);
    assert_eq!(plants[0]["plantId"], plant_id.as_str());

    let (status, _) =
        request(&router, "DELETE", &format!("/api/v1/plants/{plant_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) =
        request(&router, "GET", &format!("/api/v1/plants/{plant_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn blank_plant_name_is_rejected() {
    let (_, _, router) = build_app();
    let (status, body) = request(
        &router,
        "POST",
        "/api/v1/plants",
        Some(serde_json::json!({ "userId": "user_1", "name": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_input");
}

#[tokio::test]
async fn threshold_update_is_visible_on_the_next_get() {
    let (_, _, router) = build_app();
    let plant_id = create_plant(&router, "user_1", "basil").await;

    let thresholds = serde_json::json!({
        "moistureMin": 30.0, "moistureMax": 70.0,
        "lightMin": 200.0, "lightMax": 900.0,
        "tempMin": 16.0, "tempMax": 28.0,
        "humidityMin": 40.0, "humidityMax": 80.0
    });
    let (status, _) = request(
        &router,
        "PUT",
        &format!("/api/v1/plants/{plant_id}/thresholds"),
        Some(thresholds),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) =
        request(&router, "GET", &format!("/api/v1/plants/{plant_id}"), None).await;
    assert_eq!(body["thresholds"]["moistureMin"], 30.0);
    assert_eq!(body["thresholds"]["humidityMax"], 80.0);
}

#[tokio::test]
async fn telemetry_ingest_logs_readings_and_serves_them_back() {
    let (_, _, router) = build_app();
    let plant_id = create_plant(&router, "user_1", "basil").await;

    let report = serde_json::json!({
        "plantId": plant_id,
        "userId": "user_1",
        "sensors": { "soilMoisture": 41.5, "temp": 22.0 },
        "automation": { "waterOn": true, "lightOn": false, "fanOn": false }
    });
    let (status, summary) = request(&router, "POST", "/api/v1/telemetry", Some(report)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(summary["readingsLogged"], 2);
    assert_eq!(summary["actionsLogged"], 1);

    let (status, body) = request(
        &router,
        "GET",
        &format!("/api/v1/plants/{plant_id}/logs?type=soil_moisture"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let logs = body.as_array().expect("log list");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["value"], 41.5);

    let (status, body) = request(
        &router,
        "GET",
        &format!("/api/v1/plants/{plant_id}/environment"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reports = body.as_array().expect("report list");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["sensors"]["temp"], 22.0);

    // The device-driven watering shows up in the action log.
    let (_, body) = request(&router, "GET", "/api/v1/actions", None).await;
    let actions = body.as_array().expect("action list");
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["origin"], "device-driven");
    assert_eq!(actions[0]["status"], "confirmed");
}

#[tokio::test]
async fn ingest_for_unknown_plant_is_rejected() {
    let (_, _, router) = build_app();
    let report = serde_json::json!({
        "plantId": "plant_missing",
        "userId": "user_1",
        "sensors": { "temp": 20.0 }
    });
    let (status, body) = request(&router, "POST", "/api/v1/telemetry", Some(report)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn issued_command_is_accepted_and_settles_on_acknowledgement() {
    let (_, ledger, router) = build_app();
    let plant_id = create_plant(&router, "user_1", "basil").await;

    let (status, receipt) = request(
        &router,
        "POST",
        &format!("/api/v1/devices/{plant_id}/commands"),
        Some(serde_json::json!({ "type": "water", "state": "on" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let action_id = receipt["actionId"].as_str().expect("actionId").to_string();
    let correlation_id: uuid::Uuid = receipt["correlationId"]
        .as_str()
        .expect("correlationId")
        .parse()
        .expect("uuid");

    let (status, body) =
        request(&router, "GET", &format!("/api/v1/actions/{action_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "issued");
    assert_eq!(body["origin"], "user-driven");

    assert!(ledger.confirm(correlation_id).await.expect("confirm"));
    let (_, body) =
        request(&router, "GET", &format!("/api/v1/actions/{action_id}"), None).await;
    assert_eq!(body["status"], "confirmed");
}

#[tokio::test]
async fn commands_for_unknown_devices_are_rejected() {
    let (_, _, router) = build_app();
    let (status, body) = request(
        &router,
        "POST",
        "/api/v1/devices/zone-missing/commands",
        Some(serde_json::json!({ "type": "fan", "state": "off" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn actuators_register_and_list_per_plant() {
    let (_, _, router) = build_app();
    let plant_id = create_plant(&router, "user_1", "basil").await;

    let (status, actuator) = request(
        &router,
        "POST",
        &format!("/api/v1/plants/{plant_id}/actuators"),
        Some(serde_json::json!({ "type": "water", "description": "drip pump" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(actuator["type"], "water");

    let (status, body) = request(
        &router,
        "GET",
        &format!("/api/v1/plants/{plant_id}/actuators"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let actuators = body.as_array().expect("actuator list");
    assert_eq!(actuators.len(), 1);
    assert_eq!(actuators[0]["description"], "drip pump");
}

#[tokio::test]
async fn actions_list_filters_by_device() {
    let (_, _, router) = build_app();
    let first = create_plant(&router, "user_1", "basil").await;
    let second = create_plant(&router, "user_1", "mint").await;

    for plant in [&first, &second] {
        let (status, _) = request(
            &router,
            "POST",
            &format!("/api/v1/devices/{plant}/commands"),
            Some(serde_json::json!({ "type": "light", "state": "on" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let (status, body) = request(
        &router,
        "GET",
        &format!("/api/v1/actions?deviceId={first}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let actions = body.as_array().expect("action list");
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["deviceId"], first.as_str());
}
