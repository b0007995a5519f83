//! Typed views over the documents the backend persists.
//!
//! Documents live in a schemaless store; these records define the shape the
//! application reads and writes. Field names stay camelCase on the wire to
//! match what deployed controllers and dashboards already send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{ActionStatus, ActuatorKind, ActuatorState, CommandOrigin, SensorKind};

/// A monitored plant (one grow zone).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantRecord {
    pub plant_id: String,
    pub user_id: String,
    pub name: String,
    pub thresholds: Thresholds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comfort envelope used by device-side automation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub moisture_min: f64,
    pub moisture_max: f64,
    pub light_min: f64,
    pub light_max: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
}

/// A logical sensor attached to a plant, auto-created on first reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRecord {
    pub sensor_id: String,
    pub plant_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: SensorKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// One time-series sample from one sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReadingRecord {
    pub log_id: String,
    pub sensor_id: String,
    pub plant_id: String,
    #[serde(rename = "type")]
    pub kind: SensorKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Registered actuator hardware for a plant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorRecord {
    pub actuator_id: String,
    pub plant_id: String,
    #[serde(rename = "type")]
    pub kind: ActuatorKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Durable record of one actuator action, written exactly once per command
/// and updated in place as the command settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogRecord {
    pub action_id: String,
    pub device_id: String,
    pub actuator: ActuatorKind,
    pub desired_state: ActuatorState,
    pub status: ActionStatus,
    pub origin: CommandOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Raw per-zone readings in one environmental report. All fields optional:
/// controllers omit sensors they do not carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReadings {
    pub soil_moisture: Option<f64>,
    pub light: Option<f64>,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub air_quality: Option<f64>,
}

impl SensorReadings {
    /// Present readings paired with their sensor kind, in report order.
    pub fn present(&self) -> Vec<(SensorKind, f64)> {
        let mut readings = Vec::new();
        if let Some(value) = self.soil_moisture {
            readings.push((SensorKind::SoilMoisture, value));
        }
        if let Some(value) = self.light {
            readings.push((SensorKind::Light, value));
        }
        if let Some(value) = self.temp {
            readings.push((SensorKind::Temperature, value));
        }
        if let Some(value) = self.humidity {
            readings.push((SensorKind::Humidity, value));
        }
        if let Some(value) = self.air_quality {
            readings.push((SensorKind::AirQuality, value));
        }
        readings
    }
}

/// Device-side automation outcomes reported alongside the readings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationFlags {
    pub water_on: bool,
    pub light_on: bool,
    pub fan_on: bool,
}

impl AutomationFlags {
    /// Actuators the device switched on by itself during this report.
    pub fn triggered(&self) -> Vec<ActuatorKind> {
        let mut kinds = Vec::new();
        if self.water_on {
            kinds.push(ActuatorKind::Water);
        }
        if self.light_on {
            kinds.push(ActuatorKind::Light);
        }
        if self.fan_on {
            kinds.push(ActuatorKind::Fan);
        }
        kinds
    }
}

/// One full environmental report pushed by a controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalReport {
    pub plant_id: String,
    pub user_id: String,
    pub sensors: SensorReadings,
    #[serde(default)]
    pub automation: AutomationFlags,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}
