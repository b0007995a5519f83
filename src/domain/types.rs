//! Closed vocabularies shared across the telemetry and control paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Actuator families a grow-zone controller exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    Water,
    Light,
    Fan,
}

impl ActuatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Light => "light",
            Self::Fan => "fan",
        }
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActuatorKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "water" => Ok(Self::Water),
            "light" => Ok(Self::Light),
            "fan" => Ok(Self::Fan),
            other => Err(DomainError::validation(format!(
                "unknown actuator kind `{other}`"
            ))),
        }
    }
}

/// Desired or reported on/off state of an actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorState {
    On,
    Off,
}

impl ActuatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an action-log entry.
///
/// `Issued` may move to `Confirmed` or `TimedOut`; both of those are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    #[serde(rename = "issued")]
    Issued,
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "timed-out")]
    TimedOut,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::TimedOut)
    }
}

/// Who initiated an actuator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOrigin {
    #[serde(rename = "user-driven")]
    UserDriven,
    #[serde(rename = "device-driven")]
    DeviceDriven,
}

/// Sensor families reported by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    SoilMoisture,
    Light,
    Temperature,
    Humidity,
    AirQuality,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoilMoisture => "soil_moisture",
            Self::Light => "light",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::AirQuality => "air_quality",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuator_kind_round_trips_through_str() {
        for kind in [ActuatorKind::Water, ActuatorKind::Light, ActuatorKind::Fan] {
            assert_eq!(kind.as_str().parse::<ActuatorKind>().unwrap(), kind);
        }
        assert!("pump".parse::<ActuatorKind>().is_err());
    }

    #[test]
    fn action_status_serializes_with_dashes() {
        let json = serde_json::to_string(&ActionStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed-out\"");
        assert!(ActionStatus::TimedOut.is_terminal());
        assert!(!ActionStatus::Issued.is_terminal());
    }

    #[test]
    fn origin_serializes_with_dashes() {
        let json = serde_json::to_string(&CommandOrigin::DeviceDriven).unwrap();
        assert_eq!(json, "\"device-driven\"");
    }
}
