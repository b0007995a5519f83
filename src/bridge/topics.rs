//! Topic layout: one command topic and one status topic per device and
//! actuator, namespaced under `verdant/devices`.

use crate::domain::types::ActuatorKind;

pub const STATUS_SUBSCRIPTION: &str = "verdant/devices/+/actuators/+/status";

pub fn command_topic(device_id: &str, actuator: ActuatorKind) -> String {
    format!("verdant/devices/{device_id}/actuators/{actuator}/command")
}

pub fn status_topic(device_id: &str, actuator: ActuatorKind) -> String {
    format!("verdant/devices/{device_id}/actuators/{actuator}/status")
}

/// Split a status topic back into its device id and actuator kind.
pub fn parse_status_topic(topic: &str) -> Option<(String, ActuatorKind)> {
    let mut parts = topic.split('/');
    match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (
            Some("verdant"),
            Some("devices"),
            Some(device_id),
            Some("actuators"),
            Some(kind),
            Some("status"),
            None,
        ) => kind
            .parse::<ActuatorKind>()
            .ok()
            .map(|kind| (device_id.to_string(), kind)),
        _ => None,
    }
}
