//! Actuator command bridge.
//!
//! Commands flow out to devices over MQTT and acknowledgements flow back:
//!
//! - [`CommandLedger`] owns the in-flight correlation table and the
//!   action-log state machine (`Issued -> Confirmed | TimedOut`).
//! - [`ActuatorBridge`] owns the broker connection: bounded publish queue,
//!   reconnect with capped backoff, re-subscription on every ConnAck.
//!
//! Correlation state lives only until a command settles; durable history is
//! the `ActionLog` collection.

mod correlation;
mod mqtt;
pub mod topics;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::types::{ActuatorKind, ActuatorState, CommandOrigin};
use crate::store::StoreError;

pub use correlation::CommandLedger;
pub use mqtt::{ActuatorBridge, BridgeWorker};

/// Outbound command seam. [`ActuatorBridge`] is the production
/// implementation; services depend on the trait so tests can swap in a
/// broker-less double.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Accept a command for delivery, returning its action-log id.
    async fn issue(&self, command: ActuatorCommand) -> Result<String, BridgeError>;
}

/// An actuator command accepted from a caller or derived from telemetry.
#[derive(Debug, Clone)]
pub struct ActuatorCommand {
    pub device_id: String,
    pub actuator: ActuatorKind,
    pub desired_state: ActuatorState,
    pub origin: CommandOrigin,
    pub issued_at: DateTime<Utc>,
    pub correlation_id: Uuid,
}

impl ActuatorCommand {
    pub fn user_driven(
        device_id: impl Into<String>,
        actuator: ActuatorKind,
        desired_state: ActuatorState,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            actuator,
            desired_state,
            origin: CommandOrigin::UserDriven,
            issued_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }
}

/// Wire payload published on a command topic.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPayload {
    pub correlation_id: Uuid,
    pub state: ActuatorState,
    pub issued_at: DateTime<Utc>,
}

/// Wire payload received on a status topic. A missing correlation id marks
/// an unsolicited, device-driven event.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    pub state: ActuatorState,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("action log `{action_id}` missing while settling command")]
    MissingActionLog { action_id: String },
    #[error("status payload could not be parsed: {0}")]
    Payload(String),
}
