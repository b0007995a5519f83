//! Actuator registry and user-driven command issuance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::bridge::{ActuatorCommand, CommandSink};
use crate::cache::{CacheKey, CachedValue, ReadThrough};
use crate::domain::entities::ActuatorRecord;
use crate::domain::types::{ActuatorKind, ActuatorState};
use crate::store::{Document, DocumentStore, QueryFilter, collections};

use super::{ServiceError, decode_list};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActuator {
    #[serde(rename = "type")]
    pub kind: ActuatorKind,
    #[serde(default)]
    pub description: String,
}

/// What the caller gets back for an accepted command: enough to poll the
/// action log for the outcome.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReceipt {
    pub action_id: String,
    pub correlation_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

pub struct DeviceControlService {
    store: Arc<dyn DocumentStore>,
    reads: Arc<ReadThrough>,
    sink: Arc<dyn CommandSink>,
}

impl DeviceControlService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        reads: Arc<ReadThrough>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self { store, reads, sink }
    }

    /// Accept a user-driven actuator command for a registered device. The
    /// command is durable (action log, status `issued`) before this
    /// returns; delivery and settlement happen asynchronously.
    pub async fn issue_command(
        &self,
        device_id: &str,
        actuator: ActuatorKind,
        state: ActuatorState,
    ) -> Result<CommandReceipt, ServiceError> {
        if self.store.get(collections::PLANTS, device_id).await?.is_none() {
            return Err(ServiceError::not_found("device", device_id));
        }

        let command = ActuatorCommand::user_driven(device_id, actuator, state);
        let correlation_id = command.correlation_id;
        let issued_at = command.issued_at;
        let action_id = self.sink.issue(command).await?;
        info!(device_id, %actuator, %state, %action_id, "command accepted");
        Ok(CommandReceipt {
            action_id,
            correlation_id,
            issued_at,
        })
    }

    pub async fn register_actuator(
        &self,
        plant_id: &str,
        new_actuator: NewActuator,
    ) -> Result<ActuatorRecord, ServiceError> {
        if self.store.get(collections::PLANTS, plant_id).await?.is_none() {
            return Err(ServiceError::not_found("plant", plant_id));
        }

        let record = ActuatorRecord {
            actuator_id: format!("actuator_{}", Uuid::new_v4().simple()),
            plant_id: plant_id.to_string(),
            kind: new_actuator.kind,
            description: new_actuator.description,
            created_at: Utc::now(),
        };
        let document = Document::encode(record.actuator_id.clone(), &record)?;
        self.reads
            .write_through(collections::ACTUATORS, Some(&record.actuator_id), || async {
                self.store.put(collections::ACTUATORS, document).await
            })
            .await?;
        Ok(record)
    }

    pub async fn list_actuators(
        &self,
        plant_id: &str,
    ) -> Result<Vec<ActuatorRecord>, ServiceError> {
        let filter = QueryFilter::default().field_equals("plantId", plant_id);
        let key = CacheKey::list(collections::ACTUATORS, &filter);
        let cached = self
            .reads
            .read(key, || async {
                let documents = self.store.query(collections::ACTUATORS, &filter).await?;
                Ok(Some(CachedValue::List(documents)))
            })
            .await?;
        match cached {
            Some(value) => Ok(decode_list(&value)?),
            None => Ok(Vec::new()),
        }
    }
}
