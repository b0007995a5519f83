//! Correlation table and action-log state machine.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::cache::ReadThrough;
use crate::domain::entities::ActionLogRecord;
use crate::domain::types::{ActionStatus, ActuatorKind, ActuatorState, CommandOrigin};
use crate::store::{Document, DocumentStore, collections};

use super::{ActuatorCommand, BridgeError};

#[derive(Debug, Clone)]
struct InFlightCommand {
    action_id: String,
    device_id: String,
}

/// Tracks issued commands until they settle and writes the durable
/// action-log record exactly once per command.
///
/// Transitions go through `DashMap::remove`, so for any correlation id at
/// most one of `confirm`/`expire` ever observes the entry: a command that
/// timed out can never be confirmed afterwards.
pub struct CommandLedger {
    store: Arc<dyn DocumentStore>,
    reads: Arc<ReadThrough>,
    in_flight: DashMap<Uuid, InFlightCommand>,
}

impl CommandLedger {
    pub fn new(store: Arc<dyn DocumentStore>, reads: Arc<ReadThrough>) -> Self {
        Self {
            store,
            reads,
            in_flight: DashMap::new(),
        }
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Accept a command: write its action-log entry with status `issued`
    /// and register the correlation id. Returns the action-log id.
    pub async fn record_issued(&self, command: &ActuatorCommand) -> Result<String, BridgeError> {
        let action_id = format!("action_{}", Uuid::new_v4().simple());
        let record = ActionLogRecord {
            action_id: action_id.clone(),
            device_id: command.device_id.clone(),
            actuator: command.actuator,
            desired_state: command.desired_state,
            status: ActionStatus::Issued,
            origin: command.origin,
            correlation_id: Some(command.correlation_id),
            timestamp: command.issued_at,
        };
        self.write_log(&record).await?;

        self.in_flight.insert(
            command.correlation_id,
            InFlightCommand {
                action_id: action_id.clone(),
                device_id: command.device_id.clone(),
            },
        );
        Ok(action_id)
    }

    /// Settle a command as acknowledged. Returns false when the id is
    /// unknown (never issued, already settled, or already timed out), in
    /// which case nothing changes.
    pub async fn confirm(&self, correlation_id: Uuid) -> Result<bool, BridgeError> {
        let Some((_, pending)) = self.in_flight.remove(&correlation_id) else {
            debug!(%correlation_id, "ignoring acknowledgement for unknown or settled command");
            return Ok(false);
        };
        self.settle(&pending.action_id, ActionStatus::Confirmed).await?;
        // The device applied the command; its cached actuator state is stale.
        self.reads
            .cache()
            .invalidate_collection(collections::ACTUATORS);
        debug!(%correlation_id, device_id = %pending.device_id, "command acknowledged");
        Ok(true)
    }

    /// Settle a command as timed out. Terminal: once this succeeds a late
    /// acknowledgement finds no correlation entry and is ignored.
    pub async fn expire(&self, correlation_id: Uuid) -> Result<bool, BridgeError> {
        let Some((_, pending)) = self.in_flight.remove(&correlation_id) else {
            return Ok(false);
        };
        self.settle(&pending.action_id, ActionStatus::TimedOut).await?;
        debug!(%correlation_id, device_id = %pending.device_id, "command timed out");
        Ok(true)
    }

    /// Record an unsolicited device-driven event (e.g. threshold-triggered
    /// auto watering): one action-log entry, written directly as confirmed.
    pub async fn record_device_event(
        &self,
        device_id: &str,
        actuator: ActuatorKind,
        state: ActuatorState,
    ) -> Result<String, BridgeError> {
        let action_id = format!("action_{}", Uuid::new_v4().simple());
        let record = ActionLogRecord {
            action_id: action_id.clone(),
            device_id: device_id.to_string(),
            actuator,
            desired_state: state,
            status: ActionStatus::Confirmed,
            origin: CommandOrigin::DeviceDriven,
            correlation_id: None,
            timestamp: Utc::now(),
        };
        self.write_log(&record).await?;
        self.reads
            .cache()
            .invalidate_collection(collections::ACTUATORS);
        Ok(action_id)
    }

    async fn write_log(&self, record: &ActionLogRecord) -> Result<(), BridgeError> {
        let document = Document::encode(record.action_id.clone(), record)?;
        self.reads
            .write_through(collections::ACTION_LOGS, Some(&record.action_id), || async {
                self.store.put(collections::ACTION_LOGS, document).await
            })
            .await?;
        Ok(())
    }

    async fn settle(&self, action_id: &str, status: ActionStatus) -> Result<(), BridgeError> {
        let existing = self
            .store
            .get(collections::ACTION_LOGS, action_id)
            .await?
            .ok_or_else(|| BridgeError::MissingActionLog {
                action_id: action_id.to_string(),
            })?;
        let mut record: ActionLogRecord = existing.decode()?;
        record.status = status;

        let body = serde_json::to_value(&record)
            .map_err(|err| crate::store::StoreError::Decode(err.to_string()))?;
        // Keep the original timestamp: retention reasons about when the
        // action happened, not when it settled.
        let updated = Document::with_timestamp(action_id, body, existing.updated_at);
        self.reads
            .write_through(collections::ACTION_LOGS, Some(action_id), || async {
                self.store.put(collections::ACTION_LOGS, updated).await
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::{CacheConfig, QueryCache};
    use crate::store::memory::MemoryStore;

    use super::*;

    fn ledger() -> (Arc<MemoryStore>, CommandLedger) {
        let store = Arc::new(MemoryStore::new());
        let reads = Arc::new(ReadThrough::new(
            Arc::new(QueryCache::new(&CacheConfig::default())),
            true,
        ));
        let ledger = CommandLedger::new(store.clone(), reads);
        (store, ledger)
    }

    async fn log_status(store: &MemoryStore, action_id: &str) -> ActionStatus {
        store
            .get(collections::ACTION_LOGS, action_id)
            .await
            .unwrap()
            .unwrap()
            .decode::<ActionLogRecord>()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn issued_then_acknowledged() {
        let (store, ledger) = ledger();
        let command =
            ActuatorCommand::user_driven("zone-a", ActuatorKind::Water, ActuatorState::On);
        let action_id = ledger.record_issued(&command).await.unwrap();

        assert_eq!(log_status(&store, &action_id).await, ActionStatus::Issued);
        assert_eq!(ledger.in_flight_len(), 1);

        assert!(ledger.confirm(command.correlation_id).await.unwrap());
        assert_eq!(log_status(&store, &action_id).await, ActionStatus::Confirmed);
        assert_eq!(ledger.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn timed_out_is_terminal_even_for_late_acks() {
        let (store, ledger) = ledger();
        let command =
            ActuatorCommand::user_driven("zone-a", ActuatorKind::Fan, ActuatorState::On);
        let action_id = ledger.record_issued(&command).await.unwrap();

        assert!(ledger.expire(command.correlation_id).await.unwrap());
        assert_eq!(log_status(&store, &action_id).await, ActionStatus::TimedOut);

        // Late acknowledgement arrives after the timeout fired.
        assert!(!ledger.confirm(command.correlation_id).await.unwrap());
        assert_eq!(log_status(&store, &action_id).await, ActionStatus::TimedOut);
    }

    #[tokio::test]
    async fn confirm_after_settle_changes_nothing() {
        let (_, ledger) = ledger();
        let command =
            ActuatorCommand::user_driven("zone-a", ActuatorKind::Light, ActuatorState::Off);
        ledger.record_issued(&command).await.unwrap();

        assert!(ledger.confirm(command.correlation_id).await.unwrap());
        assert!(!ledger.confirm(command.correlation_id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_correlation_is_ignored() {
        let (_, ledger) = ledger();
        assert!(!ledger.confirm(Uuid::new_v4()).await.unwrap());
        assert!(!ledger.expire(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn device_event_is_logged_confirmed_and_device_driven() {
        let (store, ledger) = ledger();
        let action_id = ledger
            .record_device_event("zone-a", ActuatorKind::Water, ActuatorState::On)
            .await
            .unwrap();

        let record: ActionLogRecord = store
            .get(collections::ACTION_LOGS, &action_id)
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(record.status, ActionStatus::Confirmed);
        assert_eq!(record.origin, CommandOrigin::DeviceDriven);
        assert!(record.correlation_id.is_none());
        assert_eq!(ledger.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn settling_preserves_the_issue_timestamp() {
        let (store, ledger) = ledger();
        let command =
            ActuatorCommand::user_driven("zone-a", ActuatorKind::Water, ActuatorState::On);
        let action_id = ledger.record_issued(&command).await.unwrap();
        let before = store
            .get(collections::ACTION_LOGS, &action_id)
            .await
            .unwrap()
            .unwrap()
            .updated_at;

        ledger.confirm(command.correlation_id).await.unwrap();
        let after = store
            .get(collections::ACTION_LOGS, &action_id)
            .await
            .unwrap()
            .unwrap()
            .updated_at;
        assert_eq!(before, after);
    }
}
