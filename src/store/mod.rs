//! Document-store boundary.
//!
//! The backend treats persistence as a generic collection/id document store
//! with a last-write timestamp per document. Everything above this module
//! depends on [`DocumentStore`] only; the Postgres adapter lives in
//! `infra::db` and [`memory::MemoryStore`] backs the tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Collection names, matching what deployed dashboards already query.
pub mod collections {
    pub const PLANTS: &str = "Plants";
    pub const SENSORS: &str = "Sensor";
    pub const SENSOR_LOGS: &str = "SensorLog";
    pub const ENVIRONMENTAL_DATA: &str = "EnvironmentalSensorData";
    pub const ACTION_LOGS: &str = "ActionLog";
    pub const ACTUATORS: &str = "Actuator";
}

/// One stored document. `updated_at` is the retention timestamp: the
/// sweeper compares it against the rolling window cutoff.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, body: serde_json::Value) -> Self {
        Self::with_timestamp(id, body, Utc::now())
    }

    pub fn with_timestamp(
        id: impl Into<String>,
        body: serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            body,
            updated_at,
        }
    }

    /// Encode a record into a document, keyed by `id`.
    pub fn encode<T: Serialize>(id: impl Into<String>, record: &T) -> Result<Self, StoreError> {
        let body = serde_json::to_value(record)
            .map_err(|err| StoreError::Decode(err.to_string()))?;
        Ok(Self::new(id, body))
    }

    /// Decode the body into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.body.clone()).map_err(|err| StoreError::Decode(err.to_string()))
    }
}

/// The narrow query surface routes and the sweeper need: top-level field
/// equality, a timestamp range, and a result cap. Results are newest-first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub equals: Vec<(String, serde_json::Value)>,
    pub older_than: Option<DateTime<Utc>>,
    pub newer_than: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl QueryFilter {
    pub fn field_equals(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    /// Keep documents with `updated_at` strictly before the cutoff.
    pub fn older_than(mut self, cutoff: DateTime<Utc>) -> Self {
        self.older_than = Some(cutoff);
        self
    }

    /// Keep documents with `updated_at` at or after the start.
    pub fn newer_than(mut self, start: DateTime<Utc>) -> Self {
        self.newer_than = Some(start);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        if let Some(cutoff) = self.older_than {
            if document.updated_at >= cutoff {
                return false;
            }
        }
        if let Some(start) = self.newer_than {
            if document.updated_at < start {
                return false;
            }
        }
        self.equals
            .iter()
            .all(|(field, value)| document.body.get(field) == Some(value))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("document decode failed: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(
        &self,
        collection: &str,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, StoreError>;

    async fn put(&self, collection: &str, document: Document) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Delete the given ids, returning how many documents actually existed.
    /// Deleting an already-deleted id is a no-op, which keeps retention
    /// sweeps idempotent.
    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<u64, StoreError>;
}
