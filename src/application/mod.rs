//! Application services: the operations routes and workers call into.
//!
//! Each service owns its slice of the domain and goes through the
//! read-through coordinator for every read and write, so cache consistency
//! is handled in one place rather than per call site.

mod action_log;
mod device_control;
mod error;
pub mod jobs;
mod plants;
mod telemetry;

pub use action_log::ActionLogService;
pub use device_control::{CommandReceipt, DeviceControlService, NewActuator};
pub use error::{AppError, ServiceError};
pub use plants::{NewPlant, PlantService};
pub use telemetry::{IngestSummary, LogQuery, TelemetryService};

use crate::cache::CachedValue;
use crate::store::{Document, StoreError};

fn decode_one<T: serde::de::DeserializeOwned>(value: &CachedValue) -> Result<T, StoreError> {
    match value {
        CachedValue::Document(document) => document.decode(),
        CachedValue::List(_) => Err(StoreError::Decode(
            "expected a single document, found a list".into(),
        )),
    }
}

fn decode_list<T: serde::de::DeserializeOwned>(value: &CachedValue) -> Result<Vec<T>, StoreError> {
    let documents: &[Document] = match value {
        CachedValue::List(documents) => documents,
        CachedValue::Document(_) => {
            return Err(StoreError::Decode(
                "expected a list, found a single document".into(),
            ));
        }
    };
    documents.iter().map(Document::decode).collect()
}
