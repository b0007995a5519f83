//! Telemetry ingest and sensor-history queries.
//!
//! One environmental report fans out into: per-sensor `SensorLog` entries
//! (auto-creating the sensor on first sight), one `EnvironmentalSensorData`
//! snapshot, and a confirmed device-driven action-log entry for every
//! actuator the device's own automation switched on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bridge::CommandLedger;
use crate::cache::{CacheKey, CachedValue, ReadThrough};
use crate::domain::entities::{EnvironmentalReport, SensorReadingRecord, SensorRecord};
use crate::domain::types::SensorKind;
use crate::store::{Document, DocumentStore, QueryFilter, collections};

use super::{ServiceError, decode_list};

/// What one ingest call produced, echoed back to the controller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub environment_id: String,
    pub readings_logged: usize,
    pub actions_logged: usize,
}

/// Caller-facing knobs for sensor-history queries.
#[derive(Debug, Default, Clone)]
pub struct LogQuery {
    pub kind: Option<SensorKind>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

pub struct TelemetryService {
    store: Arc<dyn DocumentStore>,
    reads: Arc<ReadThrough>,
    ledger: Arc<CommandLedger>,
}

impl TelemetryService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        reads: Arc<ReadThrough>,
        ledger: Arc<CommandLedger>,
    ) -> Self {
        Self {
            store,
            reads,
            ledger,
        }
    }

    pub async fn ingest(&self, report: EnvironmentalReport) -> Result<IngestSummary, ServiceError> {
        if self
            .store
            .get(collections::PLANTS, &report.plant_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::not_found("plant", &report.plant_id));
        }

        let readings = report.sensors.present();
        if readings.is_empty() {
            return Err(ServiceError::validation(
                "report carries no sensor readings",
            ));
        }

        for (kind, value) in &readings {
            let sensor = self
                .sensor_for(&report.plant_id, &report.user_id, *kind)
                .await?;
            let reading = SensorReadingRecord {
                log_id: format!("log_{}", Uuid::new_v4().simple()),
                sensor_id: sensor.sensor_id,
                plant_id: report.plant_id.clone(),
                kind: *kind,
                value: *value,
                timestamp: report.recorded_at,
            };
            let document = Document::with_timestamp(
                reading.log_id.clone(),
                serde_json::to_value(&reading)
                    .map_err(|err| crate::store::StoreError::Decode(err.to_string()))?,
                report.recorded_at,
            );
            self.reads
                .write_through(collections::SENSOR_LOGS, Some(&reading.log_id), || async {
                    self.store.put(collections::SENSOR_LOGS, document).await
                })
                .await?;
        }
        counter!("verdant_ingest_readings_total").increment(readings.len() as u64);

        let environment_id = format!("env_{}", Uuid::new_v4().simple());
        let snapshot = Document::with_timestamp(
            environment_id.clone(),
            serde_json::to_value(&report)
                .map_err(|err| crate::store::StoreError::Decode(err.to_string()))?,
            report.recorded_at,
        );
        self.reads
            .write_through(
                collections::ENVIRONMENTAL_DATA,
                Some(&environment_id),
                || async {
                    self.store
                        .put(collections::ENVIRONMENTAL_DATA, snapshot)
                        .await
                },
            )
            .await?;

        let triggered = report.automation.triggered();
        for actuator in &triggered {
            self.ledger
                .record_device_event(&report.plant_id, *actuator, crate::domain::types::ActuatorState::On)
                .await?;
        }

        info!(
            plant_id = %report.plant_id,
            readings = readings.len(),
            actions = triggered.len(),
            "telemetry report ingested"
        );
        Ok(IngestSummary {
            environment_id,
            readings_logged: readings.len(),
            actions_logged: triggered.len(),
        })
    }

    /// Sensor-history page for one plant, newest first, served through the
    /// cache.
    pub async fn logs(
        &self,
        plant_id: &str,
        query: LogQuery,
    ) -> Result<Vec<SensorReadingRecord>, ServiceError> {
        let mut filter = QueryFilter::default().field_equals("plantId", plant_id);
        if let Some(kind) = query.kind {
            filter = filter.field_equals("type", kind.as_str());
        }
        if let Some(since) = query.since {
            filter = filter.newer_than(since);
        }
        if let Some(limit) = query.limit {
            filter = filter.limit(limit);
        }

        let key = CacheKey::list(collections::SENSOR_LOGS, &filter);
        let cached = self
            .reads
            .read(key, || async {
                let documents = self.store.query(collections::SENSOR_LOGS, &filter).await?;
                Ok(Some(CachedValue::List(documents)))
            })
            .await?;
        match cached {
            Some(value) => Ok(decode_list(&value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Recent raw environmental snapshots for one plant, newest first.
    pub async fn recent_reports(
        &self,
        plant_id: &str,
        limit: usize,
    ) -> Result<Vec<EnvironmentalReport>, ServiceError> {
        let filter = QueryFilter::default()
            .field_equals("plantId", plant_id)
            .limit(limit);
        let key = CacheKey::list(collections::ENVIRONMENTAL_DATA, &filter);
        let cached = self
            .reads
            .read(key, || async {
                let documents = self
                    .store
                    .query(collections::ENVIRONMENTAL_DATA, &filter)
                    .await?;
                Ok(Some(CachedValue::List(documents)))
            })
            .await?;
        match cached {
            Some(value) => Ok(decode_list(&value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Look the plant's sensor of this kind up, creating it on first use.
    /// Sensor ids are deterministic per plant and kind, so re-ingest never
    /// duplicates sensors.
    async fn sensor_for(
        &self,
        plant_id: &str,
        user_id: &str,
        kind: SensorKind,
    ) -> Result<SensorRecord, ServiceError> {
        let sensor_id = format!("sensor_{plant_id}_{kind}");
        if let Some(existing) = self.store.get(collections::SENSORS, &sensor_id).await? {
            return Ok(existing.decode()?);
        }

        let record = SensorRecord {
            sensor_id: sensor_id.clone(),
            plant_id: plant_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            description: format!("{kind} sensor (auto-registered)"),
            created_at: Utc::now(),
        };
        let document = Document::encode(sensor_id.clone(), &record)?;
        self.reads
            .write_through(collections::SENSORS, Some(&sensor_id), || async {
                self.store.put(collections::SENSORS, document).await
            })
            .await?;
        debug!(%sensor_id, "sensor auto-registered");
        Ok(record)
    }
}
