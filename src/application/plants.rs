//! Plant registry: create, fetch, list, threshold updates, delete.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::cache::{CacheKey, CachedValue, ReadThrough};
use crate::domain::entities::{PlantRecord, Thresholds};
use crate::store::{Document, DocumentStore, QueryFilter, collections};

use super::{ServiceError, decode_list, decode_one};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlant {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub thresholds: Thresholds,
}

pub struct PlantService {
    store: Arc<dyn DocumentStore>,
    reads: Arc<ReadThrough>,
}

impl PlantService {
    pub fn new(store: Arc<dyn DocumentStore>, reads: Arc<ReadThrough>) -> Self {
        Self { store, reads }
    }

    pub async fn create(&self, new_plant: NewPlant) -> Result<PlantRecord, ServiceError> {
        if new_plant.name.trim().is_empty() {
            return Err(ServiceError::validation("plant name must not be empty"));
        }
        let now = Utc::now();
        let record = PlantRecord {
            plant_id: format!("plant_{}", Uuid::new_v4().simple()),
            user_id: new_plant.user_id,
            name: new_plant.name,
            thresholds: new_plant.thresholds,
            created_at: now,
            updated_at: now,
        };
        let document = Document::encode(record.plant_id.clone(), &record)?;
        self.reads
            .write_through(collections::PLANTS, Some(&record.plant_id), || async {
                self.store.put(collections::PLANTS, document).await
            })
            .await?;
        info!(plant_id = %record.plant_id, "plant registered");
        Ok(record)
    }

    pub async fn get(&self, plant_id: &str) -> Result<PlantRecord, ServiceError> {
        let key = CacheKey::entity(collections::PLANTS, plant_id);
        let cached = self
            .reads
            .read(key, || async {
                Ok(self
                    .store
                    .get(collections::PLANTS, plant_id)
                    .await?
                    .map(CachedValue::Document))
            })
            .await?
            .ok_or_else(|| ServiceError::not_found("plant", plant_id))?;
        Ok(decode_one(&cached)?)
    }

    pub async fn list(&self, user_id: Option<&str>) -> Result<Vec<PlantRecord>, ServiceError> {
        let mut filter = QueryFilter::default();
        if let Some(user_id) = user_id {
            filter = filter.field_equals("userId", user_id);
        }
        let key = CacheKey::list(collections::PLANTS, &filter);
        let cached = self
            .reads
            .read(key, || async {
                let documents = self.store.query(collections::PLANTS, &filter).await?;
                Ok(Some(CachedValue::List(documents)))
            })
            .await?;
        match cached {
            Some(value) => Ok(decode_list(&value)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn update_thresholds(
        &self,
        plant_id: &str,
        thresholds: Thresholds,
    ) -> Result<PlantRecord, ServiceError> {
        let existing = self
            .store
            .get(collections::PLANTS, plant_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("plant", plant_id))?;
        let mut record: PlantRecord = existing.decode()?;
        record.thresholds = thresholds;
        record.updated_at = Utc::now();

        let document = Document::encode(plant_id, &record)?;
        self.reads
            .write_through(collections::PLANTS, Some(plant_id), || async {
                self.store.put(collections::PLANTS, document).await
            })
            .await?;
        Ok(record)
    }

    pub async fn delete(&self, plant_id: &str) -> Result<(), ServiceError> {
        if self.store.get(collections::PLANTS, plant_id).await?.is_none() {
            return Err(ServiceError::not_found("plant", plant_id));
        }
        self.reads
            .write_through(collections::PLANTS, Some(plant_id), || async {
                self.store.delete(collections::PLANTS, plant_id).await
            })
            .await?;
        info!(plant_id, "plant deleted");
        Ok(())
    }
}
