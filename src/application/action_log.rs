//! Read side of the action log: the history callers poll to learn how a
//! command settled.

use std::sync::Arc;

use crate::cache::{CacheKey, CachedValue, ReadThrough};
use crate::domain::entities::ActionLogRecord;
use crate::store::{DocumentStore, QueryFilter, collections};

use super::{ServiceError, decode_list, decode_one};

pub struct ActionLogService {
    store: Arc<dyn DocumentStore>,
    reads: Arc<ReadThrough>,
}

impl ActionLogService {
    pub fn new(store: Arc<dyn DocumentStore>, reads: Arc<ReadThrough>) -> Self {
        Self { store, reads }
    }

    pub async fn get(&self, action_id: &str) -> Result<ActionLogRecord, ServiceError> {
        let key = CacheKey::entity(collections::ACTION_LOGS, action_id);
        let cached = self
            .reads
            .read(key, || async {
                Ok(self
                    .store
                    .get(collections::ACTION_LOGS, action_id)
                    .await?
                    .map(CachedValue::Document))
            })
            .await?
            .ok_or_else(|| ServiceError::not_found("action log", action_id))?;
        Ok(decode_one(&cached)?)
    }

    /// Action history, newest first, optionally scoped to one device.
    pub async fn list(
        &self,
        device_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<ActionLogRecord>, ServiceError> {
        let mut filter = QueryFilter::default();
        if let Some(device_id) = device_id {
            filter = filter.field_equals("deviceId", device_id);
        }
        if let Some(limit) = limit {
            filter = filter.limit(limit);
        }

        let key = CacheKey::list(collections::ACTION_LOGS, &filter);
        let cached = self
            .reads
            .read(key, || async {
                let documents = self.store.query(collections::ACTION_LOGS, &filter).await?;
                Ok(Some(CachedValue::List(documents)))
            })
            .await?;
        match cached {
            Some(value) => Ok(decode_list(&value)?),
            None => Ok(Vec::new()),
        }
    }
}
