//! Read-through coordination between route handlers and the document store.
//!
//! Reads consult the cache first and fall through to a caller-supplied
//! loader on miss. A per-fingerprint gate guarantees at most one backing
//! load is outstanding per key: concurrent callers for the same key wait
//! on the gate and pick the loaded value up from the cache instead of
//! issuing duplicate reads. Loader failures propagate unchanged and are
//! never cached; neither are absent results.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::store::StoreError;

use super::keys::CacheKey;
use super::store::{CachedValue, QueryCache};

pub struct ReadThrough {
    cache: Arc<QueryCache>,
    enabled: bool,
    gates: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl ReadThrough {
    pub fn new(cache: Arc<QueryCache>, enabled: bool) -> Self {
        Self {
            cache,
            enabled,
            gates: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Cache-first read. `loader` is invoked at most once across all
    /// concurrent callers of the same key while its result remains cached.
    pub async fn read<F, Fut>(
        &self,
        key: CacheKey,
        loader: F,
    ) -> Result<Option<CachedValue>, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<CachedValue>, StoreError>>,
    {
        if !self.enabled {
            return loader().await;
        }

        if let Some(hit) = self.cache.get(&key) {
            return Ok(Some(hit));
        }

        let gate = self
            .gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = gate.lock().await;

        // A winner may have populated the cache while we waited.
        if let Some(hit) = self.cache.get(&key) {
            drop(guard);
            return Ok(Some(hit));
        }

        let result = loader().await;
        if let Ok(Some(value)) = &result {
            self.cache.put(key.clone(), value.clone());
        }
        drop(guard);
        self.gates.remove(&key);
        result
    }

    /// Run a mutation against the store, then drop every cache key the
    /// write could affect: the entity's own key plus all list keys of its
    /// collection.
    pub async fn write_through<F, Fut, T>(
        &self,
        collection: &'static str,
        id: Option<&str>,
        mutation: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let output = mutation().await?;
        self.invalidate_writes(collection, id);
        Ok(output)
    }

    pub fn invalidate_writes(&self, collection: &'static str, id: Option<&str>) {
        if !self.enabled {
            return;
        }
        if let Some(id) = id {
            self.cache.invalidate(&CacheKey::entity(collection, id));
        }
        self.cache.invalidate_lists(collection);
    }
}
