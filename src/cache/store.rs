//! Cache storage: bounded LRU with a fixed TTL.
//!
//! One `RwLock` protects both the key map and the recency order; the two
//! are never updated independently. TTL is checked lazily on read, and a
//! periodic [`QueryCache::purge_expired`] sweep bounds memory for keys that
//! are written but never read again.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;

use crate::store::Document;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// A cached read result: one document or one list page.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Document(Document),
    List(Vec<Document>),
}

struct CacheEntry {
    value: CachedValue,
    inserted_at: Instant,
}

pub struct QueryCache {
    entries: RwLock<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_ttl(config.capacity_non_zero(), config.ttl())
    }

    pub fn with_ttl(capacity: std::num::NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Look up a fingerprint. An entry whose age has reached the TTL is
    /// absent even when it is the most recently used; it is popped on the
    /// spot. A fresh hit promotes the key to most-recently-used.
    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let mut guard = rw_write(&self.entries, SOURCE, "get");
        let expired = match guard.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                counter!("verdant_cache_hit_total").increment(1);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            guard.pop(key);
            counter!("verdant_cache_expired_total").increment(1);
        }
        counter!("verdant_cache_miss_total").increment(1);
        None
    }

    /// Insert or overwrite, resetting the entry's age and recency. When the
    /// cache is full the least-recently-used entry is evicted first.
    pub fn put(&self, key: CacheKey, value: CachedValue) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        let evicted = rw_write(&self.entries, SOURCE, "put").push(key.clone(), entry);
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                counter!("verdant_cache_evict_total").increment(1);
            }
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        rw_write(&self.entries, SOURCE, "invalidate").pop(key);
    }

    /// Remove every key belonging to a collection family. Used when a write
    /// affects fingerprints the writer cannot compute exactly.
    pub fn invalidate_collection(&self, collection: &str) {
        let mut guard = rw_write(&self.entries, SOURCE, "invalidate_collection");
        let doomed: Vec<CacheKey> = guard
            .iter()
            .filter(|(key, _)| key.collection() == collection)
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            guard.pop(&key);
        }
    }

    /// Remove only the list keys of a collection, leaving entity keys that
    /// the writer invalidates exactly.
    pub fn invalidate_lists(&self, collection: &str) {
        let mut guard = rw_write(&self.entries, SOURCE, "invalidate_lists");
        let doomed: Vec<CacheKey> = guard
            .iter()
            .filter(|(key, _)| key.is_list() && key.collection() == collection)
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            guard.pop(&key);
        }
    }

    /// Best-effort sweep of entries past their TTL. Returns how many were
    /// dropped.
    pub fn purge_expired(&self) -> usize {
        let mut guard = rw_write(&self.entries, SOURCE, "purge_expired");
        let doomed: Vec<CacheKey> = guard
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        let purged = doomed.len();
        for key in doomed {
            guard.pop(&key);
        }
        if purged > 0 {
            counter!("verdant_cache_expired_total").increment(purged as u64);
        }
        purged
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
