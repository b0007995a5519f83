//! Cache key fingerprints.
//!
//! A fingerprint is a pure function of the logical read it names: the
//! collection plus either a document id or a hashed query filter. Nothing
//! here depends on the clock, so two identical reads always produce the
//! same key.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::store::QueryFilter;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A single document looked up by id.
    Entity {
        collection: &'static str,
        id: String,
    },
    /// A list query over a collection, identified by its filter hash.
    List {
        collection: &'static str,
        query_hash: u64,
    },
}

impl CacheKey {
    pub fn entity(collection: &'static str, id: impl Into<String>) -> Self {
        Self::Entity {
            collection,
            id: id.into(),
        }
    }

    pub fn list(collection: &'static str, filter: &QueryFilter) -> Self {
        Self::List {
            collection,
            query_hash: hash_filter(filter),
        }
    }

    /// The collection family this key belongs to, used for prefix
    /// invalidation.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Entity { collection, .. } | Self::List { collection, .. } => collection,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List { .. })
    }
}

/// Hash a query filter into a stable list-key discriminant.
pub fn hash_filter(filter: &QueryFilter) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (field, value) in &filter.equals {
        field.hash(&mut hasher);
        value.to_string().hash(&mut hasher);
    }
    filter.older_than.map(|t| t.timestamp_micros()).hash(&mut hasher);
    filter.newer_than.map(|t| t.timestamp_micros()).hash(&mut hasher);
    filter.limit.hash(&mut hasher);
    hasher.finish()
}
