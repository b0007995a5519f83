//! In-process document store used by unit and integration tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::cache::lock::{rw_read, rw_write};

use super::{Document, DocumentStore, QueryFilter, StoreError};

const SOURCE: &str = "store::memory";

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        rw_read(&self.collections, SOURCE, "len")
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(rw_read(&self.collections, SOURCE, "get")
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(
        &self,
        collection: &str,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, StoreError> {
        let guard = rw_read(&self.collections, SOURCE, "query");
        let mut matched: Vec<Document> = guard
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(guard);

        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn put(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        rw_write(&self.collections, SOURCE, "put")
            .entry(collection.to_string())
            .or_default()
            .insert(document.id.clone(), document);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        if let Some(docs) = rw_write(&self.collections, SOURCE, "delete").get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<u64, StoreError> {
        let mut guard = rw_write(&self.collections, SOURCE, "delete_batch");
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let mut deleted = 0;
        for id in ids {
            if docs.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = MemoryStore::new();
        store
            .put("Plants", Document::new("plant_1", serde_json::json!({"name": "basil"})))
            .await
            .unwrap();

        let doc = store.get("Plants", "plant_1").await.unwrap().unwrap();
        assert_eq!(doc.body["name"], "basil");

        store.delete("Plants", "plant_1").await.unwrap();
        assert!(store.get("Plants", "plant_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_orders_newest_first_and_limits() {
        let store = MemoryStore::new();
        let base = Utc::now();
        for i in 0..5 {
            store
                .put(
                    "SensorLog",
                    Document::with_timestamp(
                        format!("log_{i}"),
                        serde_json::json!({"plantId": "p"}),
                        base + Duration::seconds(i),
                    ),
                )
                .await
                .unwrap();
        }

        let filter = QueryFilter::default().field_equals("plantId", "p").limit(2);
        let docs = store.query("SensorLog", &filter).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "log_4");
        assert_eq!(docs[1].id, "log_3");
    }

    #[tokio::test]
    async fn delete_batch_counts_only_existing() {
        let store = MemoryStore::new();
        store
            .put("ActionLog", Document::new("a", serde_json::json!({})))
            .await
            .unwrap();

        let deleted = store
            .delete_batch("ActionLog", &["a".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let deleted = store
            .delete_batch("ActionLog", &["a".into()])
            .await
            .unwrap();
        assert_eq!(deleted, 0, "second delete of same id is a no-op");
    }
}
