//! Postgres-backed document store.
//!
//! Documents live in one `documents` table keyed by (collection, id) with a
//! jsonb body. Field-equality filters compile to jsonb containment so the
//! GIN-indexable operator does the work; timestamp-range and limit clauses
//! map straight onto `updated_at`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Postgres, QueryBuilder, Row,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::store::{Document, DocumentStore, QueryFilter, StoreError};

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    StoreError::from_persistence(err)
}

fn row_to_document(row: &sqlx::postgres::PgRow) -> Result<Document, StoreError> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let body: serde_json::Value = row.try_get("body").map_err(map_sqlx_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(map_sqlx_error)?;
    Ok(Document::with_timestamp(id, body, updated_at))
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = query("SELECT id, body, updated_at FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn query(
        &self,
        collection: &str,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, StoreError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT id, body, updated_at FROM documents WHERE collection = ");
        qb.push_bind(collection);

        for (field, value) in &filter.equals {
            qb.push(" AND body @> ");
            qb.push_bind(serde_json::json!({ field.as_str(): value }));
        }
        if let Some(cutoff) = filter.older_than {
            qb.push(" AND updated_at < ");
            qb.push_bind(cutoff);
        }
        if let Some(start) = filter.newer_than {
            qb.push(" AND updated_at >= ");
            qb.push_bind(start);
        }
        qb.push(" ORDER BY updated_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_document).collect()
    }

    async fn put(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        query(
            "INSERT INTO documents (collection, id, body, updated_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (collection, id) \
             DO UPDATE SET body = EXCLUDED.body, updated_at = EXCLUDED.updated_at",
        )
        .bind(collection)
        .bind(&document.id)
        .bind(&document.body)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<u64, StoreError> {
        let result = query("DELETE FROM documents WHERE collection = $1 AND id = ANY($2)")
            .bind(collection)
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
