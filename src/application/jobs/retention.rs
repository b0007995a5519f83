//! Rolling-window retention sweep.
//!
//! Once a day the sweeper deletes documents from the governed collections
//! whose `updated_at` fell out of the retention window. Deletes happen in
//! bounded batches so a large backlog never turns into one giant write,
//! and a run guard keeps overlapping ticks from sweeping concurrently: a
//! tick that finds the previous run still going is skipped, not queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use apalis::prelude::Data;
use apalis_cron::CronContext;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tracing::{info, warn};

use crate::config::RetentionSettings;
use crate::store::{DocumentStore, QueryFilter, StoreError};

/// Cron tick marker. Carries the tick timestamp the cutoff is computed
/// from, so a delayed run still sweeps relative to its scheduled time.
#[derive(Debug, Clone, Default)]
pub struct RetentionSweepJob(pub DateTime<Utc>);

impl From<DateTime<Utc>> for RetentionSweepJob {
    fn from(tick: DateTime<Utc>) -> Self {
        Self(tick)
    }
}

#[derive(Clone)]
pub struct RetentionContext {
    pub store: Arc<dyn DocumentStore>,
    pub settings: RetentionSettings,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl RetentionContext {
    pub fn new(store: Arc<dyn DocumentStore>, settings: RetentionSettings) -> Self {
        Self {
            store,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask an in-progress sweep to stop after its current batch.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// How one tick went.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub deleted: u64,
    /// The previous run was still in progress; nothing was swept.
    pub skipped: bool,
    /// Shutdown was requested mid-sweep; remaining batches wait for the
    /// next tick.
    pub aborted: bool,
}

/// Worker entry point for the cron stream.
pub async fn run_retention_sweep(
    _job: RetentionSweepJob,
    cron: CronContext<Utc>,
    ctx: Data<RetentionContext>,
) -> Result<(), StoreError> {
    let outcome = sweep(&ctx, *cron.get_timestamp()).await?;
    if outcome.skipped {
        warn!("retention sweep still running, skipping this tick");
    } else {
        info!(
            deleted = outcome.deleted,
            aborted = outcome.aborted,
            "retention sweep finished"
        );
    }
    Ok(())
}

/// Sweep every governed collection once, relative to `tick`.
pub async fn sweep(
    ctx: &RetentionContext,
    tick: DateTime<Utc>,
) -> Result<SweepOutcome, StoreError> {
    if ctx.running.swap(true, Ordering::SeqCst) {
        return Ok(SweepOutcome {
            skipped: true,
            ..Default::default()
        });
    }
    let _guard = RunGuard(&ctx.running);

    let cutoff = tick - Duration::days(i64::from(ctx.settings.window_days));
    let mut outcome = SweepOutcome::default();

    'collections: for collection in &ctx.settings.collections {
        loop {
            if ctx.shutdown.load(Ordering::SeqCst) {
                outcome.aborted = true;
                break 'collections;
            }

            let filter = QueryFilter::default()
                .older_than(cutoff)
                .limit(ctx.settings.batch_size);
            let expired = ctx.store.query(collection, &filter).await?;
            if expired.is_empty() {
                break;
            }

            let ids: Vec<String> = expired.iter().map(|doc| doc.id.clone()).collect();
            let deleted = ctx.store.delete_batch(collection, &ids).await?;
            outcome.deleted += deleted;
            counter!("verdant_retention_deleted_total").increment(deleted);

            if expired.len() < ctx.settings.batch_size {
                break;
            }
        }
    }
    Ok(outcome)
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use crate::store::memory::MemoryStore;
    use crate::store::{Document, collections};

    use super::*;

    fn context(store: Arc<MemoryStore>, batch_size: usize) -> RetentionContext {
        RetentionContext::new(
            store,
            RetentionSettings {
                batch_size,
                ..Default::default()
            },
        )
    }

    async fn seed(store: &MemoryStore, collection: &str, id: &str, age_days: i64) {
        let doc = Document::with_timestamp(
            id,
            serde_json::json!({ "plantId": "plant_1" }),
            Utc::now() - Duration::days(age_days),
        );
        store.put(collection, doc).await.unwrap();
    }

    #[tokio::test]
    async fn sweeps_only_documents_past_the_window() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, collections::SENSOR_LOGS, "old", 8).await;
        seed(&store, collections::SENSOR_LOGS, "fresh", 6).await;
        seed(&store, collections::ENVIRONMENTAL_DATA, "old_env", 9).await;
        seed(&store, collections::ACTION_LOGS, "old_action", 10).await;
        // Plants are not governed and must survive any age.
        seed(&store, collections::PLANTS, "ancient_plant", 400).await;

        let ctx = context(store.clone(), 500);
        let outcome = sweep(&ctx, Utc::now()).await.unwrap();
        assert_eq!(outcome.deleted, 3);
        assert!(!outcome.skipped);
        assert!(!outcome.aborted);

        assert!(store.get(collections::SENSOR_LOGS, "old").await.unwrap().is_none());
        assert!(store.get(collections::SENSOR_LOGS, "fresh").await.unwrap().is_some());
        assert!(store.get(collections::PLANTS, "ancient_plant").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn exactly_at_the_cutoff_survives() {
        let store = Arc::new(MemoryStore::new());
        let tick = Utc::now();
        let doc = Document::with_timestamp(
            "boundary",
            serde_json::json!({}),
            tick - Duration::days(7),
        );
        store.put(collections::SENSOR_LOGS, doc).await.unwrap();

        let ctx = context(store.clone(), 500);
        let outcome = sweep(&ctx, tick).await.unwrap();
        assert_eq!(outcome.deleted, 0);
        assert!(store.get(collections::SENSOR_LOGS, "boundary").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn large_backlogs_drain_across_batches() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..25 {
            seed(&store, collections::SENSOR_LOGS, &format!("log_{i}"), 8).await;
        }

        let ctx = context(store.clone(), 10);
        let outcome = sweep(&ctx, Utc::now()).await.unwrap();
        assert_eq!(outcome.deleted, 25);

        let remaining = store
            .query(collections::SENSOR_LOGS, &QueryFilter::default())
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, collections::SENSOR_LOGS, "old", 8).await;

        let ctx = context(store.clone(), 500);
        assert_eq!(sweep(&ctx, Utc::now()).await.unwrap().deleted, 1);
        assert_eq!(sweep(&ctx, Utc::now()).await.unwrap().deleted, 0);
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store, 500);
        ctx.running.store(true, Ordering::SeqCst);

        let outcome = sweep(&ctx, Utc::now()).await.unwrap();
        assert!(outcome.skipped);
        assert_eq!(outcome.deleted, 0);
    }

    #[tokio::test]
    async fn run_guard_resets_after_a_sweep() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, collections::SENSOR_LOGS, "old", 8).await;
        let ctx = context(store, 500);

        sweep(&ctx, Utc::now()).await.unwrap();
        assert!(!ctx.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_stops_between_batches() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..5 {
            seed(&store, collections::SENSOR_LOGS, &format!("log_{i}"), 8).await;
        }
        let ctx = context(store, 500);
        ctx.request_shutdown();

        let outcome = sweep(&ctx, Utc::now()).await.unwrap();
        assert!(outcome.aborted);
        assert_eq!(outcome.deleted, 0);
    }
}
