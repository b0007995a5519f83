//! Scheduled background jobs, run on apalis workers fed by cron streams.

mod retention;

pub use retention::{
    RetentionContext, RetentionSweepJob, SweepOutcome, run_retention_sweep,
};
