//! Verdant query cache.
//!
//! A single-process, in-memory read cache in front of the document store:
//!
//! - **QueryCache**: bounded LRU with a fixed TTL, keyed by fingerprint.
//! - **ReadThrough**: cache-first reads with per-fingerprint stampede
//!   suppression, and write-through invalidation for mutations.
//!
//! Entries are always safe to drop: losing one only forces a re-read.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 1024
//! ttl_seconds = 60
//! purge_interval_seconds = 300
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod read_through;
mod store;

pub use config::CacheConfig;
pub use keys::{CacheKey, hash_filter};
pub use read_through::ReadThrough;
pub use store::{CachedValue, QueryCache};
