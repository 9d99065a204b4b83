//! Persistent translation cache for nlcli
//!
//! This crate stores resolved natural-language requests so repeated
//! requests skip the slower resolution tiers:
//! - Bounded in-memory LRU view answered without disk access
//! - Flat JSON file on disk that survives restarts, published atomically
//! - Batched background flushes with a synchronous flush on drop
//! - One-shot migration from the legacy SQLite database
//!
//! # Keys
//!
//! Entries are keyed by `sha256(normalize(input) + ":" + platform)` where
//! normalization trims and lowercases the input. The same phrase on two
//! platforms is two entries.

#![expect(
    clippy::missing_errors_doc,
    reason = "Error conditions are described on the error type"
)]

mod disk;
mod entry;
mod error;
mod flush;
pub mod migrate;
mod paths;
mod stats;
mod store;

pub use disk::{CACHE_FILE_NAME, CacheFile};
pub use entry::{
    CacheEntry, cache_key, decode_document, decode_record, encode_document, normalize, now_secs,
};
pub use error::{Error, Result};
pub use migrate::{MigrationInfo, MigrationOutcome, Migrator};
pub use paths::{CACHE_DIR_ENV, default_cache_dir};
pub use stats::{CacheCounters, CacheStats, STATS_FILE_NAME, StatsFile};
pub use store::{
    CacheConfig, CacheHit, CacheSizeInfo, CacheSource, DEFAULT_FLUSH_EVERY,
    DEFAULT_MEMORY_ENTRIES, PersistentCache,
};
