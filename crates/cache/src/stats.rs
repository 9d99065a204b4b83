//! Running cache counters and their best-effort persistence

use crate::disk::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the persisted counters
pub const STATS_FILE_NAME: &str = "cache_stats.json";

/// Counters kept by the cache and mirrored to `cache_stats.json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheCounters {
    /// Lookups answered from memory
    pub memory_hits: u64,
    /// Lookups answered from the disk file
    pub file_hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries stored
    pub writes: u64,
    /// Entries in the disk file as of the last load or flush
    pub total_entries: u64,
}

impl CacheCounters {
    /// Total hits from either view
    #[must_use]
    pub const fn hits(&self) -> u64 {
        self.memory_hits + self.file_hits
    }
}

/// Snapshot of cache performance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Total hits (memory + file)
    pub hits: u64,
    /// Hits answered from memory
    pub memory_hits: u64,
    /// Hits answered from disk
    pub file_hits: u64,
    /// Misses
    pub misses: u64,
    /// Entries in the durable view
    pub entries: u64,
    /// Entries resident in memory
    pub memory_entries: usize,
    /// Entries stored
    pub writes: u64,
    /// `hits / (hits + misses)`, rounded to three decimals
    pub hit_rate: f64,
    /// `memory_hits / (hits + misses)`, rounded to three decimals
    pub memory_hit_rate: f64,
}

impl CacheStats {
    pub(crate) fn from_counters(counters: &CacheCounters, memory_entries: usize) -> Self {
        let requests = counters.hits() + counters.misses;
        Self {
            hits: counters.hits(),
            memory_hits: counters.memory_hits,
            file_hits: counters.file_hits,
            misses: counters.misses,
            entries: counters.total_entries.max(memory_entries as u64),
            memory_entries,
            writes: counters.writes,
            hit_rate: ratio(counters.hits(), requests),
            memory_hit_rate: ratio(counters.memory_hits, requests),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 1000.0
}

/// Handle on `cache_stats.json`
#[derive(Debug, Clone)]
pub struct StatsFile {
    path: PathBuf,
}

impl StatsFile {
    /// Stats file inside `dir`
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(STATS_FILE_NAME),
        }
    }

    /// Load counters, falling back to zeros on any problem
    #[must_use]
    pub fn load(&self) -> CacheCounters {
        fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    /// Persist counters; failures are only logged
    pub fn save(&self, counters: &CacheCounters) {
        let result = serde_json::to_vec(counters)
            .map_err(|e| crate::Error::serialization(e.to_string()))
            .and_then(|bytes| write_atomic(&self.path, &bytes));
        if let Err(e) = result {
            tracing::debug!(path = %self.path.display(), "Failed to persist cache stats: {e}");
        }
    }
}
