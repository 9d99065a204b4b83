//! Persistent resolution cache: an LRU memory view over the durable file
//!
//! The memory view holds at most `memory_entries` entries in access order
//! and is guarded by a single mutex that is never held across disk I/O. The
//! disk view is the union of everything ever flushed; flushes merge the
//! memory view into it (memory wins per key) and publish it with an atomic
//! rename. Several processes may share one directory. There is no lock file,
//! so concurrent writers race and the last merge wins for any given key.

use crate::disk::CacheFile;
use crate::entry::{CacheEntry, cache_key, now_secs};
use crate::flush::FlushWorker;
use crate::migrate::Migrator;
use crate::stats::{CacheCounters, CacheStats, StatsFile};
use crate::{Error, Result};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default number of entries kept in memory
pub const DEFAULT_MEMORY_ENTRIES: usize = 1000;
/// Default number of writes between background flushes
pub const DEFAULT_FLUSH_EVERY: usize = 5;

/// Construction parameters for [`PersistentCache`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding the cache files
    pub dir: PathBuf,
    /// Capacity of the in-memory view
    pub memory_entries: usize,
    /// Writes between background flushes
    pub flush_every: usize,
}

impl CacheConfig {
    /// Defaults for `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memory_entries: DEFAULT_MEMORY_ENTRIES,
            flush_every: DEFAULT_FLUSH_EVERY,
        }
    }

    /// Set the in-memory capacity
    #[must_use]
    pub const fn with_memory_entries(mut self, memory_entries: usize) -> Self {
        self.memory_entries = memory_entries;
        self
    }

    /// Set the batching threshold
    #[must_use]
    pub const fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every;
        self
    }
}

/// Which view answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    /// The in-memory view
    Memory,
    /// The disk file
    File,
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
        }
    }
}

/// A successful lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    /// The entry with usage already updated
    pub entry: CacheEntry,
    /// Where it was found
    pub source: CacheSource,
}

/// Size information about the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheSizeInfo {
    /// Size of the disk file in bytes
    pub file_size_bytes: u64,
    /// Entries resident in memory
    pub memory_entries: usize,
    /// Capacity of the memory view
    pub max_memory_entries: usize,
}

struct MemoryState {
    lru: LruCache<String, CacheEntry>,
    /// Entries evicted from `lru` that the next flush still has to write
    spill: HashMap<String, CacheEntry>,
    /// Keys stored while absent from memory; their disk `use_count` is
    /// added at the next merge
    unmerged: HashSet<String>,
    counters: CacheCounters,
    pending_writes: usize,
    dirty: bool,
}

impl MemoryState {
    fn insert(&mut self, key: String, entry: CacheEntry) {
        self.spill.remove(&key);
        if let Some((evicted_key, evicted)) = self.lru.push(key.clone(), entry)
            && evicted_key != key
        {
            self.spill.insert(evicted_key, evicted);
        }
    }
}

struct Shared {
    file: CacheFile,
    stats_file: StatsFile,
    state: Mutex<MemoryState>,
    /// Serializes disk read-modify-write cycles within this process
    io: Mutex<()>,
    flush_every: usize,
}

impl Shared {
    fn flush(&self) -> Result<usize> {
        let _io = self.io.lock();
        let mut disk = self.file.load_or_empty();
        let spilled = self.merge_memory_into(&mut disk);
        self.write_disk(&disk, spilled)
    }

    /// Overlay the memory view and pending evictions onto `disk`. Returns
    /// the spilled entries so a failed write can put them back.
    fn merge_memory_into(
        &self,
        disk: &mut BTreeMap<String, CacheEntry>,
    ) -> HashMap<String, CacheEntry> {
        let (snapshot, spilled) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.pending_writes = 0;
            state.dirty = false;
            for key in std::mem::take(&mut state.unmerged) {
                let Some(on_disk) = disk.get(&key).map(|e| e.use_count) else {
                    continue;
                };
                let resident = match state.lru.peek_mut(&key) {
                    Some(entry) => Some(entry),
                    None => state.spill.get_mut(&key),
                };
                if let Some(entry) = resident {
                    entry.use_count = entry.use_count.saturating_add(on_disk);
                }
            }
            let snapshot: Vec<(String, CacheEntry)> = state
                .lru
                .iter()
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect();
            (snapshot, std::mem::take(&mut state.spill))
        };

        for (key, entry) in &spilled {
            disk.insert(key.clone(), entry.clone());
        }
        disk.extend(snapshot);
        spilled
    }

    fn write_disk(
        &self,
        disk: &BTreeMap<String, CacheEntry>,
        spilled: HashMap<String, CacheEntry>,
    ) -> Result<usize> {
        match self.file.write_with_retry(disk) {
            Ok(()) => {
                let counters = {
                    let mut state = self.state.lock();
                    state.counters.total_entries = disk.len() as u64;
                    state.counters
                };
                self.stats_file.save(&counters);
                tracing::debug!(entries = disk.len(), "Cache flushed to disk");
                Ok(disk.len())
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.file.path().display(),
                    "Cache flush failed; durability deferred to the next flush: {e}"
                );
                let mut guard = self.state.lock();
                let state = &mut *guard;
                state.dirty = true;
                for (key, entry) in spilled {
                    if !state.lru.contains(&key) {
                        state.spill.entry(key).or_insert(entry);
                    }
                }
                Err(e)
            }
        }
    }

    fn record_miss(&self) {
        self.state.lock().counters.misses += 1;
    }

    fn lookup_file(&self, key: &str, now: f64) -> Option<CacheHit> {
        let io_guard = self.io.lock();
        let mut disk = match self.file.load() {
            Ok(disk) => disk,
            Err(e) => {
                tracing::warn!(
                    path = %self.file.path().display(),
                    "Cache file unreadable during lookup: {e}"
                );
                drop(io_guard);
                self.record_miss();
                return None;
            }
        };

        let Some(mut entry) = disk.get(key).cloned() else {
            drop(io_guard);
            self.record_miss();
            return None;
        };

        let source = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if let Some(resident) = state.lru.get_mut(key) {
                // A concurrent store or promotion got there first
                resident.touch(now);
                entry = resident.clone();
                state.counters.memory_hits += 1;
                CacheSource::Memory
            } else {
                entry.touch(now);
                state.insert(key.to_string(), entry.clone());
                state.counters.file_hits += 1;
                CacheSource::File
            }
        };

        let spilled = self.merge_memory_into(&mut disk);
        if let Err(e) = self.write_disk(&disk, spilled) {
            tracing::debug!(key, "Usage update not persisted: {e}");
        }

        tracing::debug!(key, source = %source, "Cache hit");
        Some(CacheHit { entry, source })
    }
}

/// Two-tier translation cache: a bounded LRU in memory over a flat JSON
/// file that survives restarts.
pub struct PersistentCache {
    shared: Arc<Shared>,
    worker: Option<FlushWorker>,
    dir: PathBuf,
    capacity: usize,
}

impl PersistentCache {
    /// Open (or create) the cache in `config.dir`.
    ///
    /// Runs the legacy migration first when needed; a failed migration is
    /// logged and the cache starts cold. The most recently used entries on
    /// disk are loaded into memory up to its capacity.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.memory_entries)
            .ok_or_else(|| Error::configuration("Memory capacity must be non-zero"))?;
        if config.flush_every == 0 {
            return Err(Error::configuration("flush_every must be non-zero"));
        }
        fs::create_dir_all(&config.dir)
            .map_err(|e| Error::io(e, &config.dir, "create_dir_all"))?;

        let migrator = Migrator::new(&config.dir);
        if migrator.needs_migration()
            && let Err(e) = migrator.migrate()
        {
            tracing::warn!("Legacy cache migration failed, starting with a cold cache: {e}");
        }

        let file = CacheFile::in_dir(&config.dir);
        let stats_file = StatsFile::in_dir(&config.dir);
        let disk = file.load_or_empty();

        let mut counters = stats_file.load();
        counters.total_entries = disk.len() as u64;

        let mut warm: Vec<(String, CacheEntry)> = disk.into_iter().collect();
        warm.sort_by(|a, b| b.1.last_used.total_cmp(&a.1.last_used));
        warm.truncate(capacity.get());

        let mut lru = LruCache::new(capacity);
        for (key, entry) in warm.into_iter().rev() {
            lru.push(key, entry);
        }
        tracing::debug!(
            dir = %config.dir.display(),
            memory_entries = lru.len(),
            total_entries = counters.total_entries,
            "Translation cache opened"
        );

        let shared = Arc::new(Shared {
            file,
            stats_file,
            state: Mutex::new(MemoryState {
                lru,
                spill: HashMap::new(),
                unmerged: HashSet::new(),
                counters,
                pending_writes: 0,
                dirty: false,
            }),
            io: Mutex::new(()),
            flush_every: config.flush_every,
        });

        let for_worker = Arc::clone(&shared);
        let worker = FlushWorker::spawn(move || {
            if let Err(e) = for_worker.flush() {
                tracing::trace!("Background cache flush failed: {e}");
            }
        })?;

        Ok(Self {
            shared,
            worker: Some(worker),
            dir: config.dir,
            capacity: capacity.get(),
        })
    }

    /// Directory holding the cache files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up a translation.
    ///
    /// A memory hit never touches the disk. On a memory miss the disk file
    /// is consulted and a hit there is promoted into memory and its updated
    /// usage written back before returning.
    #[must_use]
    pub fn lookup(&self, input: &str, platform: &str) -> Option<CacheHit> {
        let key = cache_key(input, platform);
        let now = now_secs();

        {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            if let Some(entry) = state.lru.get_mut(&key) {
                entry.touch(now);
                let entry = entry.clone();
                state.counters.memory_hits += 1;
                state.dirty = true;
                tracing::debug!(key = %key, source = "memory", "Cache hit");
                return Some(CacheHit {
                    entry,
                    source: CacheSource::Memory,
                });
            }
            if let Some(mut entry) = state.spill.remove(&key) {
                entry.touch(now);
                state.insert(key.clone(), entry.clone());
                state.counters.memory_hits += 1;
                state.dirty = true;
                tracing::debug!(key = %key, source = "memory", "Cache hit on pending eviction");
                return Some(CacheHit {
                    entry,
                    source: CacheSource::Memory,
                });
            }
        }

        self.shared.lookup_file(&key, now)
    }

    /// Store a translation.
    ///
    /// The entry lands in memory as most recently used; every
    /// `flush_every` writes a background flush is requested. Storing over an
    /// existing key replaces every field except `use_count`, which
    /// accumulates. For a key that is only on disk the stored count is
    /// added when the next flush merges it.
    pub fn store(&self, input: &str, platform: &str, mut entry: CacheEntry) -> Result<()> {
        entry.validate()?;
        let key = cache_key(input, platform);
        entry.platform = platform.to_string();

        let flush_due = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let previous_uses = state
                .lru
                .peek(&key)
                .or_else(|| state.spill.get(&key))
                .map(|previous| previous.use_count);
            match previous_uses {
                Some(uses) => entry.use_count = uses.saturating_add(entry.use_count),
                None => {
                    state.unmerged.insert(key.clone());
                }
            }
            state.insert(key.clone(), entry);
            state.counters.writes += 1;
            state.pending_writes += 1;
            state.dirty = true;
            if state.pending_writes >= self.shared.flush_every {
                state.pending_writes = 0;
                true
            } else {
                false
            }
        };

        tracing::debug!(key = %key, "Cached translation");
        if flush_due && let Some(worker) = &self.worker {
            worker.request();
        }
        Ok(())
    }

    /// Synchronously merge the memory view into the disk file
    pub fn force_flush(&self) -> Result<()> {
        self.shared.flush().map(|_| ())
    }

    /// Remove entries whose `last_used` is older than `max_age` from both views.
    ///
    /// Returns the number of distinct entries removed.
    pub fn cleanup_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = now_secs() - max_age.as_secs_f64();
        let _io = self.shared.io.lock();
        let mut removed: HashSet<String> = HashSet::new();

        {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let stale: Vec<String> = state
                .lru
                .iter()
                .filter(|(_, entry)| entry.last_used < cutoff)
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                state.lru.pop(&key);
                removed.insert(key);
            }
            state.spill.retain(|key, entry| {
                let keep = entry.last_used >= cutoff;
                if !keep {
                    removed.insert(key.clone());
                }
                keep
            });
        }

        let mut disk = self.shared.file.load_or_empty();
        let spilled = self.shared.merge_memory_into(&mut disk);
        disk.retain(|key, entry| {
            let keep = entry.last_used >= cutoff;
            if !keep {
                removed.insert(key.clone());
            }
            keep
        });
        self.shared.write_disk(&disk, spilled)?;

        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "Cleaned up old cache entries");
        }
        Ok(removed.len())
    }

    /// Drop every entry from both views and delete the disk file
    pub fn clear(&self) -> Result<()> {
        let _io = self.shared.io.lock();
        let counters = {
            let mut state = self.shared.state.lock();
            state.lru.clear();
            state.spill.clear();
            state.unmerged.clear();
            state.pending_writes = 0;
            state.dirty = false;
            state.counters.total_entries = 0;
            state.counters
        };
        self.shared.file.remove()?;
        self.shared.stats_file.save(&counters);
        tracing::info!("Translation cache cleared");
        Ok(())
    }

    /// Counter snapshot; never touches the disk
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        CacheStats::from_counters(&state.counters, state.lru.len())
    }

    /// Most used resident entries, by `use_count` then `last_used`
    #[must_use]
    pub fn popular(&self, limit: usize) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = {
            let state = self.shared.state.lock();
            state.lru.iter().map(|(_, e)| e.clone()).collect()
        };
        entries.sort_by(|a, b| {
            b.use_count
                .cmp(&a.use_count)
                .then_with(|| b.last_used.total_cmp(&a.last_used))
        });
        entries.truncate(limit);
        entries
    }

    /// File size and memory occupancy
    #[must_use]
    pub fn size_info(&self) -> CacheSizeInfo {
        CacheSizeInfo {
            file_size_bytes: self.shared.file.size_bytes(),
            memory_entries: self.memory_len(),
            max_memory_entries: self.capacity,
        }
    }

    /// Whether a request is resident in memory; does not affect recency
    #[must_use]
    pub fn contains_in_memory(&self, input: &str, platform: &str) -> bool {
        let key = cache_key(input, platform);
        self.shared.state.lock().lru.contains(&key)
    }

    /// Number of entries resident in memory
    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.shared.state.lock().lru.len()
    }
}

impl Drop for PersistentCache {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        let pending = {
            let state = self.shared.state.lock();
            state.dirty || !state.spill.is_empty()
        };
        if pending && let Err(e) = self.shared.flush() {
            tracing::debug!("Final cache flush failed: {e}");
        }
    }
}

impl std::fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("dir", &self.dir)
            .field("capacity", &self.capacity)
            .field("memory_entries", &self.memory_len())
            .finish_non_exhaustive()
    }
}
