//! One-time upgrade of the legacy SQLite cache into the flat file format
//!
//! The migration is gated by a zero-byte `.migrated` marker and never
//! modifies the legacy database: a failed attempt leaves it untouched and
//! removes whatever new-format file it created, so a retry starts clean.
//! Several processes may race through [`Migrator::migrate`]; the flat file is
//! published with a no-clobber rename so the first finisher wins and later
//! ones simply record completion.

use crate::disk::CacheFile;
use crate::entry::{CacheEntry, encode_document, now_secs};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File name of the legacy SQLite store
pub const LEGACY_DB_NAME: &str = "translation_cache.db";
/// File name of the completion marker
pub const MIGRATION_MARKER: &str = ".migrated";
/// Suffix appended to the legacy store by [`Migrator::cleanup`]
pub const BACKUP_SUFFIX: &str = ".backup";

/// Textual timestamp encodings found in legacy rows
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const LEGACY_QUERY: &str = "SELECT input_hash, command, explanation, confidence, platform, \
                            created_at, last_used, use_count FROM translation_cache";

/// What a call to [`Migrator::migrate`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing to do: no legacy store, or already migrated
    NotNeeded,
    /// Legacy rows were converted
    Migrated {
        /// Number of entries written to the flat file
        entries: usize,
    },
}

/// Migration status for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationInfo {
    /// Whether [`Migrator::migrate`] would do work
    pub needs_migration: bool,
    /// Whether the completion marker exists
    pub migration_completed: bool,
    /// Whether the legacy database exists
    pub legacy_exists: bool,
    /// Whether the flat cache file exists
    pub cache_exists: bool,
    /// Legacy database size in KiB, when present
    pub legacy_size_kb: Option<f64>,
    /// Flat cache file size in KiB, when present
    pub cache_size_kb: Option<f64>,
}

/// Converts `translation_cache.db` into `translation_cache.json`
#[derive(Debug, Clone)]
pub struct Migrator {
    legacy_path: PathBuf,
    cache_file: CacheFile,
    marker_path: PathBuf,
}

impl Migrator {
    /// Migrator for the cache directory `dir`
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            legacy_path: dir.join(LEGACY_DB_NAME),
            cache_file: CacheFile::in_dir(dir),
            marker_path: dir.join(MIGRATION_MARKER),
        }
    }

    /// Path of the legacy database
    #[must_use]
    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    /// Path the legacy database is renamed to by [`Migrator::cleanup`]
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.legacy_path.as_os_str().to_os_string();
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    /// True iff the legacy store exists and neither the flat file nor the
    /// completion marker does
    #[must_use]
    pub fn needs_migration(&self) -> bool {
        self.legacy_path.exists() && !self.cache_file.exists() && !self.marker_path.exists()
    }

    /// Run the migration if needed
    pub fn migrate(&self) -> Result<MigrationOutcome> {
        if !self.needs_migration() {
            return Ok(MigrationOutcome::NotNeeded);
        }

        tracing::info!(
            legacy = %self.legacy_path.display(),
            "Migrating legacy cache database to the file-based format"
        );

        let entries = match self.read_legacy() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cache migration failed while reading legacy rows: {e}");
                return Err(e);
            }
        };

        let published = match self.publish(&entries) {
            Ok(published) => published,
            Err(e) => {
                tracing::warn!("Cache migration failed while writing the cache file: {e}");
                return Err(e);
            }
        };

        if let Err(e) = self.write_marker() {
            if published && let Err(remove_err) = self.cache_file.remove() {
                tracing::warn!("Failed to remove partially migrated cache file: {remove_err}");
            }
            tracing::warn!("Cache migration failed while writing the marker: {e}");
            return Err(e);
        }

        tracing::info!(entries = entries.len(), "Cache migration complete");
        Ok(MigrationOutcome::Migrated {
            entries: entries.len(),
        })
    }

    /// Rename the legacy database aside once migration has completed.
    ///
    /// Returns `false` when no completion marker exists yet.
    pub fn cleanup(&self) -> Result<bool> {
        if !self.marker_path.exists() {
            return Ok(false);
        }
        if self.legacy_path.exists() {
            let backup = self.backup_path();
            fs::rename(&self.legacy_path, &backup)
                .map_err(|e| Error::io(e, &self.legacy_path, "rename"))?;
            tracing::info!(backup = %backup.display(), "Legacy cache database backed up");
        }
        Ok(true)
    }

    /// Current migration status
    #[must_use]
    pub fn info(&self) -> MigrationInfo {
        MigrationInfo {
            needs_migration: self.needs_migration(),
            migration_completed: self.marker_path.exists(),
            legacy_exists: self.legacy_path.exists(),
            cache_exists: self.cache_file.exists(),
            legacy_size_kb: size_kb(&self.legacy_path),
            cache_size_kb: size_kb(self.cache_file.path()),
        }
    }

    fn read_legacy(&self) -> Result<BTreeMap<String, CacheEntry>> {
        let conn = Connection::open_with_flags(
            &self.legacy_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| legacy_error("open legacy database", &e))?;

        let mut stmt = conn
            .prepare(LEGACY_QUERY)
            .map_err(|e| legacy_error("query legacy rows", &e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegacyRow {
                    input_hash: row.get(0)?,
                    command: row.get(1)?,
                    explanation: row.get(2)?,
                    confidence: row.get(3)?,
                    platform: row.get(4)?,
                    created_at: row.get(5)?,
                    last_used: row.get(6)?,
                    use_count: row.get(7)?,
                })
            })
            .map_err(|e| legacy_error("query legacy rows", &e))?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let row = row.map_err(|e| legacy_error("read legacy row", &e))?;
            let key = row.input_hash.clone();
            if let Some(entry) = row.into_entry() {
                entries.insert(key, entry);
            } else {
                tracing::warn!(key = %key, "Skipping legacy row without a command");
            }
        }
        Ok(entries)
    }

    /// Write the flat file without clobbering one produced by a concurrent
    /// migration. Returns whether this call created the file.
    fn publish(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<bool> {
        if entries.is_empty() {
            return Ok(false);
        }
        let bytes = encode_document(entries)?;
        let path = self.cache_file.path();
        let dir = path
            .parent()
            .ok_or_else(|| Error::configuration(format!("{} has no parent", path.display())))?;

        let mut tmp =
            NamedTempFile::new_in(dir).map_err(|e| Error::io(e, dir, "create temp"))?;
        tmp.write_all(&bytes)
            .map_err(|e| Error::io(e, tmp.path(), "write"))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io(e, tmp.path(), "sync"))?;

        match tmp.persist_noclobber(path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(
                    path = %path.display(),
                    "Cache file appeared during migration; another instance finished first"
                );
                Ok(false)
            }
            Err(e) => Err(Error::io(e.error, path, "rename")),
        }
    }

    fn write_marker(&self) -> Result<()> {
        fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.marker_path)
            .map(drop)
            .map_err(|e| Error::io(e, &self.marker_path, "create marker"))
    }
}

/// Raw legacy row; every column except the key may be NULL
struct LegacyRow {
    input_hash: String,
    command: Option<String>,
    explanation: Option<String>,
    confidence: Option<f64>,
    platform: Option<String>,
    created_at: Value,
    last_used: Value,
    use_count: Option<i64>,
}

impl LegacyRow {
    fn into_entry(self) -> Option<CacheEntry> {
        let command = self.command.filter(|c| !c.trim().is_empty())?;
        Some(CacheEntry {
            command,
            explanation: self.explanation.unwrap_or_default(),
            confidence: self.confidence.unwrap_or(0.0),
            created_at: legacy_timestamp(&self.created_at),
            last_used: legacy_timestamp(&self.last_used),
            use_count: self
                .use_count
                .and_then(|n| u64::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(1),
            platform: self.platform.unwrap_or_default(),
            safe: true,
        })
    }
}

fn legacy_error(operation: &str, err: &rusqlite::Error) -> Error {
    Error::migration(format!("Failed to {operation}: {err}"))
}

fn legacy_timestamp(value: &Value) -> f64 {
    match value {
        Value::Text(text) => parse_timestamp(text).unwrap_or_else(now_secs),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(secs) => *secs as f64,
        Value::Real(secs) => *secs,
        Value::Null | Value::Blob(_) => now_secs(),
    }
}

/// Parse a legacy textual timestamp (interpreted as UTC, as written by
/// SQLite's `CURRENT_TIMESTAMP`) into epoch seconds
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<f64> {
    let text = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| {
            #[allow(clippy::cast_precision_loss)]
            let micros = dt.and_utc().timestamp_micros() as f64;
            micros / 1_000_000.0
        })
}

#[allow(clippy::cast_precision_loss)]
fn size_kb(path: &Path) -> Option<f64> {
    fs::metadata(path)
        .ok()
        .map(|m| (m.len() as f64 / 1024.0 * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_current_timestamp() {
        let secs = parse_timestamp("2024-01-02 03:04:05").unwrap();
        assert!((secs - 1_704_164_645.0).abs() < 1e-6);
    }

    #[test]
    fn parses_fractional_seconds() {
        let secs = parse_timestamp("2024-01-02 03:04:05.250").unwrap();
        assert!((secs - 1_704_164_645.25).abs() < 1e-6);
    }

    #[test]
    fn parses_iso_t_separator() {
        let plain = parse_timestamp("2024-01-02T03:04:05").unwrap();
        let frac = parse_timestamp("2024-01-02T03:04:05.5").unwrap();
        assert!((plain - 1_704_164_645.0).abs() < 1e-6);
        assert!((frac - 1_704_164_645.5).abs() < 1e-6);
    }

    #[test]
    fn unparseable_text_is_none() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn unparseable_legacy_value_falls_back_to_now() {
        let before = now_secs();
        let secs = legacy_timestamp(&Value::Text("not a date".into()));
        assert!(secs >= before);
        let secs = legacy_timestamp(&Value::Null);
        assert!(secs >= before);
    }

    #[test]
    fn numeric_legacy_values_are_epoch_seconds() {
        assert!((legacy_timestamp(&Value::Integer(1_000)) - 1_000.0).abs() < f64::EPSILON);
        assert!((legacy_timestamp(&Value::Real(12.5)) - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn backup_path_appends_suffix() {
        let migrator = Migrator::new(Path::new("/cache"));
        assert_eq!(
            migrator.backup_path(),
            PathBuf::from("/cache/translation_cache.db.backup")
        );
    }

    #[test]
    fn legacy_row_defaults() {
        let row = LegacyRow {
            input_hash: "h".into(),
            command: Some("ls".into()),
            explanation: None,
            confidence: None,
            platform: None,
            created_at: Value::Null,
            last_used: Value::Null,
            use_count: Some(0),
        };
        let entry = row.into_entry().unwrap();
        assert_eq!(entry.use_count, 1);
        assert_eq!(entry.explanation, "");
        assert_eq!(entry.platform, "");
    }

    #[test]
    fn legacy_row_without_command_is_dropped() {
        let row = LegacyRow {
            input_hash: "h".into(),
            command: None,
            explanation: None,
            confidence: None,
            platform: None,
            created_at: Value::Null,
            last_used: Value::Null,
            use_count: None,
        };
        assert!(row.into_entry().is_none());
    }
}
