//! Cache entry value object, lookup keys and the flat record encoding

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One remembered natural-language to command translation.
///
/// The on-disk encoding is field-named so older or partially written files
/// still decode: unknown fields are ignored and missing optional fields take
/// their defaults. Only `command` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The resolved shell command
    pub command: String,
    /// Human-readable description of the command
    #[serde(default)]
    pub explanation: String,
    /// Resolution confidence, stored exactly as supplied
    #[serde(default)]
    pub confidence: f64,
    /// Creation time in seconds since the Unix epoch
    #[serde(default)]
    pub created_at: f64,
    /// Last access time in seconds since the Unix epoch
    #[serde(default)]
    pub last_used: f64,
    /// Number of times the entry has been used
    #[serde(default = "default_use_count")]
    pub use_count: u64,
    /// Operating system the command targets
    #[serde(default)]
    pub platform: String,
    /// Whether the producer considered the command safe to run
    #[serde(default = "default_safe")]
    pub safe: bool,
}

const fn default_use_count() -> u64 {
    1
}

const fn default_safe() -> bool {
    true
}

impl CacheEntry {
    /// Create a fresh entry stamped with the current time and `use_count = 1`
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        explanation: impl Into<String>,
        confidence: f64,
        platform: impl Into<String>,
    ) -> Self {
        let now = now_secs();
        Self {
            command: command.into(),
            explanation: explanation.into(),
            confidence,
            created_at: now,
            last_used: now,
            use_count: 1,
            platform: platform.into(),
            safe: true,
        }
    }

    /// Set the safety flag
    #[must_use]
    pub const fn with_safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    /// Record one use at `now`
    pub fn touch(&mut self, now: f64) {
        self.last_used = now;
        self.use_count = self.use_count.saturating_add(1);
    }

    /// Reject entries that must never be written
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(Error::invalid_entry("command must not be empty"));
        }
        Ok(())
    }
}

/// Normalize a natural-language request for keying and matching
#[must_use]
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Compute the lookup key for a request on a platform
#[must_use]
pub fn cache_key(input: &str, platform: &str) -> String {
    let combined = format!("{}:{platform}", normalize(input));
    hex::encode(Sha256::digest(combined.as_bytes()))
}

/// Current wall-clock time in seconds since the Unix epoch
#[must_use]
pub fn now_secs() -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let micros = chrono::Utc::now().timestamp_micros() as f64;
    micros / 1_000_000.0
}

/// Decode a single record
pub fn decode_record(key: &str, value: serde_json::Value) -> Result<CacheEntry> {
    serde_json::from_value(value).map_err(|e| Error::decode(key, e.to_string()))
}

/// Decode a whole cache document.
///
/// Returns the decoded entries plus the per-record failures, so one bad
/// record never aborts the load. A document that is not a JSON object at
/// all is a serialization error.
pub fn decode_document(bytes: &[u8]) -> Result<(BTreeMap<String, CacheEntry>, Vec<Error>)> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(bytes)
        .map_err(|e| Error::serialization(format!("Failed to parse cache file: {e}")))?;

    let mut entries = BTreeMap::new();
    let mut failures = Vec::new();
    for (key, value) in raw {
        match decode_record(&key, value) {
            Ok(entry) => {
                entries.insert(key, entry);
            }
            Err(e) => failures.push(e),
        }
    }
    Ok((entries, failures))
}

/// Encode a cache document compactly
pub fn encode_document(entries: &BTreeMap<String, CacheEntry>) -> Result<Vec<u8>> {
    serde_json::to_vec(entries)
        .map_err(|e| Error::serialization(format!("Failed to serialize cache: {e}")))
}
