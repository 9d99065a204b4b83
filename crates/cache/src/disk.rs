//! The on-disk view: one flat JSON document written by atomic rename

use crate::entry::{CacheEntry, decode_document, encode_document};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File name of the flat cache document
pub const CACHE_FILE_NAME: &str = "translation_cache.json";

/// Handle on the durable cache file
#[derive(Debug, Clone)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    /// Cache file inside `dir`
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(CACHE_FILE_NAME),
        }
    }

    /// Path of the document
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the document exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and decode the whole document.
    ///
    /// A missing file is an empty view. Records that fail to decode are
    /// logged and skipped.
    pub fn load(&self) -> Result<BTreeMap<String, CacheEntry>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(Error::io(e, &self.path, "read")),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }

        let (entries, failures) = decode_document(&bytes)?;
        for failure in &failures {
            tracing::warn!(path = %self.path.display(), "Skipping cache record: {failure}");
        }
        Ok(entries)
    }

    /// Like [`CacheFile::load`] but degrades any failure to an empty view
    #[must_use]
    pub fn load_or_empty(&self) -> BTreeMap<String, CacheEntry> {
        match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Cache file unreadable, continuing with an empty disk view: {e}"
                );
                BTreeMap::new()
            }
        }
    }

    /// Write the document atomically: temp file in the same directory, then rename
    pub fn write(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<()> {
        let bytes = encode_document(entries)?;
        write_atomic(&self.path, &bytes)
    }

    /// Write with a single retry; the second failure is returned to the caller
    pub fn write_with_retry(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<()> {
        match self.write(entries) {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::debug!(path = %self.path.display(), "Cache write failed, retrying: {first}");
                self.write(entries)
            }
        }
    }

    /// Remove the document if present
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(e, &self.path, "remove")),
        }
    }

    /// Size of the document in bytes (0 when absent)
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map_or(0, |m| m.len())
    }
}

/// Write `bytes` to `path` through a sibling temp file and an atomic rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::configuration(format!("{} has no parent", path.display())))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(e, dir, "create temp"))?;
    tmp.write_all(bytes)
        .map_err(|e| Error::io(e, tmp.path(), "write"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(e, tmp.path(), "sync"))?;
    tmp.persist(path)
        .map_err(|e| Error::io(e.error, path, "rename"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let file = CacheFile::in_dir(temp.path());
        assert!(file.load().unwrap().is_empty());
        assert_eq!(file.size_bytes(), 0);
    }

    #[test]
    fn write_then_load() {
        let temp = TempDir::new().unwrap();
        let file = CacheFile::in_dir(temp.path());
        let mut entries = BTreeMap::new();
        entries.insert("k1".to_string(), CacheEntry::new("ls", "list", 0.9, "linux"));
        file.write(&entries).unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["k1"].command, "ls");
        assert!(file.size_bytes() > 0);
    }

    #[test]
    fn write_leaves_no_temp_files_behind() {
        let temp = TempDir::new().unwrap();
        let file = CacheFile::in_dir(temp.path());
        file.write(&BTreeMap::new()).unwrap();
        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(CACHE_FILE_NAME)]);
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        let file = CacheFile::in_dir(temp.path());
        fs::write(file.path(), b"{\"k\": {\"command\": ").unwrap();
        assert!(file.load().is_err());
        assert!(file.load_or_empty().is_empty());
    }

    #[test]
    fn bad_record_does_not_abort_load() {
        let temp = TempDir::new().unwrap();
        let file = CacheFile::in_dir(temp.path());
        fs::write(
            file.path(),
            br#"{"good":{"command":"pwd"},"bad":{"use_count":"many"}}"#,
        )
        .unwrap();
        let loaded = file.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("good"));
    }

    #[test]
    fn remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let file = CacheFile::in_dir(temp.path());
        file.write(&BTreeMap::new()).unwrap();
        file.remove().unwrap();
        file.remove().unwrap();
        assert!(!file.exists());
    }
}
