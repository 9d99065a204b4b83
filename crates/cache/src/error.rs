//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(nlcli::cache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "rename")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(nlcli::cache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// A single on-disk record could not be decoded
    #[error("Failed to decode cache record {key}: {message}")]
    #[diagnostic(
        code(nlcli::cache::decode),
        help("The record is skipped; the rest of the cache file still loads")
    )]
    Decode {
        /// Key of the offending record
        key: String,
        /// Decoder message
        message: String,
    },

    /// Entry rejected on write
    #[error("Invalid cache entry: {message}")]
    #[diagnostic(code(nlcli::cache::invalid_entry))]
    InvalidEntry {
        /// What was wrong with the entry
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(nlcli::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// Legacy store migration failed
    #[error("Cache migration failed: {message}")]
    #[diagnostic(
        code(nlcli::cache::migration),
        help("The legacy database was left untouched; the cache starts cold")
    )]
    Migration {
        /// Error message describing the failure
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a decode error for one record
    #[must_use]
    pub fn decode(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decode {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an invalid entry error
    #[must_use]
    pub fn invalid_entry(msg: impl Into<String>) -> Self {
        Self::InvalidEntry {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a migration error
    #[must_use]
    pub fn migration(msg: impl Into<String>) -> Self {
        Self::Migration {
            message: msg.into(),
        }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
