//! Error types for resolution

use miette::Diagnostic;
use thiserror::Error;

/// Failure of the external translation collaborator.
///
/// These never leave the bounded resolver: every variant is normalized to
/// "no result" before reaching the orchestrator.
#[derive(Error, Debug, Diagnostic)]
pub enum TranslateError {
    /// The request never produced a response
    #[error("Translation transport failed: {message}")]
    #[diagnostic(code(nlcli::resolver::transport))]
    Transport {
        /// What went wrong
        message: String,
    },

    /// The response could not be understood
    #[error("Malformed translation response: {message}")]
    #[diagnostic(
        code(nlcli::resolver::malformed),
        help("The response must be a JSON object with 'command' and 'explanation' fields")
    )]
    Malformed {
        /// What was wrong with it
        message: String,
    },

    /// The service refused or is not configured
    #[error("Translation service unavailable: {message}")]
    #[diagnostic(code(nlcli::resolver::unavailable))]
    Unavailable {
        /// Why
        message: String,
    },
}

impl TranslateError {
    /// Create a transport error
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
        }
    }

    /// Create a malformed-response error
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed {
            message: msg.into(),
        }
    }

    /// Create an unavailable error
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable {
            message: msg.into(),
        }
    }
}

/// Construction-time errors
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid resolver configuration
    #[error("Resolver configuration error: {message}")]
    #[diagnostic(code(nlcli::resolver::config))]
    Configuration {
        /// Error message
        message: String,
    },

    /// A worker thread could not be started
    #[error("Failed to start resolver worker: {source}")]
    #[diagnostic(code(nlcli::resolver::spawn))]
    Spawn {
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Error from the cache layer
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] nlcli_cache::Error),
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }
}

/// Result type for resolver construction
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_error_messages() {
        assert_eq!(
            TranslateError::malformed("missing command").to_string(),
            "Malformed translation response: missing command"
        );
        assert_eq!(
            TranslateError::transport("connection reset").to_string(),
            "Translation transport failed: connection reset"
        );
    }

    #[test]
    fn test_cache_error_is_transparent() {
        let err: Error = nlcli_cache::Error::configuration("bad").into();
        assert!(err.to_string().contains("bad"));
    }
}
