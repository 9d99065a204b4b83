//! Argument parsing, CLI errors and output envelopes

use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use thiserror::Error;

/// Successful run
pub const EXIT_OK: i32 = 0;
/// The request could not be resolved by any tier
pub const EXIT_UNRESOLVED: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Runtime failure exit code
pub const EXIT_RUNTIME: i32 = 3;

/// CLI-specific error types with exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("Configuration error: {message}")]
    #[diagnostic(code(nlcli::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Resolution machinery failed (exit code 3)
    #[error("Resolution error: {message}")]
    #[diagnostic(code(nlcli::cli::resolve))]
    Resolve {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Other unexpected error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(nlcli::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new resolution error
    #[must_use]
    pub fn resolve(message: impl Into<String>) -> Self {
        Self::Resolve {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error with help text
    #[must_use]
    pub fn other_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Map cache errors onto CLI categories.
///
/// Configuration problems are the user's to fix (exit code 2); I/O and
/// migration failures are runtime errors (exit code 3).
impl From<nlcli_cache::Error> for CliError {
    fn from(err: nlcli_cache::Error) -> Self {
        match err {
            nlcli_cache::Error::Configuration { message } => Self::config_with_help(
                message,
                "Check the [cache] section of the config file or NLCLI_CACHE_DIR",
            ),
            nlcli_cache::Error::Io {
                source,
                path,
                operation,
            } => {
                let path_str = path
                    .as_ref()
                    .map_or(String::new(), |p| format!(" on {}", p.display()));
                Self::other_with_help(
                    format!("I/O {operation} failed{path_str}: {source}"),
                    "Check file permissions and ensure the path exists",
                )
            }
            nlcli_cache::Error::Migration { message } => Self::other_with_help(
                message,
                "The legacy database was left untouched; the cache starts empty",
            ),
            other => Self::other(other.to_string()),
        }
    }
}

impl From<nlcli_resolver::Error> for CliError {
    fn from(err: nlcli_resolver::Error) -> Self {
        match err {
            nlcli_resolver::Error::Configuration { message } => Self::config(message),
            nlcli_resolver::Error::Cache(inner) => inner.into(),
            other @ nlcli_resolver::Error::Spawn { .. } => Self::resolve(other.to_string()),
        }
    }
}

/// Map CLI error to exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Resolve { .. } | CliError::Other { .. } => EXIT_RUNTIME,
    }
}

/// Render an error as a miette report on stderr, or as a JSON envelope
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let envelope = ErrorEnvelope::new(serde_json::json!({
            "code": match err {
                CliError::Config { .. } => "config",
                CliError::Resolve { .. } => "resolve",
                CliError::Other { .. } => "other",
            },
            "message": err.to_string()
        }));
        match serde_json::to_string(&envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Always "ok"
    pub status: &'static str,
    /// The payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Always "error"
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Turn natural-language requests into shell commands.
#[derive(Parser, Debug)]
#[command(name = "nlcli")]
#[command(about = "Turn natural-language requests into shell commands")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,

    /// Emit a JSON envelope instead of text.
    #[arg(long, global = true, help = "Emit a JSON envelope instead of text")]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a natural-language request to a command.
    #[command(visible_alias = "t")]
    Translate {
        /// The request, e.g. `list files`
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
        /// Resolve for this platform instead of the current one
        #[arg(long)]
        platform: Option<String>,
        /// External translation timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,
        /// Skip the persistent cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Inspect and maintain the translation cache.
    Cache {
        /// Cache subcommand to execute.
        #[command(subcommand)]
        subcommand: CacheCommands,
    },
    /// Inspect configuration.
    Config {
        /// Config subcommand to execute.
        #[command(subcommand)]
        subcommand: ConfigCommands,
    },
}

/// `nlcli cache ...`
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheCommands {
    /// Show hit/miss counters.
    Stats,
    /// Remove entries not used for the given number of days.
    Cleanup {
        /// Maximum age in days
        #[arg(long, default_value_t = 30)]
        days: u64,
    },
    /// Remove every cached translation.
    Clear,
    /// Show the most used translations.
    Popular {
        /// Number of entries to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Migrate the legacy cache database.
    Migrate {
        /// Rename the legacy database aside once migrated
        #[arg(long)]
        cleanup: bool,
    },
    /// Show cache location, sizes and migration state.
    Info,
}

/// `nlcli config ...`
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the effective settings.
    Show,
    /// Print the config file location.
    Path,
}

/// Parse `std::env::args`
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&CliError::config("x")), EXIT_CLI);
        assert_eq!(exit_code_for(&CliError::resolve("x")), EXIT_RUNTIME);
        assert_eq!(exit_code_for(&CliError::other("x")), EXIT_RUNTIME);
    }

    #[test]
    fn test_cache_configuration_error_maps_to_config() {
        let err: CliError = nlcli_cache::Error::configuration("zero capacity").into();
        assert!(matches!(err, CliError::Config { .. }));
        assert_eq!(exit_code_for(&err), EXIT_CLI);
    }

    #[test]
    fn test_cache_io_error_mentions_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CliError =
            nlcli_cache::Error::io(io, std::path::Path::new("/tmp/x"), "write").into();
        assert!(err.to_string().contains("/tmp/x"));
        assert!(matches!(err, CliError::Other { .. }));
    }

    #[test]
    fn test_resolver_cache_error_is_unwrapped() {
        let inner = nlcli_cache::Error::configuration("bad");
        let err: CliError = nlcli_resolver::Error::Cache(inner).into();
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[test]
    fn test_parse_translate_words() {
        let cli = Cli::try_parse_from(["nlcli", "translate", "list", "all", "files", "--no-cache"])
            .unwrap();
        match cli.command {
            Commands::Translate {
                words, no_cache, ..
            } => {
                assert_eq!(words, vec!["list", "all", "files"]);
                assert!(no_cache);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_cache_cleanup_days() {
        let cli = Cli::try_parse_from(["nlcli", "--json", "cache", "cleanup", "--days", "7"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                subcommand: CacheCommands::Cleanup { days: 7 }
            }
        ));
    }

    #[test]
    fn test_translate_requires_words() {
        assert!(Cli::try_parse_from(["nlcli", "translate"]).is_err());
    }

    #[test]
    fn test_envelopes() {
        let ok = serde_json::to_value(OkEnvelope::new(1)).unwrap();
        assert_eq!(ok["status"], "ok");
        let err = serde_json::to_value(ErrorEnvelope::new("x")).unwrap();
        assert_eq!(err["status"], "error");
    }
}
