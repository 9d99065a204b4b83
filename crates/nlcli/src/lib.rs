//! nlcli - turn natural-language requests into shell commands
//!
//! The binary wires the resolution tiers from `nlcli-resolver` to
//! concrete collaborators:
//!
//! - A pattern table compiled into the binary for the exact and typo tiers
//! - Project detection (git, Node, Python, Cargo) for the context tier
//! - The persistent cache from `nlcli-cache`
//! - An OpenAI-compatible chat API for the external tier
//!
//! Settings come from `config.toml` with environment overrides; see
//! [`config::Settings`].

#![expect(
    clippy::missing_errors_doc,
    reason = "Errors are CliError values documented on the type"
)]

/// Pattern table shipped with the binary.
pub mod builtin;
/// CLI argument parsing, errors and exit codes.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Settings file and environment overrides.
pub mod config;
/// Project-aware suggestions.
pub mod context;
/// Logging setup.
pub mod tracing;
/// External translator over HTTP.
pub mod translator;

pub use cli::{CliError, EXIT_CLI, EXIT_OK, EXIT_RUNTIME, EXIT_UNRESOLVED};
pub use commands::{CommandOutput, execute};
pub use config::Settings;
