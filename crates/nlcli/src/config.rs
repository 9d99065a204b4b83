//! User settings from `config.toml` and the environment

use crate::cli::CliError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides the config file location
pub const CONFIG_ENV: &str = "NLCLI_CONFIG";
/// API key for the external translator
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// External translation timeout in seconds
pub const TIMEOUT_ENV: &str = "NLCLI_AI_TIMEOUT";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Effective settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `[cache]`
    pub cache: CacheSettings,
    /// `[ai]`
    pub ai: AiSettings,
}

/// `[cache]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache directory; resolved from the environment when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// In-memory capacity
    pub memory_entries: usize,
    /// Writes between background flushes
    pub flush_every: usize,
    /// Whether translations are cached at all
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: None,
            memory_entries: nlcli_cache::DEFAULT_MEMORY_ENTRIES,
            flush_every: nlcli_cache::DEFAULT_FLUSH_EVERY,
            enabled: true,
        }
    }
}

/// `[ai]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    /// API key; the external tier is disabled without one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Chat model
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// Timeout for one translation, in seconds
    pub timeout_secs: f64,
    /// Concurrent external calls
    pub workers: usize,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 8.0,
            workers: nlcli_resolver::DEFAULT_WORKERS,
        }
    }
}

impl Settings {
    /// Location of the config file
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        std::env::var_os("XDG_CONFIG_HOME")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .map(|dir| dir.join("nlcli").join(CONFIG_FILE_NAME))
    }

    /// Load the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self, CliError> {
        let mut settings = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, CliError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CliError::config(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        toml::from_str(&text).map_err(|e| {
            CliError::config_with_help(
                format!("Invalid config file {}: {e}", path.display()),
                "See `nlcli config show` for the expected layout",
            )
        })
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), CliError> {
        let set = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = set(nlcli_cache::CACHE_DIR_ENV) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(key) = set(API_KEY_ENV) {
            self.ai.api_key = Some(key);
        }
        if let Some(raw) = set(TIMEOUT_ENV) {
            self.ai.timeout_secs = raw.trim().parse().map_err(|_| {
                CliError::config_with_help(
                    format!("{TIMEOUT_ENV} is not a number: {raw}"),
                    "Use seconds, e.g. NLCLI_AI_TIMEOUT=8",
                )
            })?;
        }
        Ok(())
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<(), CliError> {
        if self.cache.memory_entries == 0 {
            return Err(CliError::config("cache.memory_entries must be at least 1"));
        }
        if self.cache.flush_every == 0 {
            return Err(CliError::config("cache.flush_every must be at least 1"));
        }
        if self.ai.workers == 0 {
            return Err(CliError::config("ai.workers must be at least 1"));
        }
        timeout_from_secs(self.ai.timeout_secs)?;
        Ok(())
    }

    /// External translation timeout
    pub fn timeout(&self) -> Result<Duration, CliError> {
        timeout_from_secs(self.ai.timeout_secs)
    }

    /// Cache directory, resolving the default when none is configured
    pub fn cache_dir(&self) -> Result<PathBuf, CliError> {
        match &self.cache.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(nlcli_cache::default_cache_dir()?),
        }
    }

    /// Copy safe to print
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.ai.api_key.is_some() {
            copy.ai.api_key = Some("********".to_string());
        }
        copy
    }
}

/// Validate a timeout given in seconds
pub fn timeout_from_secs(secs: f64) -> Result<Duration, CliError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(CliError::config(format!(
            "timeout must be a positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| CliError::config(format!("invalid timeout {secs}: {e}")))
}
