//! Command handlers
//!
//! Handlers build their whole output as a string and leave printing to the
//! binary, so every command can be exercised from tests.

use crate::builtin::builtin_table;
use crate::cli::{
    CacheCommands, CliError, Commands, ConfigCommands, EXIT_OK, EXIT_UNRESOLVED, ErrorEnvelope,
    OkEnvelope,
};
use crate::config::{Settings, timeout_from_secs};
use crate::context::{ProjectContext, ProjectContextProvider};
use crate::translator::OpenAiTranslator;
use nlcli_cache::{CacheConfig, MigrationOutcome, Migrator, PersistentCache};
use nlcli_resolver::{
    BoundedResolver, DEFAULT_QUEUE_DEPTH, ExactMatcher, Orchestrator, PlatformContext, Resolution,
    TypoMatcher,
};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// What a command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Text to print
    pub text: String,
    /// Print on stderr instead of stdout
    pub to_stderr: bool,
    /// Process exit code
    pub exit_code: i32,
}

impl CommandOutput {
    fn ok(text: String) -> Self {
        Self {
            text,
            to_stderr: false,
            exit_code: EXIT_OK,
        }
    }
}

/// Run `command` with `settings`
pub fn execute(
    command: &Commands,
    settings: &Settings,
    json: bool,
) -> Result<CommandOutput, CliError> {
    match command {
        Commands::Translate {
            words,
            platform,
            timeout,
            no_cache,
        } => {
            let request = TranslateRequest {
                input: words.join(" "),
                platform: platform.clone(),
                timeout: *timeout,
                use_cache: !no_cache,
            };
            execute_translate(&request, settings, json)
        }
        Commands::Cache { subcommand } => execute_cache(subcommand, settings, json),
        Commands::Config { subcommand } => execute_config(*subcommand, settings, json),
    }
}

/// Parameters of `nlcli translate`
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateRequest {
    /// The natural-language request
    pub input: String,
    /// Platform override
    pub platform: Option<String>,
    /// External timeout override in seconds
    pub timeout: Option<f64>,
    /// Whether the persistent cache takes part
    pub use_cache: bool,
}

#[derive(Debug, Serialize)]
struct TranslateOutput<'a> {
    input: &'a str,
    platform: &'a str,
    #[serde(flatten)]
    resolution: &'a Resolution,
}

/// Resolve one request through every configured tier
pub fn execute_translate(
    request: &TranslateRequest,
    settings: &Settings,
    json: bool,
) -> Result<CommandOutput, CliError> {
    let orchestrator = build_orchestrator(request, settings)?;
    let resolution = orchestrator.resolve(&request.input);

    if let Some(cache) = orchestrator.cache()
        && let Err(e) = cache.force_flush()
    {
        tracing::warn!("Failed to flush translation cache: {e}");
    }

    let Some(resolution) = resolution else {
        let message = format!("Could not resolve: {}", request.input.trim());
        let hint = if settings.ai.api_key.is_none() {
            format!("Set {} to enable AI translation", crate::config::API_KEY_ENV)
        } else {
            "Try rephrasing the request".to_string()
        };
        return if json {
            let envelope = ErrorEnvelope::new(serde_json::json!({
                "code": "unresolved",
                "message": message,
                "help": hint,
            }));
            Ok(CommandOutput {
                text: to_json(&envelope)?,
                to_stderr: false,
                exit_code: EXIT_UNRESOLVED,
            })
        } else {
            Ok(CommandOutput {
                text: format!("{message}\n{hint}"),
                to_stderr: true,
                exit_code: EXIT_UNRESOLVED,
            })
        };
    };

    let text = if json {
        to_json(&OkEnvelope::new(TranslateOutput {
            input: request.input.trim(),
            platform: orchestrator.platform(),
            resolution: &resolution,
        }))?
    } else {
        render_resolution(&resolution)
    };
    Ok(CommandOutput::ok(text))
}

fn render_resolution(resolution: &Resolution) -> String {
    let mut out = resolution.command.clone();
    let mut detail = format!("{}, {:.2}", resolution.tier, resolution.confidence);
    if let Some(uses) = resolution.use_count {
        let _ = write!(detail, ", used {uses}x");
    }
    if resolution.explanation.is_empty() {
        let _ = write!(out, "\n# [{detail}]");
    } else {
        let _ = write!(out, "\n# {} [{detail}]", resolution.explanation);
    }
    if !resolution.safe {
        out.push_str("\n# Warning: flagged as potentially dangerous; review before running");
    }
    out
}

/// Wire up the tiers from settings and request overrides
pub fn build_orchestrator(
    request: &TranslateRequest,
    settings: &Settings,
) -> Result<Orchestrator, CliError> {
    let platform = request
        .platform
        .as_deref()
        .map_or_else(PlatformContext::detect, PlatformContext::for_os);
    let timeout = match request.timeout {
        Some(secs) => timeout_from_secs(secs)?,
        None => settings.timeout()?,
    };

    let table = builtin_table()?;
    let context = match std::env::current_dir() {
        Ok(dir) => ProjectContextProvider::detect(&dir),
        Err(e) => {
            tracing::debug!("No working directory for context detection: {e}");
            ProjectContextProvider::new(ProjectContext::default())
        }
    };

    let mut builder = Orchestrator::builder()
        .exact_matcher(ExactMatcher::new(table.clone()))
        .correction_matcher(TypoMatcher::new(table))
        .context_provider(context)
        .platform(platform.os.clone())
        .timeout(timeout);

    if request.use_cache && settings.cache.enabled {
        builder = builder.cache(Arc::new(open_cache(settings)?));
    }

    if settings
        .ai
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty())
    {
        let translator = OpenAiTranslator::new(&settings.ai, timeout)?;
        let resolver = BoundedResolver::with_pool(
            Arc::new(translator),
            platform,
            settings.ai.workers,
            DEFAULT_QUEUE_DEPTH,
        )?;
        builder = builder.external(resolver);
    } else {
        tracing::debug!("No API key configured; external tier disabled");
    }

    let orchestrator = builder.build();
    tracing::debug!(?orchestrator, "Built orchestrator");
    Ok(orchestrator)
}

fn open_cache(settings: &Settings) -> Result<PersistentCache, CliError> {
    let config = CacheConfig::new(settings.cache_dir()?)
        .with_memory_entries(settings.cache.memory_entries)
        .with_flush_every(settings.cache.flush_every);
    Ok(PersistentCache::open(config)?)
}

#[derive(Debug, Serialize)]
struct CacheInfoOutput {
    dir: String,
    size: nlcli_cache::CacheSizeInfo,
    migration: nlcli_cache::MigrationInfo,
}

#[derive(Debug, Serialize)]
struct MigrateOutput {
    migrated_entries: Option<usize>,
    legacy_renamed: bool,
}

/// `nlcli cache ...`
pub fn execute_cache(
    command: &CacheCommands,
    settings: &Settings,
    json: bool,
) -> Result<CommandOutput, CliError> {
    let text = match command {
        CacheCommands::Stats => {
            let stats = open_cache(settings)?.stats();
            if json {
                to_json(&OkEnvelope::new(&stats))?
            } else {
                let mut out = String::new();
                let _ = writeln!(out, "Entries:         {}", stats.entries);
                let _ = writeln!(out, "In memory:       {}", stats.memory_entries);
                let _ = writeln!(
                    out,
                    "Hits:            {} ({} memory, {} file)",
                    stats.hits, stats.memory_hits, stats.file_hits
                );
                let _ = writeln!(out, "Misses:          {}", stats.misses);
                let _ = writeln!(out, "Writes:          {}", stats.writes);
                let _ = writeln!(out, "Hit rate:        {:.1}%", stats.hit_rate * 100.0);
                let _ = write!(out, "Memory hit rate: {:.1}%", stats.memory_hit_rate * 100.0);
                out
            }
        }
        CacheCommands::Cleanup { days } => {
            let secs = days.checked_mul(SECS_PER_DAY).ok_or_else(|| {
                CliError::config(format!("--days {days} is too large"))
            })?;
            let removed = open_cache(settings)?.cleanup_older_than(Duration::from_secs(secs))?;
            if json {
                to_json(&OkEnvelope::new(serde_json::json!({ "removed": removed })))?
            } else {
                format!("Removed {removed} entries unused for more than {days} days")
            }
        }
        CacheCommands::Clear => {
            open_cache(settings)?.clear()?;
            if json {
                to_json(&OkEnvelope::new(serde_json::json!({ "cleared": true })))?
            } else {
                "Cache cleared".to_string()
            }
        }
        CacheCommands::Popular { limit } => {
            let entries = open_cache(settings)?.popular(*limit);
            if json {
                to_json(&OkEnvelope::new(&entries))?
            } else if entries.is_empty() {
                "No cached translations".to_string()
            } else {
                let mut out = String::new();
                for entry in &entries {
                    let _ = writeln!(out, "{:>5}  {}", entry.use_count, entry.command);
                }
                out.trim_end().to_string()
            }
        }
        CacheCommands::Info => {
            let cache = open_cache(settings)?;
            let info = CacheInfoOutput {
                dir: cache.dir().display().to_string(),
                size: cache.size_info(),
                migration: Migrator::new(cache.dir()).info(),
            };
            if json {
                to_json(&OkEnvelope::new(&info))?
            } else {
                let mut out = String::new();
                let _ = writeln!(out, "Directory:     {}", info.dir);
                let _ = writeln!(out, "File size:     {} bytes", info.size.file_size_bytes);
                let _ = writeln!(
                    out,
                    "Memory:        {}/{} entries",
                    info.size.memory_entries, info.size.max_memory_entries
                );
                let _ = writeln!(out, "Legacy store:  {}", yes_no(info.migration.legacy_exists));
                let _ = write!(
                    out,
                    "Migrated:      {}",
                    yes_no(info.migration.migration_completed)
                );
                out
            }
        }
        // Works on the directory alone; opening the cache would migrate as a side effect
        CacheCommands::Migrate { cleanup } => {
            return execute_migrate(&settings.cache_dir()?, *cleanup, json);
        }
    };
    Ok(CommandOutput::ok(text))
}

fn execute_migrate(
    dir: &std::path::Path,
    cleanup: bool,
    json: bool,
) -> Result<CommandOutput, CliError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        CliError::other(format!("Failed to create cache directory {}: {e}", dir.display()))
    })?;
    let migrator = Migrator::new(dir);
    let migrated_entries = match migrator.migrate()? {
        MigrationOutcome::Migrated { entries } => Some(entries),
        MigrationOutcome::NotNeeded => None,
    };
    let legacy_renamed = cleanup && migrator.cleanup()?;

    let text = if json {
        to_json(&OkEnvelope::new(MigrateOutput {
            migrated_entries,
            legacy_renamed,
        }))?
    } else {
        let mut out = match migrated_entries {
            Some(n) => format!("Migrated {n} entries from {}", migrator.legacy_path().display()),
            None => "Nothing to migrate".to_string(),
        };
        if legacy_renamed {
            let _ = write!(
                out,
                "\nLegacy database moved to {}",
                migrator.backup_path().display()
            );
        }
        out
    };
    Ok(CommandOutput::ok(text))
}

/// `nlcli config ...`
pub fn execute_config(
    command: ConfigCommands,
    settings: &Settings,
    json: bool,
) -> Result<CommandOutput, CliError> {
    let text = match command {
        ConfigCommands::Show => {
            let shown = settings.redacted();
            if json {
                to_json(&OkEnvelope::new(&shown))?
            } else {
                toml::to_string_pretty(&shown)
                    .map_err(|e| CliError::other(format!("Failed to render settings: {e}")))?
                    .trim_end()
                    .to_string()
            }
        }
        ConfigCommands::Path => {
            let path = Settings::config_path()
                .ok_or_else(|| CliError::config("No configuration directory available"))?;
            if json {
                to_json(&OkEnvelope::new(serde_json::json!({
                    "path": path.display().to_string(),
                    "exists": path.is_file(),
                })))?
            } else {
                path.display().to_string()
            }
        }
    };
    Ok(CommandOutput::ok(text))
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::other(format!("Failed to serialize output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.cache.dir = Some(dir.path().to_path_buf());
        settings
    }

    fn request(input: &str) -> TranslateRequest {
        TranslateRequest {
            input: input.to_string(),
            platform: Some("linux".to_string()),
            timeout: None,
            use_cache: true,
        }
    }

    #[test]
    fn test_translate_builtin_phrase() {
        let temp = TempDir::new().unwrap();
        let out = execute_translate(&request("list files"), &settings_in(&temp), false).unwrap();
        assert_eq!(out.exit_code, EXIT_OK);
        assert!(out.text.starts_with("ls -la\n# "));
        assert!(out.text.contains("exact"));
    }

    #[test]
    fn test_translate_typo_reports_correction() {
        let temp = TempDir::new().unwrap();
        let out =
            execute_translate(&request("shwo disk usage"), &settings_in(&temp), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["data"]["command"], "df -h");
        assert_eq!(value["data"]["tier"], "correction");
        assert_eq!(value["data"]["platform"], "linux");
    }

    #[test]
    fn test_unresolved_without_key() {
        let temp = TempDir::new().unwrap();
        let out = execute_translate(
            &request("reticulate the splines quietly"),
            &settings_in(&temp),
            false,
        )
        .unwrap();
        assert_eq!(out.exit_code, EXIT_UNRESOLVED);
        assert!(out.to_stderr);
        assert!(out.text.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_bad_timeout_override_is_config_error() {
        let temp = TempDir::new().unwrap();
        let mut req = request("list files");
        req.timeout = Some(-1.0);
        let err = execute_translate(&req, &settings_in(&temp), false).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[test]
    fn test_windows_override() {
        let temp = TempDir::new().unwrap();
        let mut req = request("list files");
        req.platform = Some("windows".to_string());
        let out = execute_translate(&req, &settings_in(&temp), false).unwrap();
        assert!(out.text.starts_with("Get-ChildItem -Force"));
    }

    #[test]
    fn test_unsafe_resolution_carries_warning() {
        let resolution = Resolution {
            command: "rm -rf ./build".to_string(),
            explanation: "Delete the build directory".to_string(),
            confidence: 0.9,
            tier: nlcli_resolver::Tier::External,
            use_count: Some(1),
            safe: false,
        };
        let text = render_resolution(&resolution);
        assert!(text.starts_with("rm -rf ./build\n# Delete the build directory"));
        assert!(text.ends_with("review before running"));

        let shown = Resolution {
            safe: true,
            ..resolution
        };
        assert!(!render_resolution(&shown).contains("Warning"));
    }

    #[test]
    fn test_json_output_reports_safety() {
        let temp = TempDir::new().unwrap();
        let out = execute_translate(&request("list files"), &settings_in(&temp), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(value["data"]["safe"], true);
    }

    #[test]
    fn test_cache_stats_on_fresh_dir() {
        let temp = TempDir::new().unwrap();
        let out = execute_cache(&CacheCommands::Stats, &settings_in(&temp), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(value["data"]["entries"], 0);
        assert_eq!(value["data"]["misses"], 0);
    }

    #[test]
    fn test_cache_popular_lists_stored_entries() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);
        {
            let cache = open_cache(&settings).unwrap();
            let entry = nlcli_cache::CacheEntry::new("du -sh *", "Sizes", 0.9, "linux");
            cache.store("folder sizes", "linux", entry).unwrap();
            cache.force_flush().unwrap();
        }
        let out = execute_cache(&CacheCommands::Popular { limit: 5 }, &settings, false).unwrap();
        assert!(out.text.contains("du -sh *"));
    }

    #[test]
    fn test_cache_migrate_without_legacy() {
        let temp = TempDir::new().unwrap();
        let out = execute_cache(
            &CacheCommands::Migrate { cleanup: true },
            &settings_in(&temp),
            false,
        )
        .unwrap();
        assert_eq!(out.text, "Nothing to migrate");
    }

    #[test]
    fn test_cleanup_days_overflow() {
        let temp = TempDir::new().unwrap();
        let err = execute_cache(
            &CacheCommands::Cleanup { days: u64::MAX },
            &settings_in(&temp),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[test]
    fn test_config_show_is_toml() {
        let mut settings = Settings::default();
        settings.ai.api_key = Some("sk-hidden".to_string());
        let out = execute_config(ConfigCommands::Show, &settings, false).unwrap();
        assert!(out.text.contains("[cache]"));
        assert!(!out.text.contains("sk-hidden"));
    }
}
