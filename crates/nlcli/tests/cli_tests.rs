//! End-to-end tests of the nlcli binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Isolated cache dir and working dir, no config file, no API key
fn nlcli(temp: &TempDir) -> Command {
    let cache = temp.path().join("cache");
    let work = temp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("nlcli").unwrap();
    cmd.current_dir(&work)
        .env("NLCLI_CACHE_DIR", &cache)
        .env("NLCLI_CONFIG", temp.path().join("absent.toml"))
        .env_remove("OPENAI_API_KEY")
        .env_remove("NLCLI_AI_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_translate_builtin_phrase() {
    let temp = TempDir::new().unwrap();
    nlcli(&temp)
        .args(["translate", "--platform", "linux", "show", "disk", "usage"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("df -h\n"));
}

#[test]
fn test_translate_alias_and_json() {
    let temp = TempDir::new().unwrap();
    let output = nlcli(&temp)
        .args(["--json", "t", "--platform", "darwin", "where", "am", "i?"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["data"]["command"], "pwd");
    assert_eq!(value["data"]["tier"], "exact");
    assert_eq!(value["data"]["platform"], "darwin");
}

#[test]
fn test_unresolved_exits_one() {
    let temp = TempDir::new().unwrap();
    nlcli(&temp)
        .args(["translate", "reticulate", "the", "splines", "--no-cache"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not resolve"))
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn test_unresolved_json_envelope() {
    let temp = TempDir::new().unwrap();
    let output = nlcli(&temp)
        .args(["--json", "translate", "reticulate", "the", "splines"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"], "error");
    assert_eq!(value["error"]["code"], "unresolved");
}

#[test]
fn test_context_tier_in_git_repo() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    fs::create_dir_all(work.join(".git")).unwrap();
    fs::write(work.join(".git/HEAD"), "ref: refs/heads/trunk\n").unwrap();

    nlcli(&temp)
        .args(["translate", "what", "changes"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("git status\n"))
        .stdout(predicate::str::contains("trunk"));
}

#[test]
fn test_bad_timeout_env_is_cli_error() {
    let temp = TempDir::new().unwrap();
    nlcli(&temp)
        .env("NLCLI_AI_TIMEOUT", "soon")
        .args(["translate", "list", "files"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NLCLI_AI_TIMEOUT"));
}

#[test]
fn test_invalid_config_file_is_cli_error() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");
    fs::write(&config, "[cache\n").unwrap();
    nlcli(&temp)
        .env("NLCLI_CONFIG", &config)
        .args(["cache", "stats"])
        .assert()
        .code(2);
}

#[test]
fn test_cache_stats_and_info() {
    let temp = TempDir::new().unwrap();
    nlcli(&temp)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:"));

    let output = nlcli(&temp)
        .args(["--json", "cache", "info"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["data"]["migration"]["legacy_exists"], false);
    assert_eq!(value["data"]["size"]["max_memory_entries"], 1000);
}

#[test]
fn test_cache_clear_and_cleanup() {
    let temp = TempDir::new().unwrap();
    nlcli(&temp)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleared"));
    nlcli(&temp)
        .args(["cache", "cleanup", "--days", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 entries"));
}

#[test]
fn test_cache_migrate_nothing() {
    let temp = TempDir::new().unwrap();
    nlcli(&temp)
        .args(["cache", "migrate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to migrate"));
}

#[test]
fn test_config_path_honors_env() {
    let temp = TempDir::new().unwrap();
    nlcli(&temp)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("absent.toml"));
}

#[test]
fn test_config_show_reads_file() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");
    fs::write(&config, "[cache]\nmemory_entries = 42\n").unwrap();
    nlcli(&temp)
        .env("NLCLI_CONFIG", &config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("memory_entries = 42"));
}

#[test]
fn test_missing_words_is_usage_error() {
    let temp = TempDir::new().unwrap();
    nlcli(&temp).arg("translate").assert().code(2);
}
