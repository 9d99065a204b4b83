//! Cache directory resolution

use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "NLCLI_CACHE_DIR";

/// Inputs for determining the cache directory
#[derive(Debug, Clone)]
struct CacheInputs {
    nlcli_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

/// Candidates in preference order. `~/.nlcli` also holds the legacy database.
fn candidates(inputs: CacheInputs) -> Vec<PathBuf> {
    let override_dir = inputs
        .nlcli_cache_dir
        .filter(|p| !p.as_os_str().is_empty());
    override_dir
        .into_iter()
        .chain(inputs.home_dir.map(|home| home.join(".nlcli")))
        .chain(inputs.xdg_cache_home.map(|xdg| xdg.join("nlcli")))
        .chain(inputs.os_cache_dir.map(|dir| dir.join("nlcli")))
        .chain(std::iter::once(inputs.temp_dir.join("nlcli")))
        .filter(|p| !p.starts_with("/homeless-shelter"))
        .collect()
}

/// Existing directories can still be read-only; creating a file checks that
fn usable(dir: &Path) -> bool {
    std::fs::create_dir_all(dir).is_ok() && tempfile::tempfile_in(dir).is_ok()
}

fn cache_root_from_inputs(inputs: CacheInputs) -> Result<PathBuf> {
    candidates(inputs)
        .into_iter()
        .find(|dir| usable(dir))
        .ok_or_else(|| Error::configuration("No writable cache directory found"))
}

/// Resolve the default cache directory from the environment
pub fn default_cache_dir() -> Result<PathBuf> {
    let inputs = CacheInputs {
        nlcli_cache_dir: std::env::var(CACHE_DIR_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from),
        home_dir: home_dir(),
        xdg_cache_home: std::env::var("XDG_CACHE_HOME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from),
        os_cache_dir: cache_dir(),
        temp_dir: std::env::temp_dir(),
    };
    cache_root_from_inputs(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn empty_inputs(temp_dir: PathBuf) -> CacheInputs {
        CacheInputs {
            nlcli_cache_dir: None,
            home_dir: None,
            xdg_cache_home: None,
            os_cache_dir: None,
            temp_dir,
        }
    }

    #[test]
    fn override_wins() {
        let temp = TempDir::new().unwrap();
        let wanted = temp.path().join("custom");
        let inputs = CacheInputs {
            nlcli_cache_dir: Some(wanted.clone()),
            home_dir: Some(temp.path().join("home")),
            ..empty_inputs(temp.path().to_path_buf())
        };
        let dir = cache_root_from_inputs(inputs).unwrap();
        assert_eq!(dir, wanted);
        assert!(dir.is_dir());
    }

    #[test]
    fn home_dot_dir_is_preferred_over_xdg() {
        let temp = TempDir::new().unwrap();
        let inputs = CacheInputs {
            home_dir: Some(temp.path().join("home")),
            xdg_cache_home: Some(temp.path().join("xdg")),
            ..empty_inputs(temp.path().to_path_buf())
        };
        let dir = cache_root_from_inputs(inputs).unwrap();
        assert_eq!(dir, temp.path().join("home/.nlcli"));
    }

    #[test]
    fn candidates_follow_preference_order() {
        let inputs = CacheInputs {
            nlcli_cache_dir: Some(PathBuf::from("/o")),
            home_dir: Some(PathBuf::from("/h")),
            xdg_cache_home: Some(PathBuf::from("/x")),
            os_cache_dir: Some(PathBuf::from("/c")),
            temp_dir: PathBuf::from("/t"),
        };
        let expected: Vec<PathBuf> = ["/o", "/h/.nlcli", "/x/nlcli", "/c/nlcli", "/t/nlcli"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(candidates(inputs), expected);
    }

    #[test]
    fn skips_homeless_shelter() {
        let tmp = std::env::temp_dir();
        let inputs = CacheInputs {
            home_dir: Some(PathBuf::from("/homeless-shelter")),
            xdg_cache_home: Some(PathBuf::from("/homeless-shelter/.cache")),
            ..empty_inputs(tmp.clone())
        };
        let dir = cache_root_from_inputs(inputs).unwrap();
        assert!(!dir.starts_with("/homeless-shelter"));
        assert!(dir.starts_with(&tmp));
    }

    #[test]
    fn empty_override_is_ignored() {
        let temp = TempDir::new().unwrap();
        let inputs = CacheInputs {
            nlcli_cache_dir: Some(PathBuf::new()),
            ..empty_inputs(temp.path().to_path_buf())
        };
        let dir = cache_root_from_inputs(inputs).unwrap();
        assert_eq!(dir, temp.path().join("nlcli"));
    }
}
