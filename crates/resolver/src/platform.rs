//! Platform discrimination for keys and prompts

use serde::Serialize;

/// The operating system and shell commands are resolved for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformContext {
    /// Lowercase OS name: `linux`, `darwin`, `windows`, ...
    pub os: String,
    /// Shell the command will run under
    pub shell: String,
}

impl PlatformContext {
    /// Explicit platform
    #[must_use]
    pub fn new(os: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            shell: shell.into(),
        }
    }

    /// Detect the current platform and shell
    #[must_use]
    pub fn detect() -> Self {
        let os = os_name(std::env::consts::OS);
        let shell = std::env::var("SHELL")
            .ok()
            .and_then(|s| {
                std::path::Path::new(&s)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_shell(&os).to_string());
        Self { os, shell }
    }

    /// Same shell defaults as [`PlatformContext::detect`] for an explicit OS
    #[must_use]
    pub fn for_os(os: &str) -> Self {
        let os = os_name(os);
        let shell = default_shell(&os).to_string();
        Self { os, shell }
    }
}

/// Map Rust's OS names onto the names used in cache keys
fn os_name(os: &str) -> String {
    match os {
        "macos" => "darwin".to_string(),
        other => other.to_lowercase(),
    }
}

fn default_shell(os: &str) -> &'static str {
    match os {
        "windows" => "powershell",
        "darwin" => "zsh",
        _ => "bash",
    }
}

impl std::fmt::Display for PlatformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.os, self.shell)
    }
}
