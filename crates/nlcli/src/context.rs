//! Project-aware suggestions from the working directory
//!
//! Everything is detected once, up front, from the filesystem alone so that
//! [`ContextProvider::suggest`] stays free of I/O.

use nlcli_resolver::{ContextProvider, ContextSuggestion};
use std::fs;
use std::path::{Path, PathBuf};

/// What was found around the working directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectContext {
    /// Root of the enclosing git work tree
    pub git_root: Option<PathBuf>,
    /// Checked-out branch, when HEAD names one
    pub git_branch: Option<String>,
    /// `package.json` present
    pub node: bool,
    /// `yarn.lock` present
    pub yarn: bool,
    /// `requirements.txt` present
    pub python_requirements: bool,
    /// `pyproject.toml` present
    pub pyproject: bool,
    /// `Cargo.toml` present
    pub cargo: bool,
}

impl ProjectContext {
    /// Inspect `dir` and its ancestors
    #[must_use]
    pub fn detect(dir: &Path) -> Self {
        let git_root = find_git_root(dir);
        let git_branch = git_root.as_deref().and_then(read_branch);
        let context = Self {
            git_branch,
            git_root,
            node: dir.join("package.json").is_file(),
            yarn: dir.join("yarn.lock").is_file(),
            python_requirements: dir.join("requirements.txt").is_file(),
            pyproject: dir.join("pyproject.toml").is_file(),
            cargo: dir.join("Cargo.toml").is_file(),
        };
        tracing::debug!(?context, "Detected project context");
        context
    }
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Branch name from `.git/HEAD`; `None` when detached or unreadable
fn read_branch(root: &Path) -> Option<String> {
    let git = root.join(".git");
    // Worktrees and submodules use a `gitdir:` pointer file
    let git_dir = if git.is_file() {
        let pointer = fs::read_to_string(&git).ok()?;
        let target = pointer.trim().strip_prefix("gitdir:")?.trim();
        root.join(target)
    } else {
        git
    };
    let head = fs::read_to_string(git_dir.join("HEAD")).ok()?;
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(ToString::to_string)
}

/// [`ContextProvider`] over a detected [`ProjectContext`]
#[derive(Debug, Clone)]
pub struct ProjectContextProvider {
    context: ProjectContext,
}

impl ProjectContextProvider {
    /// Detect the context of `dir`
    #[must_use]
    pub fn detect(dir: &Path) -> Self {
        Self::new(ProjectContext::detect(dir))
    }

    /// Provider over an already detected context
    #[must_use]
    pub const fn new(context: ProjectContext) -> Self {
        Self { context }
    }

    /// The detected context
    #[must_use]
    pub const fn context(&self) -> &ProjectContext {
        &self.context
    }

    fn git(&self, words: &[String], out: &mut Vec<ContextSuggestion>) {
        if self.context.git_root.is_none() {
            return;
        }
        let branch = self.context.git_branch.as_deref().unwrap_or("unknown");
        if has_any(words, &["status", "changes", "changed"]) {
            out.push(suggestion(
                "git status",
                format!("Check status of the Git repository (branch: {branch})"),
                0.92,
                "git_status",
            ));
        }
        if has_any(words, &["branch", "branches", "switch"]) {
            out.push(suggestion(
                "git branch",
                format!("List branches (current: {branch})"),
                0.87,
                "git_branch",
            ));
        }
    }

    fn node(&self, words: &[String], out: &mut Vec<ContextSuggestion>) {
        if !self.context.node {
            return;
        }
        if has_any(words, &["install", "dependencies", "deps"]) {
            if self.context.yarn {
                out.push(suggestion(
                    "yarn install",
                    "Install Node.js dependencies with Yarn",
                    0.92,
                    "node_install",
                ));
            } else {
                out.push(suggestion(
                    "npm install",
                    "Install Node.js dependencies with npm",
                    0.90,
                    "node_install",
                ));
            }
        }
        if has_any(words, &["run", "start", "dev"]) {
            out.push(suggestion(
                "npm start",
                "Start the Node.js application",
                0.85,
                "node_start",
            ));
            out.push(suggestion(
                "npm run dev",
                "Start the development server",
                0.83,
                "node_dev",
            ));
        }
    }

    fn python(&self, words: &[String], out: &mut Vec<ContextSuggestion>) {
        if self.context.python_requirements && has_any(words, &["install", "dependencies", "deps"])
        {
            out.push(suggestion(
                "pip install -r requirements.txt",
                "Install Python dependencies",
                0.90,
                "python_install",
            ));
        }
        if self.context.pyproject && has_any(words, &["run", "execute", "start"]) {
            out.push(suggestion(
                "python -m pip install -e .",
                "Install the project in development mode",
                0.83,
                "python_dev",
            ));
        }
    }

    fn cargo(&self, words: &[String], out: &mut Vec<ContextSuggestion>) {
        if !self.context.cargo {
            return;
        }
        if has_any(words, &["build", "compile"]) {
            out.push(suggestion(
                "cargo build",
                "Build the Rust project",
                0.90,
                "cargo_build",
            ));
        }
        if has_any(words, &["test", "tests"]) {
            out.push(suggestion(
                "cargo test",
                "Run the Rust project's tests",
                0.90,
                "cargo_test",
            ));
        }
    }
}

impl ContextProvider for ProjectContextProvider {
    fn suggest(&self, input: &str) -> Vec<ContextSuggestion> {
        let words = words(input);
        let mut out = Vec::new();
        self.git(&words, &mut out);
        self.node(&words, &mut out);
        self.python(&words, &mut out);
        self.cargo(&words, &mut out);
        out
    }
}

fn words(input: &str) -> Vec<String> {
    input
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn has_any(words: &[String], wanted: &[&str]) -> bool {
    words.iter().any(|w| wanted.contains(&w.as_str()))
}

fn suggestion(
    command: &str,
    explanation: impl Into<String>,
    confidence: f64,
    context_type: &str,
) -> ContextSuggestion {
    ContextSuggestion {
        command: command.to_string(),
        explanation: explanation.into(),
        confidence,
        context_type: context_type.to_string(),
    }
}
