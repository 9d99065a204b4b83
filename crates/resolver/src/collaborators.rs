//! Seams for the local strategies and the external translator
//!
//! Local matchers and context providers are pure and synchronous: they must
//! answer without I/O because they run before the cache on every request.

use crate::error::TranslateError;
use crate::platform::PlatformContext;
use serde::Serialize;

/// A local strategy's answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalMatch {
    /// Resolved command
    pub command: String,
    /// What it does
    pub explanation: String,
    /// How sure the matcher is
    pub confidence: f64,
    /// Which matcher produced it
    pub source: String,
}

/// Synchronous local pattern matcher
pub trait LocalMatcher: Send + Sync {
    /// Match `input` for `platform`, or `None`
    fn find(&self, input: &str, platform: &str) -> Option<LocalMatch>;
}

/// One context-derived suggestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSuggestion {
    /// Suggested command
    pub command: String,
    /// What it does
    pub explanation: String,
    /// How sure the provider is
    pub confidence: f64,
    /// Kind of context that produced it (`git_status`, `node_install`, ...)
    pub context_type: String,
}

/// Environment-aware suggestion source
pub trait ContextProvider: Send + Sync {
    /// Suggestions for `input` in no particular order
    fn suggest(&self, input: &str) -> Vec<ContextSuggestion>;
}

/// External translation service.
///
/// Returns the raw JSON object; validation happens in the bounded resolver
/// so every implementation gets the same treatment of malformed payloads.
pub trait Translator: Send + Sync {
    /// Translate `input` for `platform`
    fn translate(
        &self,
        input: &str,
        platform: &PlatformContext,
    ) -> Result<serde_json::Value, TranslateError>;
}

impl<T: LocalMatcher + ?Sized> LocalMatcher for std::sync::Arc<T> {
    fn find(&self, input: &str, platform: &str) -> Option<LocalMatch> {
        (**self).find(input, platform)
    }
}

impl<T: ContextProvider + ?Sized> ContextProvider for std::sync::Arc<T> {
    fn suggest(&self, input: &str) -> Vec<ContextSuggestion> {
        (**self).suggest(input)
    }
}
