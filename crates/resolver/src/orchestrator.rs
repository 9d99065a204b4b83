//! Tiered resolution: cheapest and most certain strategies first
//!
//! Every tier before the external call is synchronous and does no network
//! I/O. The first tier that produces an acceptable answer wins; "no match"
//! at any tier is a value, never an error.

use crate::collaborators::{ContextProvider, LocalMatch, LocalMatcher};
use crate::external::BoundedResolver;
use crate::platform::PlatformContext;
use nlcli_cache::{CacheEntry, PersistentCache};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A context suggestion must exceed this confidence to be used
pub const CONTEXT_CONFIDENCE_THRESHOLD: f64 = 0.85;
/// Default wall-clock bound on the external tier
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(8);

/// Which strategy produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Exact local pattern
    Exact,
    /// Typo or fuzzy local pattern
    Correction,
    /// Environment-aware suggestion
    Context,
    /// Persistent cache
    Cache,
    /// External translation service
    External,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Exact => "exact",
            Self::Correction => "correction",
            Self::Context => "context",
            Self::Cache => "cache",
            Self::External => "external",
        };
        f.write_str(name)
    }
}

/// A resolved command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// Command to run
    pub command: String,
    /// What it does
    pub explanation: String,
    /// Confidence reported by the producing tier
    pub confidence: f64,
    /// Producing tier
    pub tier: Tier,
    /// Cache usage count, for cache-backed answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_count: Option<u64>,
    /// False when the external service flagged the command as dangerous
    pub safe: bool,
}

impl Resolution {
    fn local(found: LocalMatch, tier: Tier) -> Self {
        Self {
            command: found.command,
            explanation: found.explanation,
            confidence: found.confidence,
            tier,
            use_count: None,
            safe: true,
        }
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    exact: Vec<Box<dyn LocalMatcher>>,
    corrections: Vec<Box<dyn LocalMatcher>>,
    context: Option<Box<dyn ContextProvider>>,
    cache: Option<Arc<PersistentCache>>,
    external: Option<BoundedResolver>,
    platform: Option<String>,
    timeout: Duration,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            exact: Vec::new(),
            corrections: Vec::new(),
            context: None,
            cache: None,
            external: None,
            platform: None,
            timeout: DEFAULT_EXTERNAL_TIMEOUT,
        }
    }
}

impl OrchestratorBuilder {
    /// Empty builder: no strategies, detected platform
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exact-match strategy
    #[must_use]
    pub fn exact_matcher(mut self, matcher: impl LocalMatcher + 'static) -> Self {
        self.exact.push(Box::new(matcher));
        self
    }

    /// Add a correction strategy
    #[must_use]
    pub fn correction_matcher(mut self, matcher: impl LocalMatcher + 'static) -> Self {
        self.corrections.push(Box::new(matcher));
        self
    }

    /// Set the context provider
    #[must_use]
    pub fn context_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.context = Some(Box::new(provider));
        self
    }

    /// Use `cache` for the cache tier and to remember external answers
    #[must_use]
    pub fn cache(mut self, cache: Arc<PersistentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enable the external tier
    #[must_use]
    pub fn external(mut self, resolver: BoundedResolver) -> Self {
        self.external = Some(resolver);
        self
    }

    /// Platform discriminator for matching and cache keys
    #[must_use]
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Bound on the external tier
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> Orchestrator {
        let platform = self
            .platform
            .unwrap_or_else(|| PlatformContext::detect().os);
        Orchestrator {
            exact: self.exact,
            corrections: self.corrections,
            context: self.context,
            cache: self.cache,
            external: self.external,
            platform,
            timeout: self.timeout,
        }
    }
}

/// Runs the resolution tiers in order
pub struct Orchestrator {
    exact: Vec<Box<dyn LocalMatcher>>,
    corrections: Vec<Box<dyn LocalMatcher>>,
    context: Option<Box<dyn ContextProvider>>,
    cache: Option<Arc<PersistentCache>>,
    external: Option<BoundedResolver>,
    platform: String,
    timeout: Duration,
}

impl Orchestrator {
    /// Start building an orchestrator
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Platform used for matching and cache keys
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// The cache, when one is attached
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<PersistentCache>> {
        self.cache.as_ref()
    }

    /// Resolve `input` to a command, or `None` when no tier can
    #[tracing::instrument(name = "resolve", skip(self), fields(platform = %self.platform))]
    pub fn resolve(&self, input: &str) -> Option<Resolution> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        let started = Instant::now();
        let resolution = self.resolve_local(input).or_else(|| self.resolve_remote(input));

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &resolution {
            Some(found) => tracing::debug!(tier = %found.tier, elapsed_ms, "Resolved"),
            None => tracing::debug!(elapsed_ms, "No tier could resolve the request"),
        }
        resolution
    }

    fn resolve_local(&self, input: &str) -> Option<Resolution> {
        if let Some(found) = self.exact.iter().find_map(|m| m.find(input, &self.platform)) {
            return Some(Resolution::local(found, Tier::Exact));
        }
        if let Some(found) = self
            .corrections
            .iter()
            .find_map(|m| m.find(input, &self.platform))
        {
            return Some(Resolution::local(found, Tier::Correction));
        }

        let provider = self.context.as_ref()?;
        let best = provider
            .suggest(input)
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;
        if best.confidence > CONTEXT_CONFIDENCE_THRESHOLD {
            return Some(Resolution {
                command: best.command,
                explanation: best.explanation,
                confidence: best.confidence,
                tier: Tier::Context,
                use_count: None,
                safe: true,
            });
        }
        tracing::debug!(
            confidence = best.confidence,
            context_type = %best.context_type,
            "Context suggestion below threshold; falling through"
        );
        None
    }

    fn resolve_remote(&self, input: &str) -> Option<Resolution> {
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.lookup(input, &self.platform)
        {
            return Some(Resolution {
                command: hit.entry.command,
                explanation: hit.entry.explanation,
                confidence: hit.entry.confidence,
                tier: Tier::Cache,
                use_count: Some(hit.entry.use_count),
                safe: hit.entry.safe,
            });
        }

        let translation = self.external.as_ref()?.resolve(input, self.timeout)?;

        let mut use_count = None;
        if let Some(cache) = &self.cache {
            let entry = CacheEntry::new(
                translation.command.clone(),
                translation.explanation.clone(),
                translation.confidence,
                self.platform.clone(),
            )
            .with_safe(translation.safe);
            match cache.store(input, &self.platform, entry) {
                Ok(()) => use_count = Some(1),
                Err(e) => tracing::warn!("Could not cache external translation: {e}"),
            }
        }

        Some(Resolution {
            command: translation.command,
            explanation: translation.explanation,
            confidence: translation.confidence,
            tier: Tier::External,
            use_count,
            safe: translation.safe,
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("platform", &self.platform)
            .field("exact_matchers", &self.exact.len())
            .field("correction_matchers", &self.corrections.len())
            .field("context", &self.context.is_some())
            .field("cache", &self.cache.is_some())
            .field("external", &self.external)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ContextSuggestion;

    struct Always(&'static str, f64);
    impl LocalMatcher for Always {
        fn find(&self, _input: &str, _platform: &str) -> Option<LocalMatch> {
            Some(LocalMatch {
                command: self.0.to_string(),
                explanation: String::new(),
                confidence: self.1,
                source: "test".to_string(),
            })
        }
    }

    struct Never;
    impl LocalMatcher for Never {
        fn find(&self, _input: &str, _platform: &str) -> Option<LocalMatch> {
            None
        }
    }

    struct Suggests(Vec<f64>);
    impl ContextProvider for Suggests {
        fn suggest(&self, _input: &str) -> Vec<ContextSuggestion> {
            self.0
                .iter()
                .map(|&confidence| ContextSuggestion {
                    command: format!("ctx {confidence}"),
                    explanation: String::new(),
                    confidence,
                    context_type: "test".to_string(),
                })
                .collect()
        }
    }

    #[test]
    fn test_empty_input_is_unresolved() {
        let orchestrator = Orchestrator::builder()
            .platform("linux")
            .exact_matcher(Always("ls", 1.0))
            .build();
        assert!(orchestrator.resolve("   ").is_none());
    }

    #[test]
    fn test_exact_wins_over_correction() {
        let orchestrator = Orchestrator::builder()
            .platform("linux")
            .correction_matcher(Always("typo", 0.9))
            .exact_matcher(Always("exact", 1.0))
            .build();
        let found = orchestrator.resolve("anything").unwrap();
        assert_eq!(found.command, "exact");
        assert_eq!(found.tier, Tier::Exact);
    }

    #[test]
    fn test_correction_used_when_exact_misses() {
        let orchestrator = Orchestrator::builder()
            .platform("linux")
            .exact_matcher(Never)
            .correction_matcher(Always("typo", 0.9))
            .build();
        assert_eq!(orchestrator.resolve("x").unwrap().tier, Tier::Correction);
    }

    #[test]
    fn test_context_picks_highest_confidence() {
        let orchestrator = Orchestrator::builder()
            .platform("linux")
            .context_provider(Suggests(vec![0.86, 0.92, 0.5]))
            .build();
        let found = orchestrator.resolve("x").unwrap();
        assert_eq!(found.tier, Tier::Context);
        assert!((found.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn test_context_at_threshold_falls_through() {
        let orchestrator = Orchestrator::builder()
            .platform("linux")
            .context_provider(Suggests(vec![0.85]))
            .build();
        assert!(orchestrator.resolve("x").is_none());
    }

    #[test]
    fn test_tier_names() {
        assert_eq!(Tier::Correction.to_string(), "correction");
        assert_eq!(serde_json::to_string(&Tier::External).unwrap(), "\"external\"");
    }
}
