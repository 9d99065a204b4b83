//! Natural-language to shell command resolution for nlcli
//!
//! The [`Orchestrator`] runs a fixed sequence of tiers and stops at the
//! first that answers:
//!
//! 1. Exact local pattern ([`ExactMatcher`])
//! 2. Typo-tolerant local pattern ([`TypoMatcher`])
//! 3. Context suggestion above [`CONTEXT_CONFIDENCE_THRESHOLD`]
//! 4. Persistent cache ([`nlcli_cache::PersistentCache`])
//! 5. External translator under a hard timeout ([`BoundedResolver`]),
//!    whose answers are written back to the cache

#![expect(
    clippy::missing_errors_doc,
    reason = "Error conditions are described on the error types"
)]

mod collaborators;
mod error;
mod external;
mod orchestrator;
mod patterns;
mod platform;

pub use collaborators::{ContextProvider, ContextSuggestion, LocalMatch, LocalMatcher, Translator};
pub use error::{Error, Result, TranslateError};
pub use external::{
    BoundedResolver, DEFAULT_CONFIDENCE, DEFAULT_QUEUE_DEPTH, DEFAULT_WORKERS, Translation,
};
pub use orchestrator::{
    CONTEXT_CONFIDENCE_THRESHOLD, DEFAULT_EXTERNAL_TIMEOUT, Orchestrator, OrchestratorBuilder,
    Resolution, Tier,
};
pub use patterns::{
    DEFAULT_TYPO_THRESHOLD, ExactMatcher, PatternRecord, PatternTable, TypoMatcher, canonical,
    similarity,
};
pub use platform::PlatformContext;
