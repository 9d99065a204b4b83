//! Bounded external resolver
//!
//! External calls run on a small fixed pool of worker threads fed by a
//! bounded queue. The caller waits on a per-call reply channel for at most
//! the timeout; a late reply lands in a channel nobody reads and is dropped.
//! Workers are never interrupted, so an abandoned call finishes in the
//! background.

use crate::collaborators::Translator;
use crate::error::{Error, Result, TranslateError};
use crate::platform::PlatformContext;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};

/// Default number of pool workers
pub const DEFAULT_WORKERS: usize = 2;
/// Default number of queued calls beyond the busy workers
pub const DEFAULT_QUEUE_DEPTH: usize = 16;
/// Confidence assumed when the service omits one
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A validated external translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    /// Resolved command
    pub command: String,
    /// What it does
    pub explanation: String,
    /// Service confidence, as reported
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Whether the service considers the command safe
    #[serde(default = "default_safe")]
    pub safe: bool,
    /// Service reasoning
    #[serde(default)]
    pub reasoning: String,
}

const fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

const fn default_safe() -> bool {
    true
}

impl Translation {
    /// Validate a raw service payload
    pub fn from_value(value: serde_json::Value) -> std::result::Result<Self, TranslateError> {
        if !value.is_object() {
            return Err(TranslateError::malformed("response is not a JSON object"));
        }
        let translation: Self = serde_json::from_value(value)
            .map_err(|e| TranslateError::malformed(e.to_string()))?;
        if translation.command.trim().is_empty() {
            return Err(TranslateError::malformed("command is empty"));
        }
        Ok(translation)
    }
}

/// Runs the translator under a hard wall-clock bound
pub struct BoundedResolver {
    translator: Arc<dyn Translator>,
    platform: PlatformContext,
    jobs: SyncSender<Job>,
    workers: usize,
}

impl BoundedResolver {
    /// Pool of [`DEFAULT_WORKERS`] workers
    pub fn new(translator: Arc<dyn Translator>, platform: PlatformContext) -> Result<Self> {
        Self::with_pool(translator, platform, DEFAULT_WORKERS, DEFAULT_QUEUE_DEPTH)
    }

    /// Pool of `workers` threads with `queue_depth` pending calls
    pub fn with_pool(
        translator: Arc<dyn Translator>,
        platform: PlatformContext,
        workers: usize,
        queue_depth: usize,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(Error::configuration("worker pool must have at least one worker"));
        }
        let (jobs, rx) = mpsc::sync_channel::<Job>(queue_depth);
        let rx = Arc::new(Mutex::new(rx));
        for i in 0..workers {
            let rx = Arc::clone(&rx);
            thread::Builder::new()
                .name(format!("nlcli-resolver-{i}"))
                .spawn(move || worker_loop(&rx))
                .map_err(|source| Error::Spawn { source })?;
        }
        tracing::debug!(workers, queue_depth, "External resolver pool started");
        Ok(Self {
            translator,
            platform,
            jobs,
            workers,
        })
    }

    /// Number of pool workers
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Platform handed to the translator
    #[must_use]
    pub const fn platform(&self) -> &PlatformContext {
        &self.platform
    }

    /// Translate `input`, waiting at most `timeout`.
    ///
    /// Timeouts, transport errors, malformed payloads, a full queue and a
    /// panicking translator all yield `None`.
    #[must_use]
    pub fn resolve(&self, input: &str, timeout: Duration) -> Option<Translation> {
        let started = Instant::now();
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let translator = Arc::clone(&self.translator);
        let platform = self.platform.clone();
        let request = input.to_string();
        let job: Job = Box::new(move || {
            let outcome = translator.translate(&request, &platform);
            // The caller may have given up already
            let _ = reply_tx.send(outcome);
        });

        match self.jobs.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("External resolver queue is full; skipping translation");
                return None;
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("External resolver pool is gone");
                return None;
            }
        }

        let elapsed_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match reply_rx.recv_timeout(timeout) {
            Ok(Ok(value)) => match Translation::from_value(value) {
                Ok(translation) => {
                    tracing::debug!(elapsed_ms = elapsed_ms(), "External translation received");
                    Some(translation)
                }
                Err(e) => {
                    tracing::warn!("Discarding external translation: {e}");
                    None
                }
            },
            Ok(Err(e)) => {
                tracing::warn!(elapsed_ms = elapsed_ms(), "External translation failed: {e}");
                None
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    elapsed_ms = elapsed_ms(),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "External translation timed out"
                );
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("External translation aborted");
                None
            }
        }
    }
}

impl std::fmt::Debug for BoundedResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedResolver")
            .field("platform", &self.platform)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

fn worker_loop(rx: &Mutex<Receiver<Job>>) {
    loop {
        // Hold the lock only while dequeuing
        let job = rx.lock().recv();
        let Ok(job) = job else {
            break;
        };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::warn!("External translator panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_translation_requires_command_and_explanation() {
        assert!(Translation::from_value(json!({"command": "ls"})).is_err());
        assert!(Translation::from_value(json!({"explanation": "x"})).is_err());
        assert!(Translation::from_value(json!({"command": " ", "explanation": "x"})).is_err());
        assert!(Translation::from_value(json!("ls")).is_err());
    }

    #[test]
    fn test_translation_defaults() {
        let t = Translation::from_value(json!({"command": "ls", "explanation": "list"})).unwrap();
        assert!((t.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
        assert!(t.safe);
        assert!(t.reasoning.is_empty());
    }

    #[test]
    fn test_translation_ignores_extra_fields() {
        let t = Translation::from_value(json!({
            "command": "ls",
            "explanation": "list",
            "confidence": 0.4,
            "alternatives": "dir"
        }))
        .unwrap();
        assert!((t.confidence - 0.4).abs() < f64::EPSILON);
    }

    struct Fixed;
    impl Translator for Fixed {
        fn translate(
            &self,
            _input: &str,
            _platform: &PlatformContext,
        ) -> std::result::Result<serde_json::Value, TranslateError> {
            Ok(json!({"command": "ls", "explanation": "list"}))
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = BoundedResolver::with_pool(
            Arc::new(Fixed),
            PlatformContext::for_os("linux"),
            0,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_resolve_returns_translation() {
        let resolver =
            BoundedResolver::new(Arc::new(Fixed), PlatformContext::for_os("linux")).unwrap();
        let t = resolver.resolve("list", Duration::from_secs(5)).unwrap();
        assert_eq!(t.command, "ls");
    }
}
