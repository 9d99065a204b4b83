//! Timeout and failure normalization of the bounded external resolver

use nlcli_resolver::{BoundedResolver, PlatformContext, TranslateError, Translator};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

struct Hanging;
impl Translator for Hanging {
    fn translate(&self, _input: &str, _platform: &PlatformContext) -> Result<Value, TranslateError> {
        thread::sleep(Duration::from_secs(30));
        Ok(json!({"command": "late", "explanation": "too late"}))
    }
}

struct Replies(Result<Value, &'static str>);
impl Translator for Replies {
    fn translate(&self, _input: &str, _platform: &PlatformContext) -> Result<Value, TranslateError> {
        self.0.clone().map_err(TranslateError::transport)
    }
}

struct Panics;
impl Translator for Panics {
    fn translate(&self, _input: &str, _platform: &PlatformContext) -> Result<Value, TranslateError> {
        panic!("translator bug");
    }
}

struct SeesPlatform(Arc<AtomicUsize>);
impl Translator for SeesPlatform {
    fn translate(&self, input: &str, platform: &PlatformContext) -> Result<Value, TranslateError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "command": format!("{} on {}", input, platform.os),
            "explanation": platform.shell,
        }))
    }
}

fn linux() -> PlatformContext {
    PlatformContext::new("linux", "bash")
}

#[test]
fn test_timeout_is_bounded() {
    let resolver = BoundedResolver::new(Arc::new(Hanging), linux()).unwrap();

    let started = Instant::now();
    let result = resolver.resolve("list files", Duration::from_millis(50));
    let elapsed = started.elapsed();

    assert!(result.is_none());
    assert!(elapsed < Duration::from_millis(200), "took {elapsed:?}");
}

#[test]
fn test_busy_pool_still_times_out() {
    let resolver = BoundedResolver::with_pool(Arc::new(Hanging), linux(), 1, 4).unwrap();
    assert!(resolver.resolve("first", Duration::from_millis(20)).is_none());

    // The only worker is still stuck on the first call
    let started = Instant::now();
    assert!(resolver.resolve("second", Duration::from_millis(50)).is_none());
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[test]
fn test_full_queue_returns_none_immediately() {
    let resolver = BoundedResolver::with_pool(Arc::new(Hanging), linux(), 1, 1).unwrap();
    // Occupy the single worker, then the single queue slot
    assert!(resolver.resolve("first", Duration::from_millis(50)).is_none());
    thread::sleep(Duration::from_millis(50));
    assert!(resolver.resolve("second", Duration::from_millis(50)).is_none());

    let started = Instant::now();
    assert!(resolver.resolve("third", Duration::from_secs(5)).is_none());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_malformed_payloads_are_none() {
    for payload in [
        json!({"explanation": "no command"}),
        json!({"command": "ls"}),
        json!({"command": "", "explanation": "empty"}),
        json!({"command": 42, "explanation": "wrong type"}),
        json!(["ls"]),
        Value::Null,
    ] {
        let resolver = BoundedResolver::new(Arc::new(Replies(Ok(payload.clone()))), linux()).unwrap();
        assert!(
            resolver.resolve("x", Duration::from_secs(5)).is_none(),
            "accepted {payload}"
        );
    }
}

#[test]
fn test_transport_error_is_none() {
    let resolver = BoundedResolver::new(Arc::new(Replies(Err("connection reset"))), linux()).unwrap();
    assert!(resolver.resolve("x", Duration::from_secs(5)).is_none());
}

#[test]
fn test_panicking_translator_is_none_and_pool_survives() {
    let resolver = BoundedResolver::with_pool(Arc::new(Panics), linux(), 1, 4).unwrap();
    assert!(resolver.resolve("x", Duration::from_secs(5)).is_none());
    assert!(resolver.resolve("y", Duration::from_secs(5)).is_none());
}

#[test]
fn test_translator_receives_platform() {
    let calls = Arc::new(AtomicUsize::new(0));
    let resolver = BoundedResolver::new(
        Arc::new(SeesPlatform(Arc::clone(&calls))),
        PlatformContext::new("darwin", "zsh"),
    )
    .unwrap();
    let translation = resolver.resolve("ls", Duration::from_secs(5)).unwrap();
    assert_eq!(translation.command, "ls on darwin");
    assert_eq!(translation.explanation, "zsh");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_callers_share_pool() {
    let calls = Arc::new(AtomicUsize::new(0));
    let resolver = Arc::new(
        BoundedResolver::new(Arc::new(SeesPlatform(Arc::clone(&calls))), linux()).unwrap(),
    );
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let resolver = Arc::clone(&resolver);
            thread::spawn(move || resolver.resolve(&format!("cmd{i}"), Duration::from_secs(5)))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().is_some());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}
