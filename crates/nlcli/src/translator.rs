//! External translator backed by an OpenAI-compatible chat completions API

use crate::cli::CliError;
use crate::config::AiSettings;
use nlcli_resolver::{PlatformContext, TranslateError, Translator};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use std::time::Duration;

const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 600;

/// Chat-completions translator
pub struct OpenAiTranslator {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiTranslator {
    /// Build from `[ai]` settings; fails without an API key
    pub fn new(settings: &AiSettings, timeout: Duration) -> Result<Self, CliError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CliError::config_with_help(
                    "No API key configured for the external translator",
                    "Set OPENAI_API_KEY or ai.api_key in the config file",
                )
            })?;
        install_crypto_provider();
        // The HTTP timeout only reclaims abandoned calls; callers are bounded
        // separately and give up sooner.
        let client = Client::builder()
            .timeout(timeout.saturating_mul(2))
            .build()
            .map_err(|e| CliError::other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model: settings.model.clone(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
        })
    }

    fn request_body(&self, input: &str, platform: &PlatformContext) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt(platform)},
                {"role": "user", "content": user_prompt(input)},
            ],
            "response_format": {"type": "json_object"},
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        })
    }
}

impl std::fmt::Debug for OpenAiTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiTranslator")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Translator for OpenAiTranslator {
    fn translate(&self, input: &str, platform: &PlatformContext) -> Result<Value, TranslateError> {
        let body = serde_json::to_vec(&self.request_body(input, platform))
            .map_err(|e| TranslateError::transport(format!("Failed to encode request: {e}")))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| TranslateError::transport(e.to_string()))?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(TranslateError::unavailable(format!(
                "API key rejected (HTTP {status})"
            )));
        }
        if !status.is_success() {
            return Err(TranslateError::transport(format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .map_err(|e| TranslateError::transport(format!("Failed to read response: {e}")))?;
        extract_content(&bytes)
    }
}

/// Install the process-wide TLS crypto provider; later calls are no-ops
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Pull the JSON object out of a chat-completions response body
pub fn extract_content(body: &[u8]) -> Result<Value, TranslateError> {
    let envelope: Value = serde_json::from_slice(body)
        .map_err(|e| TranslateError::malformed(format!("response is not JSON: {e}")))?;
    let content = envelope
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| TranslateError::malformed("response has no message content"))?;
    serde_json::from_str(content)
        .map_err(|e| TranslateError::malformed(format!("message content is not JSON: {e}")))
}

fn system_prompt(platform: &PlatformContext) -> String {
    format!(
        "You translate natural-language requests into shell commands.\n\
         Platform: {os}\n\
         Shell: {shell}\n\
         Use commands appropriate for {os} and the {shell} shell. Prefer the \
         most common, safe form of a command and relative paths unless \
         absolute paths are requested. Mark a command unsafe if it deletes \
         data, changes system configuration or needs elevated privileges.\n\
         Always answer with a JSON object containing: command (string), \
         explanation (string), confidence (number between 0 and 1), safe \
         (boolean), reasoning (string).",
        os = platform.os,
        shell = platform.shell,
    )
}

fn user_prompt(input: &str) -> String {
    format!("Translate this request into a shell command:\n\"{input}\"")
}
