//! Minimal client for the Anthropic Messages API, behind a trait so
//! the section generators can run against test doubles.
//!
//! Failures here are expected operating conditions (no key, offline,
//! rate limited) and surface as `AiError` for the caller to fold into
//! section fallbacks; nothing in this module aborts a journal run.

use std::env;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AiConfig;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug)]
pub enum AiError {
    /// Completions are switched off or no API key is available.
    Disabled,
    /// Transport-level failure, timeouts included.
    Http(String),
    /// Non-success response from the API.
    Status { code: u16, body: String },
    /// Success response carrying no usable text.
    EmptyReply,
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiError::Disabled => write!(f, "ai completions disabled"),
            AiError::Http(err) => write!(f, "request failed: {err}"),
            AiError::Status { code, body } => write!(f, "api returned {code}: {body}"),
            AiError::EmptyReply => write!(f, "api returned an empty reply"),
        }
    }
}

impl std::error::Error for AiError {}

/// One blocking completion round-trip: an instruction plus a JSON
/// context document, answered with plain text.
pub trait CompletionClient {
    fn complete(&self, instruction: &str, context: &serde_json::Value) -> Result<String, AiError>;
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct HttpCompletionClient {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
    enabled: bool,
}

impl HttpCompletionClient {
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| AiError::Http(err.to_string()))?;
        Ok(HttpCompletionClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key: resolve_api_key(config),
            enabled: config.enabled,
        })
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, instruction: &str, context: &serde_json::Value) -> Result<String, AiError> {
        if !self.enabled {
            return Err(AiError::Disabled);
        }
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AiError::Disabled);
        };

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: format!("{instruction}\n\n{context}"),
            }],
        };
        tracing::debug!(model = %self.model, "requesting completion");
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .map_err(|err| AiError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AiError::Status {
                code: status.as_u16(),
                body: truncated(&body, 300),
            });
        }
        let parsed: MessagesResponse = response
            .json()
            .map_err(|err| AiError::Http(err.to_string()))?;
        reply_text(&parsed)
    }
}

/// Stand-in used when AI is configured off or the real client cannot
/// be built. Every request reports `Disabled` so sections fall back.
pub struct DisabledClient;

impl CompletionClient for DisabledClient {
    fn complete(&self, _instruction: &str, _context: &serde_json::Value) -> Result<String, AiError> {
        Err(AiError::Disabled)
    }
}

fn resolve_api_key(config: &AiConfig) -> Option<String> {
    config
        .api_key
        .clone()
        .or_else(|| env::var("ANTHROPIC_API_KEY").ok())
        .filter(|key| !key.trim().is_empty())
}

fn reply_text(response: &MessagesResponse) -> Result<String, AiError> {
    let text = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned();
    if text.is_empty() {
        return Err(AiError::EmptyReply);
    }
    Ok(text)
}

fn truncated(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
