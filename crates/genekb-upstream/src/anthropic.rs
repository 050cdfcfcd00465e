//! [`ReasoningService`] over the Anthropic Messages API.

use std::time::Duration;

use genekb_core::reasoning::{
  CompletionRequest, ModelTier, ReasoningError, ReasoningService, UpstreamError,
};
use reqwest::{StatusCode, header::HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, error::Error};

const API_VERSION: &str = "2023-06-01";
/// Longest error body carried into an error message.
const ERROR_BODY_LIMIT: usize = 300;

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
  /// Without a key every call fails with a configuration error.
  pub api_key:        Option<String>,
  pub base_url:       String,
  pub standard_model: String,
  pub fast_model:     String,
  /// Transport-level timeout. The engine applies its own, usually shorter.
  pub timeout_secs:   u64,
}

impl Default for ReasoningConfig {
  fn default() -> Self {
    Self {
      api_key:        None,
      base_url:       "https://api.anthropic.com".into(),
      standard_model: "claude-sonnet-4-20250514".into(),
      fast_model:     "claude-haiku-4-5".into(),
      timeout_secs:   120,
    }
  }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
  model:      &'a str,
  max_tokens: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  system:     Option<&'a str>,
  messages:   [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
  role:    &'static str,
  content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
  content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
  Text {
    text: String,
  },
  #[serde(other)]
  Other,
}

impl MessagesResponse {
  fn into_text(self) -> String {
    self
      .content
      .into_iter()
      .filter_map(|block| match block {
        ContentBlock::Text { text } => Some(text),
        ContentBlock::Other => None,
      })
      .collect::<Vec<_>>()
      .join("")
  }
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct AnthropicClient {
  http:   reqwest::Client,
  config: ReasoningConfig,
}

impl AnthropicClient {
  pub fn new(config: ReasoningConfig) -> Result<Self> {
    if config.base_url.trim().is_empty() {
      return Err(Error::InvalidConfig("reasoning base_url is empty".into()));
    }
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self { http, config })
  }

  pub fn is_configured(&self) -> bool {
    self.config.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
  }

  fn model(&self, tier: ModelTier) -> &str {
    match tier {
      ModelTier::Standard => &self.config.standard_model,
      ModelTier::Fast => &self.config.fast_model,
    }
  }

  fn endpoint(&self) -> String {
    format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
  }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
  headers
    .get(reqwest::header::RETRY_AFTER)?
    .to_str()
    .ok()?
    .trim()
    .parse::<u64>()
    .ok()
    .map(Duration::from_secs)
}

/// Classify a non-success response.
fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ReasoningError {
  match status {
    StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited { retry_after }.into(),
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
      ReasoningError::Configuration(format!("API key rejected (HTTP {})", status.as_u16()))
    }
    _ => {
      let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
      UpstreamError::Http { status: status.as_u16(), message }.into()
    }
  }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> ReasoningError {
  if e.is_timeout() {
    UpstreamError::Timeout(timeout).into()
  } else {
    UpstreamError::Transport(e.to_string()).into()
  }
}

impl ReasoningService for AnthropicClient {
  async fn complete(&self, request: &CompletionRequest) -> Result<String, ReasoningError> {
    let api_key = self
      .config
      .api_key
      .as_deref()
      .map(str::trim)
      .filter(|k| !k.is_empty())
      .ok_or_else(|| ReasoningError::Configuration("no API key configured".into()))?;
    let timeout = Duration::from_secs(self.config.timeout_secs);

    let body = MessagesRequest {
      model:      self.model(request.tier),
      max_tokens: request.max_tokens,
      system:     request.system.as_deref(),
      messages:   [Message { role: "user", content: &request.prompt }],
    };

    debug!(model = body.model, max_tokens = body.max_tokens, "reasoning request");
    let response = self
      .http
      .post(self.endpoint())
      .header("x-api-key", api_key)
      .header("anthropic-version", API_VERSION)
      .json(&body)
      .send()
      .await
      .map_err(|e| transport_error(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
      let retry = retry_after(response.headers());
      let text = response.text().await.unwrap_or_default();
      return Err(status_error(status, retry, &text));
    }

    let parsed: MessagesResponse = response.json().await.map_err(|e| transport_error(e, timeout))?;
    Ok(parsed.into_text())
  }
}
