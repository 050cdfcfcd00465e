//! The [`ReasoningService`] trait and its error taxonomy.
//!
//! A reasoning service takes a prompt and returns free text. It is slow,
//! costs money per call, and fails in a handful of well-understood ways.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model size to use for a call. The fast tier is used for cheap, high-volume
/// calls such as listing related genes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
  #[default]
  Standard,
  Fast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
  pub system:     Option<String>,
  pub prompt:     String,
  pub tier:       ModelTier,
  pub max_tokens: u32,
}

impl CompletionRequest {
  pub fn new(prompt: impl Into<String>, tier: ModelTier, max_tokens: u32) -> Self {
    Self { system: None, prompt: prompt.into(), tier, max_tokens }
  }

  pub fn with_system(mut self, system: impl Into<String>) -> Self {
    self.system = Some(system.into());
    self
  }
}

/// A failure of the upstream service itself. All variants are candidates for
/// a retry except non-429 client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
  #[error("reasoning service timed out after {0:?}")]
  Timeout(Duration),

  #[error("reasoning service rate limited the request")]
  RateLimited { retry_after: Option<Duration> },

  #[error("reasoning service returned HTTP {status}: {message}")]
  Http { status: u16, message: String },

  #[error("transport error: {0}")]
  Transport(String),
}

impl UpstreamError {
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Timeout(_) | Self::RateLimited { .. } | Self::Transport(_) => true,
      Self::Http { status, .. } => *status >= 500,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReasoningError {
  #[error(transparent)]
  Upstream(#[from] UpstreamError),

  /// The service cannot be used at all (e.g. no credential). Retrying will
  /// not help.
  #[error("reasoning service is not configured: {0}")]
  Configuration(String),
}

/// An external text-completion capability.
pub trait ReasoningService: Send + Sync {
  fn complete<'a>(
    &'a self,
    request: &'a CompletionRequest,
  ) -> impl Future<Output = Result<String, ReasoningError>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn client_errors_are_not_transient() {
    assert!(UpstreamError::Timeout(Duration::from_secs(1)).is_transient());
    assert!(UpstreamError::Http { status: 529, message: "overloaded".into() }.is_transient());
    assert!(!UpstreamError::Http { status: 400, message: "bad".into() }.is_transient());
  }
}
