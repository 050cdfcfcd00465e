//! Error type for `genekb-engine`.

use genekb_core::reasoning::{ReasoningError, UpstreamError};
use thiserror::Error;

use crate::decode::ParseError;

#[derive(Debug, Error)]
pub enum Error {
  /// The reasoning service failed after the pipeline's single retry.
  #[error(transparent)]
  Upstream(#[from] UpstreamError),

  #[error("could not decode reasoning output: {0}")]
  Parse(#[from] ParseError),

  #[error("not found: {0}")]
  NotFound(String),

  /// A collaborator cannot be used at all. Fatal to the discovery worker.
  #[error("configuration error: {0}")]
  Configuration(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  pub fn is_configuration(&self) -> bool { matches!(self, Self::Configuration(_)) }
}

impl From<ReasoningError> for Error {
  fn from(e: ReasoningError) -> Self {
    match e {
      ReasoningError::Upstream(u) => Self::Upstream(u),
      ReasoningError::Configuration(m) => Self::Configuration(m),
    }
  }
}

impl From<genekb_core::Error> for Error {
  fn from(e: genekb_core::Error) -> Self { Self::InvalidInput(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
