//! Error type for `genekb-upstream`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http client error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("malformed response: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
