//! Error types for `genekb-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown {kind} value: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("invalid rsid: {0:?}")]
  InvalidRsid(String),

  #[error("invalid gene symbol: {0:?}")]
  InvalidGeneSymbol(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
