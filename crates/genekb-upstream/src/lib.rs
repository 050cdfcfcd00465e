//! HTTP implementations of the genekb collaborator traits.
//!
//! - [`AnthropicClient`] implements
//!   [`ReasoningService`](genekb_core::reasoning::ReasoningService) over the
//!   Anthropic Messages API, with a standard and a fast model tier.
//! - [`SnpediaClient`] implements
//!   [`ReferenceService`](genekb_core::reference::ReferenceService) over the
//!   SNPedia wiki, rate limited and failure-swallowing.

#![allow(async_fn_in_trait)]

pub mod anthropic;
pub mod error;
mod rate_limit;
pub mod snpedia;

pub use anthropic::{AnthropicClient, ReasoningConfig};
pub use error::{Error, Result};
pub use snpedia::{ReferenceConfig, References, SnpediaClient};
