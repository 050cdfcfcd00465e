//! The genekb annotation and discovery engine.
//!
//! [`Engine`] ties together the pieces that turn a static genotype dataset
//! into a growing knowledge base:
//!
//! - the [`pipeline`], which produces or caches one annotation per rsid;
//! - the [`query`] engine, which answers one question per call and hands
//!   unannotated SNPs to the bounded [`pool`];
//! - the [`discovery`] worker, a background loop expanding from gene to
//!   related gene.
//!
//! Storage, reasoning and reference text are collaborators behind the traits
//! in `genekb-core`.

#![allow(async_fn_in_trait)]

pub mod activity;
pub mod baseline;
pub mod config;
pub mod decode;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod prompt;
pub mod query;

use genekb_core::{genotype::GenotypeStore, store::KnowledgeStore};

pub use config::EngineConfig;
pub use engine::{CitationTarget, Engine, EngineStatus, SnpDetail};
pub use error::{Error, Result};

/// A store handle the engine can share between its tasks.
pub trait EngineStore: GenotypeStore + KnowledgeStore + Clone + 'static {}

impl<T> EngineStore for T where T: GenotypeStore + KnowledgeStore + Clone + 'static {}

#[cfg(test)]
mod tests;
