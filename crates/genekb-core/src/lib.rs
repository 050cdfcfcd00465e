//! Core types and trait definitions for the genekb annotation engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! defines the domain records (annotations, audit events, query history), the
//! collaborator traits the engine drives (genotype lookup, knowledge store,
//! reasoning and reference services), and the citation token format.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod annotation;
pub mod audit;
pub mod citation;
pub mod error;
pub mod genotype;
pub mod history;
pub mod reasoning;
pub mod reference;
pub mod store;

pub use error::{Error, Result};
