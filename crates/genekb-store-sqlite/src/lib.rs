//! SQLite backend for genekb.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One [`SqliteStore`] implements both
//! the read-only [`GenotypeStore`](genekb_core::genotype::GenotypeStore) and
//! the engine's [`KnowledgeStore`](genekb_core::store::KnowledgeStore).

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
