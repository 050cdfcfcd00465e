//! Query history: one entry per interactive question answered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
  pub id:             i64,
  pub query:          String,
  pub response:       String,
  /// rsids surfaced by the answer, de-duplicated in first-seen order.
  pub snps_mentioned: Vec<String>,
  pub created_at:     DateTime<Utc>,
  pub hidden:         bool,
}

/// Input to [`crate::store::KnowledgeStore::record_query`].
#[derive(Debug, Clone)]
pub struct NewQueryHistory {
  pub query:          String,
  pub response:       String,
  pub snps_mentioned: Vec<String>,
}
