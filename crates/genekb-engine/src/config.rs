//! Engine tuning knobs.
//!
//! Every field has a default so a config file may omit the whole section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Concurrent consumers of the annotation pool.
  pub pool_workers:          usize,
  /// Jobs the pool will hold before rejecting new ones.
  pub pool_capacity:         usize,
  /// Hard limit on a single reasoning call.
  pub reasoning_timeout_ms:  u64,
  /// Pause before the one retry of a transient failure.
  pub retry_delay_ms:        u64,
  /// Related genes requested per discovery iteration.
  pub max_candidates:        usize,
  /// SNPs looked at per gene during discovery.
  pub max_snps_per_gene:     usize,
  /// Pending discovery seeds held in memory.
  pub max_queue:             usize,
  pub base_interval_ms:      u64,
  pub max_interval_ms:       u64,
  /// Annotations at or above this magnitude count as notable.
  pub notable_min_magnitude: f64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      pool_workers:          2,
      pool_capacity:         64,
      reasoning_timeout_ms:  60_000,
      retry_delay_ms:        1_000,
      max_candidates:        10,
      max_snps_per_gene:     5,
      max_queue:             1_000,
      base_interval_ms:      2_000,
      max_interval_ms:       300_000,
      notable_min_magnitude: 2.0,
    }
  }
}

impl EngineConfig {
  pub fn reasoning_timeout(&self) -> Duration { Duration::from_millis(self.reasoning_timeout_ms) }

  pub fn retry_delay(&self) -> Duration { Duration::from_millis(self.retry_delay_ms) }

  pub fn base_interval(&self) -> Duration { Duration::from_millis(self.base_interval_ms) }

  /// Never below the base interval.
  pub fn max_interval(&self) -> Duration {
    Duration::from_millis(self.max_interval_ms.max(self.base_interval_ms))
  }
}
