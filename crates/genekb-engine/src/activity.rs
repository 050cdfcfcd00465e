//! In-memory activity log and counters behind `status()`.
//!
//! The log is a bounded ring buffer; once full, the oldest entry is dropped.
//! Every entry is also emitted through `tracing`, so the buffer is only a
//! convenience view for the control surface.

use std::{
  collections::VecDeque,
  sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
  },
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entries retained by [`Activity`].
pub const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Info,
  Warn,
  Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
  pub timestamp: DateTime<Utc>,
  pub level:     LogLevel,
  pub message:   String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
  pub queries_processed: u64,
  pub snps_enriched:     u64,
  pub knowledge_added:   u64,
}

#[derive(Debug, Default)]
pub struct Activity {
  log:               Mutex<VecDeque<LogEntry>>,
  current_task:      Mutex<Option<String>>,
  queries_processed: AtomicU64,
  snps_enriched:     AtomicU64,
  knowledge_added:   AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

impl Activity {
  pub fn new() -> Self { Self::default() }

  // ── Log ───────────────────────────────────────────────────────────────────

  pub fn info(&self, message: impl Into<String>) {
    let message = message.into();
    tracing::info!("{message}");
    self.push(LogLevel::Info, message);
  }

  pub fn warn(&self, message: impl Into<String>) {
    let message = message.into();
    tracing::warn!("{message}");
    self.push(LogLevel::Warn, message);
  }

  pub fn error(&self, message: impl Into<String>) {
    let message = message.into();
    tracing::error!("{message}");
    self.push(LogLevel::Error, message);
  }

  fn push(&self, level: LogLevel, message: String) {
    let mut log = lock(&self.log);
    if log.len() == LOG_CAPACITY {
      log.pop_front();
    }
    log.push_back(LogEntry { timestamp: Utc::now(), level, message });
  }

  /// The newest `limit` entries, oldest first.
  pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
    let log = lock(&self.log);
    let skip = log.len().saturating_sub(limit);
    log.iter().skip(skip).cloned().collect()
  }

  pub fn clear(&self) { lock(&self.log).clear(); }

  // ── Current task ──────────────────────────────────────────────────────────

  /// Mark `label` as the task in progress until the guard is dropped.
  pub fn begin_task(&self, label: impl Into<String>) -> TaskGuard<'_> {
    let label = label.into();
    *lock(&self.current_task) = Some(label.clone());
    TaskGuard { activity: self, label }
  }

  pub fn current_task(&self) -> Option<String> { lock(&self.current_task).clone() }

  // ── Counters ──────────────────────────────────────────────────────────────

  pub fn query_processed(&self) { self.queries_processed.fetch_add(1, Ordering::Relaxed); }

  pub fn snp_enriched(&self) { self.snps_enriched.fetch_add(1, Ordering::Relaxed); }

  pub fn knowledge_added(&self) { self.knowledge_added.fetch_add(1, Ordering::Relaxed); }

  pub fn stats(&self) -> ActivityStats {
    ActivityStats {
      queries_processed: self.queries_processed.load(Ordering::Relaxed),
      snps_enriched:     self.snps_enriched.load(Ordering::Relaxed),
      knowledge_added:   self.knowledge_added.load(Ordering::Relaxed),
    }
  }
}

/// Clears the current task on drop, unless another task has replaced it.
pub struct TaskGuard<'a> {
  activity: &'a Activity,
  label:    String,
}

impl Drop for TaskGuard<'_> {
  fn drop(&mut self) {
    let mut current = lock(&self.activity.current_task);
    if current.as_deref() == Some(self.label.as_str()) {
      *current = None;
    }
  }
}
