//! The discovery worker: a perpetual loop that grows the knowledge base by
//! walking from gene to related gene.
//!
//! Each iteration picks a seed, asks the reasoning service for related genes,
//! annotates whatever SNPs on file those genes cover, and enqueues the new
//! genes as future seeds. The queue and the seen set live in memory only and
//! are rebuilt from notable annotations after a restart.

use std::{
  collections::{HashSet, VecDeque},
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::{DateTime, Utc};
use genekb_core::{
  audit::{DataType, EventSource, NewAuditEvent},
  genotype::{GenotypeStore, normalize_gene_symbol},
  reasoning::ReasoningService,
  reference::{ReferenceService, ReferenceSubject},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  EngineStore, Error, Result,
  decode::decode_gene_list,
  pipeline::{AnnotateOutcome, Pipeline},
  prompt,
};

/// Notable annotations scanned when the queue runs dry.
const NOTABLE_SCAN: usize = 50;
/// Finished queue items kept for `status()`.
const RECENT_ITEMS: usize = 20;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

// ─── Queue ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
  Pending,
  Processed,
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
  /// Normalised gene symbol, or an rsid for variant seeds.
  pub symbol:      String,
  /// What put the item here: the seed it was related to, `notable`, or
  /// `random`.
  pub origin:      String,
  pub enqueued_at: DateTime<Utc>,
  pub status:      ItemStatus,
}

impl QueueItem {
  fn new(symbol: impl Into<String>, origin: impl Into<String>) -> Self {
    Self {
      symbol:      symbol.into(),
      origin:      origin.into(),
      enqueued_at: Utc::now(),
      status:      ItemStatus::Pending,
    }
  }
}

/// Pending seeds plus the set of symbols already looked at.
///
/// No two pending items share a symbol, and a symbol that has already been
/// used as a seed is never queued again.
#[derive(Debug)]
pub struct DiscoveryQueue {
  pending:  VecDeque<QueueItem>,
  explored: HashSet<String>,
  seen:     HashSet<String>,
  recent:   VecDeque<QueueItem>,
  capacity: usize,
}

impl DiscoveryQueue {
  pub fn new(capacity: usize) -> Self {
    Self {
      pending: VecDeque::new(),
      explored: HashSet::new(),
      seen: HashSet::new(),
      recent: VecDeque::new(),
      capacity,
    }
  }

  /// Returns `false` when the symbol is already pending or explored, or the
  /// queue is full.
  pub fn enqueue(&mut self, symbol: &str, origin: &str) -> bool {
    if self.pending.len() >= self.capacity
      || self.explored.contains(symbol)
      || self.pending.iter().any(|i| i.symbol == symbol)
    {
      return false;
    }
    self.pending.push_back(QueueItem::new(symbol, origin));
    true
  }

  /// Take the oldest pending item and mark its symbol explored.
  pub fn pop(&mut self) -> Option<QueueItem> {
    let item = self.pending.pop_front()?;
    self.explored.insert(item.symbol.clone());
    self.seen.insert(item.symbol.clone());
    Some(item)
  }

  /// Record that `symbol` is being used as a seed without passing through
  /// the queue. Returns `false` if it was already explored.
  pub fn claim(&mut self, symbol: &str) -> bool {
    self.seen.insert(symbol.to_owned());
    self.explored.insert(symbol.to_owned())
  }

  pub fn is_explored(&self, symbol: &str) -> bool { self.explored.contains(symbol) }

  /// Returns `true` the first time a symbol is seen.
  pub fn mark_seen(&mut self, symbol: &str) -> bool { self.seen.insert(symbol.to_owned()) }

  pub fn finish(&mut self, mut item: QueueItem, status: ItemStatus) {
    item.status = status;
    if self.recent.len() == RECENT_ITEMS {
      self.recent.pop_front();
    }
    self.recent.push_back(item);
  }

  pub fn clear(&mut self) {
    self.pending.clear();
    self.explored.clear();
    self.seen.clear();
    self.recent.clear();
  }

  pub fn snapshot(&self) -> QueueSnapshot {
    QueueSnapshot {
      pending:  self.pending.iter().map(|i| i.symbol.clone()).collect(),
      explored: self.explored.len(),
      seen:     self.seen.len(),
      recent:   self.recent.iter().cloned().collect(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
  pub pending:  Vec<String>,
  pub explored: usize,
  pub seen:     usize,
  pub recent:   Vec<QueueItem>,
}

// ─── Iteration ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum SeedKind {
  Gene,
  Variant,
}

struct Seed {
  kind: SeedKind,
  item: QueueItem,
}

/// What one iteration did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
  pub seed:      Option<String>,
  pub related:   Vec<String>,
  /// rsids that received a new annotation.
  pub annotated: Vec<String>,
  /// Symbols queued as future seeds.
  pub enqueued:  Vec<String>,
  pub failed:    bool,
}

impl IterationReport {
  pub fn is_productive(&self) -> bool { !self.annotated.is_empty() || !self.enqueued.is_empty() }
}

/// Double `current`, capped at `max`.
pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
  current.saturating_mul(2).min(max)
}

struct Inner<S, R, F> {
  pipeline:   Pipeline<S, R, F>,
  queue:      Mutex<DiscoveryQueue>,
  running:    AtomicBool,
  last_error: Mutex<Option<String>>,
}

impl<S, R, F> Inner<S, R, F>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  async fn next_seed(&self) -> Result<Option<Seed>> {
    if let Some(item) = lock(&self.queue).pop() {
      return Ok(Some(Seed { kind: SeedKind::Gene, item }));
    }

    let store = self.pipeline.store();
    let min_magnitude = self.pipeline.config().notable_min_magnitude;

    let notable = store
      .notable_annotations(min_magnitude, NOTABLE_SCAN)
      .await
      .map_err(Error::store)?;
    {
      let mut queue = lock(&self.queue);
      for annotation in &notable {
        let Some(gene) = annotation.gene.as_deref().and_then(|g| normalize_gene_symbol(g).ok())
        else {
          continue;
        };
        if queue.claim(&gene) {
          return Ok(Some(Seed { kind: SeedKind::Gene, item: QueueItem::new(gene, "notable") }));
        }
      }
    }

    let sample = store.unannotated_sample(1).await.map_err(Error::store)?;
    let Some(record) = sample.into_iter().next() else {
      return Ok(None);
    };

    let mut queue = lock(&self.queue);
    if let Some(gene) = record.gene.as_deref().and_then(|g| normalize_gene_symbol(g).ok()) {
      if queue.claim(&gene) {
        return Ok(Some(Seed { kind: SeedKind::Gene, item: QueueItem::new(gene, "random") }));
      }
    }
    queue.claim(&record.rsid);
    Ok(Some(Seed { kind: SeedKind::Variant, item: QueueItem::new(record.rsid, "random") }))
  }

  /// rsids on file for a gene, capped per gene.
  async fn gene_snps(&self, symbol: &str) -> Result<Vec<String>> {
    let mut rsids = self
      .pipeline
      .store()
      .snps_for_gene(symbol)
      .await
      .map_err(Error::store)?;
    rsids.truncate(self.pipeline.config().max_snps_per_gene);
    Ok(rsids)
  }

  /// Annotate the rsids that have no annotation yet. Failures other than
  /// configuration errors are logged and skipped.
  async fn annotate_missing(&self, rsids: &[String], annotated: &mut Vec<String>) -> Result<()> {
    let store = self.pipeline.store();
    for rsid in rsids {
      if store.get_annotation(rsid).await.map_err(Error::store)?.is_some() {
        continue;
      }
      match self.pipeline.annotate(rsid, None, false).await {
        Ok(AnnotateOutcome::Improved { .. }) => annotated.push(rsid.clone()),
        Ok(_) => {}
        Err(e) if e.is_configuration() => return Err(e),
        Err(e) => warn!(%rsid, error = %e, "discovery annotation failed, skipping"),
      }
    }
    Ok(())
  }

  /// Annotate the seed's own SNPs, then each candidate gene's. `matched`
  /// collects every rsid looked at.
  async fn explore(
    &self,
    seed: &Seed,
    candidates: &[String],
    matched: &mut Vec<String>,
    annotated: &mut Vec<String>,
  ) -> Result<()> {
    let label = seed.item.symbol.as_str();
    let seed_snps = match seed.kind {
      SeedKind::Gene => self.gene_snps(label).await?,
      SeedKind::Variant => {
        let on_file = GenotypeStore::get(self.pipeline.store(), label)
          .await
          .map_err(Error::store)?
          .is_some_and(|g| g.is_called());
        if on_file { vec![label.to_owned()] } else { Vec::new() }
      }
    };
    matched.extend(seed_snps.iter().cloned());
    self.annotate_missing(&seed_snps, annotated).await?;

    for symbol in candidates {
      let rsids = self.gene_snps(symbol).await?;
      matched.extend(rsids.iter().cloned());
      self.annotate_missing(&rsids, annotated).await?;
    }
    Ok(())
  }

  async fn run_iteration(&self) -> Result<IterationReport> {
    let Some(seed) = self.next_seed().await? else {
      debug!("discovery idle: nothing left to explore");
      return Ok(IterationReport::default());
    };
    let label = seed.item.symbol.clone();
    let activity = self.pipeline.activity();
    let config = self.pipeline.config();
    let _task = activity.begin_task(format!("exploring {label}"));

    let mut report = IterationReport { seed: Some(label.clone()), ..Default::default() };

    let subject = match seed.kind {
      SeedKind::Gene => ReferenceSubject::Gene(&label),
      SeedKind::Variant => ReferenceSubject::Variant(&label),
    };
    let reference = self.pipeline.references.fetch(subject).await;

    let request = prompt::related_genes(&label, config.max_candidates, reference.as_deref());
    let related = match self.pipeline.reason(&request).await {
      Ok(reply) => decode_gene_list(&reply, config.max_candidates).map_err(|e| ("parse", Error::from(e))),
      Err(e) => {
        let err = Error::from(e);
        let kind = if err.is_configuration() { "configuration" } else { "upstream" };
        Err((kind, err))
      }
    };
    let related = match related {
      Ok(related) => related,
      Err((kind, err)) => {
        activity.warn(format!("related genes for {label} unavailable: {err}"));
        lock(&self.queue).finish(seed.item, ItemStatus::Skipped);
        self
          .pipeline
          .record_failure(
            EventSource::Discovery,
            Some(&label),
            kind,
            format!("Related genes for {label} unavailable: {err}"),
          )
          .await?;
        if err.is_configuration() {
          return Err(err);
        }
        report.failed = true;
        return Ok(report);
      }
    };
    report.related = related.clone();

    let conversation = NewAuditEvent::new(
      EventSource::Claude,
      DataType::Conversation,
      format!("Genes related to {label}: {}", related.join(", ")),
    )
    .reference(label.as_str())
    .metadata(json!({
      "purpose": "related_genes",
      "genes": related,
      "reference": reference.is_some(),
    }));
    if let Err(e) = self.pipeline.store().append_event(conversation).await {
      warn!(seed = %label, error = %e, "could not record related-genes exchange");
    }

    // Candidates are deduplicated against everything seen before any work.
    let candidates: Vec<String> = {
      let mut queue = lock(&self.queue);
      related.into_iter().filter(|s| *s != label && queue.mark_seen(s)).collect()
    };

    let mut matched = Vec::new();
    let mut annotated = Vec::new();
    let outcome = self.explore(&seed, &candidates, &mut matched, &mut annotated).await;
    report.annotated = annotated;

    if let Err(e) = outcome {
      lock(&self.queue).finish(seed.item, ItemStatus::Skipped);
      return Err(e);
    }

    {
      let mut queue = lock(&self.queue);
      report.enqueued = candidates
        .iter()
        .filter(|s| queue.enqueue(s, &label))
        .cloned()
        .collect();
      queue.finish(seed.item, ItemStatus::Processed);
    }

    let event = NewAuditEvent::new(
      EventSource::Discovery,
      DataType::GeneDiscovery,
      format!(
        "Explored {label}: {} related, {} SNPs matched, {} annotated",
        report.related.len(),
        matched.len(),
        report.annotated.len()
      ),
    )
    .reference(label.as_str())
    .metadata(json!({
      "related": report.related,
      "matched": matched,
      "annotated": report.annotated,
      "enqueued": report.enqueued,
    }));
    self.pipeline.store().append_event(event).await.map_err(Error::store)?;
    activity.knowledge_added();
    activity.info(format!(
      "explored {label}: {} annotated, {} queued",
      report.annotated.len(),
      report.enqueued.len()
    ));

    Ok(report)
  }

  async fn run(self: Arc<Self>, cancel: CancellationToken) {
    let base = self.pipeline.config().base_interval();
    let max = self.pipeline.config().max_interval();
    let mut delay = base;

    loop {
      // Cancellation is observed between iterations only.
      if cancel.is_cancelled() {
        break;
      }
      let result = self.run_iteration().await;

      match result {
        Ok(report) if report.is_productive() => delay = base,
        Ok(_) => delay = next_backoff(delay, max),
        Err(e) if e.is_configuration() => {
          error!(error = %e, "discovery halted");
          self.pipeline.activity().error(format!("discovery halted: {e}"));
          *lock(&self.last_error) = Some(e.to_string());
          break;
        }
        Err(e) => {
          warn!(error = %e, "discovery iteration failed");
          delay = next_backoff(delay, max);
        }
      }

      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = tokio::time::sleep(delay) => {}
      }
    }

    self.running.store(false, Ordering::SeqCst);
    info!("discovery loop exited");
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
  Started,
  AlreadyRunning,
}

#[derive(Default)]
struct Control {
  cancel: Option<CancellationToken>,
  handle: Option<JoinHandle<()>>,
}

/// Owner of the discovery loop. `start` and `stop` are the only ways to
/// change whether it runs.
pub struct DiscoveryWorker<S, R, F> {
  inner:   Arc<Inner<S, R, F>>,
  control: Mutex<Control>,
}

impl<S, R, F> DiscoveryWorker<S, R, F>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  pub fn new(pipeline: Pipeline<S, R, F>) -> Self {
    let capacity = pipeline.config().max_queue;
    Self {
      inner:   Arc::new(Inner {
        pipeline,
        queue: Mutex::new(DiscoveryQueue::new(capacity)),
        running: AtomicBool::new(false),
        last_error: Mutex::new(None),
      }),
      control: Mutex::new(Control::default()),
    }
  }

  pub fn is_running(&self) -> bool { self.inner.running.load(Ordering::SeqCst) }

  /// The configuration error that last halted the loop, if any.
  pub fn last_error(&self) -> Option<String> { lock(&self.inner.last_error).clone() }

  pub fn queue(&self) -> QueueSnapshot { lock(&self.inner.queue).snapshot() }

  /// Queue a gene symbol as a future seed.
  pub fn enqueue(&self, symbol: &str, origin: &str) -> Result<bool> {
    let symbol = normalize_gene_symbol(symbol)?;
    Ok(lock(&self.inner.queue).enqueue(&symbol, origin))
  }

  pub fn reset(&self) {
    lock(&self.inner.queue).clear();
    self.inner.pipeline.activity().info("discovery queue reset");
  }

  pub async fn start(&self) -> Result<StartOutcome> {
    {
      let mut control = lock(&self.control);
      if control.handle.as_ref().is_some_and(|h| !h.is_finished()) {
        return Ok(StartOutcome::AlreadyRunning);
      }
      let cancel = CancellationToken::new();
      *lock(&self.inner.last_error) = None;
      self.inner.running.store(true, Ordering::SeqCst);
      let handle = tokio::spawn(Arc::clone(&self.inner).run(cancel.clone()));
      control.cancel = Some(cancel);
      control.handle = Some(handle);
    }

    self.inner.pipeline.activity().info("discovery worker started");
    self
      .inner
      .pipeline
      .store()
      .append_event(NewAuditEvent::new(EventSource::System, DataType::WorkerStarted, "Discovery worker started"))
      .await
      .map_err(Error::store)?;
    Ok(StartOutcome::Started)
  }

  /// Stop the loop and wait for it to exit. An iteration in flight runs to
  /// completion first. Returns `false` when it was not running.
  pub async fn stop(&self) -> Result<bool> {
    let (cancel, handle) = {
      let mut control = lock(&self.control);
      (control.cancel.take(), control.handle.take())
    };
    let Some(handle) = handle else {
      return Ok(false);
    };
    let was_running = !handle.is_finished();

    if let Some(cancel) = cancel {
      cancel.cancel();
    }
    if let Err(e) = handle.await {
      warn!(error = %e, "discovery task ended abnormally");
    }
    self.inner.running.store(false, Ordering::SeqCst);

    if !was_running {
      return Ok(false);
    }
    self.inner.pipeline.activity().info("discovery worker stopped");
    self
      .inner
      .pipeline
      .store()
      .append_event(NewAuditEvent::new(EventSource::System, DataType::WorkerStopped, "Discovery worker stopped"))
      .await
      .map_err(Error::store)?;
    Ok(true)
  }

  pub(crate) async fn run_iteration(&self) -> Result<IterationReport> { self.inner.run_iteration().await }
}
