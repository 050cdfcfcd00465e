//! Bounded background annotation.
//!
//! A fixed number of workers drain one bounded channel of rsids. Submission
//! never blocks: an rsid already queued or in flight is accepted without a
//! second job, and a full queue rejects the job.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use genekb_core::{reasoning::ReasoningService, reference::ReferenceService};
use tokio::{
  sync::{Mutex as AsyncMutex, mpsc},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{EngineStore, pipeline::{AnnotateOutcome, Pipeline}};

type Pending = Arc<Mutex<HashSet<String>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

pub struct AnnotationPool {
  tx:      mpsc::Sender<String>,
  pending: Pending,
  cancel:  CancellationToken,
  workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AnnotationPool {
  /// Spawn `workers` consumers on the current tokio runtime.
  pub fn spawn<S, R, F>(pipeline: Pipeline<S, R, F>, workers: usize, capacity: usize) -> Self
  where
    S: EngineStore,
    R: ReasoningService + 'static,
    F: ReferenceService + 'static,
  {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let rx = Arc::new(AsyncMutex::new(rx));
    let pending: Pending = Arc::default();
    let cancel = CancellationToken::new();

    let handles = (0..workers.max(1))
      .map(|id| {
        tokio::spawn(work(
          id,
          pipeline.clone(),
          Arc::clone(&rx),
          Arc::clone(&pending),
          cancel.clone(),
        ))
      })
      .collect();

    Self { tx, pending, cancel, workers: Mutex::new(handles) }
  }

  /// Queue `rsid` for annotation. Returns `false` only when the job was
  /// rejected.
  pub fn submit(&self, rsid: &str) -> bool {
    let mut pending = lock(&self.pending);
    if pending.contains(rsid) {
      return true;
    }
    match self.tx.try_send(rsid.to_owned()) {
      Ok(()) => {
        pending.insert(rsid.to_owned());
        debug!(%rsid, "queued for annotation");
        true
      }
      Err(mpsc::error::TrySendError::Full(_)) => {
        warn!(%rsid, "annotation pool full, job rejected");
        false
      }
      Err(mpsc::error::TrySendError::Closed(_)) => {
        warn!(%rsid, "annotation pool closed, job rejected");
        false
      }
    }
  }

  /// Jobs queued or in flight.
  pub fn pending(&self) -> usize { lock(&self.pending).len() }

  /// Stop the workers and wait for them. Jobs still queued are dropped;
  /// jobs in flight finish first.
  pub async fn shutdown(&self) {
    self.cancel.cancel();
    let handles: Vec<_> = lock(&self.workers).drain(..).collect();
    for handle in handles {
      if let Err(e) = handle.await {
        warn!(error = %e, "annotation worker panicked");
      }
    }
  }
}

async fn work<S, R, F>(
  id: usize,
  pipeline: Pipeline<S, R, F>,
  rx: Arc<AsyncMutex<mpsc::Receiver<String>>>,
  pending: Pending,
  cancel: CancellationToken,
) where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  loop {
    let job = {
      let mut rx = rx.lock().await;
      tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        job = rx.recv() => job,
      }
    };
    let Some(rsid) = job else { break };

    // A job once taken runs to completion, cancelled or not.
    match pipeline.annotate(&rsid, None, false).await {
      Ok(AnnotateOutcome::Improved { .. }) => debug!(worker = id, %rsid, "annotated"),
      Ok(AnnotateOutcome::Cached { .. }) => debug!(worker = id, %rsid, "already annotated"),
      Ok(AnnotateOutcome::Rejected { error, .. }) => {
        debug!(worker = id, %rsid, %error, "annotation rejected")
      }
      Err(e) => warn!(worker = id, %rsid, error = %e, "background annotation failed"),
    }

    lock(&pending).remove(&rsid);
  }
  info!(worker = id, "annotation worker exiting");
}
