//! The annotation pipeline: one rsid in, at most one annotation written.
//!
//! Every invocation that reaches the reasoning service appends exactly one
//! audit event: `annotation_improvement` on success, `error` otherwise,
//! including when the store rejects the write.
//! Cache hits and unknown rsids touch neither the service nor the log.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use genekb_core::{
  annotation::{Annotation, AnnotationSource, RevertOutcome},
  audit::{AuditQuery, DataType, EventSource, NewAuditEvent},
  genotype::{GenotypeStore, normalize_genotype, normalize_rsid},
  reasoning::{CompletionRequest, ReasoningError, ReasoningService},
  reference::{ReferenceService, ReferenceSubject},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::{
  EngineStore, Error, Result,
  activity::Activity,
  baseline,
  config::EngineConfig,
  decode::{AnnotationDraft, decode_annotation},
  prompt::{self, AnnotationContext},
};

/// Audit events offered to the service as citable evidence.
const EVIDENCE_LIMIT: usize = 5;

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnnotateOutcome {
  /// An enriched annotation already existed and was not regenerated.
  Cached { annotation: Annotation },
  /// A new annotation was written.
  Improved { annotation: Annotation },
  /// The reply could not be decoded. Nothing was written.
  Rejected { prior: Option<Annotation>, error: String },
}

impl AnnotateOutcome {
  /// The annotation the caller should display, if any.
  pub fn annotation(&self) -> Option<&Annotation> {
    match self {
      Self::Cached { annotation } | Self::Improved { annotation } => Some(annotation),
      Self::Rejected { prior, .. } => prior.as_ref(),
    }
  }
}

/// Fields a user may overwrite. At least one must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEdit {
  pub title:         Option<String>,
  pub summary:       Option<String>,
  pub genotype_info: Option<BTreeMap<String, String>>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Shared handle to the collaborators every engine component needs.
///
/// Cloning is cheap; the store is expected to be a cheap handle itself.
pub struct Pipeline<S, R, F> {
  pub(crate) store:      S,
  pub(crate) reasoning:  Arc<R>,
  pub(crate) references: Arc<F>,
  pub(crate) config:     Arc<EngineConfig>,
  pub(crate) activity:   Arc<Activity>,
}

impl<S: Clone, R, F> Clone for Pipeline<S, R, F> {
  fn clone(&self) -> Self {
    Self {
      store:      self.store.clone(),
      reasoning:  Arc::clone(&self.reasoning),
      references: Arc::clone(&self.references),
      config:     Arc::clone(&self.config),
      activity:   Arc::clone(&self.activity),
    }
  }
}

impl<S, R, F> Pipeline<S, R, F>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  pub fn new(store: S, reasoning: R, references: F, config: EngineConfig) -> Self {
    Self {
      store,
      reasoning: Arc::new(reasoning),
      references: Arc::new(references),
      config: Arc::new(config),
      activity: Arc::new(Activity::new()),
    }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn activity(&self) -> &Activity { &self.activity }

  pub fn config(&self) -> &EngineConfig { &self.config }

  /// One reasoning call under the hard timeout, retried once after a
  /// transient failure.
  pub(crate) async fn reason(&self, request: &CompletionRequest) -> Result<String, ReasoningError> {
    match self.reason_once(request).await {
      Err(ReasoningError::Upstream(e)) if e.is_transient() => {
        warn!(error = %e, "transient reasoning failure, retrying once");
        tokio::time::sleep(self.config.retry_delay()).await;
        self.reason_once(request).await
      }
      other => other,
    }
  }

  async fn reason_once(&self, request: &CompletionRequest) -> Result<String, ReasoningError> {
    let limit = self.config.reasoning_timeout();
    match tokio::time::timeout(limit, self.reasoning.complete(request)).await {
      Ok(result) => result,
      Err(_) => Err(genekb_core::reasoning::UpstreamError::Timeout(limit).into()),
    }
  }

  /// Append an `error` event describing a failed reasoning call or decode.
  pub(crate) async fn record_failure(
    &self,
    source: EventSource,
    reference: Option<&str>,
    kind: &str,
    message: String,
  ) -> Result<()> {
    let mut event = NewAuditEvent::new(source, DataType::Error, message)
      .metadata(json!({ "kind": kind }));
    if let Some(reference) = reference {
      event = event.reference(reference);
    }
    self.store.append_event(event).await.map_err(Error::store)?;
    Ok(())
  }

  // ── Annotate ──────────────────────────────────────────────────────────────

  pub async fn annotate(
    &self,
    rsid: &str,
    instructions: Option<&str>,
    force: bool,
  ) -> Result<AnnotateOutcome> {
    let rsid = normalize_rsid(rsid)?;

    let prior = self.store.get_annotation(&rsid).await.map_err(Error::store)?;
    if let Some(cached) = prior.as_ref().filter(|a| a.source.is_enriched() && !force) {
      debug!(%rsid, source = %cached.source, "annotation cache hit");
      return Ok(AnnotateOutcome::Cached { annotation: cached.clone() });
    }

    let genotype = GenotypeStore::get(&self.store, &rsid)
      .await
      .map_err(Error::store)?
      .filter(|g| g.is_called())
      .ok_or_else(|| Error::NotFound(format!("no genotype on file for {rsid}")))?;

    let _task = self.activity.begin_task(format!("annotating {rsid}"));

    let reference = self.references.fetch(ReferenceSubject::Variant(&rsid)).await;
    // A first reference page becomes the baseline. It is stored only together
    // with a successful improvement.
    let baseline = match (&prior, reference.as_deref()) {
      (None, Some(page)) => baseline::from_wikitext(&rsid, page, genotype.gene.as_deref()),
      _ => None,
    };
    let current = prior.as_ref().or(baseline.as_ref());

    let evidence = self
      .store
      .query_events(&AuditQuery {
        reference_id: Some(rsid.clone()),
        limit: Some(EVIDENCE_LIMIT),
        ..Default::default()
      })
      .await
      .map_err(Error::store)?;
    let offered: Vec<i64> = evidence.iter().map(|e| e.id).collect();

    let request = prompt::annotation(&AnnotationContext {
      genotype: &genotype,
      reference: reference.as_deref(),
      prior: current,
      instructions,
      evidence: &evidence,
    });

    let reply = match self.reason(&request).await {
      Ok(reply) => reply,
      Err(e) => {
        let err = Error::from(e);
        let kind = if err.is_configuration() { "configuration" } else { "upstream" };
        self.activity.error(format!("annotation of {rsid} failed: {err}"));
        self
          .record_failure(EventSource::Claude, Some(&rsid), kind, format!("Annotation of {rsid} failed: {err}"))
          .await?;
        return Err(err);
      }
    };

    let draft = match decode_annotation(&reply, &offered) {
      Ok(draft) => draft,
      Err(e) => {
        self.activity.warn(format!("rejected annotation for {rsid}: {e}"));
        self
          .record_failure(EventSource::Claude, Some(&rsid), "parse", format!("Rejected annotation for {rsid}: {e}"))
          .await?;
        return Ok(AnnotateOutcome::Rejected { prior, error: e.to_string() });
      }
    };

    let annotation = merge(&rsid, draft, current, genotype.gene.as_deref());
    let stored = match self.store_improvement(baseline, annotation, instructions, force).await {
      Ok(stored) => stored,
      Err(err) => {
        self.activity.error(format!("storing annotation for {rsid} failed: {err}"));
        if let Err(e) = self
          .record_failure(EventSource::System, Some(&rsid), "store", format!("Storing annotation for {rsid} failed: {err}"))
          .await
        {
          warn!(%rsid, error = %e, "could not record store failure");
        }
        return Err(err);
      }
    };

    self.activity.snp_enriched();
    self.activity.knowledge_added();
    self.activity.info(format!("improved {rsid}: {}", stored.title));

    Ok(AnnotateOutcome::Improved { annotation: stored })
  }

  /// Write the baseline (if any), then the improvement and its event.
  async fn store_improvement(
    &self,
    baseline: Option<Annotation>,
    annotation: Annotation,
    instructions: Option<&str>,
    force: bool,
  ) -> Result<Annotation> {
    let with_baseline = baseline.is_some();
    if let Some(baseline) = baseline {
      self.store.upsert_annotation(baseline).await.map_err(Error::store)?;
    }
    let stored = self.store.upsert_annotation(annotation).await.map_err(Error::store)?;

    let event = NewAuditEvent::new(
      EventSource::Claude,
      DataType::AnnotationImprovement,
      format!("Improved annotation for {}: {}", stored.rsid, stored.title),
    )
    .reference(stored.rsid.as_str())
    .metadata(json!({
      "magnitude": stored.magnitude,
      "repute": stored.repute.map(|r| r.as_str()),
      "categories": stored.categories,
      "forced": force,
      "instructions": instructions,
      "baseline": with_baseline,
    }));
    self.store.append_event(event).await.map_err(Error::store)?;
    Ok(stored)
  }

  // ── User edit ─────────────────────────────────────────────────────────────

  pub async fn edit(&self, rsid: &str, edit: AnnotationEdit) -> Result<Annotation> {
    let rsid = normalize_rsid(rsid)?;
    if edit.title.is_none() && edit.summary.is_none() && edit.genotype_info.is_none() {
      return Err(Error::InvalidInput("edit must change title, summary or genotype_info".into()));
    }

    let mut annotation = match self.store.get_annotation(&rsid).await.map_err(Error::store)? {
      Some(existing) => existing,
      None => {
        let genotype = GenotypeStore::get(&self.store, &rsid)
          .await
          .map_err(Error::store)?
          .ok_or_else(|| Error::NotFound(format!("no genotype on file for {rsid}")))?;
        Annotation {
          rsid:          rsid.clone(),
          title:         rsid.clone(),
          summary:       String::new(),
          gene:          genotype.gene,
          genotype_info: BTreeMap::new(),
          categories:    Default::default(),
          magnitude:     None,
          repute:        None,
          source:        AnnotationSource::User,
          improved_at:   None,
        }
      }
    };

    let mut changed = Vec::new();
    if let Some(title) = edit.title {
      annotation.title = title.trim().to_owned();
      changed.push("title");
    }
    if let Some(summary) = edit.summary {
      annotation.summary = summary.trim().to_owned();
      changed.push("summary");
    }
    if let Some(info) = edit.genotype_info {
      annotation.genotype_info = info
        .into_iter()
        .map(|(k, v)| (normalize_genotype(&k), v.trim().to_owned()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect();
      changed.push("genotype_info");
    }
    annotation.source = AnnotationSource::User;
    annotation.improved_at = Some(Utc::now());

    let stored = self.store.upsert_annotation(annotation).await.map_err(Error::store)?;

    let event = NewAuditEvent::new(
      EventSource::User,
      DataType::AnnotationEdit,
      format!("Edited annotation for {rsid}"),
    )
    .reference(rsid.as_str())
    .metadata(json!({ "fields": changed }));
    self.store.append_event(event).await.map_err(Error::store)?;
    self.activity.info(format!("user edited {rsid}"));

    Ok(stored)
  }

  // ── Revert ────────────────────────────────────────────────────────────────

  pub async fn revert(&self, rsid: &str) -> Result<RevertOutcome> {
    let rsid = normalize_rsid(rsid)?;

    let outcome = self.store.revert_annotation(&rsid).await.map_err(Error::store)?;
    let content = match &outcome {
      RevertOutcome::Restored(_) => format!("Restored reference annotation for {rsid}"),
      RevertOutcome::Cleared => format!("Cleared annotation for {rsid}"),
      RevertOutcome::Missing => return Err(Error::NotFound(format!("no annotation for {rsid}"))),
    };

    let event = NewAuditEvent::new(EventSource::User, DataType::AnnotationRevert, content)
      .reference(rsid.as_str())
      .metadata(json!({ "restored": matches!(outcome, RevertOutcome::Restored(_)) }));
    self.store.append_event(event).await.map_err(Error::store)?;
    self.activity.info(format!("reverted {rsid}"));

    Ok(outcome)
  }
}

/// Combine a decoded draft with what was there before. Categories accumulate;
/// everything else comes from the draft.
fn merge(
  rsid: &str,
  draft: AnnotationDraft,
  prior: Option<&Annotation>,
  genotype_gene: Option<&str>,
) -> Annotation {
  let mut categories = draft.categories;
  if let Some(prior) = prior {
    categories.extend(prior.categories.iter().cloned());
  }
  let gene = draft
    .gene
    .or_else(|| prior.and_then(|p| p.gene.clone()))
    .or_else(|| genotype_gene.map(str::to_owned));

  Annotation {
    rsid: rsid.to_owned(),
    title: draft.title,
    summary: draft.summary,
    gene,
    genotype_info: draft.genotype_info,
    categories,
    magnitude: draft.magnitude,
    repute: draft.repute,
    source: AnnotationSource::Claude,
    improved_at: Some(Utc::now()),
  }
}
