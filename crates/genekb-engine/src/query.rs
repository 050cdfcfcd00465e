//! Interactive natural-language queries over the genome.

use std::{collections::HashSet, sync::Arc};

use genekb_core::{
  annotation::{Annotation, AnnotationSource, Repute},
  audit::{AuditQuery, DataType, EventSource, NewAuditEvent},
  genotype::{GenotypeRecord, GenotypeStore},
  history::NewQueryHistory,
  reasoning::ReasoningService,
  reference::ReferenceService,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
  EngineStore, Error, Result,
  decode::{Reference, decode_query_reply},
  pipeline::Pipeline,
  pool::AnnotationPool,
  prompt::{self, GenomeSummary},
};

/// SNPs returned by a single query.
pub const MAX_SNPS_PER_QUERY: usize = 20;
/// SNPs a gene reference expands to.
pub const MAX_SNPS_PER_REFERENCED_GENE: usize = 3;

const NOTABLE_IN_SUMMARY: usize = 10;
const RECENT_IN_SUMMARY: usize = 5;

/// One resolved SNP in a query answer, with whatever is cached for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnpFinding {
  pub rsid:           String,
  pub genotype:       String,
  pub chromosome:     String,
  pub position:       u64,
  pub gene:           Option<String>,
  pub title:          Option<String>,
  pub summary:        Option<String>,
  /// What the person's own genotype means, when the annotation says.
  pub interpretation: Option<String>,
  pub magnitude:      Option<f64>,
  pub repute:         Option<Repute>,
  pub source:         Option<AnnotationSource>,
}

impl SnpFinding {
  fn new(record: GenotypeRecord, annotation: Option<Annotation>) -> Self {
    let interpretation = annotation
      .as_ref()
      .and_then(|a| a.interpretation_for(&record.genotype))
      .map(str::to_owned);
    let gene = annotation.as_ref().and_then(|a| a.gene.clone()).or(record.gene);
    Self {
      rsid: record.rsid,
      genotype: record.genotype,
      chromosome: record.chromosome,
      position: record.position,
      gene,
      title: annotation.as_ref().map(|a| a.title.clone()),
      summary: annotation.as_ref().map(|a| a.summary.clone()),
      interpretation,
      magnitude: annotation.as_ref().and_then(|a| a.magnitude),
      repute: annotation.as_ref().and_then(|a| a.repute),
      source: annotation.as_ref().map(|a| a.source),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
  pub query:                String,
  pub response:             String,
  /// Unique by rsid, in order of first mention.
  pub snps_found:           Vec<SnpFinding>,
  /// rsids handed to the annotation pool by this query.
  pub pending_improvements: Vec<String>,
  pub history_id:           i64,
}

pub struct QueryEngine<S, R, F> {
  pipeline: Pipeline<S, R, F>,
  pool:     Arc<AnnotationPool>,
}

impl<S, R, F> QueryEngine<S, R, F>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  pub fn new(pipeline: Pipeline<S, R, F>, pool: Arc<AnnotationPool>) -> Self { Self { pipeline, pool } }

  pub async fn query(&self, text: &str) -> Result<QueryResult> {
    let question = text.trim();
    if question.is_empty() {
      return Err(Error::InvalidInput("query text is empty".into()));
    }
    let store = self.pipeline.store();
    let activity = self.pipeline.activity();
    let _task = activity.begin_task("answering a query");

    let summary = self.summary().await?;
    let request = prompt::query(question, &summary);

    let reply = match self.pipeline.reason(&request).await {
      Ok(reply) => reply,
      Err(e) => {
        let err = Error::from(e);
        activity.error(format!("query failed: {err}"));
        self
          .pipeline
          .record_failure(EventSource::Claude, None, "query", format!("Query failed: {err}"))
          .await?;
        return Err(err);
      }
    };
    let reply = decode_query_reply(&reply);

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let mut pending = Vec::new();

    'refs: for reference in &reply.references {
      let rsids = match reference {
        Reference::Variant(rsid) => vec![rsid.clone()],
        Reference::Gene(symbol) => {
          let mut rsids = store.snps_for_gene(symbol).await.map_err(Error::store)?;
          rsids.truncate(MAX_SNPS_PER_REFERENCED_GENE);
          rsids
        }
      };

      for rsid in rsids {
        if found.len() >= MAX_SNPS_PER_QUERY {
          break 'refs;
        }
        if !seen.insert(rsid.clone()) {
          continue;
        }
        let Some(record) = GenotypeStore::get(store, &rsid)
          .await
          .map_err(Error::store)?
          .filter(|r| r.is_called())
        else {
          continue;
        };

        let annotation = store.get_annotation(&rsid).await.map_err(Error::store)?;
        if annotation.is_none() && self.pool.submit(&rsid) {
          pending.push(rsid.clone());
        }
        found.push(SnpFinding::new(record, annotation));
      }
    }

    let entry = store
      .record_query(NewQueryHistory {
        query:          question.to_owned(),
        response:       reply.answer.clone(),
        snps_mentioned: found.iter().map(|f| f.rsid.clone()).collect(),
      })
      .await
      .map_err(Error::store)?;

    let event = NewAuditEvent::new(EventSource::User, DataType::SearchQuery, question)
      .metadata(json!({
        "history_id": entry.id,
        "snps_found": entry.snps_mentioned,
        "pending": pending,
      }));
    store.append_event(event).await.map_err(Error::store)?;

    let conversation = NewAuditEvent::new(EventSource::Claude, DataType::Conversation, reply.answer.as_str())
      .metadata(json!({
        "purpose": "query",
        "history_id": entry.id,
        "question": question,
        "rsids_mentioned": entry.snps_mentioned,
      }));
    store.append_event(conversation).await.map_err(Error::store)?;

    activity.query_processed();
    activity.info(format!(
      "answered query with {} SNPs, {} queued for annotation",
      found.len(),
      pending.len()
    ));

    Ok(QueryResult {
      query: entry.query,
      response: entry.response,
      snps_found: found,
      pending_improvements: pending,
      history_id: entry.id,
    })
  }

  async fn summary(&self) -> Result<GenomeSummary> {
    let store = self.pipeline.store();
    let min_magnitude = self.pipeline.config().notable_min_magnitude;

    Ok(GenomeSummary {
      snp_count:        GenotypeStore::count(store).await.map_err(Error::store)?,
      annotation_count: store.annotation_count().await.map_err(Error::store)?,
      notable:          store
        .notable_annotations(min_magnitude, NOTABLE_IN_SUMMARY)
        .await
        .map_err(Error::store)?,
      recent:           store
        .query_events(&AuditQuery {
          data_type: Some(DataType::AnnotationImprovement),
          limit: Some(RECENT_IN_SUMMARY),
          ..Default::default()
        })
        .await
        .map_err(Error::store)?,
    })
  }
}
