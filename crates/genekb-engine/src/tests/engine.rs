use genekb_core::{
  annotation::{AnnotationSource, RevertOutcome},
  audit::{AuditQuery, DataType, EventSource, NewAuditEvent},
  citation::{Citation, CitationKind},
  history::NewQueryHistory,
  store::KnowledgeStore,
};

use super::*;
use crate::{CitationTarget, Error};

#[tokio::test]
async fn citations_resolve_against_audit_log_and_history() {
  let store = store_with(vec![]).await;
  let event = store
    .append_event(NewAuditEvent::new(EventSource::System, DataType::WorkerStarted, "started"))
    .await
    .unwrap();
  let entry = store
    .record_query(NewQueryHistory {
      query:          "q".into(),
      response:       "a".into(),
      snps_mentioned: vec![],
    })
    .await
    .unwrap();
  let (reasoning, _) = ScriptedReasoning::new(|_| Ok(String::new()));
  let engine = engine_with(store, reasoning);

  match engine.resolve_citation(Citation::audit(event.id)).await.unwrap() {
    CitationTarget::Audit(e) => assert_eq!(e.content, "started"),
    other => panic!("expected audit target, got {other:?}"),
  }
  match engine.resolve_citation(Citation { kind: CitationKind::Query, id: entry.id }).await.unwrap() {
    CitationTarget::Query(q) => assert_eq!(q.query, "q"),
    other => panic!("expected query target, got {other:?}"),
  }
  assert!(matches!(engine.resolve_citation(Citation::audit(999)).await, Err(Error::NotFound(_))));
  engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn history_can_be_hidden() {
  let store = store_with(vec![]).await;
  let entry = store
    .record_query(NewQueryHistory {
      query:          "q".into(),
      response:       "a".into(),
      snps_mentioned: vec![],
    })
    .await
    .unwrap();
  let (reasoning, _) = ScriptedReasoning::new(|_| Ok(String::new()));
  let engine = engine_with(store, reasoning);

  engine.set_history_hidden(entry.id, true).await.unwrap();
  assert!(engine.history(10, false).await.unwrap().is_empty());
  assert_eq!(engine.history(10, true).await.unwrap().len(), 1);
  assert!(matches!(engine.set_history_hidden(404, true).await, Err(Error::NotFound(_))));
  engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn snp_detail_includes_personal_interpretation() {
  let store = store_with(vec![snp("rs1801133", "TC", Some("MTHFR"))]).await;
  let (reasoning, _) = ScriptedReasoning::new(|_| Ok(annotation_reply("MTHFR C677T")));
  let engine = engine_with(store, reasoning);

  let detail = engine.get_annotation("rs1801133").await.unwrap();
  assert!(detail.annotation.is_none());

  engine.annotate("rs1801133", None, false).await.unwrap();
  let detail = engine.get_annotation("RS1801133").await.unwrap();
  assert_eq!(detail.interpretation.as_deref(), Some("One copy."));

  assert!(matches!(engine.get_annotation("rs5").await, Err(Error::NotFound(_))));
  engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn logs_and_audit_are_separate() {
  let store = store_with(vec![snp("rs1801133", "CT", Some("MTHFR"))]).await;
  let (reasoning, _) = ScriptedReasoning::new(|_| Ok(annotation_reply("MTHFR C677T")));
  let engine = engine_with(store, reasoning);

  engine.annotate("rs1801133", None, false).await.unwrap();
  assert!(!engine.get_logs(10).is_empty());
  assert_eq!(engine.status().stats.snps_enriched, 1);

  engine.clear_logs();
  assert!(engine.get_logs(10).is_empty());
  assert!(engine.status().recent_logs.is_empty());

  let events = engine.audit(&AuditQuery::default()).await.unwrap();
  assert_eq!(events.len(), 1, "clearing logs leaves the audit log alone");
  let stats = engine.audit_stats().await.unwrap();
  assert_eq!(stats.by_type.get("annotation_improvement"), Some(&1));
  assert_eq!(engine.audit_event(events[0].id).await.unwrap().id, events[0].id);
  engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn pool_dedups_and_rejects_when_full() {
  let store = store_with(vec![snp("rs1", "AA", None), snp("rs2", "AA", None), snp("rs3", "AA", None)]).await;
  let calls = Arc::new(AtomicUsize::new(0));
  let reasoning = SlowReasoning { delay: Duration::from_secs(5), calls };
  let pipeline = pipeline_with(store, reasoning, test_config());
  let pool = crate::pool::AnnotationPool::spawn(pipeline, 1, 1);

  assert!(pool.submit("rs1"));
  assert!(pool.submit("rs1"), "a pending rsid is accepted without a second job");
  assert_eq!(pool.pending(), 1);

  let accepted = ["rs2", "rs3", "rs4"].iter().filter(|r| pool.submit(r)).count();
  assert!(accepted < 3, "a full pool rejects jobs");
  assert!(pool.pending() <= 2);
  pool.shutdown().await;
}

#[tokio::test]
async fn annotating_from_a_reference_page_makes_revert_restore_it() {
  let store = store_with(vec![snp("rs429358", "CC", Some("APOE"))]).await;
  let (reasoning, _) = ScriptedReasoning::new(|_| Ok(annotation_reply("APOE e4")));
  let references = PagedReferences::default().with(
    "rs429358",
    "{{Rsnum|rsid=429358|Gene=APOE|magnitude=4|repute=Bad}}\n\
     One of the two SNPs that together define the APOE e2, e3 and e4 alleles.",
  );
  let engine = Engine::new(store.clone(), reasoning, references, test_config());

  engine.annotate("rs429358", None, false).await.unwrap();
  let detail = engine.get_annotation("rs429358").await.unwrap();
  assert_eq!(detail.annotation.as_ref().map(|a| a.source), Some(AnnotationSource::Claude));

  let RevertOutcome::Restored(baseline) = engine.revert_annotation("rs429358").await.unwrap() else {
    panic!("expected the reference page to be restored");
  };
  assert_eq!(baseline.source, AnnotationSource::Snpedia);
  assert_eq!(baseline.gene.as_deref(), Some("APOE"));
  assert_eq!(baseline.magnitude, Some(4.0));
  engine.shutdown().await.unwrap();
}
