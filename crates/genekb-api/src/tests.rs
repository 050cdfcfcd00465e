use std::sync::Arc;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use genekb_core::{
  genotype::GenotypeRecord,
  reasoning::{CompletionRequest, ReasoningError, ReasoningService},
  reference::NoReferences,
};
use genekb_engine::{Engine, EngineConfig};
use genekb_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use super::api_router;

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Answers annotation prompts with a fixed annotation and everything else with
/// a query reply naming rs1801133.
struct CannedReasoning;

impl ReasoningService for CannedReasoning {
  async fn complete(&self, request: &CompletionRequest) -> Result<String, ReasoningError> {
    if request.prompt.starts_with("Write an annotation") {
      Ok(
        json!({
          "title": "MTHFR C677T",
          "summary": "Reduced folate metabolism.",
          "gene": "MTHFR",
          "genotype_info": { "CT": "One copy of the T allele." },
          "categories": ["metabolism"],
          "magnitude": 2.5,
          "repute": "bad"
        })
        .to_string(),
      )
    } else {
      Ok(json!({ "answer": "See rs1801133.", "references": ["rs1801133"] }).to_string())
    }
  }
}

/// A reasoning service without credentials.
struct Unconfigured;

impl ReasoningService for Unconfigured {
  async fn complete(&self, _request: &CompletionRequest) -> Result<String, ReasoningError> {
    Err(ReasoningError::Configuration("no API key".into()))
  }
}

async fn seeded_store() -> SqliteStore {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store
    .insert_genotypes(vec![GenotypeRecord {
      rsid:       "rs1801133".into(),
      chromosome: "1".into(),
      position:   11_856_378,
      genotype:   "CT".into(),
      gene:       Some("MTHFR".into()),
    }])
    .await
    .unwrap();
  store
}

fn config() -> EngineConfig { EngineConfig { retry_delay_ms: 0, ..Default::default() } }

async fn engine<R: ReasoningService + 'static>(
  reasoning: R,
) -> Arc<Engine<SqliteStore, R, NoReferences>> {
  Arc::new(Engine::new(seeded_store().await, reasoning, NoReferences, config()))
}

async fn oneshot<R: ReasoningService + 'static>(
  engine: Arc<Engine<SqliteStore, R, NoReferences>>,
  method: &str,
  uri:    &str,
  body:   Option<Value>,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  api_router(engine).oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

// ─── Status & logs ───────────────────────────────────────────────────────────

#[tokio::test]
async fn status_reports_idle_engine() {
  let resp = oneshot(engine(CannedReasoning).await, "GET", "/status", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["running"], json!(false));
  assert_eq!(body["stats"]["queries_processed"], json!(0));
}

#[tokio::test]
async fn clearing_logs_returns_204() {
  let engine = engine(CannedReasoning).await;
  let resp = oneshot(Arc::clone(&engine), "DELETE", "/logs", None).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);

  let resp = oneshot(engine, "GET", "/logs?limit=5", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await, json!([]));
}

// ─── Discovery ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn seeding_a_gene_twice_queues_it_once() {
  let engine = engine(CannedReasoning).await;
  let seed = json!({ "gene": "mthfr" });

  let resp = oneshot(Arc::clone(&engine), "POST", "/discovery/seed", Some(seed.clone())).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["queued"], json!(true));

  let resp = oneshot(Arc::clone(&engine), "POST", "/discovery/seed", Some(seed)).await;
  assert_eq!(json_body(resp).await["queued"], json!(false));

  let resp = oneshot(engine, "GET", "/status", None).await;
  let body = json_body(resp).await;
  assert_eq!(body["discovery_queue"]["pending"][0]["symbol"], json!("MTHFR"));
}

#[tokio::test]
async fn seeding_an_invalid_symbol_is_bad_request() {
  let resp =
    oneshot(engine(CannedReasoning).await, "POST", "/discovery/seed", Some(json!({ "gene": "??" })))
      .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn query_returns_referenced_snps_and_history_id() {
  let engine = engine(CannedReasoning).await;
  let resp = oneshot(
    Arc::clone(&engine),
    "POST",
    "/query",
    Some(json!({ "query": "What about folate?" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);

  let body = json_body(resp).await;
  assert_eq!(body["response"], json!("See rs1801133."));
  assert_eq!(body["snps_found"][0]["rsid"], json!("rs1801133"));
  let history_id = body["history_id"].as_i64().unwrap();

  let resp = oneshot(engine, "GET", &format!("/citations/query/{history_id}"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["kind"], json!("query"));
}

#[tokio::test]
async fn empty_query_is_bad_request() {
  let resp =
    oneshot(engine(CannedReasoning).await, "POST", "/query", Some(json!({ "query": "  " }))).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unconfigured_reasoning_is_service_unavailable() {
  let resp =
    oneshot(engine(Unconfigured).await, "POST", "/query", Some(json!({ "query": "Anything?" })))
      .await;
  assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
  assert!(json_body(resp).await["error"].is_string());
}

#[tokio::test]
async fn hiding_unknown_history_entry_is_404() {
  let resp = oneshot(
    engine(CannedReasoning).await,
    "POST",
    "/history/999/hidden",
    Some(json!({ "hidden": true })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ─── Annotations ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn annotate_then_fetch_returns_interpretation() {
  let engine = engine(CannedReasoning).await;
  let resp =
    oneshot(Arc::clone(&engine), "POST", "/annotations/rs1801133/annotate", Some(json!({}))).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["outcome"], json!("improved"));
  assert_eq!(body["annotation"]["title"], json!("MTHFR C677T"));

  let resp = oneshot(engine, "GET", "/annotations/RS1801133", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["genotype"]["genotype"], json!("CT"));
  assert_eq!(body["interpretation"], json!("One copy of the T allele."));
}

#[tokio::test]
async fn unknown_rsid_is_404() {
  let resp = oneshot(engine(CannedReasoning).await, "GET", "/annotations/rs42", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_rsid_is_bad_request() {
  let resp = oneshot(engine(CannedReasoning).await, "GET", "/annotations/not-an-rsid", None).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_edit_is_bad_request() {
  let resp =
    oneshot(engine(CannedReasoning).await, "PUT", "/annotations/rs1801133", Some(json!({}))).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn revert_without_annotation_is_404() {
  let resp =
    oneshot(engine(CannedReasoning).await, "POST", "/annotations/rs1801133/revert", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn edit_is_visible_in_audit_log() {
  let engine = engine(CannedReasoning).await;
  let resp = oneshot(
    Arc::clone(&engine),
    "PUT",
    "/annotations/rs1801133",
    Some(json!({ "summary": "Checked by hand." })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);

  let resp =
    oneshot(Arc::clone(&engine), "GET", "/audit?data_type=annotation_edit", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let events = json_body(resp).await;
  assert_eq!(events.as_array().unwrap().len(), 1);
  assert_eq!(events[0]["reference_id"], json!("rs1801133"));
  let id = events[0]["id"].as_i64().unwrap();

  let resp = oneshot(Arc::clone(&engine), "GET", &format!("/audit/{id}"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let resp = oneshot(engine, "GET", "/audit/stats", None).await;
  assert_eq!(json_body(resp).await["total"], json!(1));
}

#[tokio::test]
async fn unknown_audit_event_is_404() {
  let resp = oneshot(engine(CannedReasoning).await, "GET", "/audit/12345", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_citation_kind_is_bad_request() {
  let resp = oneshot(engine(CannedReasoning).await, "GET", "/citations/bogus/1", None).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
