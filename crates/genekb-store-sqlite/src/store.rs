//! [`SqliteStore`]: the SQLite implementation of [`GenotypeStore`] and
//! [`KnowledgeStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use genekb_core::{
  annotation::{Annotation, AnnotationSource, RevertOutcome},
  audit::{AuditEvent, AuditQuery, AuditStats, NewAuditEvent},
  genotype::{GenotypeRecord, GenotypeStore},
  history::{NewQueryHistory, QueryHistoryEntry},
  store::KnowledgeStore,
};

use crate::{
  Result,
  encode::{
    ANNOTATION_COLUMNS, EVENT_COLUMNS, GENOTYPE_COLUMNS, HISTORY_COLUMNS, RawAnnotation,
    RawEvent, RawGenotype, RawHistory, encode_categories, encode_dt, encode_genotype_info,
    encode_rsids,
  },
  error::Error,
  schema::SCHEMA,
};

/// Default number of audit events returned when a query sets no limit.
const DEFAULT_EVENT_LIMIT: usize = 100;

/// What the revert transaction found, before decoding.
enum RawRevert {
  Restored(RawAnnotation),
  Cleared,
  Missing,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A genekb store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a private in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Bulk-load genotype calls. Existing rows for the same rsid are replaced.
  ///
  /// This is the hook for the external genotype-file importer; the engine
  /// itself never writes genotypes.
  pub async fn insert_genotypes(&self, records: Vec<GenotypeRecord>) -> Result<usize> {
    let mut rows = Vec::with_capacity(records.len());
    for r in records {
      let position = i64::try_from(r.position)
        .map_err(|_| Error::OutOfRange(format!("position {} for {}", r.position, r.rsid)))?;
      rows.push((
        r.rsid.to_ascii_lowercase(),
        r.chromosome,
        position,
        r.genotype,
        r.gene.map(|g| g.trim().to_ascii_uppercase()),
      ));
    }

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO snps (rsid, chromosome, position, genotype, gene)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for (rsid, chromosome, position, genotype, gene) in &rows {
            stmt.execute(rusqlite::params![rsid, chromosome, position, genotype, gene])?;
          }
        }
        tx.commit()?;
        Ok(rows.len())
      })
      .await?;
    Ok(inserted)
  }

  async fn read_annotation(&self, rsid: String) -> Result<Option<Annotation>> {
    let raw: Option<RawAnnotation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ANNOTATION_COLUMNS} FROM annotations a WHERE a.rsid = ?1"),
              rusqlite::params![rsid],
              RawAnnotation::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAnnotation::into_annotation).transpose()
  }
}

// ─── GenotypeStore impl ──────────────────────────────────────────────────────

impl GenotypeStore for SqliteStore {
  type Error = Error;

  async fn get(&self, rsid: &str) -> Result<Option<GenotypeRecord>> {
    let rsid = rsid.to_ascii_lowercase();

    let raw: Option<RawGenotype> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {GENOTYPE_COLUMNS} FROM snps s WHERE s.rsid = ?1"),
              rusqlite::params![rsid],
              RawGenotype::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawGenotype::into_record).transpose()
  }

  async fn snps_for_gene(&self, gene: &str) -> Result<Vec<String>> {
    let gene = gene.trim().to_ascii_uppercase();

    // A SNP belongs to a gene if the importer said so, or if its annotation
    // names the gene. No-calls are never returned.
    let rsids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT s.rsid FROM snps s
           WHERE s.gene = ?1 AND s.genotype NOT IN ('', '--')
           UNION
           SELECT s.rsid FROM snps s
           JOIN annotations a ON a.rsid = s.rsid
           WHERE UPPER(a.gene) = ?1 AND s.genotype NOT IN ('', '--')
           ORDER BY 1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![gene], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rsids)
  }

  async fn count(&self) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM snps", [], |r| r.get(0))?))
      .await?;
    Ok(n.max(0) as u64)
  }
}

// ─── KnowledgeStore impl ─────────────────────────────────────────────────────

impl KnowledgeStore for SqliteStore {
  type Error = Error;

  // ── Annotations ───────────────────────────────────────────────────────────

  async fn get_annotation(&self, rsid: &str) -> Result<Option<Annotation>> {
    self.read_annotation(rsid.to_ascii_lowercase()).await
  }

  async fn upsert_annotation(&self, annotation: Annotation) -> Result<Annotation> {
    let rsid          = annotation.rsid.to_ascii_lowercase();
    let title         = annotation.title.clone();
    let summary       = annotation.summary.clone();
    let gene          = annotation.gene.clone();
    let genotype_info = encode_genotype_info(&annotation.genotype_info)?;
    let categories    = encode_categories(&annotation.categories)?;
    let magnitude     = annotation.magnitude;
    let repute        = annotation.repute.map(|r| r.as_str());
    let source        = annotation.source;
    let improved_at   = annotation.improved_at.map(encode_dt);
    let now           = encode_dt(Utc::now());
    let key           = rsid.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if source == AnnotationSource::Snpedia {
          // A fresh reference baseline supersedes any retained one.
          tx.execute(
            "DELETE FROM annotation_baselines WHERE rsid = ?1",
            rusqlite::params![rsid],
          )?;
        } else {
          // Capture the snpedia row the first time it is overwritten. An
          // existing baseline is kept as-is.
          tx.execute(
            "INSERT OR IGNORE INTO annotation_baselines
               (rsid, title, summary, gene, genotype_info, categories,
                magnitude, repute, captured_at)
             SELECT rsid, title, summary, gene, genotype_info, categories,
                    magnitude, repute, ?2
             FROM annotations WHERE rsid = ?1 AND source = 'snpedia'",
            rusqlite::params![rsid, now],
          )?;
        }

        tx.execute(
          "INSERT INTO annotations
             (rsid, title, summary, gene, genotype_info, categories,
              magnitude, repute, source, improved_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT(rsid) DO UPDATE SET
             title         = excluded.title,
             summary       = excluded.summary,
             gene          = excluded.gene,
             genotype_info = excluded.genotype_info,
             categories    = excluded.categories,
             magnitude     = excluded.magnitude,
             repute        = excluded.repute,
             source        = excluded.source,
             improved_at   = excluded.improved_at,
             updated_at    = excluded.updated_at",
          rusqlite::params![
            rsid,
            title,
            summary,
            gene,
            genotype_info,
            categories,
            magnitude,
            repute,
            source.as_str(),
            improved_at,
            now,
          ],
        )?;

        tx.commit()?;
        Ok(())
      })
      .await?;

    self
      .read_annotation(key)
      .await?
      .ok_or_else(|| Error::OutOfRange(format!("annotation {} vanished after upsert", annotation.rsid)))
  }

  async fn revert_annotation(&self, rsid: &str) -> Result<RevertOutcome> {
    let rsid = rsid.to_ascii_lowercase();
    let now  = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM annotations WHERE rsid = ?1",
            rusqlite::params![rsid],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(RawRevert::Missing);
        }

        let restored = tx.execute(
          "INSERT OR REPLACE INTO annotations
             (rsid, title, summary, gene, genotype_info, categories,
              magnitude, repute, source, improved_at, updated_at)
           SELECT rsid, title, summary, gene, genotype_info, categories,
                  magnitude, repute, 'snpedia', NULL, ?2
           FROM annotation_baselines WHERE rsid = ?1",
          rusqlite::params![rsid, now],
        )?;

        let outcome = if restored > 0 {
          tx.execute(
            "DELETE FROM annotation_baselines WHERE rsid = ?1",
            rusqlite::params![rsid],
          )?;
          let row = tx.query_row(
            &format!("SELECT {ANNOTATION_COLUMNS} FROM annotations a WHERE a.rsid = ?1"),
            rusqlite::params![rsid],
            RawAnnotation::from_row,
          )?;
          RawRevert::Restored(row)
        } else {
          tx.execute("DELETE FROM annotations WHERE rsid = ?1", rusqlite::params![rsid])?;
          RawRevert::Cleared
        };

        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    Ok(match raw {
      RawRevert::Restored(row) => RevertOutcome::Restored(row.into_annotation()?),
      RawRevert::Cleared => RevertOutcome::Cleared,
      RawRevert::Missing => RevertOutcome::Missing,
    })
  }

  async fn notable_annotations(&self, min_magnitude: f64, limit: usize) -> Result<Vec<Annotation>> {
    let limit = limit as i64;

    let raws: Vec<RawAnnotation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ANNOTATION_COLUMNS}
           FROM annotations a
           JOIN snps s ON s.rsid = a.rsid
           WHERE a.magnitude >= ?1
           ORDER BY a.magnitude DESC, a.rsid
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![min_magnitude, limit], RawAnnotation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAnnotation::into_annotation).collect()
  }

  async fn annotation_count(&self) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM annotations", [], |r| r.get(0))?))
      .await?;
    Ok(n.max(0) as u64)
  }

  async fn unannotated_sample(&self, limit: usize) -> Result<Vec<GenotypeRecord>> {
    let limit = limit as i64;

    let raws: Vec<RawGenotype> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {GENOTYPE_COLUMNS}
           FROM snps s
           LEFT JOIN annotations a ON a.rsid = s.rsid
           WHERE a.rsid IS NULL AND s.genotype NOT IN ('', '--')
           ORDER BY RANDOM()
           LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit], RawGenotype::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGenotype::into_record).collect()
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn append_event(&self, event: NewAuditEvent) -> Result<AuditEvent> {
    let timestamp    = Utc::now();
    let ts_str       = encode_dt(timestamp);
    let source       = event.source.as_str();
    let data_type    = event.data_type.as_str();
    let reference_id = event.reference_id.clone();
    let content      = event.content.clone();
    let metadata     = serde_json::to_string(&event.metadata)?;

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_log (timestamp, source, data_type, reference_id, content, metadata)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![ts_str, source, data_type, reference_id, content, metadata],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(AuditEvent {
      id,
      timestamp,
      source: event.source,
      data_type: event.data_type,
      reference_id: event.reference_id,
      content: event.content,
      metadata: event.metadata,
    })
  }

  async fn get_event(&self, id: i64) -> Result<Option<AuditEvent>> {
    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {EVENT_COLUMNS} FROM audit_log WHERE id = ?1"),
              rusqlite::params![id],
              RawEvent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEvent::into_event).transpose()
  }

  async fn query_events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
    let source       = query.source.map(|s| s.as_str());
    let data_type    = query.data_type.map(|t| t.as_str());
    let reference_id = query.reference_id.clone();
    let pattern      = query.search.as_deref().map(|t| format!("%{t}%"));
    let limit        = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT) as i64;

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM audit_log
           WHERE (?1 IS NULL OR source = ?1)
             AND (?2 IS NULL OR data_type = ?2)
             AND (?3 IS NULL OR reference_id = ?3)
             AND (?4 IS NULL OR content LIKE ?4)
           ORDER BY id DESC
           LIMIT ?5"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![source, data_type, reference_id, pattern, limit],
            RawEvent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn event_stats(&self) -> Result<AuditStats> {
    let (total, by_source, by_type) = self
      .conn
      .call(|conn| {
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |r| r.get(0))?;

        let mut stmt = conn.prepare("SELECT source, COUNT(*) FROM audit_log GROUP BY source")?;
        let by_source = stmt
          .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt =
          conn.prepare("SELECT data_type, COUNT(*) FROM audit_log GROUP BY data_type")?;
        let by_type = stmt
          .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((total, by_source, by_type))
      })
      .await?;

    Ok(AuditStats {
      total:     total.max(0) as u64,
      by_source: by_source.into_iter().map(|(k, n)| (k, n.max(0) as u64)).collect(),
      by_type:   by_type.into_iter().map(|(k, n)| (k, n.max(0) as u64)).collect(),
    })
  }

  // ── Query history ─────────────────────────────────────────────────────────

  async fn record_query(&self, entry: NewQueryHistory) -> Result<QueryHistoryEntry> {
    let created_at = Utc::now();
    let at_str     = encode_dt(created_at);
    let rsids      = encode_rsids(&entry.snps_mentioned)?;
    let query      = entry.query.clone();
    let response   = entry.response.clone();

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO query_history (query, response, snps_mentioned, created_at, hidden)
           VALUES (?1, ?2, ?3, ?4, 0)",
          rusqlite::params![query, response, rsids, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(QueryHistoryEntry {
      id,
      query: entry.query,
      response: entry.response,
      snps_mentioned: entry.snps_mentioned,
      created_at,
      hidden: false,
    })
  }

  async fn get_query(&self, id: i64) -> Result<Option<QueryHistoryEntry>> {
    let raw: Option<RawHistory> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {HISTORY_COLUMNS} FROM query_history WHERE id = ?1"),
              rusqlite::params![id],
              RawHistory::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawHistory::into_entry).transpose()
  }

  async fn list_queries(&self, limit: usize, include_hidden: bool) -> Result<Vec<QueryHistoryEntry>> {
    let limit = limit as i64;

    let raws: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {HISTORY_COLUMNS} FROM query_history
           WHERE ?1 OR hidden = 0
           ORDER BY id DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![include_hidden, limit], RawHistory::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistory::into_entry).collect()
  }

  async fn set_query_hidden(&self, id: i64, hidden: bool) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE query_history SET hidden = ?2 WHERE id = ?1",
          rusqlite::params![id, hidden],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }
}
