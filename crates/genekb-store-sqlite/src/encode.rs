//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Maps, sets, lists and
//! metadata are stored as compact JSON. Enumerations are stored as their
//! lowercase names.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use genekb_core::{
  annotation::{Annotation, AnnotationSource, Repute},
  audit::AuditEvent,
  genotype::GenotypeRecord,
  history::QueryHistoryEntry,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_genotype_info(info: &BTreeMap<String, String>) -> Result<String> {
  Ok(serde_json::to_string(info)?)
}

pub fn encode_categories(categories: &BTreeSet<String>) -> Result<String> {
  Ok(serde_json::to_string(categories)?)
}

pub fn encode_rsids(rsids: &[String]) -> Result<String> { Ok(serde_json::to_string(rsids)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list shared by every `SELECT` that feeds [`RawAnnotation`].
pub const ANNOTATION_COLUMNS: &str = "a.rsid, a.title, a.summary, a.gene, a.genotype_info, \
                                      a.categories, a.magnitude, a.repute, a.source, a.improved_at";

/// Raw values read directly from an `annotations` row.
pub struct RawAnnotation {
  pub rsid:          String,
  pub title:         String,
  pub summary:       String,
  pub gene:          Option<String>,
  pub genotype_info: String,
  pub categories:    String,
  pub magnitude:     Option<f64>,
  pub repute:        Option<String>,
  pub source:        String,
  pub improved_at:   Option<String>,
}

impl RawAnnotation {
  /// Map a row selected with [`ANNOTATION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rsid:          row.get(0)?,
      title:         row.get(1)?,
      summary:       row.get(2)?,
      gene:          row.get(3)?,
      genotype_info: row.get(4)?,
      categories:    row.get(5)?,
      magnitude:     row.get(6)?,
      repute:        row.get(7)?,
      source:        row.get(8)?,
      improved_at:   row.get(9)?,
    })
  }

  pub fn into_annotation(self) -> Result<Annotation> {
    let repute = self.repute.as_deref().map(str::parse::<Repute>).transpose()?;
    let source = self.source.parse::<AnnotationSource>()?;
    let improved_at = self.improved_at.as_deref().map(decode_dt).transpose()?;

    Ok(Annotation {
      rsid: self.rsid,
      title: self.title,
      summary: self.summary,
      gene: self.gene,
      genotype_info: serde_json::from_str(&self.genotype_info)?,
      categories: serde_json::from_str(&self.categories)?,
      magnitude: self.magnitude,
      repute,
      source,
      improved_at,
    })
  }
}

/// Column list shared by every `SELECT` that feeds [`RawEvent`].
pub const EVENT_COLUMNS: &str =
  "id, timestamp, source, data_type, reference_id, content, metadata";

/// Raw values read directly from an `audit_log` row.
pub struct RawEvent {
  pub id:           i64,
  pub timestamp:    String,
  pub source:       String,
  pub data_type:    String,
  pub reference_id: Option<String>,
  pub content:      String,
  pub metadata:     String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      timestamp:    row.get(1)?,
      source:       row.get(2)?,
      data_type:    row.get(3)?,
      reference_id: row.get(4)?,
      content:      row.get(5)?,
      metadata:     row.get(6)?,
    })
  }

  pub fn into_event(self) -> Result<AuditEvent> {
    Ok(AuditEvent {
      id:           self.id,
      timestamp:    decode_dt(&self.timestamp)?,
      source:       self.source.parse()?,
      data_type:    self.data_type.parse()?,
      reference_id: self.reference_id,
      content:      self.content,
      metadata:     serde_json::from_str(&self.metadata)?,
    })
  }
}

pub const HISTORY_COLUMNS: &str = "id, query, response, snps_mentioned, created_at, hidden";

/// Raw values read directly from a `query_history` row.
pub struct RawHistory {
  pub id:             i64,
  pub query:          String,
  pub response:       String,
  pub snps_mentioned: String,
  pub created_at:     String,
  pub hidden:         bool,
}

impl RawHistory {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      query:          row.get(1)?,
      response:       row.get(2)?,
      snps_mentioned: row.get(3)?,
      created_at:     row.get(4)?,
      hidden:         row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<QueryHistoryEntry> {
    Ok(QueryHistoryEntry {
      id:             self.id,
      query:          self.query,
      response:       self.response,
      snps_mentioned: serde_json::from_str(&self.snps_mentioned)?,
      created_at:     decode_dt(&self.created_at)?,
      hidden:         self.hidden,
    })
  }
}

pub const GENOTYPE_COLUMNS: &str = "s.rsid, s.chromosome, s.position, s.genotype, s.gene";

/// Raw values read directly from a `snps` row.
pub struct RawGenotype {
  pub rsid:       String,
  pub chromosome: String,
  pub position:   i64,
  pub genotype:   String,
  pub gene:       Option<String>,
}

impl RawGenotype {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rsid:       row.get(0)?,
      chromosome: row.get(1)?,
      position:   row.get(2)?,
      genotype:   row.get(3)?,
      gene:       row.get(4)?,
    })
  }

  pub fn into_record(self) -> Result<GenotypeRecord> {
    let position = u64::try_from(self.position)
      .map_err(|_| Error::OutOfRange(format!("position {} for {}", self.position, self.rsid)))?;
    Ok(GenotypeRecord {
      rsid: self.rsid,
      chromosome: self.chromosome,
      position,
      genotype: self.genotype,
      gene: self.gene,
    })
  }
}
