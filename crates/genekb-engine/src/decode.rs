//! Strict decoding of reasoning-service output.
//!
//! The service is asked for JSON but answers in free text, so every decoder
//! first cuts the outermost JSON value out of the reply (tolerating code
//! fences and surrounding prose) and then validates it field by field.
//! Nothing is written to the store unless decoding succeeded.

use std::{
  collections::{BTreeMap, BTreeSet, HashSet},
  sync::LazyLock,
};

use genekb_core::{
  annotation::Repute,
  citation::{CitationKind, retain_citations},
  genotype::{normalize_gene_symbol, normalize_genotype, normalize_rsid},
};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

static RSID_MENTION: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)\brs[0-9]+\b").expect("static regex"));

#[derive(Debug, Error)]
pub enum ParseError {
  #[error("no JSON {0} found in reply")]
  NoJson(&'static str),

  #[error("malformed JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("missing or empty field `{0}`")]
  Missing(&'static str),

  #[error("invalid `{field}`: {reason}")]
  Invalid { field: &'static str, reason: String },
}

impl ParseError {
  fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
    Self::Invalid { field, reason: reason.into() }
  }
}

/// The slice from the first `open` to the last `close`, inclusive.
fn extract(text: &str, open: char, close: char) -> Option<&str> {
  let start = text.find(open)?;
  let end = text.rfind(close)?;
  (end > start).then(|| &text[start..=end])
}

// ─── Annotation ──────────────────────────────────────────────────────────────

/// A validated annotation proposal, not yet merged with the prior row.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDraft {
  pub title:         String,
  pub summary:       String,
  pub gene:          Option<String>,
  pub genotype_info: BTreeMap<String, String>,
  pub categories:    BTreeSet<String>,
  pub magnitude:     Option<f64>,
  pub repute:        Option<Repute>,
}

#[derive(Deserialize)]
struct RawDraft {
  title:         Option<String>,
  summary:       Option<String>,
  gene:          Option<String>,
  #[serde(default)]
  genotype_info: BTreeMap<String, String>,
  #[serde(default)]
  categories:    Vec<String>,
  magnitude:     Option<serde_json::Value>,
  repute:        Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ParseError> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
    .ok_or(ParseError::Missing(field))
}

/// Decode an annotation reply. Audit citations whose id is not in `offered`
/// are removed from the summary, as are citations of any other kind.
pub fn decode_annotation(text: &str, offered: &[i64]) -> Result<AnnotationDraft, ParseError> {
  let json = extract(text, '{', '}').ok_or(ParseError::NoJson("object"))?;
  let raw: RawDraft = serde_json::from_str(json)?;

  let title = required(raw.title, "title")?;
  let summary = required(raw.summary, "summary")?;
  let summary = retain_citations(&summary, |c| {
    c.kind == CitationKind::Audit && offered.contains(&c.id)
  })
  .trim()
  .to_owned();

  let mut genotype_info = BTreeMap::new();
  for (key, explanation) in raw.genotype_info {
    let genotype = normalize_genotype(&key);
    let explanation = explanation.trim();
    if genotype.is_empty() || explanation.is_empty() {
      return Err(ParseError::invalid("genotype_info", format!("bad entry for {key:?}")));
    }
    genotype_info.insert(genotype, explanation.to_owned());
  }
  if genotype_info.is_empty() {
    return Err(ParseError::Missing("genotype_info"));
  }

  let categories = raw
    .categories
    .iter()
    .map(|c| c.trim().to_lowercase())
    .filter(|c| !c.is_empty())
    .collect();

  let magnitude = match raw.magnitude {
    None | Some(serde_json::Value::Null) => None,
    Some(serde_json::Value::Number(n)) => match n.as_f64() {
      Some(m) if m.is_finite() && m >= 0.0 => Some(m),
      _ => return Err(ParseError::invalid("magnitude", format!("{n} is not a non-negative number"))),
    },
    Some(other) => return Err(ParseError::invalid("magnitude", format!("expected a number, got {other}"))),
  };

  let repute = match raw.repute.as_deref().map(str::trim) {
    None | Some("") => None,
    Some(r) if r.eq_ignore_ascii_case("null") || r.eq_ignore_ascii_case("none") => None,
    Some(r) => Some(r.parse::<Repute>().map_err(|e| ParseError::invalid("repute", e.to_string()))?),
  };

  let gene = match raw.gene.as_deref().map(str::trim) {
    None | Some("") => None,
    Some(g) => Some(normalize_gene_symbol(g).map_err(|e| ParseError::invalid("gene", e.to_string()))?),
  };

  Ok(AnnotationDraft { title, summary, gene, genotype_info, categories, magnitude, repute })
}

// ─── Query reply ─────────────────────────────────────────────────────────────

/// Something the answer points at in the genome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
  Variant(String),
  Gene(String),
}

impl Reference {
  /// Classify a raw string: rsids are variants, valid symbols are genes.
  pub fn parse(raw: &str) -> Option<Self> {
    if let Ok(rsid) = normalize_rsid(raw) {
      return Some(Self::Variant(rsid));
    }
    normalize_gene_symbol(raw).ok().map(Self::Gene)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryReply {
  pub answer:     String,
  /// De-duplicated, in order of first mention.
  pub references: Vec<Reference>,
}

#[derive(Deserialize)]
struct RawReply {
  answer:     String,
  #[serde(default)]
  references: Vec<String>,
}

/// Decode a query reply. Never fails: a reply that is not the requested JSON
/// is taken as the answer itself and scanned for rsids.
pub fn decode_query_reply(text: &str) -> QueryReply {
  let structured = extract(text, '{', '}')
    .and_then(|json| serde_json::from_str::<RawReply>(json).ok())
    .filter(|r| !r.answer.trim().is_empty());

  let (answer, raw_refs): (String, Vec<String>) = match structured {
    Some(r) => {
      let mut refs = r.references;
      refs.extend(RSID_MENTION.find_iter(&r.answer).map(|m| m.as_str().to_owned()));
      (r.answer.trim().to_owned(), refs)
    }
    None => {
      let refs = RSID_MENTION.find_iter(text).map(|m| m.as_str().to_owned()).collect();
      (text.trim().to_owned(), refs)
    }
  };

  let mut seen = HashSet::new();
  let references = raw_refs
    .iter()
    .filter_map(|r| Reference::parse(r))
    .filter(|r| seen.insert(r.clone()))
    .collect();

  QueryReply { answer, references }
}

// ─── Related genes ───────────────────────────────────────────────────────────

/// Decode a JSON array of gene symbols. Entries that are not valid symbols
/// are dropped; the result is de-duplicated and capped at `limit`.
pub fn decode_gene_list(text: &str, limit: usize) -> Result<Vec<String>, ParseError> {
  let json = extract(text, '[', ']').ok_or(ParseError::NoJson("array"))?;
  let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;

  let mut seen = HashSet::new();
  Ok(
    raw
      .iter()
      .filter_map(serde_json::Value::as_str)
      .filter_map(|s| normalize_gene_symbol(s).ok())
      .filter(|s| seen.insert(s.clone()))
      .take(limit)
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  const GOOD: &str = r#"Here you go:
```json
{
  "title": "MTHFR C677T",
  "summary": "Reduces folate metabolism {{audit:3}} and is common {{audit:99}}.",
  "gene": "mthfr",
  "genotype_info": { "C;T": "One copy, mildly reduced activity.", "tt": "Two copies." },
  "categories": ["Metabolism", " cardiovascular "],
  "magnitude": 2.5,
  "repute": "Bad"
}
```"#;

  #[test]
  fn decodes_fenced_annotation() {
    let draft = decode_annotation(GOOD, &[3]).unwrap();
    assert_eq!(draft.title, "MTHFR C677T");
    assert_eq!(draft.summary, "Reduces folate metabolism {{audit:3}} and is common.");
    assert_eq!(draft.gene.as_deref(), Some("MTHFR"));
    assert!(draft.genotype_info.contains_key("CT"));
    assert!(draft.genotype_info.contains_key("TT"));
    assert!(draft.categories.contains("metabolism"));
    assert!(draft.categories.contains("cardiovascular"));
    assert_eq!(draft.magnitude, Some(2.5));
    assert_eq!(draft.repute, Some(Repute::Bad));
  }

  #[test]
  fn rejects_missing_fields_and_bad_values() {
    assert!(matches!(decode_annotation("no json here", &[]), Err(ParseError::NoJson(_))));
    assert!(matches!(
      decode_annotation(r#"{"title": "x", "genotype_info": {"AA": "y"}}"#, &[]),
      Err(ParseError::Missing("summary"))
    ));
    assert!(matches!(
      decode_annotation(r#"{"title": "x", "summary": "y", "genotype_info": {}}"#, &[]),
      Err(ParseError::Missing("genotype_info"))
    ));
    assert!(matches!(
      decode_annotation(
        r#"{"title": "x", "summary": "y", "genotype_info": {"AA": "z"}, "magnitude": -1}"#,
        &[]
      ),
      Err(ParseError::Invalid { field: "magnitude", .. })
    ));
    assert!(matches!(
      decode_annotation(
        r#"{"title": "x", "summary": "y", "genotype_info": {"AA": "z"}, "repute": "great"}"#,
        &[]
      ),
      Err(ParseError::Invalid { field: "repute", .. })
    ));
  }

  #[test]
  fn query_reply_prefers_json_and_dedups() {
    let reply = decode_query_reply(
      r#"{"answer": "You carry two copies of rs429358 (APOE).", "references": ["APOE", "RS429358", "not a gene!"]}"#,
    );
    assert_eq!(reply.answer, "You carry two copies of rs429358 (APOE).");
    assert_eq!(reply.references, vec![
      Reference::Gene("APOE".into()),
      Reference::Variant("rs429358".into()),
    ]);
  }

  #[test]
  fn query_reply_falls_back_to_rsid_scan() {
    let reply = decode_query_reply("Look at rs1801133 and rs1801131, then rs1801133 again.");
    assert_eq!(reply.answer, "Look at rs1801133 and rs1801131, then rs1801133 again.");
    assert_eq!(reply.references, vec![
      Reference::Variant("rs1801133".into()),
      Reference::Variant("rs1801131".into()),
    ]);
  }

  #[test]
  fn gene_list_is_normalised_and_capped() {
    let genes = decode_gene_list(r#"Sure: ["mthfr", "COMT", "MTHFR", 7, "two words", "MTRR"]"#, 2).unwrap();
    assert_eq!(genes, vec!["MTHFR".to_owned(), "COMT".to_owned()]);
    assert!(decode_gene_list("none", 5).is_err());
  }
}
