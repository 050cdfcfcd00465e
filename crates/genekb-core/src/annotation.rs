//! Annotation types: the interpretive record kept for each rsid.
//!
//! There is at most one annotation per rsid. Writes overwrite in place; the
//! only history kept is the snpedia-sourced baseline, retained so an enriched
//! annotation can be reverted.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
  str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, genotype::normalize_genotype};

// ─── Repute ──────────────────────────────────────────────────────────────────

/// Qualitative direction of a variant's effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repute {
  Good,
  Bad,
  Neutral,
}

impl Repute {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Good => "good",
      Self::Bad => "bad",
      Self::Neutral => "neutral",
    }
  }
}

impl FromStr for Repute {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "good" => Ok(Self::Good),
      "bad" => Ok(Self::Bad),
      "neutral" => Ok(Self::Neutral),
      _ => Err(Error::UnknownVariant { kind: "repute", value: s.to_owned() }),
    }
  }
}

// ─── Source ──────────────────────────────────────────────────────────────────

/// Where the current text of an annotation came from.
///
/// Variants are declared in ascending precedence, so the derived `Ord` gives
/// `User > Claude > Snpedia`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSource {
  Snpedia,
  Claude,
  User,
}

impl AnnotationSource {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Snpedia => "snpedia",
      Self::Claude => "claude",
      Self::User => "user",
    }
  }

  /// Enriched annotations are never regenerated unless forced.
  pub fn is_enriched(self) -> bool { matches!(self, Self::Claude | Self::User) }
}

impl fmt::Display for AnnotationSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AnnotationSource {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "snpedia" => Ok(Self::Snpedia),
      "claude" => Ok(Self::Claude),
      "user" => Ok(Self::User),
      _ => Err(Error::UnknownVariant { kind: "annotation source", value: s.to_owned() }),
    }
  }
}

// ─── Annotation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
  pub rsid:          String,
  pub title:         String,
  /// Free text; may embed citation tokens (see [`crate::citation`]).
  pub summary:       String,
  pub gene:          Option<String>,
  /// Genotype key (normalised, e.g. `"CT"`) → plain-language explanation.
  pub genotype_info: BTreeMap<String, String>,
  pub categories:    BTreeSet<String>,
  /// Importance score; never negative.
  pub magnitude:     Option<f64>,
  pub repute:        Option<Repute>,
  pub source:        AnnotationSource,
  /// Set whenever the text was written by the reasoning service or a user.
  pub improved_at:   Option<DateTime<Utc>>,
}

impl Annotation {
  /// The explanation for a specific genotype, trying the reversed allele
  /// order as well (`"TC"` matches a `"CT"` entry).
  pub fn interpretation_for(&self, genotype: &str) -> Option<&str> {
    let key = normalize_genotype(genotype);
    if let Some(text) = self.genotype_info.get(&key) {
      return Some(text);
    }
    let reversed: String = key.chars().rev().collect();
    self.genotype_info.get(&reversed).map(String::as_str)
  }
}

/// The result of [`crate::store::KnowledgeStore::revert_annotation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "annotation", rename_all = "snake_case")]
pub enum RevertOutcome {
  /// The retained snpedia baseline was written back.
  Restored(Annotation),
  /// No baseline existed; the annotation row was removed.
  Cleared,
  /// There was no annotation for the rsid.
  Missing,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn source_precedence() {
    assert!(AnnotationSource::User > AnnotationSource::Claude);
    assert!(AnnotationSource::Claude > AnnotationSource::Snpedia);
    assert!(!AnnotationSource::Snpedia.is_enriched());
    assert!(AnnotationSource::User.is_enriched());
  }

  #[test]
  fn interpretation_matches_either_allele_order() {
    let mut info = BTreeMap::new();
    info.insert("CT".to_owned(), "one copy of the variant".to_owned());
    let ann = Annotation {
      rsid:          "rs1801133".into(),
      title:         "MTHFR C677T".into(),
      summary:       String::new(),
      gene:          Some("MTHFR".into()),
      genotype_info: info,
      categories:    BTreeSet::new(),
      magnitude:     None,
      repute:        None,
      source:        AnnotationSource::Claude,
      improved_at:   None,
    };
    assert_eq!(ann.interpretation_for("TC"), Some("one copy of the variant"));
    assert_eq!(ann.interpretation_for("c;t"), Some("one copy of the variant"));
    assert_eq!(ann.interpretation_for("TT"), None);
  }

  #[test]
  fn repute_parses_case_insensitively() {
    assert_eq!("Bad".parse::<Repute>().unwrap(), Repute::Bad);
    assert!("terrible".parse::<Repute>().is_err());
  }
}
