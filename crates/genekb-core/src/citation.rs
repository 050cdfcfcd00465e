//! Citation tokens embedded in annotation text.
//!
//! A token has the textual form `{{kind:id}}`, e.g. `{{audit:42}}`. The core
//! never renders citations; it only guarantees that every id it writes into
//! stored text can be looked up. Resolution is left to whoever displays the
//! text.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::Error;

static TOKEN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\{\{\s*([a-z_]+)\s*:\s*([0-9]+)\s*\}\}").expect("static regex"));

/// The record type a citation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationKind {
  /// An [`crate::audit::AuditEvent`] id.
  Audit,
  /// A [`crate::history::QueryHistoryEntry`] id.
  Query,
}

impl CitationKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Audit => "audit",
      Self::Query => "query",
    }
  }
}

impl FromStr for CitationKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "audit" => Ok(Self::Audit),
      "query" => Ok(Self::Query),
      _ => Err(Error::UnknownVariant { kind: "citation kind", value: s.to_owned() }),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
  pub kind: CitationKind,
  pub id:   i64,
}

impl Citation {
  pub fn audit(id: i64) -> Self { Self { kind: CitationKind::Audit, id } }
}

impl fmt::Display for Citation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{{{{{}:{}}}}}", self.kind.as_str(), self.id)
  }
}

fn from_captures(caps: &Captures<'_>) -> Option<Citation> {
  let kind = caps.get(1)?.as_str().parse().ok()?;
  let id = caps.get(2)?.as_str().parse().ok()?;
  Some(Citation { kind, id })
}

/// Every well-formed citation in `text`, in order of appearance.
pub fn parse_citations(text: &str) -> Vec<Citation> {
  TOKEN.captures_iter(text).filter_map(|c| from_captures(&c)).collect()
}

/// Rewrite `text`, keeping citations for which `keep` returns true (in
/// canonical form) and deleting all other `{{...:n}}` tokens, including ones
/// with an unknown kind.
pub fn retain_citations(text: &str, keep: impl Fn(&Citation) -> bool) -> String {
  let rewritten = TOKEN.replace_all(text, |caps: &Captures<'_>| match from_captures(caps) {
    Some(citation) if keep(&citation) => citation.to_string(),
    _ => String::new(),
  });
  // Removing a token can leave a dangling space before punctuation.
  rewritten.replace(" .", ".").replace(" ,", ",").replace("  ", " ")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_round_trips_through_parse() {
    let c = Citation::audit(42);
    assert_eq!(c.to_string(), "{{audit:42}}");
    assert_eq!(parse_citations(&format!("see {c} and {{{{query:7}}}}")), vec![
      c,
      Citation { kind: CitationKind::Query, id: 7 },
    ]);
  }

  #[test]
  fn unknown_kinds_are_not_citations() {
    assert!(parse_citations("{{wiki:3}}").is_empty());
  }

  #[test]
  fn retain_drops_unoffered_ids() {
    let text = "Raises homocysteine {{audit:3}}, common in Europe {{ audit : 99 }}.";
    let out = retain_citations(text, |c| c.id == 3);
    assert_eq!(out, "Raises homocysteine {{audit:3}}, common in Europe.");
  }
}
