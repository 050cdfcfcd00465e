//! Best-effort reference text for a SNP or gene.

use std::{fmt, future::Future};

/// What to fetch reference text about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSubject<'a> {
  Variant(&'a str),
  Gene(&'a str),
}

impl fmt::Display for ReferenceSubject<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Variant(rsid) => f.write_str(rsid),
      Self::Gene(symbol) => f.write_str(symbol),
    }
  }
}

/// A source of raw scientific text.
///
/// Implementations swallow their own failures: `None` means "nothing
/// available", whatever the reason.
pub trait ReferenceService: Send + Sync {
  fn fetch<'a>(
    &'a self,
    subject: ReferenceSubject<'a>,
  ) -> impl Future<Output = Option<String>> + Send + 'a;
}

/// A reference service that never has anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl ReferenceService for NoReferences {
  async fn fetch(&self, _subject: ReferenceSubject<'_>) -> Option<String> { None }
}
