//! Genotype records and the read-only [`GenotypeStore`] trait.
//!
//! Genotype data is imported once from an external file and never changes
//! afterwards. The engine only ever reads it.

use std::{future::Future, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

static RSID: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^rs[0-9]+$").expect("static regex"));

static GENE_SYMBOL: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9-]{0,19}$").expect("static regex"));

// ─── Record ──────────────────────────────────────────────────────────────────

/// One genotyped position from the imported dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenotypeRecord {
  pub rsid:       String,
  pub chromosome: String,
  pub position:   u64,
  /// Allele pair as reported by the genotyping chip, e.g. `"CT"`.
  pub genotype:   String,
  /// Gene symbol the position falls in, when the importer knows it.
  pub gene:       Option<String>,
}

impl GenotypeRecord {
  /// `--` and empty genotypes are no-calls: the chip failed to read them.
  pub fn is_called(&self) -> bool {
    let g = self.genotype.trim();
    !g.is_empty() && g != "--"
  }
}

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Lowercase and validate an rsid (`RS429358 ` → `rs429358`).
pub fn normalize_rsid(raw: &str) -> Result<String> {
  let rsid = raw.trim().to_ascii_lowercase();
  if RSID.is_match(&rsid) {
    Ok(rsid)
  } else {
    Err(Error::InvalidRsid(raw.to_owned()))
  }
}

/// Uppercase and validate a gene symbol (` mthfr` → `MTHFR`).
pub fn normalize_gene_symbol(raw: &str) -> Result<String> {
  let symbol = raw.trim().to_ascii_uppercase();
  if GENE_SYMBOL.is_match(&symbol) {
    Ok(symbol)
  } else {
    Err(Error::InvalidGeneSymbol(raw.to_owned()))
  }
}

/// Canonical genotype key: uppercase, separators removed (`"c;t"` → `"CT"`).
pub fn normalize_genotype(raw: &str) -> String {
  raw
    .chars()
    .filter(|c| c.is_ascii_alphabetic() || *c == '-')
    .map(|c| c.to_ascii_uppercase())
    .collect()
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Read-only access to the imported genotype dataset.
pub trait GenotypeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Look up the genotype for `rsid`. `None` means the SNP is not on file.
  fn get<'a>(
    &'a self,
    rsid: &'a str,
  ) -> impl Future<Output = Result<Option<GenotypeRecord>, Self::Error>> + Send + 'a;

  /// All rsids on file that belong to `gene` (normalised symbol).
  fn snps_for_gene<'a>(
    &'a self,
    gene: &'a str,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  /// Total number of genotyped positions.
  fn count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
