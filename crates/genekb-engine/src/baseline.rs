//! Reference annotations parsed from SNPedia wikitext.
//!
//! The parsed record is stored with source `snpedia` next to the first
//! improvement of an rsid, which makes it the row a revert restores.

use std::{collections::BTreeMap, sync::LazyLock};

use genekb_core::{
  annotation::{Annotation, AnnotationSource, Repute},
  genotype::normalize_gene_symbol,
};
use regex::{Captures, Regex};

fn re(pattern: &str) -> Regex { Regex::new(pattern).expect("static regex") }

static MAGNITUDE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\|\s*magnitude\s*=\s*([0-9]+(?:\.[0-9]+)?)"));
static REPUTE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\|\s*repute\s*=\s*([a-z]+)"));
static GENE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\|\s*gene\s*=\s*([^|}\n]+)"));
static TEMPLATE: LazyLock<Regex> = LazyLock::new(|| re(r"\{\{[^}]*\}\}"));
static WIKI_LINK: LazyLock<Regex> = LazyLock::new(|| re(r"\[\[([^\]|]+)(?:\|([^\]]*))?\]\]"));
static LABELLED_LINK: LazyLock<Regex> = LazyLock::new(|| re(r"\[https?://[^\]\s]+\s+([^\]]+)\]"));
static BARE_LINK: LazyLock<Regex> = LazyLock::new(|| re(r"\[https?://[^\]]+\]"));
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| re(r"'{2,3}"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| re(r"\s+"));

/// Sentences kept from the page body.
const SUMMARY_SENTENCES: usize = 3;
/// Fragments this short are template debris, not prose.
const MIN_SENTENCE_CHARS: usize = 20;

fn is_redirect(wikitext: &str) -> bool {
  wikitext.trim_start().to_ascii_uppercase().starts_with("#REDIRECT")
}

/// The first few sentences of prose, with templates and link markup removed.
pub fn summarize(wikitext: &str) -> Option<String> {
  if is_redirect(wikitext) {
    return None;
  }
  let text = TEMPLATE.replace_all(wikitext, "");
  let text = WIKI_LINK.replace_all(&text, |c: &Captures<'_>| {
    c.get(2)
      .filter(|label| !label.as_str().trim().is_empty())
      .or_else(|| c.get(1))
      .map_or_else(String::new, |m| m.as_str().to_owned())
  });
  let text = LABELLED_LINK.replace_all(&text, "$1");
  let text = BARE_LINK.replace_all(&text, "");
  let text = EMPHASIS.replace_all(&text, "");
  let text = WHITESPACE.replace_all(&text, " ");

  let sentences: Vec<&str> = text
    .split('.')
    .take(SUMMARY_SENTENCES)
    .map(str::trim)
    .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
    .collect();
  if sentences.is_empty() { None } else { Some(format!("{}.", sentences.join(". "))) }
}

/// Build the reference annotation for `rsid` from its page. Redirects and
/// pages with neither prose nor a magnitude yield `None`.
pub fn from_wikitext(rsid: &str, wikitext: &str, genotype_gene: Option<&str>) -> Option<Annotation> {
  if is_redirect(wikitext) {
    return None;
  }

  let capture = |re: &Regex| re.captures(wikitext).and_then(|c| c.get(1)).map(|m| m.as_str().trim());
  let magnitude = capture(&MAGNITUDE).and_then(|m| m.parse::<f64>().ok());
  let repute = capture(&REPUTE).and_then(|r| r.parse::<Repute>().ok());
  let gene = capture(&GENE)
    .and_then(|g| normalize_gene_symbol(g).ok())
    .or_else(|| genotype_gene.and_then(|g| normalize_gene_symbol(g).ok()));
  let summary = summarize(wikitext);

  if summary.is_none() && magnitude.is_none() {
    return None;
  }

  Some(Annotation {
    rsid: rsid.to_owned(),
    title: gene.as_deref().map_or_else(|| rsid.to_owned(), |g| format!("{g} {rsid}")),
    summary: summary.unwrap_or_default(),
    gene,
    genotype_info: BTreeMap::new(),
    categories: Default::default(),
    magnitude,
    repute,
    source: AnnotationSource::Snpedia,
    improved_at: None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  const PAGE: &str = "{{Rsnum\n|rsid=1801133\n|Gene=MTHFR\n|Chromosome=1\n|magnitude=2.5\n|repute=Bad\n}}\n\
    '''rs1801133''', also known as C677T, is one of the most studied [[SNP|SNPs]] in the \
    [[MTHFR]] gene. The T allele reduces the activity of the enzyme by roughly a third \
    [http://www.ncbi.nlm.nih.gov/pubmed/123 PMID 123]. See also.";

  #[test]
  fn parses_template_fields_and_prose() {
    let a = from_wikitext("rs1801133", PAGE, None).unwrap();
    assert_eq!(a.source, AnnotationSource::Snpedia);
    assert_eq!(a.gene.as_deref(), Some("MTHFR"));
    assert_eq!(a.title, "MTHFR rs1801133");
    assert_eq!(a.magnitude, Some(2.5));
    assert_eq!(a.repute, Some(Repute::Bad));
    assert!(a.summary.starts_with("rs1801133, also known as C677T, is one of the most studied SNPs in the MTHFR gene."));
    assert!(a.summary.contains("PMID 123"));
    assert!(!a.summary.contains("See also"));
  }

  #[test]
  fn redirects_and_empty_pages_yield_nothing() {
    assert!(from_wikitext("rs1", "#REDIRECT [[Rs2]]", None).is_none());
    assert!(from_wikitext("rs1", "{{Rsnum|rsid=1}}", None).is_none());
  }

  #[test]
  fn genotype_gene_fills_in_when_page_has_none() {
    let a = from_wikitext("rs1", "{{Rsnum|magnitude=1}}", Some("apoe")).unwrap();
    assert_eq!(a.gene.as_deref(), Some("APOE"));
    assert_eq!(a.summary, "");
  }
}
