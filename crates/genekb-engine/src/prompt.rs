//! Prompt construction for the three kinds of reasoning call.

use std::fmt::Write as _;

use genekb_core::{
  annotation::Annotation,
  audit::AuditEvent,
  citation::Citation,
  genotype::GenotypeRecord,
  reasoning::{CompletionRequest, ModelTier},
};

const ANNOTATION_SYSTEM: &str = "You are a genetics research assistant writing clear, accurate \
                                 annotations of SNPs for a person reading their own genome. Use \
                                 plain language and avoid medical advice.";

const QUERY_SYSTEM: &str = "You are a genetics research assistant with access to the user's \
                            genotype data. Answer the question directly and name the specific \
                            rsids or gene symbols your answer relies on.";

const ANNOTATION_MAX_TOKENS: u32 = 1_500;
const QUERY_MAX_TOKENS: u32 = 2_048;
const RELATED_MAX_TOKENS: u32 = 400;

/// Longest reference excerpt passed along verbatim.
const REFERENCE_EXCERPT: usize = 4_000;

fn excerpt(text: &str, max: usize) -> &str {
  match text.char_indices().nth(max) {
    Some((i, _)) => &text[..i],
    None => text,
  }
}

// ─── Annotation ──────────────────────────────────────────────────────────────

pub struct AnnotationContext<'a> {
  pub genotype:     &'a GenotypeRecord,
  pub reference:    Option<&'a str>,
  pub prior:        Option<&'a Annotation>,
  pub instructions: Option<&'a str>,
  /// Recent audit events about this SNP, offered as citable evidence.
  pub evidence:     &'a [AuditEvent],
}

pub fn annotation(ctx: &AnnotationContext<'_>) -> CompletionRequest {
  let g = ctx.genotype;
  let mut p = String::new();

  let _ = writeln!(p, "Write an annotation for the SNP {}.", g.rsid);
  let _ = writeln!(p, "Chromosome {}, position {}.", g.chromosome, g.position);
  let _ = writeln!(p, "The person's genotype is {}.", g.genotype);
  if let Some(gene) = &g.gene {
    let _ = writeln!(p, "The SNP lies in {gene}.");
  }

  if let Some(reference) = ctx.reference {
    let _ = writeln!(p, "\nReference material:\n{}", excerpt(reference, REFERENCE_EXCERPT));
  }

  if let Some(prior) = ctx.prior {
    let _ = writeln!(p, "\nCurrent annotation ({}):", prior.source);
    let _ = writeln!(p, "Title: {}", prior.title);
    let _ = writeln!(p, "Summary: {}", prior.summary);
    for (genotype, text) in &prior.genotype_info {
      let _ = writeln!(p, "  {genotype}: {text}");
    }
  }

  if !ctx.evidence.is_empty() {
    p.push_str("\nEarlier findings about this SNP. Cite one by copying its token into the summary:\n");
    for event in ctx.evidence {
      let _ = writeln!(p, "{} {}", Citation::audit(event.id), event.content);
    }
  }

  if let Some(instructions) = ctx.instructions {
    let _ = writeln!(p, "\nAdditional instructions: {instructions}");
  }

  p.push_str(
    "\nReply with JSON only, in exactly this shape:\n\
     {\n  \"title\": \"short name of the variant\",\n  \"summary\": \"2-3 sentences\",\n  \
     \"gene\": \"gene symbol or null\",\n  \"genotype_info\": {\"AA\": \"what AA means\"},\n  \
     \"categories\": [\"lowercase topic\"],\n  \"magnitude\": 0.0,\n  \
     \"repute\": \"good | bad | neutral | null\"\n}\n\
     Only include genotypes that are relevant for this SNP. Magnitude runs from 0 (trivial) \
     to 10 (severe).",
  );

  CompletionRequest::new(p, ModelTier::Standard, ANNOTATION_MAX_TOKENS).with_system(ANNOTATION_SYSTEM)
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// A compact picture of the genome and recent work, sent with every query.
pub struct GenomeSummary {
  pub snp_count:        u64,
  pub annotation_count: u64,
  pub notable:          Vec<Annotation>,
  pub recent:           Vec<AuditEvent>,
}

pub fn query(question: &str, summary: &GenomeSummary) -> CompletionRequest {
  let mut p = String::new();

  let _ = writeln!(
    p,
    "The genome has {} genotyped SNPs, {} of them annotated.",
    summary.snp_count, summary.annotation_count
  );
  if !summary.notable.is_empty() {
    p.push_str("Notable variants:\n");
    for a in &summary.notable {
      let _ = writeln!(
        p,
        "- {} ({}): {}, magnitude {}",
        a.rsid,
        a.gene.as_deref().unwrap_or("unknown gene"),
        a.title,
        a.magnitude.map_or_else(|| "?".to_owned(), |m| m.to_string()),
      );
    }
  }
  if !summary.recent.is_empty() {
    p.push_str("Recently improved:\n");
    for e in &summary.recent {
      let _ = writeln!(p, "- {}", e.content);
    }
  }

  let _ = writeln!(p, "\nQuestion: {question}");
  p.push_str(
    "\nReply with JSON only:\n\
     {\"answer\": \"your answer\", \"references\": [\"rs123\", \"GENE\"]}\n\
     List every rsid or gene symbol the answer depends on in `references`.",
  );

  CompletionRequest::new(p, ModelTier::Standard, QUERY_MAX_TOKENS).with_system(QUERY_SYSTEM)
}

// ─── Related genes ───────────────────────────────────────────────────────────

/// `reference` is the subject's reference page, when one was found.
pub fn related_genes(subject: &str, limit: usize, reference: Option<&str>) -> CompletionRequest {
  let mut p = format!(
    "List up to {limit} human genes that are functionally related to {subject}: same pathway, \
     interacting proteins, or shared disease associations.\n"
  );
  if let Some(reference) = reference {
    let _ = writeln!(p, "\nReference material on {subject}:\n{}\n", excerpt(reference, REFERENCE_EXCERPT));
  }
  p.push_str(
    "Reply with a JSON array of official HGNC gene symbols only, e.g. [\"COMT\", \"MTRR\"].",
  );
  CompletionRequest::new(p, ModelTier::Fast, RELATED_MAX_TOKENS)
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use genekb_core::audit::{DataType, EventSource};

  use super::*;

  #[test]
  fn annotation_prompt_offers_citation_tokens() {
    let genotype = GenotypeRecord {
      rsid:       "rs1801133".into(),
      chromosome: "1".into(),
      position:   11856378,
      genotype:   "CT".into(),
      gene:       Some("MTHFR".into()),
    };
    let evidence = vec![AuditEvent {
      id:           42,
      timestamp:    Utc::now(),
      source:       EventSource::Discovery,
      data_type:    DataType::GeneDiscovery,
      reference_id: Some("rs1801133".into()),
      content:      "Found via COMT".into(),
      metadata:     serde_json::Value::Null,
    }];
    let req = annotation(&AnnotationContext {
      genotype:     &genotype,
      reference:    Some("MTHFR C677T reduces enzyme activity."),
      prior:        None,
      instructions: Some("mention folate"),
      evidence:     &evidence,
    });

    assert_eq!(req.tier, ModelTier::Standard);
    assert!(req.prompt.contains("{{audit:42}} Found via COMT"));
    assert!(req.prompt.contains("genotype is CT"));
    assert!(req.prompt.contains("mention folate"));
  }

  #[test]
  fn related_genes_uses_fast_tier() {
    let req = related_genes("MTHFR", 10, None);
    assert_eq!(req.tier, ModelTier::Fast);
    assert!(req.prompt.contains("up to 10"));
    assert!(!req.prompt.contains("Reference material"));
  }

  #[test]
  fn related_genes_includes_the_gene_page() {
    let req = related_genes("MTHFR", 10, Some("MTHFR encodes methylenetetrahydrofolate reductase."));
    assert!(req.prompt.contains("Reference material on MTHFR:\nMTHFR encodes"));
    assert!(req.prompt.ends_with("e.g. [\"COMT\", \"MTRR\"]."));
  }
}
