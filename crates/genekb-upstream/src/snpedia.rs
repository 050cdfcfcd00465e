//! [`ReferenceService`] backed by the SNPedia MediaWiki API.
//!
//! Pages are fetched as raw wikitext. Every failure (network, HTTP status,
//! missing page, unexpected JSON) is logged and reported as "nothing
//! available".

use std::time::Duration;

use genekb_core::reference::{NoReferences, ReferenceService, ReferenceSubject};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, error::Error, rate_limit::RateLimiter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
  pub enabled:         bool,
  pub base_url:        String,
  /// Minimum spacing between requests, to stay polite to the wiki.
  pub min_interval_ms: u64,
  pub timeout_secs:    u64,
}

impl Default for ReferenceConfig {
  fn default() -> Self {
    Self {
      enabled:         true,
      base_url:        "https://bots.snpedia.com/api.php".into(),
      min_interval_ms: 500,
      timeout_secs:    10,
    }
  }
}

#[derive(Deserialize)]
struct ParseResponse {
  parse: Option<ParsedPage>,
}

#[derive(Deserialize)]
struct ParsedPage {
  wikitext: Wikitext,
}

#[derive(Deserialize)]
struct Wikitext {
  #[serde(rename = "*")]
  text: String,
}

/// Extract page text from an `action=parse` reply. Error replies and empty
/// pages yield `None`.
fn page_text(body: &str) -> Result<Option<String>> {
  let response: ParseResponse = serde_json::from_str(body)?;
  Ok(
    response
      .parse
      .map(|p| p.wikitext.text)
      .filter(|t| !t.trim().is_empty()),
  )
}

fn page_title(subject: ReferenceSubject<'_>) -> String {
  match subject {
    ReferenceSubject::Variant(rsid) => rsid.to_ascii_lowercase(),
    ReferenceSubject::Gene(symbol) => symbol.to_owned(),
  }
}

pub struct SnpediaClient {
  http:     reqwest::Client,
  base_url: String,
  limiter:  RateLimiter,
}

impl SnpediaClient {
  pub fn new(config: &ReferenceConfig) -> Result<Self> {
    if config.base_url.trim().is_empty() {
      return Err(Error::InvalidConfig("references base_url is empty".into()));
    }
    let http = reqwest::Client::builder()
      .user_agent(concat!("genekb/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self {
      http,
      base_url: config.base_url.clone(),
      limiter: RateLimiter::new(Duration::from_millis(config.min_interval_ms)),
    })
  }

  async fn fetch_page(&self, title: &str) -> Result<Option<String>> {
    self.limiter.wait().await;
    let body = self
      .http
      .get(&self.base_url)
      .query(&[("action", "parse"), ("page", title), ("prop", "wikitext"), ("format", "json")])
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?;
    page_text(&body)
  }
}

impl ReferenceService for SnpediaClient {
  async fn fetch(&self, subject: ReferenceSubject<'_>) -> Option<String> {
    let title = page_title(subject);
    match self.fetch_page(&title).await {
      Ok(text) => {
        debug!(%title, found = text.is_some(), "reference lookup");
        text
      }
      Err(e) => {
        debug!(%title, error = %e, "reference lookup failed");
        None
      }
    }
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// The reference source chosen at startup.
pub enum References {
  Snpedia(SnpediaClient),
  Disabled(NoReferences),
}

impl References {
  pub fn from_config(config: &ReferenceConfig) -> Result<Self> {
    if config.enabled {
      Ok(Self::Snpedia(SnpediaClient::new(config)?))
    } else {
      Ok(Self::Disabled(NoReferences))
    }
  }
}

impl ReferenceService for References {
  async fn fetch(&self, subject: ReferenceSubject<'_>) -> Option<String> {
    match self {
      Self::Snpedia(client) => client.fetch(subject).await,
      Self::Disabled(none) => none.fetch(subject).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_reply_yields_wikitext() {
    let body = r#"{"parse": {"title": "Rs1801133", "pageid": 1, "wikitext": {"*": "{{Rsnum|rsid=1801133|Gene=MTHFR}}"}}}"#;
    assert_eq!(page_text(body).unwrap().as_deref(), Some("{{Rsnum|rsid=1801133|Gene=MTHFR}}"));
  }

  #[test]
  fn missing_page_yields_none() {
    let body = r#"{"error": {"code": "missingtitle", "info": "The page you specified doesn't exist."}}"#;
    assert_eq!(page_text(body).unwrap(), None);
    assert!(page_text("<html>").is_err());
  }

  #[test]
  fn variant_titles_are_lowercased() {
    assert_eq!(page_title(ReferenceSubject::Variant("RS1801133")), "rs1801133");
    assert_eq!(page_title(ReferenceSubject::Gene("MTHFR")), "MTHFR");
  }

  #[tokio::test]
  async fn disabled_references_are_always_absent() {
    let refs = References::from_config(&ReferenceConfig { enabled: false, ..Default::default() }).unwrap();
    assert!(refs.fetch(ReferenceSubject::Gene("MTHFR")).await.is_none());
  }
}
