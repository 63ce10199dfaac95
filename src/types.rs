//! Core types and errors for the discovery engine.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during discovery.
///
/// Only [`RestlessError::InvalidInput`] ever escapes a discovery run. The
/// other variants are produced internally and absorbed into a partial
/// [`Finding`].
#[derive(Error, Debug)]
pub enum RestlessError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("discovery budget exhausted")]
    BudgetExhausted,

    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("could not parse {url}: {reason}")]
    ParseFailure { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, RestlessError>;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Declared in an OpenAPI/Swagger document.
    Doc,
    /// Listed in a sitemap.
    Sitemap,
    /// Answered a probe from the curated common-path list.
    CommonPath,
    /// Answered a variant derived from an observed path shape.
    Fuzz,
    /// Confirmed by the post-discovery verify pass.
    Verify,
    /// Guessed without any network traffic.
    Heuristic,
}

impl SourceKind {
    /// Default evidence weight for observations of this kind.
    ///
    /// Machine-declared documentation outranks everything; guesses rank last.
    pub fn weight(self) -> f64 {
        match self {
            SourceKind::Doc => 0.9,
            SourceKind::Verify => 0.6,
            SourceKind::CommonPath => 0.5,
            SourceKind::Fuzz => 0.4,
            SourceKind::Sitemap => 0.3,
            SourceKind::Heuristic => 0.1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Doc => "doc",
            SourceKind::Sitemap => "sitemap",
            SourceKind::CommonPath => "common-path",
            SourceKind::Fuzz => "fuzz",
            SourceKind::Verify => "verify",
            SourceKind::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation supporting an endpoint or base-URL hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    /// Kind of source that produced the observation.
    pub source: SourceKind,
    /// The URL that was observed.
    pub url: String,
    /// RFC 3339 timestamp of the observation.
    pub when: String,
    /// Strength of the observation, always within [0, 1].
    pub score: f64,
}

impl Evidence {
    /// Create evidence stamped now, weighted by its source kind.
    pub fn new(source: SourceKind, url: impl Into<String>) -> Self {
        Self::with_score(source, url, source.weight())
    }

    /// Create evidence with an explicit score (clamped to [0, 1]).
    pub fn with_score(source: SourceKind, url: impl Into<String>, score: f64) -> Self {
        Self {
            source,
            url: url.into(),
            when: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            score: clamp_unit(score),
        }
    }
}

/// Something an extractor learned about the target.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Evidence that `method path` exists.
    Endpoint {
        method: String,
        path: String,
        evidence: Evidence,
    },
    /// Evidence that `url` serves the API.
    BaseUrl { url: String, evidence: Evidence },
    /// A documentation URL, parsed or not.
    DocUrl { url: String },
}

impl Observation {
    pub fn endpoint(method: &str, path: impl Into<String>, evidence: Evidence) -> Self {
        Observation::Endpoint {
            method: method.to_ascii_uppercase(),
            path: path.into(),
            evidence,
        }
    }

    pub fn base_url(url: impl Into<String>, evidence: Evidence) -> Self {
        Observation::BaseUrl {
            url: url.into(),
            evidence,
        }
    }

    pub fn doc_url(url: impl Into<String>) -> Self {
        Observation::DocUrl { url: url.into() }
    }
}

/// A discovered endpoint with the evidence backing it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointCandidate {
    pub method: String,
    /// Path template, may contain `{param}` segments.
    pub path: String,
    /// Combined score of all evidence.
    pub score: f64,
    pub evidence: Vec<Evidence>,
}

impl EndpointCandidate {
    /// Number of distinct source kinds backing this candidate.
    pub fn source_diversity(&self) -> usize {
        let mut kinds: Vec<SourceKind> = self.evidence.iter().map(|e| e.source).collect();
        kinds.sort();
        kinds.dedup();
        kinds.len()
    }
}

/// The complete result of one discovery run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub domain: String,
    pub base_urls: Vec<String>,
    pub doc_urls: Vec<String>,
    /// Sorted by descending score, then path.
    pub endpoints: Vec<EndpointCandidate>,
    pub confidence: f64,
}

impl Finding {
    /// True when the run completed without finding any endpoint.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn outcome(&self) -> Outcome {
        if self.is_empty() {
            Outcome::Empty
        } else {
            Outcome::Found
        }
    }
}

/// How a completed run should be reported by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// At least one endpoint was found.
    Found,
    /// The run completed but found no endpoints.
    Empty,
}

impl Outcome {
    /// Process exit code for this outcome (hard errors use 1).
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Found => 0,
            Outcome::Empty => 2,
        }
    }
}

/// Configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Upper bound for a single request; the budget deadline may cut it shorter.
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Response bodies are truncated to this many bytes.
    pub max_body_bytes: usize,
    /// Requests per second across the whole run.
    pub rate_limit: u32,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_redirects: 5,
            max_body_bytes: 2 * 1024 * 1024,
            rate_limit: 10,
            user_agent: format!("restless/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Clamp a score into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_score_is_clamped() {
        assert_eq!(Evidence::with_score(SourceKind::Fuzz, "u", 1.7).score, 1.0);
        assert_eq!(Evidence::with_score(SourceKind::Fuzz, "u", -0.2).score, 0.0);
        assert_eq!(Evidence::with_score(SourceKind::Fuzz, "u", f64::NAN).score, 0.0);
    }

    #[test]
    fn test_evidence_timestamp_is_rfc3339() {
        let evidence = Evidence::new(SourceKind::Doc, "https://example.com/openapi.json");
        assert!(chrono::DateTime::parse_from_rfc3339(&evidence.when).is_ok());
        assert_eq!(evidence.score, 0.9);
    }

    #[test]
    fn test_source_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&SourceKind::CommonPath).unwrap();
        assert_eq!(json, "\"common-path\"");
        assert_eq!(SourceKind::CommonPath.to_string(), "common-path");
    }

    #[test]
    fn test_finding_outcome() {
        let mut finding = Finding {
            domain: "example.com".to_string(),
            base_urls: vec![],
            doc_urls: vec![],
            endpoints: vec![],
            confidence: 0.0,
        };
        assert_eq!(finding.outcome(), Outcome::Empty);
        assert_eq!(finding.outcome().exit_code(), 2);

        finding.endpoints.push(EndpointCandidate {
            method: "GET".to_string(),
            path: "/health".to_string(),
            score: 0.5,
            evidence: vec![Evidence::new(SourceKind::CommonPath, "https://example.com/health")],
        });
        assert_eq!(finding.outcome(), Outcome::Found);
        assert_eq!(finding.outcome().exit_code(), 0);
    }

    #[test]
    fn test_finding_json_shape() {
        let finding = Finding {
            domain: "example.com".to_string(),
            base_urls: vec!["https://api.example.com".to_string()],
            doc_urls: vec![],
            endpoints: vec![],
            confidence: 0.01,
        };
        let value = serde_json::to_value(&finding).unwrap();
        assert!(value.get("baseUrls").is_some());
        assert!(value.get("docUrls").is_some());
        assert!(value.get("endpoints").is_some());
    }
}
