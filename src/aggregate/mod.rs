//! Evidence aggregation.
//!
//! Observations from every extractor are folded into endpoint candidates
//! keyed by (method, path template) and into scored base-URL candidates.
//! Scores combine as independent evidence: `1 - Π(1 - score)`.

pub mod template;

use crate::types::{clamp_unit, EndpointCandidate, Evidence, Finding, Observation, SourceKind};
use std::collections::{BTreeMap, BTreeSet};
use template::Segment;
use tracing::trace;

/// Confidence of a finding without endpoints, relative to its best base URL.
const EMPTY_CONFIDENCE_FACTOR: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EndpointKey {
    method: String,
    shape: Vec<Segment>,
}

#[derive(Debug, Default)]
struct Accumulator {
    /// Every normalized path observed for this template.
    paths: BTreeSet<String>,
    evidence: Vec<Evidence>,
}

impl Accumulator {
    fn push(&mut self, evidence: Evidence) {
        let duplicate = self
            .evidence
            .iter()
            .any(|e| e.source == evidence.source && e.url == evidence.url);
        if !duplicate {
            self.evidence.push(evidence);
        }
    }

    /// Preferred display path: a declared template if one was seen, else the
    /// shape rendered with generic parameter names.
    fn display_path(&self, shape: &[Segment]) -> String {
        self.paths
            .iter()
            .find(|p| template::is_declared_template(p))
            .cloned()
            .unwrap_or_else(|| template::render(shape))
    }
}

/// Folds observations into a [`Finding`].
#[derive(Debug, Default)]
pub struct Aggregator {
    endpoints: BTreeMap<EndpointKey, Accumulator>,
    base_urls: BTreeMap<String, Vec<Evidence>>,
    doc_urls: Vec<String>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch of observations in order.
    pub fn fold(&mut self, observations: impl IntoIterator<Item = Observation>) {
        for observation in observations {
            self.add(observation);
        }
    }

    pub fn add(&mut self, observation: Observation) {
        match observation {
            Observation::Endpoint { method, path, evidence } => {
                let path = template::normalize_path(&path);
                let key = EndpointKey {
                    method: method.to_ascii_uppercase(),
                    shape: template::shape(&path),
                };
                trace!("Evidence for {} {} from {}", key.method, path, evidence.source);
                let entry = self.endpoints.entry(key).or_default();
                entry.paths.insert(path);
                entry.push(evidence);
            }
            Observation::BaseUrl { url, evidence } => {
                let url = url.trim_end_matches('/').to_string();
                let entry = self.base_urls.entry(url).or_default();
                if !entry.iter().any(|e| e.source == evidence.source && e.url == evidence.url) {
                    entry.push(evidence);
                }
            }
            Observation::DocUrl { url } => {
                if !self.doc_urls.contains(&url) {
                    self.doc_urls.push(url);
                }
            }
        }
    }

    /// Observed GET paths backed by any of the given source kinds.
    ///
    /// Declared templates are returned as templates; concrete paths as seen.
    pub fn observed_get_paths(&self, sources: &[SourceKind]) -> Vec<String> {
        self.endpoints
            .iter()
            .filter(|(key, acc)| {
                key.method == "GET" && acc.evidence.iter().any(|e| sources.contains(&e.source))
            })
            .flat_map(|(_, acc)| acc.paths.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Base URLs ranked by combined score, best first.
    pub fn ranked_base_urls(&self) -> Vec<String> {
        let mut ranked: Vec<(String, f64)> = self
            .base_urls
            .iter()
            .map(|(url, evidence)| (url.clone(), combine_evidence(evidence)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().map(|(url, _)| url).collect()
    }

    /// Endpoint candidates as they currently stand, sorted.
    pub fn candidates(&self) -> Vec<EndpointCandidate> {
        let mut candidates: Vec<EndpointCandidate> = self
            .endpoints
            .iter()
            .filter(|(_, acc)| !acc.evidence.is_empty())
            .map(|(key, acc)| EndpointCandidate {
                method: key.method.clone(),
                path: acc.display_path(&key.shape),
                score: combine_evidence(&acc.evidence),
                evidence: acc.evidence.clone(),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.method.cmp(&b.method))
        });
        candidates
    }

    /// Overall confidence of what has been folded so far.
    pub fn confidence(&self) -> f64 {
        let candidates = self.candidates();
        if candidates.is_empty() {
            let best_base = self
                .base_urls
                .values()
                .map(|evidence| combine_evidence(evidence))
                .fold(0.0, f64::max);
            return clamp_unit(best_base * EMPTY_CONFIDENCE_FACTOR);
        }
        overall_confidence(&candidates)
    }

    /// Produce the final finding.
    pub fn finish(self, domain: &str) -> Finding {
        let confidence = self.confidence();
        Finding {
            domain: domain.to_string(),
            base_urls: self.ranked_base_urls(),
            doc_urls: self.doc_urls.clone(),
            endpoints: self.candidates(),
            confidence,
        }
    }
}

/// Combine independent scores: `1 - Π(1 - s)`.
pub fn combine_scores(scores: impl IntoIterator<Item = f64>) -> f64 {
    let miss: f64 = scores.into_iter().map(|s| 1.0 - clamp_unit(s)).product();
    clamp_unit(1.0 - miss)
}

fn combine_evidence(evidence: &[Evidence]) -> f64 {
    combine_scores(evidence.iter().map(|e| e.score))
}

/// Mean candidate score weighted by how many distinct source kinds back each
/// candidate. Diverse evidence counts for more than repeated evidence.
pub fn overall_confidence(candidates: &[EndpointCandidate]) -> f64 {
    let (weighted, weights) = candidates.iter().fold((0.0, 0.0), |(sum, total), c| {
        let weight = c.source_diversity() as f64;
        (sum + c.score * weight, total + weight)
    });

    if weights == 0.0 {
        return 0.0;
    }
    clamp_unit(weighted / weights)
}
