//! Base-URL guesses that need no network traffic.

use crate::discovery::target::{base_url, Target};
use crate::types::{Evidence, Observation, SourceKind};

/// Every probe origin is a weak base-URL candidate.
pub fn observe(target: &Target) -> Vec<Observation> {
    target
        .origins
        .iter()
        .map(|origin| Observation::base_url(base_url(origin), Evidence::new(SourceKind::Heuristic, origin.as_str())))
        .collect()
}
