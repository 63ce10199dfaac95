//! API surface discovery.
//!
//! This module handles gathering evidence from:
//! - Heuristics (no network)
//! - OpenAPI / Swagger documents
//! - Sitemaps
//! - A curated list of common API paths
//! - Variants of already observed paths (fuzzing, opt-in)
//! - The verify pass layered over the result

pub mod common_paths;
pub mod doc_probe;
pub mod fetcher;
pub mod fuzz_probe;
pub mod heuristic;
pub mod sitemap_probe;
pub mod target;
pub mod verify;

pub use fetcher::{FetchResponse, Fetcher, SafeMethod};
pub use target::Target;

use crate::budget::Budget;
use std::sync::Arc;

/// Everything an extractor needs: what to probe, how, and within what limits.
#[derive(Clone)]
pub struct ProbeContext {
    pub target: Arc<Target>,
    pub fetcher: Fetcher,
    pub budget: Arc<Budget>,
}

impl ProbeContext {
    pub fn new(target: Arc<Target>, fetcher: Fetcher, budget: Arc<Budget>) -> Self {
        Self {
            target,
            fetcher,
            budget,
        }
    }

    /// Same target and fetcher, different budget.
    pub fn with_budget(&self, budget: Arc<Budget>) -> Self {
        Self {
            target: self.target.clone(),
            fetcher: self.fetcher.clone(),
            budget,
        }
    }
}
