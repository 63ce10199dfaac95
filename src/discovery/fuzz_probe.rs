//! Fuzz probing - varies the segments of path shapes that were already observed.
//!
//! Only GET is ever issued and only shapes seen in documentation or sitemaps
//! are varied: path parameters get a concrete value and the version/API
//! prefix is permuted. Nothing entirely new is invented.

use crate::aggregate::template;
use crate::discovery::target::join_path;
use crate::discovery::ProbeContext;
use crate::types::{Evidence, Observation, RestlessError, Result, SourceKind};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, trace};

/// Prefixes permuted onto each observed shape.
const PREFIXES: &[&str] = &["", "/v1", "/v2", "/api"];

/// Upper bound on variants generated per run.
const MAX_VARIANTS: usize = 12;

static PREFIX_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(api|v\d+(\.\d+)?)$").expect("valid regex"));

/// Derive candidate paths from observed GET paths.
///
/// Paths already observed concretely are never re-probed. The result is
/// sorted and capped, so the same seeds always give the same variants.
pub fn variants(seeds: &[String]) -> Vec<String> {
    let observed: BTreeSet<String> = seeds
        .iter()
        .filter(|s| !template::is_declared_template(s))
        .map(|s| template::normalize_path(s))
        .collect();

    let mut out = BTreeSet::new();
    for seed in seeds {
        let concrete = template::instantiate(seed);
        let stem = strip_prefix_segments(&concrete);
        if stem == "/" {
            continue;
        }

        out.insert(concrete.clone());
        for prefix in PREFIXES {
            let candidate = template::normalize_path(&format!("{}{}", prefix, stem));
            out.insert(candidate);
        }
    }

    out.into_iter()
        .filter(|candidate| !observed.contains(candidate))
        .take(MAX_VARIANTS)
        .collect()
}

/// Drop leading `/api` and `/vN` segments.
fn strip_prefix_segments(path: &str) -> String {
    let rest: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip_while(|s| PREFIX_SEGMENT.is_match(s))
        .collect();
    format!("/{}", rest.join("/"))
}

/// GET each variant on the API origin; confirmed paths become fuzz evidence.
pub async fn probe(ctx: &ProbeContext, seeds: &[String]) -> Result<Vec<Observation>> {
    let Some(origin) = ctx.target.api_origin() else {
        return Ok(Vec::new());
    };

    let candidates = variants(seeds);
    debug!("Fuzzing {} variants from {} seeds", candidates.len(), seeds.len());

    let mut observations = Vec::new();
    for path in candidates {
        let Some(url) = join_path(origin, &path) else {
            continue;
        };

        let response = match ctx.fetcher.fetch(&url, &ctx.budget).await {
            Ok(r) => r,
            Err(RestlessError::BudgetExhausted) => break,
            Err(_) => continue,
        };

        if response.suggests_endpoint() {
            debug!("Fuzz variant confirmed: {} ({})", url, response.status);
            observations.push(Observation::endpoint(
                "GET",
                path,
                Evidence::new(SourceKind::Fuzz, url.as_str()),
            ));
        } else {
            trace!("Fuzz variant rejected: {} ({})", url, response.status);
        }
    }

    Ok(observations)
}
