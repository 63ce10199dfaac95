//! Common-path probing - tries frequently used API paths directly.

use crate::discovery::target::{base_url, join_path};
use crate::discovery::ProbeContext;
use crate::types::{Evidence, Observation, RestlessError, Result, SourceKind};
use tracing::{debug, trace};

/// Curated API paths, most telling first.
pub const COMMON_PATHS: &[&str] = &[
    "/v1/status",
    "/health",
    "/api/v1/status",
    "/api/health",
    "/status",
    "/v1",
    "/api/v1",
    "/api",
    "/healthz",
    "/version",
    "/v2/status",
    "/api/status",
];

/// GET each common path on each origin (API origin first) until the budget runs out.
///
/// A 2xx or 401/403 answer is positive evidence for the path and for the
/// origin as a base URL. A 404 drops the path.
pub async fn probe(ctx: &ProbeContext) -> Result<Vec<Observation>> {
    let origins = ctx.target.api_first_origins();
    let mut observations = Vec::new();

    'paths: for path in COMMON_PATHS {
        for origin in &origins {
            let Some(url) = join_path(origin, path) else {
                continue;
            };

            let response = match ctx.fetcher.fetch(&url, &ctx.budget).await {
                Ok(r) => r,
                Err(RestlessError::BudgetExhausted) => break 'paths,
                Err(_) => continue,
            };

            if response.suggests_endpoint() {
                debug!("Common path answered: {} ({})", url, response.status);
                observations.push(Observation::endpoint(
                    "GET",
                    *path,
                    Evidence::new(SourceKind::CommonPath, url.as_str()),
                ));
                observations.push(Observation::base_url(
                    base_url(origin),
                    Evidence::new(SourceKind::CommonPath, url.as_str()),
                ));
            } else if response.is_not_found() {
                trace!("Dropping {}: not found", url);
            } else {
                trace!("Inconclusive {}: {}", url, response.status);
            }
        }
    }

    Ok(observations)
}
