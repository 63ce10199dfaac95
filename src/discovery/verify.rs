//! Verify pass - live checks layered over an aggregated result.
//!
//! Base URLs are checked with HEAD and parameter-free GET endpoints with GET.
//! Every check goes on the wire; a response remembered from an earlier phase
//! is not a second observation. Verify only ever adds evidence, so it can
//! raise scores but never lower them.

use crate::aggregate::template;
use crate::discovery::{ProbeContext, SafeMethod};
use crate::types::{Evidence, Observation, RestlessError, Result, SourceKind};
use tracing::{debug, trace};
use url::Url;

/// Base URLs checked per run.
const MAX_BASE_URLS: usize = 2;

/// Endpoints checked per run.
const MAX_ENDPOINTS: usize = 3;

/// Most pages a verify pass can use.
pub const VERIFY_PAGES: u32 = (MAX_BASE_URLS + MAX_ENDPOINTS) as u32;

/// Check the best base URLs and endpoints.
///
/// `endpoints` are `(METHOD, path)` pairs, best first; only GET paths without
/// parameters are checked, against the best reachable base URL.
pub async fn verify(ctx: &ProbeContext, base_urls: &[String], endpoints: &[(String, String)]) -> Result<Vec<Observation>> {
    let mut observations = Vec::new();
    let mut reachable: Option<String> = None;

    for base in base_urls.iter().take(MAX_BASE_URLS) {
        let url = format!("{}/", base.trim_end_matches('/'));
        match ctx.fetcher.request_live(SafeMethod::Head, &url, &ctx.budget).await {
            Ok(response) if response.status < 500 => {
                debug!("Base URL reachable: {} ({})", base, response.status);
                observations.push(Observation::base_url(base.clone(), Evidence::new(SourceKind::Verify, url.as_str())));
                reachable.get_or_insert_with(|| base.clone());
            }
            Ok(response) => trace!("Base URL unhealthy: {} ({})", base, response.status),
            Err(RestlessError::BudgetExhausted) => return Ok(observations),
            Err(_) => {}
        }
    }

    let Some(base) = reachable else {
        return Ok(observations);
    };
    let Ok(base) = Url::parse(&format!("{}/", base.trim_end_matches('/'))) else {
        return Ok(observations);
    };

    let checkable = endpoints
        .iter()
        .filter(|(method, path)| method == "GET" && !template::has_params(path))
        .take(MAX_ENDPOINTS);

    for (_, path) in checkable {
        let Ok(url) = base.join(path) else {
            continue;
        };

        match ctx.fetcher.request_live(SafeMethod::Get, url.as_str(), &ctx.budget).await {
            Ok(response) if response.suggests_endpoint() => {
                debug!("Endpoint verified: GET {} ({})", url, response.status);
                observations.push(Observation::endpoint("GET", path.clone(), Evidence::new(SourceKind::Verify, url.as_str())));
            }
            Ok(response) => trace!("Endpoint not verified: GET {} ({})", url, response.status),
            Err(RestlessError::BudgetExhausted) => break,
            Err(_) => {}
        }
    }

    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::Budget;
    use crate::discovery::{Fetcher, Target};
    use crate::types::HttpConfig;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(origin: &str) -> ProbeContext {
        ProbeContext::new(
            Arc::new(Target::with_origins("example.com", &[origin.to_string()])),
            Fetcher::new(HttpConfig { rate_limit: 100, ..HttpConfig::default() }).unwrap(),
            Arc::new(Budget::new(Duration::from_secs(10), VERIFY_PAGES)),
        )
    }

    #[tokio::test]
    async fn test_verify_confirms_base_and_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let endpoints = vec![
            ("GET".to_string(), "/v1/models".to_string()),
            ("POST".to_string(), "/v1/chat".to_string()),
            ("GET".to_string(), "/v1/models/{model}".to_string()),
        ];
        let observations = verify(&context(&server.uri()), &[server.uri()], &endpoints)
            .await
            .unwrap();

        assert_eq!(observations.len(), 2);
        assert!(observations.iter().all(|o| match o {
            Observation::BaseUrl { evidence, .. } | Observation::Endpoint { evidence, .. } =>
                evidence.source == SourceKind::Verify,
            Observation::DocUrl { .. } => false,
        }));
        // HEAD on the base plus a single GET: POST and templated paths are never sent.
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_base_skips_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let endpoints = vec![("GET".to_string(), "/health".to_string())];
        let observations = verify(&context(&server.uri()), &[server.uri()], &endpoints)
            .await
            .unwrap();

        assert!(observations.is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remembered_response_is_checked_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/status"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let ctx = context(&server.uri());
        let status_url = format!("{}/v1/status", server.uri());
        let earlier = Budget::new(Duration::from_secs(10), 1);
        ctx.fetcher.fetch(&status_url, &earlier).await.unwrap();

        let endpoints = vec![("GET".to_string(), "/v1/status".to_string())];
        let observations = verify(&ctx, &[server.uri()], &endpoints).await.unwrap();

        assert!(observations
            .iter()
            .any(|o| matches!(o, Observation::Endpoint { path, .. } if path == "/v1/status")));
        let status_hits = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/v1/status")
            .count();
        assert_eq!(status_hits, 2);
    }
}
