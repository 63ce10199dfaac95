//! Budget-aware HTTP fetcher, the only place discovery touches the network.

use crate::budget::Budget;
use crate::types::{HttpConfig, RestlessError, Result};
use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// The only HTTP verbs discovery may issue.
///
/// Nothing here can express a mutating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafeMethod {
    Get,
    Head,
}

impl SafeMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            SafeMethod::Get => reqwest::Method::GET,
            SafeMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// A completed HTTP exchange. Any status is a valid response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Body as text, truncated; empty for HEAD and binary content.
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401/403: the path exists but sits behind auth.
    pub fn is_auth_gated(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("text/html"))
    }

    /// 2xx or auth-gated, and not an HTML page (SPA catch-alls answer 200 to anything).
    pub fn suggests_endpoint(&self) -> bool {
        (self.is_success() || self.is_auth_gated()) && !self.is_html()
    }
}

type DirectLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Fetcher with rate limiting and per-run response memoization.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    config: HttpConfig,
    rate_limiter: Arc<DirectLimiter>,
    seen: Arc<DashMap<(SafeMethod, String), FetchResponse>>,
}

impl Fetcher {
    /// Create a new fetcher.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .http1_only()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        let per_second = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            config,
            rate_limiter,
            seen: Arc::new(DashMap::new()),
        })
    }

    /// GET a URL under the given budget.
    pub async fn fetch(&self, url: &str, budget: &Budget) -> Result<FetchResponse> {
        self.request(SafeMethod::Get, url, budget).await
    }

    /// HEAD a URL under the given budget.
    pub async fn head(&self, url: &str, budget: &Budget) -> Result<FetchResponse> {
        self.request(SafeMethod::Head, url, budget).await
    }

    /// Issue a read-only request.
    ///
    /// Refuses to start once the budget is exhausted; otherwise takes one page
    /// before sending. The request is bounded by whichever is shorter: the
    /// configured timeout or the time left until the budget deadline.
    /// Responses already fetched in this run are served from memory without
    /// spending budget.
    pub async fn request(&self, method: SafeMethod, url: &str, budget: &Budget) -> Result<FetchResponse> {
        if let Some(hit) = self.seen.get(&(method, url.to_string())) {
            trace!("Memo hit: {:?} {}", method, url);
            return Ok(hit.value().clone());
        }

        self.request_live(method, url, budget).await
    }

    /// Issue a read-only request on the wire, never answered from the memo.
    ///
    /// Used where a response must be a live observation of its own. The
    /// result still refreshes the memo.
    pub async fn request_live(&self, method: SafeMethod, url: &str, budget: &Budget) -> Result<FetchResponse> {
        let key = (method, url.to_string());

        if !budget.is_active() {
            return Err(RestlessError::BudgetExhausted);
        }

        let deadline = budget.deadline();
        if tokio::time::timeout_at(deadline, self.rate_limiter.until_ready())
            .await
            .is_err()
        {
            budget.exhaust();
            return Err(RestlessError::BudgetExhausted);
        }

        budget.take_page()?;

        let per_request = budget
            .remaining_time()
            .min(Duration::from_secs(self.config.timeout_secs.max(1)));
        if per_request.is_zero() {
            return Err(RestlessError::BudgetExhausted);
        }

        trace!("{:?} {} (timeout {:?})", method, url, per_request);

        let response = match tokio::time::timeout_at(deadline, self.do_fetch(method, url, per_request)).await {
            Ok(result) => result,
            Err(_) => Err(RestlessError::FetchFailure {
                url: url.to_string(),
                reason: "cancelled at budget deadline".to_string(),
            }),
        };

        match response {
            Ok(response) => {
                debug!("{:?} {} -> {}", method, url, response.status);
                self.seen.insert(key, response.clone());
                Ok(response)
            }
            Err(e) => {
                debug!("{}", e);
                Err(e)
            }
        }
    }

    /// Perform the actual HTTP exchange.
    async fn do_fetch(&self, method: SafeMethod, url: &str, timeout: Duration) -> Result<FetchResponse> {
        let failure = |e: reqwest::Error| RestlessError::FetchFailure {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let mut response = self
            .client
            .request(method.as_reqwest(), url)
            .timeout(timeout)
            .send()
            .await
            .map_err(failure)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase());

        let body = if method == SafeMethod::Head || is_binary(content_type.as_deref()) {
            String::new()
        } else {
            let limit = self.config.max_body_bytes;
            let mut bytes = Vec::new();
            while let Some(chunk) = response.chunk().await.map_err(failure)? {
                let room = limit - bytes.len();
                bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if bytes.len() >= limit {
                    trace!("Truncated body of {} at {} bytes", url, limit);
                    break;
                }
            }
            String::from_utf8_lossy(&bytes).into_owned()
        };

        Ok(FetchResponse {
            url: final_url,
            status,
            content_type,
            body,
        })
    }
}

/// Content types whose bodies carry nothing discovery can read.
fn is_binary(content_type: Option<&str>) -> bool {
    const BINARY_PREFIXES: &[&str] = &["image/", "audio/", "video/", "font/", "application/octet-stream", "application/zip", "application/pdf"];

    content_type.is_some_and(|ct| BINARY_PREFIXES.iter().any(|p| ct.starts_with(p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(HttpConfig {
            rate_limit: 100,
            ..HttpConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_response_classification() {
        let mut response = FetchResponse {
            url: "https://example.com/health".to_string(),
            status: 403,
            content_type: Some("application/json".to_string()),
            body: String::new(),
        };
        assert!(response.suggests_endpoint());

        response.status = 404;
        assert!(response.is_not_found());
        assert!(!response.suggests_endpoint());

        response.status = 200;
        response.content_type = Some("text/html; charset=utf-8".to_string());
        assert!(!response.suggests_endpoint());
    }

    #[test]
    fn test_is_binary() {
        assert!(is_binary(Some("image/png")));
        assert!(!is_binary(Some("application/json")));
        assert!(!is_binary(None));
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let budget = Budget::new(Duration::from_secs(10), 5);
        let response = fetcher()
            .fetch(&format!("{}/missing", server.uri()), &budget)
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(budget.pages_used(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_network() {
        let server = MockServer::start().await;
        let budget = Budget::new(Duration::from_secs(10), 0);

        let result = fetcher().fetch(&format!("{}/x", server.uri()), &budget).await;

        assert!(matches!(result, Err(RestlessError::BudgetExhausted)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_fetch_is_memoized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let budget = Budget::new(Duration::from_secs(10), 5);
        let url = format!("{}/health", server.uri());

        let first = fetcher.fetch(&url, &budget).await.unwrap();
        let second = fetcher.fetch(&url, &budget).await.unwrap();

        assert_eq!(first.body, "ok");
        assert_eq!(second.body, "ok");
        assert_eq!(budget.pages_used(), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .mount(&server)
            .await;

        let budget = Budget::new(Duration::from_secs(10), 5);
        let result = fetcher().fetch(&format!("{}/loop", server.uri()), &budget).await;

        assert!(matches!(result, Err(RestlessError::FetchFailure { .. })));
        assert!(server.received_requests().await.unwrap().len() <= 6);
    }

    #[tokio::test]
    async fn test_slow_response_is_cut_at_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let budget = Budget::new(Duration::from_millis(300), 5);
        let started = std::time::Instant::now();
        let result = fetcher().fetch(&format!("{}/slow", server.uri()), &budget).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let budget = Budget::new(Duration::from_secs(10), 5);
        let response = fetcher().head(&format!("{}/", server.uri()), &budget).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_live_request_skips_memo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/status"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let budget = Budget::new(Duration::from_secs(10), 5);
        let url = format!("{}/v1/status", server.uri());

        fetcher.fetch(&url, &budget).await.unwrap();
        let live = fetcher.request_live(SafeMethod::Get, &url, &budget).await.unwrap();

        assert_eq!(live.status, 401);
        assert_eq!(budget.pages_used(), 2);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_body_is_truncated_while_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64 * 1024)))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(HttpConfig {
            rate_limit: 100,
            max_body_bytes: 100,
            ..HttpConfig::default()
        })
        .unwrap();
        let budget = Budget::new(Duration::from_secs(10), 5);
        let response = fetcher.fetch(&format!("{}/big", server.uri()), &budget).await.unwrap();

        assert_eq!(response.body.len(), 100);
    }
}
