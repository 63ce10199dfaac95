//! Sitemap probing - mines `/sitemap.xml` for API-shaped and API-documentation URLs.
//!
//! Sitemaps carry no method information, so every candidate is a low-weight
//! `GET`. A sitemap index is followed one level deep, within budget.

use crate::discovery::target::{base_url, join_path};
use crate::discovery::ProbeContext;
use crate::types::{Evidence, Observation, RestlessError, Result, SourceKind};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, trace};
use url::Url;

/// Maximum number of child sitemaps fetched from an index.
const MAX_CHILD_SITEMAPS: usize = 2;

/// Maximum endpoint candidates taken from sitemaps.
const MAX_ENDPOINT_CANDIDATES: usize = 50;

/// Maximum documentation pages taken from sitemaps.
const MAX_DOC_PAGES: usize = 5;

/// First segments that mark a documentation section.
const DOC_ROOTS: &[&str] = &["docs", "doc", "documentation", "reference", "developers", "developer", "api-reference"];

static VERSION_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+(\.\d+)?$").expect("valid regex"));

/// `<loc>` values from one sitemap document.
#[derive(Debug, Default, PartialEq)]
pub struct SitemapDocument {
    /// Page URLs from `<urlset>`.
    pub urls: Vec<String>,
    /// Child sitemap URLs from `<sitemapindex>`.
    pub sitemaps: Vec<String>,
}

impl SitemapDocument {
    fn push_loc(&mut self, loc: &str, is_sitemap: bool) {
        let loc = loc.trim();
        if loc.is_empty() {
            return;
        }
        if is_sitemap {
            self.sitemaps.push(loc.to_string());
        } else {
            self.urls.push(loc.to_string());
        }
    }
}

/// How a sitemap URL path relates to an API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Looks like a live API path (`/api/...`, `/v1/...`).
    Api,
    /// Documentation about an API.
    ApiDocs,
    Other,
}

/// Fetch the sitemap from the site origin and turn its URLs into evidence.
pub async fn probe(ctx: &ProbeContext) -> Result<Vec<Observation>> {
    let Some(origin) = ctx.target.site_origin() else {
        return Ok(Vec::new());
    };
    let Some(sitemap_url) = join_path(origin, "/sitemap.xml") else {
        return Ok(Vec::new());
    };

    let root = match fetch_document(ctx, &sitemap_url).await {
        Ok(Some(doc)) => doc,
        Ok(None) | Err(RestlessError::BudgetExhausted) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut page_urls = root.urls;
    for child in root.sitemaps.iter().take(MAX_CHILD_SITEMAPS) {
        match fetch_document(ctx, child).await {
            Ok(Some(doc)) => page_urls.extend(doc.urls),
            Ok(None) => {}
            Err(RestlessError::BudgetExhausted) => break,
            Err(e) => debug!("{}", e),
        }
    }

    debug!("Sitemap {} listed {} URLs", sitemap_url, page_urls.len());
    Ok(observations_from_urls(&page_urls))
}

/// Fetch and parse one sitemap; `None` for non-2xx or unparsable content.
async fn fetch_document(ctx: &ProbeContext, url: &str) -> Result<Option<SitemapDocument>> {
    let response = match ctx.fetcher.fetch(url, &ctx.budget).await {
        Ok(r) => r,
        Err(RestlessError::BudgetExhausted) => return Err(RestlessError::BudgetExhausted),
        Err(_) => return Ok(None),
    };

    if !response.is_success() || response.is_html() {
        trace!("No sitemap at {} ({})", url, response.status);
        return Ok(None);
    }

    match parse_sitemap(&response.body, url) {
        Ok(doc) => Ok(Some(doc)),
        Err(e) => {
            debug!("{}", e);
            Ok(None)
        }
    }
}

/// Classify sitemap page URLs into endpoint, base-URL and documentation evidence.
pub fn observations_from_urls(urls: &[String]) -> Vec<Observation> {
    let mut observations = Vec::new();
    let mut endpoint_paths = BTreeSet::new();
    let mut doc_pages = 0;

    for raw in urls {
        let Ok(url) = Url::parse(raw) else {
            continue;
        };

        match classify_path(url.path()) {
            PathKind::Api => {
                if endpoint_paths.len() >= MAX_ENDPOINT_CANDIDATES || !endpoint_paths.insert(url.path().to_string()) {
                    continue;
                }
                observations.push(Observation::endpoint(
                    "GET",
                    url.path(),
                    Evidence::new(SourceKind::Sitemap, raw.as_str()),
                ));
                if url.host_str().is_some_and(|h| h.starts_with("api.")) {
                    let origin = url.join("/").map(|o| base_url(&o)).unwrap_or_default();
                    observations.push(Observation::base_url(origin, Evidence::new(SourceKind::Sitemap, raw.as_str())));
                }
            }
            PathKind::ApiDocs if doc_pages < MAX_DOC_PAGES => {
                doc_pages += 1;
                observations.push(Observation::doc_url(raw.as_str()));
            }
            PathKind::ApiDocs | PathKind::Other => {}
        }
    }

    observations
}

/// Decide whether a path looks like an API namespace, API docs, or neither.
pub fn classify_path(path: &str) -> PathKind {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect();

    let Some(first) = segments.first() else {
        return PathKind::Other;
    };

    let api_like = segments.iter().any(|s| is_api_segment(s));

    if DOC_ROOTS.contains(&first.as_str()) {
        let about_api = first == "api-reference" || segments.iter().any(|s| is_api_segment(s) || s == "reference");
        return if about_api { PathKind::ApiDocs } else { PathKind::Other };
    }

    if api_like {
        PathKind::Api
    } else {
        PathKind::Other
    }
}

fn is_api_segment(segment: &str) -> bool {
    segment == "api"
        || segment.starts_with("api-")
        || segment.starts_with("api_")
        || VERSION_SEGMENT.is_match(segment)
}

/// Parse a `<urlset>` or `<sitemapindex>` document.
pub fn parse_sitemap(xml: &str, source_url: &str) -> Result<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = SitemapDocument::default();
    let mut buf = Vec::new();
    let mut in_url = false;
    let mut in_sitemap = false;
    let mut in_loc = false;
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"urlset" | b"sitemapindex" => saw_root = true,
                b"url" => in_url = true,
                b"sitemap" => in_sitemap = true,
                b"loc" => in_loc = in_url || in_sitemap,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"url" => in_url = false,
                b"sitemap" => in_sitemap = false,
                b"loc" => in_loc = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_loc => {
                let text = e.unescape().map_err(|e| RestlessError::ParseFailure {
                    url: source_url.to_string(),
                    reason: e.to_string(),
                })?;
                doc.push_loc(&text, in_sitemap);
            }
            Ok(Event::CData(e)) if in_loc => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                doc.push_loc(&text, in_sitemap);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(RestlessError::ParseFailure {
                    url: source_url.to_string(),
                    reason: format!("XML parse error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(RestlessError::ParseFailure {
            url: source_url.to_string(),
            reason: "not a sitemap (no urlset or sitemapindex)".to_string(),
        });
    }

    Ok(doc)
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

    fn context(origin: &str, pages: u32) -> ProbeContext {
        ProbeContext::new(
            Arc::new(Target::with_origins("example.com", &[origin.to_string()])),
            Fetcher::new(HttpConfig::default()).unwrap(),
            Arc::new(Budget::new(Duration::from_secs(10), pages)),
        )
    }

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url><loc>https://example.com/api/v1/users</loc><lastmod>2024-01-15</lastmod></url>
          <url><loc>https://example.com/about?a=1&amp;b=2</loc></url>
        </urlset>"#;

        let doc = parse_sitemap(xml, "s").unwrap();
        assert_eq!(
            doc.urls,
            vec!["https://example.com/api/v1/users", "https://example.com/about?a=1&b=2"]
        );
        assert!(doc.sitemaps.is_empty());
    }

    #[test]
    fn test_parse_cdata_locations() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url><loc><![CDATA[https://example.com/api/v1/orders?page=1&size=2]]></loc></url>
          <url><loc>https://example.com/api/v1/users</loc></url>
        </urlset>"#;

        let doc = parse_sitemap(xml, "s").unwrap();
        assert_eq!(
            doc.urls,
            vec![
                "https://example.com/api/v1/orders?page=1&size=2",
                "https://example.com/api/v1/users"
            ]
        );
    }

    #[test]
    fn test_parse_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <sitemap><loc>https://example.com/sitemap-docs.xml</loc></sitemap>
        </sitemapindex>"#;

        let doc = parse_sitemap(xml, "s").unwrap();
        assert_eq!(doc.sitemaps, vec!["https://example.com/sitemap-docs.xml"]);
        assert!(doc.urls.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_sitemap() {
        assert!(parse_sitemap("<html><body>hi</body></html>", "s").is_err());
        assert!(parse_sitemap("<urlset><url><loc>x</url></urlset>", "s").is_err());
    }

    #[test]
    fn test_classify_path() {
        assert_eq!(classify_path("/api/users"), PathKind::Api);
        assert_eq!(classify_path("/v2/orders/7"), PathKind::Api);
        assert_eq!(classify_path("/docs/api/authentication"), PathKind::ApiDocs);
        assert_eq!(classify_path("/api-reference/chat"), PathKind::ApiDocs);
        assert_eq!(classify_path("/docs/getting-started"), PathKind::Other);
        assert_eq!(classify_path("/blog/apis-are-fun"), PathKind::Other);
        assert_eq!(classify_path("/"), PathKind::Other);
    }

    #[test]
    fn test_observations_from_urls() {
        let urls = vec![
            "https://api.example.com/v1/models".to_string(),
            "https://example.com/v1/models".to_string(),
            "https://example.com/docs/api/models".to_string(),
            "https://example.com/pricing".to_string(),
        ];

        let observations = observations_from_urls(&urls);

        let endpoints: Vec<_> = observations
            .iter()
            .filter(|o| matches!(o, Observation::Endpoint { .. }))
            .collect();
        assert_eq!(endpoints.len(), 1);
        assert!(observations.contains(&Observation::doc_url("https://example.com/docs/api/models")));
        assert!(observations.iter().any(|o| matches!(
            o,
            Observation::BaseUrl { url, .. } if url == "https://api.example.com"
        )));
    }

    #[tokio::test]
    async fn test_probe_emits_low_weight_get_evidence() {
        let server = MockServer::start().await;
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <url><loc>https://example.com/api/v1/users/42</loc></url>
            <url><loc>https://example.com/careers</loc></url>
        </urlset>"#;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(xml)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&server)
            .await;

        let observations = probe(&context(&server.uri(), 5)).await.unwrap();

        assert_eq!(observations.len(), 1);
        match &observations[0] {
            Observation::Endpoint { method, path, evidence } => {
                assert_eq!(method, "GET");
                assert_eq!(path, "/api/v1/users/42");
                assert_eq!(evidence.source, SourceKind::Sitemap);
                assert_eq!(evidence.score, 0.3);
            }
            other => panic!("Expected endpoint, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_follows_index_within_budget() {
        let server = MockServer::start().await;
        let index = format!(
            r#"<sitemapindex><sitemap><loc>{0}/a.xml</loc></sitemap><sitemap><loc>{0}/b.xml</loc></sitemap></sitemapindex>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<urlset><url><loc>https://example.com/api/status</loc></url></urlset>",
            ))
            .mount(&server)
            .await;

        let observations = probe(&context(&server.uri(), 2)).await.unwrap();

        assert_eq!(observations.len(), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_sitemap_yields_nothing() {
        let server = MockServer::start().await;
        let observations = probe(&context(&server.uri(), 5)).await.unwrap();
        assert!(observations.is_empty());
    }
}
