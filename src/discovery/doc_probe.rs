//! Documentation probing - looks for OpenAPI/Swagger documents at well-known paths.

use crate::discovery::target::join_path;
use crate::discovery::{FetchResponse, ProbeContext};
use crate::types::{Evidence, Observation, RestlessError, Result, SourceKind};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

/// Well-known documentation locations, most common first.
pub const DOC_PATHS: &[&str] = &[
    "/openapi.json",
    "/.well-known/openapi.json",
    "/.well-known/openapi.yaml",
    "/swagger.json",
    "/openapi.yaml",
    "/api/openapi.json",
    "/v3/api-docs",
    "/swagger/v1/swagger.json",
    "/api-docs",
    "/docs/openapi.json",
];

/// HTTP methods an OpenAPI path item may declare.
const OPERATION_METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// Upper bound on operations taken from one document.
const MAX_OPERATIONS: usize = 500;

/// What a parsed API description declares.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ApiSpec {
    /// Absolute server URLs, without trailing slash.
    pub servers: Vec<String>,
    /// `(METHOD, path)` pairs in document order.
    pub operations: Vec<(String, String)>,
}

/// Prober for machine-readable API documentation.
#[derive(Debug, Clone)]
pub struct DocProber {
    max_attempts: usize,
}

impl DocProber {
    /// Create a prober that issues at most `max_attempts` requests.
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts }
    }

    /// Try the well-known paths on every origin until one document parses.
    ///
    /// A document that is found but cannot be parsed is still reported as a
    /// documentation URL; it just contributes no endpoints.
    pub async fn probe(&self, ctx: &ProbeContext) -> Result<Vec<Observation>> {
        let mut observations = Vec::new();
        let mut attempts = 0;

        'paths: for path in DOC_PATHS {
            for origin in &ctx.target.origins {
                if attempts >= self.max_attempts {
                    break 'paths;
                }
                let Some(url) = join_path(origin, path) else {
                    continue;
                };
                attempts += 1;

                let response = match ctx.fetcher.fetch(&url, &ctx.budget).await {
                    Ok(r) => r,
                    Err(RestlessError::BudgetExhausted) => break 'paths,
                    Err(_) => continue,
                };

                if !looks_like_spec(&response) {
                    trace!("No API document at {} ({})", url, response.status);
                    continue;
                }

                observations.push(Observation::doc_url(&url));

                match parse_spec(&response.body, &response.url) {
                    Ok(spec) => {
                        debug!(
                            "Found API document at {}: {} operations, {} servers",
                            url,
                            spec.operations.len(),
                            spec.servers.len()
                        );
                        observations.extend(spec_observations(&spec, &url));
                        break 'paths;
                    }
                    Err(e) => debug!("{}", e),
                }
            }
        }

        Ok(observations)
    }
}

/// Turn a parsed document into endpoint and base-URL evidence.
pub fn spec_observations(spec: &ApiSpec, doc_url: &str) -> Vec<Observation> {
    let servers = spec
        .servers
        .iter()
        .map(|server| Observation::base_url(server.clone(), Evidence::new(SourceKind::Doc, doc_url)));

    let endpoints = spec
        .operations
        .iter()
        .map(|(method, path)| Observation::endpoint(method, path.clone(), Evidence::new(SourceKind::Doc, doc_url)));

    servers.chain(endpoints).collect()
}

/// A 2xx, non-HTML body that mentions OpenAPI or Swagger.
fn looks_like_spec(response: &FetchResponse) -> bool {
    response.is_success()
        && !response.is_html()
        && (response.body.contains("openapi") || response.body.contains("swagger"))
}

/// Parse an OpenAPI 3 or Swagger 2 document, JSON or YAML.
pub fn parse_spec(body: &str, doc_url: &str) -> Result<ApiSpec> {
    let failure = |reason: String| RestlessError::ParseFailure {
        url: doc_url.to_string(),
        reason,
    };

    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    let document: Value = if trimmed.starts_with('{') {
        serde_json::from_str(trimmed).map_err(|e| failure(e.to_string()))?
    } else {
        let yaml: serde_yaml::Value = serde_yaml::from_str(trimmed).map_err(|e| failure(e.to_string()))?;
        yaml_to_json(yaml)
    };

    if document.get("openapi").is_none() && document.get("swagger").is_none() {
        return Err(failure("no openapi or swagger version field".to_string()));
    }

    let paths = document
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| failure("missing paths object".to_string()))?;

    let mut operations = Vec::new();
    for (path, item) in paths {
        if !path.starts_with('/') {
            continue;
        }
        let Some(item) = item.as_object() else {
            continue;
        };
        for method in OPERATION_METHODS {
            if item.contains_key(*method) && operations.len() < MAX_OPERATIONS {
                operations.push((method.to_ascii_uppercase(), path.clone()));
            }
        }
    }

    Ok(ApiSpec {
        servers: declared_servers(&document, doc_url),
        operations,
    })
}

/// Server URLs from `servers` (OpenAPI 3) or `host`/`basePath` (Swagger 2).
fn declared_servers(document: &Value, doc_url: &str) -> Vec<String> {
    let mut servers: Vec<String> = Vec::new();

    if let Some(list) = document.get("servers").and_then(Value::as_array) {
        let base = Url::parse(doc_url).ok();
        for server in list {
            let Some(raw) = server.get("url").and_then(Value::as_str) else {
                continue;
            };
            // Server variables would need substitution; skip templated URLs.
            if raw.contains('{') {
                continue;
            }
            let resolved = match &base {
                Some(base) => base.join(raw).ok(),
                None => Url::parse(raw).ok(),
            };
            if let Some(url) = resolved {
                servers.push(url.as_str().trim_end_matches('/').to_string());
            }
        }
    } else if let Some(host) = document.get("host").and_then(Value::as_str) {
        let scheme = document
            .get("schemes")
            .and_then(Value::as_array)
            .and_then(|s| s.iter().filter_map(Value::as_str).find(|s| *s == "https").or_else(|| s.first().and_then(Value::as_str)))
            .unwrap_or("https");
        let base_path = document.get("basePath").and_then(Value::as_str).unwrap_or("");
        servers.push(format!("{}://{}{}", scheme, host, base_path).trim_end_matches('/').to_string());
    }

    servers.dedup();
    servers
}

/// Convert YAML into JSON values, stringifying scalar keys (`200:` response codes).
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map(Value::from).unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(map) => {
            let mut object = serde_json::Map::new();
            for (key, value) in map {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                object.insert(key, yaml_to_json(value));
            }
            Value::Object(object)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}
