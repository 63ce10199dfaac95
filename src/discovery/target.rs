//! The domain under discovery and the origins probed for it.

use tracing::debug;
use url::Url;

/// A normalized domain plus the origins extractors probe.
#[derive(Debug, Clone)]
pub struct Target {
    pub domain: String,
    /// Probe origins, website first.
    pub origins: Vec<Url>,
}

impl Target {
    /// Build the default origins for a domain: the site itself and `api.` of it.
    ///
    /// Inputs that cannot form a URL yield a target with no origins, which in
    /// turn yields an empty finding rather than an error.
    pub fn from_domain(domain: &str) -> Self {
        let domain = normalize_domain(domain);
        let mut origins = Vec::new();

        if let Some(site) = origin_for_host(&domain) {
            origins.push(site);
        }
        if !domain.starts_with("api.") {
            if let Some(api) = origin_for_host(&format!("api.{}", domain)) {
                origins.push(api);
            }
        }

        Self { domain, origins }
    }

    /// Use explicit origins instead of the ones derived from the domain.
    pub fn with_origins(domain: &str, origins: &[String]) -> Self {
        let origins = origins
            .iter()
            .filter_map(|raw| match Url::parse(raw) {
                Ok(url) if url.has_host() => Some(url),
                Ok(_) | Err(_) => {
                    debug!("Ignoring unusable origin override: {}", raw);
                    None
                }
            })
            .collect();

        Self {
            domain: normalize_domain(domain),
            origins,
        }
    }

    /// Origin that hosts the website (sitemaps, docs).
    pub fn site_origin(&self) -> Option<&Url> {
        self.origins.first()
    }

    /// Origin most likely to serve the API itself.
    pub fn api_origin(&self) -> Option<&Url> {
        self.origins
            .iter()
            .find(|o| o.host_str().is_some_and(|h| h.starts_with("api.")))
            .or_else(|| self.origins.first())
    }

    /// Origins ordered API-first, for probes aimed at live endpoints.
    pub fn api_first_origins(&self) -> Vec<&Url> {
        let mut ordered: Vec<&Url> = self.origins.iter().collect();
        ordered.sort_by_key(|o| !o.host_str().is_some_and(|h| h.starts_with("api.")));
        ordered
    }
}

/// Resolve an absolute path against an origin.
pub fn join_path(origin: &Url, path: &str) -> Option<String> {
    origin.join(path).ok().map(|u| u.to_string())
}

/// Base-URL form of an origin: no trailing slash.
pub fn base_url(origin: &Url) -> String {
    origin.as_str().trim_end_matches('/').to_string()
}

/// Strip scheme, credentials, path and port noise from user input.
pub fn normalize_domain(input: &str) -> String {
    let trimmed = input.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .rsplit('@')
        .next()
        .unwrap_or("");

    host.trim_end_matches('.').to_ascii_lowercase()
}

fn origin_for_host(host: &str) -> Option<Url> {
    if host.is_empty() {
        return None;
    }
    match Url::parse(&format!("https://{}/", host)) {
        Ok(url) if url.has_host() => Some(url),
        _ => {
            debug!("Cannot build an origin for host {:?}", host);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("  OpenAI.com "), "openai.com");
        assert_eq!(normalize_domain("https://openai.com/docs?x=1"), "openai.com");
        assert_eq!(normalize_domain("http://user@example.com./"), "example.com");
    }

    #[test]
    fn test_default_origins() {
        let target = Target::from_domain("openai.com");
        let origins: Vec<String> = target.origins.iter().map(base_url).collect();
        assert_eq!(origins, vec!["https://openai.com", "https://api.openai.com"]);
        assert_eq!(base_url(target.api_origin().unwrap()), "https://api.openai.com");
        assert_eq!(base_url(target.api_first_origins()[0]), "https://api.openai.com");
        assert_eq!(base_url(target.site_origin().unwrap()), "https://openai.com");
    }

    #[test]
    fn test_api_domain_is_not_doubled() {
        let target = Target::from_domain("api.stripe.com");
        assert_eq!(target.origins.len(), 1);
    }

    #[test]
    fn test_unusable_domain_has_no_origins() {
        let target = Target::from_domain("not a domain");
        assert!(target.origins.is_empty());
        assert!(target.api_origin().is_none());
    }

    #[test]
    fn test_origin_override() {
        let target = Target::with_origins(
            "example.com",
            &["http://127.0.0.1:8080".to_string(), "nonsense".to_string()],
        );
        assert_eq!(target.origins.len(), 1);
        assert_eq!(
            join_path(&target.origins[0], "/openapi.json").unwrap(),
            "http://127.0.0.1:8080/openapi.json"
        );
    }
}
