//! Merge-safe YAML profiles built from a [`Finding`].
//!
//! A profile is rewritten on every save, but only the keys discovery owns are
//! replaced. Hand-edited `auth` and `defaults` sections, the original
//! `createdAt` and any keys this writer does not know about survive a save
//! unless the caller asks to overwrite.

use crate::aggregate::template;
use crate::types::{Finding, RestlessError, Result};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding the API token referenced by profiles.
pub const TOKEN_ENV_VAR: &str = "RESTLESS_TOKEN";

const PROFILE_VERSION: u64 = 1;
const DEFAULT_TIMEOUT_SECONDS: u64 = 20;
const MAX_EXAMPLES: usize = 3;

/// Header names whose values are treated as credentials.
const SECRET_HEADER_HINTS: &[&str] = &["authorization", "api-key", "apikey", "token", "secret", "cookie"];

/// Keys written from the finding on every save.
const MANAGED_KEYS: &[&str] = &[
    "version",
    "name",
    "createdAt",
    "updatedAt",
    "discoveredFrom",
    "baseUrls",
    "auth",
    "defaults",
    "discovery",
    "endpoints",
    "examples",
];

/// How a profile save behaves.
#[derive(Debug, Clone, Default)]
pub struct ProfileOptions {
    /// Replace an existing profile instead of merging into it.
    pub overwrite: bool,
    pub emit_examples: bool,
    /// Replace literal credentials in `defaults.headers` with env references.
    pub redact_secrets: bool,
    pub verify: bool,
    pub fuzz: bool,
    pub budget_seconds: u64,
    pub budget_pages: u32,
}

/// Default profile directory: `~/.config/restless/profiles`.
pub fn default_profile_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".config").join("restless").join("profiles"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Reads and writes profiles in one directory.
#[derive(Debug, Clone)]
pub struct ProfileWriter {
    dir: PathBuf,
}

impl ProfileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writer for an explicit directory, or the default one.
    pub fn from_override(dir: Option<PathBuf>) -> Self {
        Self::new(dir.unwrap_or_else(default_profile_dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the profile called `name`.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.yaml", name)))
    }

    /// Names of the saved profiles, sorted. A missing directory has none.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
            .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Save `finding` as profile `name`, merging into an existing profile.
    ///
    /// An existing profile that does not parse as a YAML mapping is left
    /// untouched unless `options.overwrite` is set.
    pub fn write(&self, name: &str, finding: &Finding, options: &ProfileOptions) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        let existing = if options.overwrite {
            None
        } else {
            read_existing(&path)?
        };

        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let profile = render_profile(name, finding, existing.as_ref(), options, &now);
        let yaml = serde_yaml::to_string(&Value::Mapping(profile))?;

        fs::create_dir_all(&self.dir)?;
        let tmp_path = path.with_extension("yaml.tmp");
        fs::write(&tmp_path, yaml)?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!("Saved profile {} to {}", name, path.display());
        Ok(path)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." || trimmed.contains(['/', '\\']) {
        return Err(RestlessError::ConfigError(format!("invalid profile name: {:?}", name)));
    }
    Ok(())
}

/// Load an existing profile for merging. `None` when there is nothing to merge.
fn read_existing(path: &Path) -> Result<Option<Mapping>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_yaml::from_str::<Value>(&content) {
        Ok(Value::Mapping(mapping)) => Ok(Some(mapping)),
        Ok(Value::Null) => Ok(None),
        Ok(_) | Err(_) => Err(RestlessError::ConfigError(format!(
            "existing profile {} is not a valid YAML mapping; use --overwrite-profile to replace it",
            path.display()
        ))),
    }
}

/// Build the profile document for `finding`, merged over `existing`.
pub fn render_profile(
    name: &str,
    finding: &Finding,
    existing: Option<&Mapping>,
    options: &ProfileOptions,
    now: &str,
) -> Mapping {
    let kept = |key: &str| existing.and_then(|m| m.get(key)).cloned();

    let mut profile = Mapping::new();
    profile.insert("version".into(), PROFILE_VERSION.into());
    profile.insert("name".into(), name.into());
    profile.insert("createdAt".into(), kept("createdAt").unwrap_or_else(|| now.into()));
    profile.insert("updatedAt".into(), now.into());
    profile.insert("discoveredFrom".into(), discovered_from(finding, options, now));
    profile.insert("baseUrls".into(), string_seq(&finding.base_urls));
    profile.insert("auth".into(), kept("auth").unwrap_or_else(default_auth));

    let mut defaults = kept("defaults").unwrap_or_else(default_defaults);
    if options.redact_secrets {
        redact_headers(&mut defaults);
    }
    profile.insert("defaults".into(), defaults);

    let mut discovery = Mapping::new();
    discovery.insert("confidence".into(), round2(finding.confidence).into());
    discovery.insert("docUrls".into(), string_seq(&finding.doc_urls));
    profile.insert("discovery".into(), Value::Mapping(discovery));
    profile.insert("endpoints".into(), endpoints(finding));

    if options.emit_examples {
        profile.insert("examples".into(), examples(finding));
    } else if let Some(examples) = kept("examples") {
        profile.insert("examples".into(), examples);
    }

    if let Some(existing) = existing {
        for (key, value) in existing {
            let managed = key.as_str().is_some_and(|k| MANAGED_KEYS.contains(&k));
            if !managed {
                profile.insert(key.clone(), value.clone());
            }
        }
    }

    profile
}

fn discovered_from(finding: &Finding, options: &ProfileOptions, now: &str) -> Value {
    let mut flags = Mapping::new();
    flags.insert("verify".into(), options.verify.into());
    flags.insert("fuzz".into(), options.fuzz.into());
    flags.insert("budgetSeconds".into(), options.budget_seconds.into());
    flags.insert("budgetPages".into(), u64::from(options.budget_pages).into());

    let mut from = Mapping::new();
    from.insert("domain".into(), finding.domain.as_str().into());
    from.insert("when".into(), now.into());
    from.insert("flags".into(), Value::Mapping(flags));
    Value::Mapping(from)
}

fn endpoints(finding: &Finding) -> Value {
    let endpoints = finding
        .endpoints
        .iter()
        .map(|endpoint| {
            let evidence = endpoint
                .evidence
                .iter()
                .map(|ev| {
                    let mut entry = Mapping::new();
                    entry.insert("source".into(), ev.source.as_str().into());
                    entry.insert("url".into(), ev.url.as_str().into());
                    entry.insert("when".into(), ev.when.as_str().into());
                    entry.insert("score".into(), round2(ev.score).into());
                    Value::Mapping(entry)
                })
                .collect();

            let mut entry = Mapping::new();
            entry.insert("method".into(), endpoint.method.as_str().into());
            entry.insert("path".into(), endpoint.path.as_str().into());
            entry.insert("score".into(), round2(endpoint.score).into());
            entry.insert("evidence".into(), Value::Sequence(evidence));
            Value::Mapping(entry)
        })
        .collect();
    Value::Sequence(endpoints)
}

/// Ready-to-run requests for the best parameter-free GET endpoints.
fn examples(finding: &Finding) -> Value {
    let examples = finding
        .endpoints
        .iter()
        .filter(|e| e.method == "GET" && !template::has_params(&e.path))
        .take(MAX_EXAMPLES)
        .map(|endpoint| {
            let name = endpoint
                .path
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or("root");

            let mut headers = Mapping::new();
            headers.insert("Authorization".into(), format!("Bearer ${{ENV:{}}}", TOKEN_ENV_VAR).into());

            let mut request = Mapping::new();
            request.insert("method".into(), endpoint.method.as_str().into());
            request.insert("path".into(), endpoint.path.as_str().into());
            request.insert("headers".into(), Value::Mapping(headers));

            let mut example = Mapping::new();
            example.insert("name".into(), name.into());
            example.insert("request".into(), Value::Mapping(request));
            Value::Mapping(example)
        })
        .collect();
    Value::Sequence(examples)
}

fn default_auth() -> Value {
    let mut token = Mapping::new();
    token.insert("source".into(), "env".into());
    token.insert("envVar".into(), TOKEN_ENV_VAR.into());

    let mut auth = Mapping::new();
    auth.insert("type".into(), "bearer".into());
    auth.insert("token".into(), Value::Mapping(token));
    Value::Mapping(auth)
}

fn default_defaults() -> Value {
    let mut headers = Mapping::new();
    headers.insert("Accept".into(), "application/json".into());
    headers.insert("User-Agent".into(), format!("restless/{}", env!("CARGO_PKG_VERSION")).into());

    let mut defaults = Mapping::new();
    defaults.insert("headers".into(), Value::Mapping(headers));
    defaults.insert("timeoutSeconds".into(), DEFAULT_TIMEOUT_SECONDS.into());
    Value::Mapping(defaults)
}

/// Swap literal credential values in `headers` for an env reference.
fn redact_headers(defaults: &mut Value) {
    let Some(headers) = defaults.get_mut("headers").and_then(Value::as_mapping_mut) else {
        return;
    };

    let reference = format!("${{ENV:{}}}", TOKEN_ENV_VAR);
    for (key, value) in headers.iter_mut() {
        let Some(name) = key.as_str() else {
            continue;
        };
        let lowered = name.to_ascii_lowercase();
        if !SECRET_HEADER_HINTS.iter().any(|hint| lowered.contains(hint)) {
            continue;
        }
        let Some(current) = value.as_str() else {
            continue;
        };
        if current.contains("${ENV:") {
            continue;
        }

        let redacted = match current.split_once(' ') {
            Some((scheme, _)) if scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("basic") => {
                format!("{} {}", scheme, reference)
            }
            _ => reference.clone(),
        };
        *value = redacted.into();
    }
}

fn string_seq(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| s.as_str().into()).collect())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EndpointCandidate, Evidence, SourceKind};
    use tempfile::TempDir;

    fn finding() -> Finding {
        Finding {
            domain: "openai.com".to_string(),
            base_urls: vec!["https://api.openai.com".to_string()],
            doc_urls: vec!["https://openai.com/openapi.json".to_string()],
            endpoints: vec![
                EndpointCandidate {
                    method: "GET".to_string(),
                    path: "/v1/models".to_string(),
                    score: 0.9,
                    evidence: vec![Evidence::new(SourceKind::Doc, "https://openai.com/openapi.json")],
                },
                EndpointCandidate {
                    method: "GET".to_string(),
                    path: "/v1/models/{model}".to_string(),
                    score: 0.9,
                    evidence: vec![Evidence::new(SourceKind::Doc, "https://openai.com/openapi.json")],
                },
            ],
            confidence: 0.9,
        }
    }

    fn load(path: &Path) -> Mapping {
        let content = fs::read_to_string(path).unwrap();
        serde_yaml::from_str(&content).unwrap()
    }

    #[test]
    fn test_fresh_profile_has_defaults() {
        let dir = TempDir::new().unwrap();
        let writer = ProfileWriter::new(dir.path());

        let path = writer.write("openai", &finding(), &ProfileOptions::default()).unwrap();
        assert_eq!(path, dir.path().join("openai.yaml"));

        let profile = load(&path);
        assert_eq!(profile["name"], Value::from("openai"));
        assert_eq!(profile["auth"]["type"], Value::from("bearer"));
        assert_eq!(profile["auth"]["token"]["envVar"], Value::from(TOKEN_ENV_VAR));
        assert_eq!(profile["defaults"]["timeoutSeconds"], Value::from(20u64));
        assert_eq!(profile["discovery"]["confidence"], Value::from(0.9));
        assert_eq!(profile["endpoints"][0]["path"], Value::from("/v1/models"));
        assert_eq!(profile["endpoints"][0]["evidence"][0]["source"], Value::from("doc"));
        assert!(profile.get("examples").is_none());
        assert_eq!(writer.list().unwrap(), vec!["openai".to_string()]);
    }

    #[test]
    fn test_merge_preserves_hand_edits() {
        let dir = TempDir::new().unwrap();
        let writer = ProfileWriter::new(dir.path());
        fs::write(
            dir.path().join("openai.yaml"),
            "createdAt: 2024-01-01T00:00:00Z\n\
             auth:\n  type: apiKey\n  header: X-Api-Key\n\
             defaults:\n  headers:\n    X-Team: research\n  timeoutSeconds: 60\n\
             notes: keep me\n\
             endpoints: []\n",
        )
        .unwrap();

        let path = writer.write("openai", &finding(), &ProfileOptions::default()).unwrap();
        let profile = load(&path);

        assert_eq!(profile["createdAt"], Value::from("2024-01-01T00:00:00Z"));
        assert_eq!(profile["auth"]["type"], Value::from("apiKey"));
        assert_eq!(profile["defaults"]["timeoutSeconds"], Value::from(60u64));
        assert_eq!(profile["notes"], Value::from("keep me"));
        assert_eq!(profile["endpoints"].as_sequence().unwrap().len(), 2);
    }

    #[test]
    fn test_overwrite_drops_hand_edits() {
        let dir = TempDir::new().unwrap();
        let writer = ProfileWriter::new(dir.path());
        fs::write(dir.path().join("openai.yaml"), "auth:\n  type: apiKey\nnotes: gone\n").unwrap();

        let options = ProfileOptions {
            overwrite: true,
            ..ProfileOptions::default()
        };
        let profile = load(&writer.write("openai", &finding(), &options).unwrap());

        assert_eq!(profile["auth"]["type"], Value::from("bearer"));
        assert!(profile.get("notes").is_none());
    }

    #[test]
    fn test_invalid_existing_profile_is_not_clobbered() {
        let dir = TempDir::new().unwrap();
        let writer = ProfileWriter::new(dir.path());
        let path = dir.path().join("openai.yaml");
        fs::write(&path, "auth: [unclosed\n").unwrap();

        let result = writer.write("openai", &finding(), &ProfileOptions::default());
        assert!(matches!(result, Err(RestlessError::ConfigError(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "auth: [unclosed\n");
    }

    #[test]
    fn test_names_with_separators_are_rejected() {
        let writer = ProfileWriter::new("/tmp");
        for name in ["", "..", "a/b", "a\\b"] {
            assert!(writer.path_for(name).is_err(), "{:?} should be rejected", name);
        }
    }

    #[test]
    fn test_redact_secrets() {
        let mut existing = Mapping::new();
        existing.insert(
            "defaults".into(),
            serde_yaml::from_str("headers:\n  Authorization: Bearer sk-live-123\n  X-Api-Key: abc\n  Accept: application/json\n")
                .unwrap(),
        );
        let options = ProfileOptions {
            redact_secrets: true,
            ..ProfileOptions::default()
        };

        let profile = render_profile("openai", &finding(), Some(&existing), &options, "2024-01-01T00:00:00Z");
        let headers = &profile["defaults"]["headers"];
        assert_eq!(headers["Authorization"], Value::from("Bearer ${ENV:RESTLESS_TOKEN}"));
        assert_eq!(headers["X-Api-Key"], Value::from("${ENV:RESTLESS_TOKEN}"));
        assert_eq!(headers["Accept"], Value::from("application/json"));
    }

    #[test]
    fn test_examples_use_parameter_free_gets() {
        let options = ProfileOptions {
            emit_examples: true,
            ..ProfileOptions::default()
        };
        let profile = render_profile("openai", &finding(), None, &options, "2024-01-01T00:00:00Z");

        let examples = profile["examples"].as_sequence().unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0]["name"], Value::from("models"));
        assert_eq!(examples[0]["request"]["path"], Value::from("/v1/models"));
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let writer = ProfileWriter::new(dir.path().join("absent"));
        assert!(writer.list().unwrap().is_empty());
    }
}
