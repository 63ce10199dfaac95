//! Path normalization and template matching.
//!
//! A path is reduced to a sequence of segment classes. Literal segments must
//! match exactly; anything that looks like an identifier (`{id}`, `:id`,
//! numbers, UUIDs, long hex strings) is a parameter and matches any other
//! parameter. `/users/42`, `/users/7` and `/users/{id}` therefore share one
//! template.

use regex::Regex;
use std::sync::LazyLock;

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").expect("valid regex")
});

static LONG_HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[0-9a-f]{16,}$").expect("valid regex"));

/// One segment of a path shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Literal(String),
    Param,
}

/// Normalize a raw path: drop query and fragment, force a leading `/`,
/// collapse empty segments and drop the trailing `/`.
pub fn normalize_path(raw: &str) -> String {
    let path = raw.split(['?', '#']).next().unwrap_or("");
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Whether a single segment stands for a path parameter.
pub fn is_param_segment(segment: &str) -> bool {
    if is_declared_param(segment) || (segment.starts_with(':') && segment.len() > 1) {
        return true;
    }

    if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }

    if UUID.is_match(segment) {
        return true;
    }

    // Long hex ids; the digit check keeps words like "deadbeefcafebabe" out.
    LONG_HEX.is_match(segment) && segment.bytes().any(|b| b.is_ascii_digit())
}

/// `{name}` as used by OpenAPI templates.
fn is_declared_param(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}

/// Whether the path carries at least one declared `{param}` segment.
pub fn is_declared_template(path: &str) -> bool {
    path.split('/').any(is_declared_param)
}

/// Whether any segment of the path is a parameter of any kind.
pub fn has_params(path: &str) -> bool {
    shape(path).iter().any(|s| *s == Segment::Param)
}

/// Reduce a path to its segment classes.
pub fn shape(path: &str) -> Vec<Segment> {
    normalize_path(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if is_param_segment(s) {
                Segment::Param
            } else {
                Segment::Literal(s.to_string())
            }
        })
        .collect()
}

/// Render a shape as a template, naming parameters `{id}`, `{id2}`, ...
pub fn render(shape: &[Segment]) -> String {
    if shape.is_empty() {
        return "/".to_string();
    }

    let mut params = 0;
    let parts: Vec<String> = shape
        .iter()
        .map(|segment| match segment {
            Segment::Literal(s) => s.clone(),
            Segment::Param => {
                params += 1;
                if params == 1 {
                    "{id}".to_string()
                } else {
                    format!("{{id{}}}", params)
                }
            }
        })
        .collect();

    format!("/{}", parts.join("/"))
}

/// Replace every parameter segment with a plausible concrete value.
pub fn instantiate(path: &str) -> String {
    let segments: Vec<String> = normalize_path(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| if is_declared_param(s) || s.starts_with(':') { "1".to_string() } else { s.to_string() })
        .collect();

    format!("/{}", segments.join("/"))
}
