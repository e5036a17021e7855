//! URL templates
//!
//! A template is a path pattern such as `/api/users/:id/posts/:postId.json`.
//! Expanding it against a parameter map substitutes every placeholder that
//! has a value, drops the ones that don't (along with one adjacent `/`), and
//! returns whatever parameters were left over as query parameters.

use crate::error::ResourceError;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Placeholder names that would shadow record machinery on the consumer side
const RESERVED_NAMES: &[&str] = &["hasOwnProperty"];

/// One character that cannot be part of a placeholder name
const NON_WORD: &str = "[^0-9A-Za-z_]";

/// A parameter value: literal, computed on demand, or looked up on the body
#[derive(Clone)]
pub enum ParamValue {
    Literal(Value),
    Lazy(Arc<dyn Fn() -> Value + Send + Sync>),
    /// Dotted member path (without the leading `@`) read off the request body
    FromBody(String),
}

impl ParamValue {
    pub fn lazy(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        ParamValue::Lazy(Arc::new(f))
    }

    /// Produce the concrete value, reading `FromBody` paths off `body`
    pub fn evaluate(&self, body: Option<&Value>) -> Result<Value, ResourceError> {
        match self {
            ParamValue::Literal(v) => Ok(v.clone()),
            ParamValue::Lazy(f) => Ok(f()),
            ParamValue::FromBody(path) => lookup_dotted_path(body, path),
        }
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Literal(v) => write!(f, "Literal({})", v),
            ParamValue::Lazy(_) => f.write_str("Lazy(..)"),
            ParamValue::FromBody(path) => write!(f, "FromBody(@{})", path),
        }
    }
}

impl From<Value> for ParamValue {
    /// Strings starting with `@` become body lookups
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) if s.starts_with('@') => ParamValue::FromBody(s[1..].to_string()),
            other => ParamValue::Literal(other),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::from(Value::String(value.to_string()))
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ParamValue::from)
    }
}

/// Named parameters, as supplied to [`UrlTemplate::expand`]
pub type Params = BTreeMap<String, ParamValue>;

/// Literal parameters from a JSON object; non-object values yield no parameters
pub fn params_from_json(value: &Value) -> Params {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), ParamValue::Literal(v.clone())))
            .collect(),
        _ => Params::new(),
    }
}

fn is_valid_dotted_path(path: &str) -> bool {
    if path.is_empty() || RESERVED_NAMES.contains(&path) {
        return false;
    }
    path.split('.').all(|member| {
        let mut chars = member.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            }
            _ => false,
        }
    })
}

/// Follow `a.b.c` through nested objects; missing members yield `Null`
pub fn lookup_dotted_path(obj: Option<&Value>, path: &str) -> Result<Value, ResourceError> {
    if !is_valid_dotted_path(path) {
        return Err(ResourceError::invalid_name(
            format!("@{}", path),
            "dotted member path is invalid",
        ));
    }

    let mut current = obj;
    for key in path.split('.') {
        current = current.and_then(|v| v.get(key));
    }
    Ok(current.cloned().unwrap_or(Value::Null))
}

/// Percent-encode a value for use as a single path segment
pub fn encode_uri_segment(val: &str) -> String {
    urlencoding::encode(val)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
        .replace("%40", "@")
        .replace("%3A", ":")
        .replace("%24", "$")
        .replace("%2C", ",")
        .replace("%26", "&")
        .replace("%3D", "=")
        .replace("%2B", "+")
}

fn segment_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| if v.is_null() { String::new() } else { segment_text(v) })
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Result of expanding a template
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expanded {
    pub path: String,
    pub query: Map<String, Value>,
}

/// An immutable path pattern with per-placeholder defaults
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    pattern: String,
    defaults: Params,
}

impl UrlTemplate {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            defaults: Params::new(),
        }
    }

    pub fn with_defaults(pattern: impl Into<String>, defaults: Params) -> Self {
        Self {
            pattern: pattern.into(),
            defaults,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Placeholder names present in `url_override` (or the base pattern), in
    /// order of first appearance
    pub fn placeholders(&self, url_override: Option<&str>) -> Result<Vec<String>, ResourceError> {
        scan_placeholders(url_override.unwrap_or(&self.pattern))
    }

    /// Expand the template into a concrete path and residual query parameters
    pub fn expand(
        &self,
        params: &Params,
        url_override: Option<&str>,
    ) -> Result<Expanded, ResourceError> {
        let template = url_override.unwrap_or(&self.pattern);
        let names = scan_placeholders(template)?;
        let mut url = template.replace("\\:", ":");

        for name in &names {
            let source = params.get(name).or_else(|| self.defaults.get(name));
            let value = match source {
                Some(p) => p.evaluate(None)?,
                None => Value::Null,
            };
            url = if value.is_null() {
                remove_placeholder(&url, name)?
            } else {
                substitute_placeholder(&url, name, &encode_uri_segment(&segment_text(&value)))?
            };
        }

        let path = tidy_path(&url)?;

        let mut query = Map::new();
        for (key, value) in params {
            if !names.iter().any(|n| n == key) {
                query.insert(key.clone(), value.evaluate(None)?);
            }
        }

        Ok(Expanded { path, query })
    }
}

fn compile(pattern: &str, name: &str) -> Result<Regex, ResourceError> {
    Regex::new(pattern).map_err(|e| ResourceError::invalid_name(name, e.to_string()))
}

fn scan_placeholders(template: &str) -> Result<Vec<String>, ResourceError> {
    let mut names: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    for token in template.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
        if RESERVED_NAMES.contains(&token) {
            return Err(ResourceError::invalid_name(token, "reserved parameter name"));
        }
        if token.is_empty() || token.chars().all(|c| c.is_ascii_digit()) || seen.contains(token) {
            continue;
        }
        let unescaped = compile(
            &format!(r"(^|[^\\]):{}({}|$)", regex::escape(token), NON_WORD),
            token,
        )?;
        if unescaped.is_match(template) {
            seen.insert(token.to_string());
            names.push(token.to_string());
        }
    }

    Ok(names)
}

fn substitute_placeholder(url: &str, name: &str, encoded: &str) -> Result<String, ResourceError> {
    let re = compile(&format!(":{}({}|$)", regex::escape(name), NON_WORD), name)?;
    Ok(re
        .replace_all(url, |caps: &Captures| format!("{}{}", encoded, &caps[1]))
        .into_owned())
}

fn remove_placeholder(url: &str, name: &str) -> Result<String, ResourceError> {
    let re = compile(&format!("(/?):{}({}|$)", regex::escape(name), NON_WORD), name)?;
    Ok(re
        .replace_all(url, |caps: &Captures| {
            let tail = &caps[2];
            if tail.starts_with('/') {
                tail.to_string()
            } else {
                format!("{}{}", &caps[1], tail)
            }
        })
        .into_owned())
}

/// Strip trailing slashes, fold `/.ext` into `.ext`, un-escape `/\.`
fn tidy_path(url: &str) -> Result<String, ResourceError> {
    let trimmed = url.trim_end_matches('/');
    let extension = compile(r"/\.([0-9A-Za-z_]+)($|\?)", "extension")?;
    let folded = extension
        .replacen(trimmed, 1, |caps: &Captures| format!(".{}{}", &caps[1], &caps[2]))
        .into_owned();
    Ok(folded.replacen("/\\.", "/.", 1))
}
