//! Transport layer
//!
//! Resource classes never talk to the network directly; they hand a fully
//! built [`HttpRequest`] to a [`Transport`] and reconcile whatever comes back.
//!
//! # Module Structure
//!
//! - [`http`] - `reqwest`-backed transport used by the binary and integration tests

pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use http::HttpTransport;

/// HTTP verbs an action may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Whether requests with this verb carry a JSON body
    pub fn has_body(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete request produced by a resource action
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Expanded path, relative to the transport's base URL unless absolute
    pub url: String,
    /// Residual query parameters; null values are omitted on the wire
    pub params: Map<String, Value>,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Map::new(),
            body: None,
            headers: BTreeMap::new(),
            timeout: None,
        }
    }

    /// Query pairs in wire order: keys sorted, arrays repeated, objects as JSON
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut keys: Vec<&String> = self.params.keys().collect();
        keys.sort();

        let mut pairs = Vec::new();
        for key in keys {
            match &self.params[key] {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items.iter().filter(|v| !v.is_null()) {
                        pairs.push((key.clone(), query_value(item)));
                    }
                }
                other => pairs.push((key.clone(), query_value(other))),
            }
        }
        pairs
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A successful (2xx) response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, `Null` when the body was empty
    pub data: Value,
}

impl HttpResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            data,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }
}

/// A failed exchange: either no response at all, or a non-success status
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP status when the server answered
    pub status: Option<u16>,
    pub message: String,
    /// Parsed error body, `Null` when absent or not JSON
    pub data: Value,
}

impl TransportError {
    pub fn status(status: u16, data: Value) -> Self {
        Self {
            status: Some(status),
            message: format!("API request failed: {}", status),
            data,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            data: Value::Null,
        }
    }
}

/// The collaborator that actually moves bytes
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
