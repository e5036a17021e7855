//! HTTP transport for resource requests

use super::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// `reqwest`-backed [`Transport`]
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Option<Url>,
    bearer_token: Option<String>,
}

impl HttpTransport {
    /// Create a transport that resolves request paths against `base_url`
    pub fn new(base_url: Option<&str>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!("resmodel/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        let base_url = base_url
            .map(|u| Url::parse(u).with_context(|| format!("Invalid base URL: {}", u)))
            .transpose()?;

        Ok(Self {
            client,
            base_url,
            bearer_token: None,
        })
    }

    /// Attach a bearer token to every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Resolve an expanded resource path into an absolute URL
    fn resolve(&self, path: &str) -> Result<Url, TransportError> {
        if let Ok(absolute) = Url::parse(path) {
            return Ok(absolute);
        }
        let Some(base) = &self.base_url else {
            return Err(TransportError::network(format!(
                "Relative URL {} requires a base URL",
                path
            )));
        };
        base.join(path)
            .map_err(|e| TransportError::network(format!("Invalid request URL {}: {}", path, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.resolve(&request.url)?;
        tracing::debug!("{} {}", request.method, url);

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Patch => self.client.patch(url),
            Method::Delete => self.client.delete(url),
        };

        let pairs = request.query_pairs();
        if !pairs.is_empty() {
            builder = builder.query(&pairs);
        }
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::network(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            let data = serde_json::from_str(&body).unwrap_or(Value::Null);
            return Err(TransportError::status(status.as_u16(), data));
        }

        let data = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|e| {
                TransportError::network(format!("Failed to parse response JSON: {}", e))
            })?
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            data,
        })
    }
}
