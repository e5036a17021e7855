//! Action descriptors
//!
//! An action is one callable operation on a resource class: a verb, whether
//! the response is a list, how to derive route parameters from the body,
//! and optional response hooks.

use super::instance::{ActionOutput, Outcome};
use super::template::{ParamValue, Params};
use crate::error::ResourceError;
use crate::transport::Method;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Everything a response interceptor gets to look at
#[derive(Debug, Clone)]
pub struct ActionResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Raw payload as received
    pub data: Value,
    /// The instance or collection the payload was reconciled into
    pub resource: ActionOutput,
}

/// Turns a reconciled response into the value handed to success callbacks
pub type ResponseInterceptor = Arc<dyn Fn(ActionResponse) -> ActionOutput + Send + Sync>;

/// Last say on a failure: recover with a value, or pass an error on
pub type ResponseErrorInterceptor = Arc<dyn Fn(ResourceError) -> Outcome + Send + Sync>;

#[derive(Clone, Default)]
pub struct Interceptors {
    pub response: Option<ResponseInterceptor>,
    pub response_error: Option<ResponseErrorInterceptor>,
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("response", &self.response.is_some())
            .field("response_error", &self.response_error.is_some())
            .finish()
    }
}

/// Static configuration of one action
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    pub method: Method,
    /// Response is expected to be a JSON array
    #[serde(default)]
    pub is_array: bool,
    /// Parameters derived per call, typically `"@id"` lookups on the body
    #[serde(default)]
    pub params: Params,
    /// Replaces the resource's URL template for this action only
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(skip)]
    pub interceptor: Interceptors,
}

impl ActionDescriptor {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            is_array: false,
            params: Params::new(),
            url: None,
            headers: BTreeMap::new(),
            timeout_ms: None,
            interceptor: Interceptors::default(),
        }
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_response_interceptor(
        mut self,
        f: impl Fn(ActionResponse) -> ActionOutput + Send + Sync + 'static,
    ) -> Self {
        self.interceptor.response = Some(Arc::new(f));
        self
    }

    pub fn with_response_error_interceptor(
        mut self,
        f: impl Fn(ResourceError) -> Outcome + Send + Sync + 'static,
    ) -> Self {
        self.interceptor.response_error = Some(Arc::new(f));
        self
    }

    /// Whether the verb carries a request body
    pub fn has_body(&self) -> bool {
        self.method.has_body()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Action table keyed by action name
pub type Actions = BTreeMap<String, ActionDescriptor>;

/// `get`, `save`, `query`, `remove`, `delete`
pub fn default_actions() -> Actions {
    let mut actions = Actions::new();
    actions.insert("get".into(), ActionDescriptor::new(Method::Get));
    actions.insert("save".into(), ActionDescriptor::new(Method::Post));
    actions.insert("query".into(), ActionDescriptor::new(Method::Get).array());
    actions.insert("remove".into(), ActionDescriptor::new(Method::Delete));
    actions.insert("delete".into(), ActionDescriptor::new(Method::Delete));
    actions
}
