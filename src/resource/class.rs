//! Resource classes
//!
//! A [`ResourceClass`] is built from a URL template, parameter defaults and
//! an action table. Calling an action builds the request synchronously,
//! starts it on the Tokio runtime, and hands back the record the response
//! will be reconciled into.

use super::action::{default_actions, ActionDescriptor, ActionResponse, Actions};
use super::dispatch::{resolve_args, resolve_instance_args, Arg, CallbackEvent, ResolvedArgs};
use super::instance::{share, ActionOutput, Collection, Instance, Pending, Settled, SharedOutcome};
use super::template::{ParamValue, Params, UrlTemplate};
use crate::error::{ResourceError, Shape};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use uuid::Uuid;

#[derive(Clone)]
struct ClassInner {
    template: UrlTemplate,
    defaults: Params,
    actions: Actions,
    transport: Arc<dyn Transport>,
}

/// Callable object model for one REST resource
#[derive(Clone)]
pub struct ResourceClass {
    inner: Arc<ClassInner>,
}

/// Where a response lands
#[derive(Clone)]
enum Target {
    Instance(Instance),
    Collection(Collection),
}

impl Target {
    fn begin(&self, pending: SharedOutcome) {
        match self {
            Target::Instance(i) => i.begin(pending),
            Target::Collection(c) => c.begin(pending),
        }
    }

    fn mark_resolved(&self) {
        match self {
            Target::Instance(i) => i.mark_resolved(),
            Target::Collection(c) => c.mark_resolved(),
        }
    }

    fn output(&self) -> ActionOutput {
        match self {
            Target::Instance(i) => ActionOutput::Instance(i.clone()),
            Target::Collection(c) => ActionOutput::Collection(c.clone()),
        }
    }

    /// Record a success value, leaving self-references implicit
    fn settle(&self, output: ActionOutput) -> Settled {
        let is_self = match (self, &output) {
            (Target::Instance(t), ActionOutput::Instance(o)) => t.ptr_eq(o),
            (Target::Collection(t), ActionOutput::Collection(o)) => t.ptr_eq(o),
            _ => false,
        };
        if is_self {
            Settled::Target
        } else {
            Settled::Output(output)
        }
    }
}

impl ResourceClass {
    /// `actions` extend and override the default `get`/`save`/`query`/`remove`/`delete` table
    pub fn new(
        url: impl Into<String>,
        defaults: Params,
        actions: Actions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let mut table = default_actions();
        table.extend(actions);
        Self {
            inner: Arc::new(ClassInner {
                template: UrlTemplate::new(url),
                defaults,
                actions: table,
                transport,
            }),
        }
    }

    pub fn url(&self) -> &str {
        self.inner.template.pattern()
    }

    pub fn action(&self, name: &str) -> Option<&ActionDescriptor> {
        self.inner.actions.get(name)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.inner.actions.keys().map(|k| k.as_str())
    }

    /// A new record of this class, able to invoke its actions
    pub fn instance(&self, value: Value) -> Instance {
        Instance::with_class(value, Some(self.clone()))
    }

    /// A class with the same template and actions, and `extra` layered over
    /// the parameter defaults
    pub fn bind(&self, extra: Params) -> ResourceClass {
        let mut inner = (*self.inner).clone();
        inner.defaults.extend(extra);
        ResourceClass {
            inner: Arc::new(inner),
        }
    }

    /// Static call: returns a fresh instance (or collection for array
    /// actions) whose resolution flag flips once the response is reconciled
    pub fn call(&self, action: &str, args: Vec<Arg>) -> Result<ActionOutput, ResourceError> {
        let runtime = current_runtime()?;
        let descriptor = self.lookup(action)?;
        let resolved = resolve_args(args, descriptor.has_body())?;

        let target = if descriptor.is_array {
            Target::Collection(Collection::new())
        } else {
            Target::Instance(self.instance(resolved.data.clone().unwrap_or(Value::Null)))
        };
        let body = if descriptor.has_body() {
            resolved.data.clone().filter(|data| !data.is_null())
        } else {
            None
        };
        let extraction_source = resolved.data.clone();

        let shared = self.prepare(action, descriptor, resolved, extraction_source.as_ref(), body, &target)?;
        target.begin(shared.clone());
        launch(&runtime, &shared);

        Ok(target.output())
    }

    pub fn get(&self, args: Vec<Arg>) -> Result<ActionOutput, ResourceError> {
        self.call("get", args)
    }

    pub fn query(&self, args: Vec<Arg>) -> Result<ActionOutput, ResourceError> {
        self.call("query", args)
    }

    pub fn save(&self, args: Vec<Arg>) -> Result<ActionOutput, ResourceError> {
        self.call("save", args)
    }

    pub fn remove(&self, args: Vec<Arg>) -> Result<ActionOutput, ResourceError> {
        self.call("remove", args)
    }

    pub fn delete(&self, args: Vec<Arg>) -> Result<ActionOutput, ResourceError> {
        self.call("delete", args)
    }

    /// Instance call: the instance is the body and the mutation target.
    /// Array actions reconcile into a fresh collection instead.
    pub(crate) fn call_on_instance(
        &self,
        action: &str,
        instance: &Instance,
        args: Vec<Arg>,
    ) -> Result<Pending, ResourceError> {
        let runtime = current_runtime()?;
        let descriptor = self.lookup(action)?;
        let resolved = resolve_instance_args(args)?;

        let data = instance.to_value();
        let body = descriptor.has_body().then(|| data.clone());
        let target = if descriptor.is_array {
            Target::Collection(Collection::new())
        } else {
            Target::Instance(instance.clone())
        };

        let shared = self.prepare(action, descriptor, resolved, Some(&data), body, &target)?;
        launch(&runtime, &shared);
        Ok(Pending::new(shared, target.output()))
    }

    fn lookup(&self, action: &str) -> Result<&ActionDescriptor, ResourceError> {
        self.inner
            .actions
            .get(action)
            .ok_or_else(|| ResourceError::UnknownAction(action.to_string()))
    }

    /// Resource defaults overlaid with the action's own params, evaluated
    /// against the outgoing data
    fn extract_params(&self, data: Option<&Value>, action_params: &Params) -> Result<Params, ResourceError> {
        let mut merged = self.inner.defaults.clone();
        merged.extend(action_params.iter().map(|(k, v)| (k.clone(), v.clone())));

        merged
            .into_iter()
            .map(|(key, value)| Ok((key, ParamValue::Literal(value.evaluate(data)?))))
            .collect()
    }

    fn build_request(
        &self,
        descriptor: &ActionDescriptor,
        explicit: Option<&Value>,
        data: Option<&Value>,
        body: Option<Value>,
    ) -> Result<HttpRequest, ResourceError> {
        let mut params = self.extract_params(data, &descriptor.params)?;
        match explicit {
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    params.insert(key.clone(), ParamValue::Literal(value.clone()));
                }
            }
            Some(Value::Null) | None => {}
            Some(other) => tracing::debug!("ignoring non-object call params: {}", other),
        }

        let expanded = self.inner.template.expand(&params, descriptor.url.as_deref())?;

        let mut request = HttpRequest::new(descriptor.method, expanded.path);
        request.params = expanded.query;
        request.body = body;
        request.headers = descriptor.headers.clone();
        request.timeout = descriptor.timeout();
        Ok(request)
    }

    /// Build the request now (so build errors surface at the call site) and
    /// return the not-yet-started shared outcome
    fn prepare(
        &self,
        action: &str,
        descriptor: &ActionDescriptor,
        args: ResolvedArgs,
        data: Option<&Value>,
        body: Option<Value>,
        target: &Target,
    ) -> Result<SharedOutcome, ResourceError> {
        let request = self.build_request(descriptor, args.params.as_ref(), data, body)?;

        let request_id = Uuid::new_v4();
        tracing::debug!(%request_id, action, "{} {}", request.method, request.url);

        let class = self.clone();
        let transport = self.inner.transport.clone();
        let interceptors = descriptor.interceptor.clone();
        let is_array = descriptor.is_array;
        let target = target.clone();
        let ResolvedArgs {
            on_success, on_error, ..
        } = args;

        Ok(share(async move {
            let reconciled = match transport.send(request).await {
                Ok(response) => class.reconcile(&target, is_array, response),
                Err(e) => Err(ResourceError::from(e)),
            };
            target.mark_resolved();

            match reconciled {
                Ok(response) => {
                    tracing::debug!(%request_id, status = response.status, "request resolved");
                    let headers = response.headers.clone();
                    let value = match &interceptors.response {
                        Some(intercept) => intercept(response),
                        None => response.resource,
                    };
                    if let Some(callback) = &on_success {
                        callback.invoke(CallbackEvent::Success {
                            value: &value,
                            headers: &headers,
                        });
                    }
                    Ok(target.settle(value))
                }
                Err(err) => {
                    tracing::warn!(%request_id, "request failed: {}", err);
                    if let Some(callback) = &on_error {
                        callback.invoke(CallbackEvent::Failure(&err));
                    }
                    match &interceptors.response_error {
                        Some(intercept) => intercept(err).map(|output| target.settle(output)),
                        None => Err(err),
                    }
                }
            }
        }))
    }

    /// Fold a response payload into the target record(s)
    fn reconcile(
        &self,
        target: &Target,
        is_array: bool,
        response: HttpResponse,
    ) -> Result<ActionResponse, ResourceError> {
        let HttpResponse {
            status,
            headers,
            data,
        } = response;

        if !data.is_null() {
            let actual = if data.is_array() { Shape::Array } else { Shape::Object };
            let expected = if is_array { Shape::Array } else { Shape::Object };
            if actual != expected {
                return Err(ResourceError::ResponseShapeMismatch { expected, actual });
            }

            match (target, &data) {
                (Target::Collection(collection), Value::Array(items)) => {
                    collection.replace_items(items.iter().map(|item| self.instance(item.clone())).collect());
                }
                (Target::Instance(instance), Value::Object(attrs)) => instance.merge(attrs),
                _ => tracing::debug!("payload has no attributes to merge"),
            }
        }

        Ok(ActionResponse {
            status,
            headers,
            data,
            resource: target.output(),
        })
    }
}

fn current_runtime() -> Result<Handle, ResourceError> {
    Handle::try_current().map_err(|_| ResourceError::NoRuntime)
}

/// Drive the request to completion whether or not anyone awaits it
fn launch(runtime: &Handle, shared: &SharedOutcome) {
    runtime.spawn(shared.clone());
}

impl fmt::Debug for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClass")
            .field("url", &self.url())
            .field("actions", &self.inner.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::transport::{Method, TransportError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    fn class_with(url: &str, defaults: Params, actions: Actions, transport: &MockTransport) -> ResourceClass {
        ResourceClass::new(url, defaults, actions, Arc::new(transport.clone()))
    }

    fn users(transport: &MockTransport) -> ResourceClass {
        let mut defaults = Params::new();
        defaults.insert("id".into(), ParamValue::from("@id"));
        class_with("/api/users/:id", defaults, Actions::new(), transport)
    }

    #[tokio::test]
    async fn test_static_get_resolves_instance() {
        let transport = MockTransport::new();
        transport.reply_json(json!({"id": 5, "name": "ada"}));
        let users = users(&transport);

        let output = assert_ok!(users.get(vec![Arg::Value(json!({"id": 5}))]));
        let user = output.as_instance().unwrap().clone();
        assert!(!user.is_resolved());

        let value = assert_ok!(user.pending().unwrap().await);
        assert!(value.as_instance().unwrap().ptr_eq(&user));
        assert!(user.is_resolved());
        assert_eq!(user.get("name"), Some(json!("ada")));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].url, "/api/users/5");
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn test_resolution_flag_flips_only_after_response() {
        let transport = MockTransport::new();
        transport.hold();
        transport.reply_json(json!({"id": 1}));
        let users = users(&transport);

        let output = users.get(vec![]).unwrap();
        let pending = output.pending().unwrap();
        tokio::task::yield_now().await;
        assert!(!output.is_resolved());

        transport.release();
        assert_ok!(pending.await);
        assert!(output.is_resolved());
    }

    #[tokio::test]
    async fn test_query_repopulates_collection() {
        let transport = MockTransport::new();
        transport.reply_json(json!([{"id": 1}, {"id": 2}]));
        let users = users(&transport);

        let output = users.query(vec![Arg::Value(json!({"active": true}))]).unwrap();
        let list = output.as_collection().unwrap().clone();
        assert!(list.is_empty());

        let value = assert_ok!(list.pending().unwrap().await);
        assert!(value.as_collection().unwrap().ptr_eq(&list));
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1).unwrap().get("id"), Some(json!(2)));
        assert!(list.get(0).unwrap().class().is_some());

        let request = &transport.requests()[0];
        assert_eq!(request.url, "/api/users");
        assert_eq!(request.params.get("active"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_shape_mismatch_still_resolves() {
        let transport = MockTransport::new();
        transport.reply_json(json!({"id": 1}));
        let users = users(&transport);

        let failures = Arc::new(AtomicUsize::new(0));
        let seen = failures.clone();
        let output = users
            .query(vec![
                Arg::Value(json!({})),
                Arg::success(|_, _| panic!("success must not run")),
                Arg::error(move |err| {
                    assert!(matches!(err, ResourceError::ResponseShapeMismatch { .. }));
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            ])
            .unwrap();

        let err = assert_err!(output.pending().unwrap().await);
        assert_eq!(
            err,
            ResourceError::ResponseShapeMismatch {
                expected: Shape::Array,
                actual: Shape::Object
            }
        );
        assert!(output.is_resolved());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(output.as_collection().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_callback_and_resolution_on_transport_failure() {
        let transport = MockTransport::new();
        transport.reply(Err(TransportError::status(404, json!({"error": "missing"}))));
        let users = users(&transport);

        let failures = Arc::new(AtomicUsize::new(0));
        let seen = failures.clone();
        let output = users
            .get(vec![
                Arg::Value(json!({"id": 9})),
                Arg::success(|_, _| panic!("success must not run")),
                Arg::error(move |err| {
                    assert_eq!(err.status(), Some(404));
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            ])
            .unwrap();

        let err = assert_err!(output.pending().unwrap().await);
        assert_eq!(err.status(), Some(404));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(output.is_resolved());
    }

    #[tokio::test]
    async fn test_success_callback_receives_value_and_headers() {
        let transport = MockTransport::new();
        let mut response = HttpResponse::ok(json!({"id": 3}));
        response.headers.insert("etag".into(), "abc".into());
        transport.reply(Ok(response));
        let users = users(&transport);

        let captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let output = users
            .get(vec![
                Arg::Value(json!({"id": 3})),
                Arg::success(move |value, headers| {
                    *sink.lock().unwrap() = Some((value.to_value(), headers.get("etag").cloned()));
                }),
            ])
            .unwrap();
        assert_ok!(output.pending().unwrap().await);

        let (value, etag) = captured.lock().unwrap().clone().unwrap();
        assert_eq!(value, json!({"id": 3}));
        assert_eq!(etag.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_save_sends_body_and_extracts_id() {
        let transport = MockTransport::new();
        transport.reply_json(json!({"id": 7, "name": "grace", "created": true}));
        let users = users(&transport);

        let output = users.save(vec![Arg::Value(json!({"id": 7, "name": "grace"}))]).unwrap();
        let user = output.as_instance().unwrap().clone();
        assert_eq!(user.get("name"), Some(json!("grace")));
        assert_ok!(user.pending().unwrap().await);

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "/api/users/7");
        assert_eq!(request.body, Some(json!({"id": 7, "name": "grace"})));
        assert_eq!(user.get("created"), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_instance_call_mutates_and_returns_pending() {
        let transport = MockTransport::new();
        transport.reply_json(json!({"id": 4, "name": "after"}));
        let users = users(&transport);

        let user = users.instance(json!({"id": 4, "name": "before", "local": 1}));
        let pending = assert_ok!(user.invoke("save", vec![]));
        let value = assert_ok!(pending.await);

        assert!(value.as_instance().unwrap().ptr_eq(&user));
        assert_eq!(user.get("name"), Some(json!("after")));
        assert_eq!(user.get("local"), Some(json!(1)));
        assert!(user.is_resolved());

        let request = &transport.requests()[0];
        assert_eq!(request.url, "/api/users/4");
        assert_eq!(request.body, Some(json!({"id": 4, "name": "before", "local": 1})));
    }

    #[tokio::test]
    async fn test_instance_call_with_leading_callback() {
        let transport = MockTransport::new();
        transport.reply_json(Value::Null);
        let users = users(&transport);

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let user = users.instance(json!({"id": 2}));
        let pending = user
            .invoke(
                "remove",
                vec![Arg::success(move |_, _| {
                    seen.fetch_add(1, Ordering::SeqCst);
                })],
            )
            .unwrap();
        assert_ok!(pending.await);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(transport.requests()[0].method, Method::Delete);
        assert_eq!(transport.requests()[0].url, "/api/users/2");
        assert!(transport.requests()[0].body.is_none());
    }

    #[tokio::test]
    async fn test_custom_action_with_override_url_and_interceptors() {
        let transport = MockTransport::new();
        transport.reply_json(json!({"id": 1, "count": 12}));
        transport.reply(Err(TransportError::network("connection reset")));

        let mut actions = Actions::new();
        actions.insert(
            "stats".into(),
            ActionDescriptor::new(Method::Get)
                .with_url("/api/users/:id/stats")
                .with_header("x-trace", "1")
                .with_response_interceptor(|response| ActionOutput::Raw(response.data["count"].clone())),
        );
        actions.insert(
            "ping".into(),
            ActionDescriptor::new(Method::Get)
                .with_response_error_interceptor(|_| Ok(ActionOutput::Raw(json!("offline")))),
        );
        let users = class_with("/api/users/:id", Params::new(), actions, &transport);

        let stats = users.call("stats", vec![Arg::Value(json!({"id": 1}))]).unwrap();
        let value = assert_ok!(stats.pending().unwrap().await);
        assert_eq!(value.to_value(), json!(12));
        assert_eq!(stats.as_instance().unwrap().get("count"), Some(json!(12)));

        let ping = users.call("ping", vec![]).unwrap();
        let recovered = assert_ok!(ping.pending().unwrap().await);
        assert_eq!(recovered.to_value(), json!("offline"));
        assert!(ping.is_resolved());

        let requests = transport.requests();
        assert_eq!(requests[0].url, "/api/users/1/stats");
        assert_eq!(requests[0].headers.get("x-trace").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_build_errors_are_synchronous() {
        let transport = MockTransport::new();
        let users = users(&transport);

        let err = users
            .get((0..5).map(|_| Arg::Value(json!({}))).collect())
            .unwrap_err();
        assert!(matches!(err, ResourceError::TooManyArguments { got: 5, .. }));

        let err = users.call("frobnicate", vec![]).unwrap_err();
        assert_eq!(err, ResourceError::UnknownAction("frobnicate".into()));

        let broken = class_with("/api/:hasOwnProperty", Params::new(), Actions::new(), &transport);
        assert!(matches!(
            broken.get(vec![]),
            Err(ResourceError::InvalidParameterName { .. })
        ));

        let mut bad_path = Params::new();
        bad_path.insert("id".into(), ParamValue::from("@owner..id"));
        let broken = class_with("/api/:id", bad_path, Actions::new(), &transport);
        assert!(matches!(
            broken.save(vec![Arg::Value(json!({"owner": {"id": 1}}))]),
            Err(ResourceError::InvalidParameterName { .. })
        ));

        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_calls_outside_runtime_fail_without_sending() {
        let transport = MockTransport::new();
        let users = users(&transport);

        let err = assert_err!(users.get(vec![Arg::Value(json!({"id": 1}))]));
        assert_eq!(err, ResourceError::NoRuntime);

        let user = users.instance(json!({"id": 1}));
        assert_eq!(assert_err!(user.invoke("save", vec![])), ResourceError::NoRuntime);
        assert!(!user.is_resolved());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_null_data_on_body_action_sends_no_body() {
        let transport = MockTransport::new();
        transport.reply_json(json!({"id": 8, "touched": true}));
        let users = users(&transport);

        let output = users
            .save(vec![Arg::Value(json!({"id": 8, "dry": true})), Arg::Value(Value::Null)])
            .unwrap();
        assert_ok!(output.pending().unwrap().await);

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "/api/users/8");
        assert_eq!(request.params.get("dry"), Some(&json!(true)));
        assert!(request.body.is_none());
        assert_eq!(output.as_instance().unwrap().get("touched"), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_bind_layers_defaults() {
        let transport = MockTransport::new();
        transport.reply_json(json!([]));
        let mut defaults = Params::new();
        defaults.insert("format".into(), ParamValue::from("json"));
        let posts = class_with("/api/:owner/posts", defaults, Actions::new(), &transport);

        let mut extra = Params::new();
        extra.insert("owner".into(), ParamValue::from("ada"));
        let bound = posts.bind(extra);

        let output = bound.query(vec![]).unwrap();
        assert_ok!(output.pending().unwrap().await);

        let request = &transport.requests()[0];
        assert_eq!(request.url, "/api/ada/posts");
        assert_eq!(request.params.get("format"), Some(&json!("json")));
        assert_eq!(posts.url(), bound.url());
    }

    #[tokio::test]
    async fn test_lazy_default_evaluated_per_call() {
        let transport = MockTransport::new();
        transport.reply_json(json!({}));
        transport.reply_json(json!({}));
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counter.clone();
        let mut defaults = Params::new();
        defaults.insert(
            "page".into(),
            ParamValue::lazy(move || json!(source.fetch_add(1, Ordering::SeqCst))),
        );
        let feed = class_with("/feed/:page", defaults, Actions::new(), &transport);

        assert_ok!(feed.get(vec![]).unwrap().pending().unwrap().await);
        assert_ok!(feed.get(vec![]).unwrap().pending().unwrap().await);

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["/feed/0".to_string(), "/feed/1".to_string()]);
    }
}
