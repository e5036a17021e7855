//! Argument dispatch for action calls
//!
//! Actions accept a loose positional argument list so the same action can be
//! called as `get(params)`, `get(callback)`, `get(params, callback)`,
//! `save(params, data, callback, error_callback)` and so on. The rules live in
//! [`resolve_args`]; nothing else in the crate inspects argument shapes.

use super::instance::ActionOutput;
use crate::error::ResourceError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Upper bound for static calls: `[params, data, success, error]`
pub const MAX_STATIC_ARGS: usize = 4;

/// Upper bound for instance calls: `[params, success, error]`
pub const MAX_INSTANCE_ARGS: usize = 3;

/// What a callback is invoked with
pub enum CallbackEvent<'a> {
    Success {
        value: &'a ActionOutput,
        headers: &'a BTreeMap<String, String>,
    },
    Failure(&'a ResourceError),
}

/// A callable argument. Whether it acts as the success or the error
/// callback is decided by its position, so one type serves both roles.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(CallbackEvent<'_>) + Send + Sync>);

impl Callback {
    pub fn new(f: impl Fn(CallbackEvent<'_>) + Send + Sync + 'static) -> Self {
        Callback(Arc::new(f))
    }

    /// Callback that only reacts to success
    pub fn on_success(
        f: impl Fn(&ActionOutput, &BTreeMap<String, String>) + Send + Sync + 'static,
    ) -> Self {
        Callback::new(move |event| {
            if let CallbackEvent::Success { value, headers } = event {
                f(value, headers)
            }
        })
    }

    /// Callback that only reacts to failure
    pub fn on_error(f: impl Fn(&ResourceError) + Send + Sync + 'static) -> Self {
        Callback::new(move |event| {
            if let CallbackEvent::Failure(err) = event {
                f(err)
            }
        })
    }

    pub(crate) fn invoke(&self, event: CallbackEvent<'_>) {
        (self.0)(event)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// One positional argument of an action call
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Callback(Callback),
}

impl Arg {
    pub fn success(
        f: impl Fn(&ActionOutput, &BTreeMap<String, String>) + Send + Sync + 'static,
    ) -> Self {
        Arg::Callback(Callback::on_success(f))
    }

    pub fn error(f: impl Fn(&ResourceError) + Send + Sync + 'static) -> Self {
        Arg::Callback(Callback::on_error(f))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Arg::Callback(_))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<Callback> for Arg {
    fn from(callback: Callback) -> Self {
        Arg::Callback(callback)
    }
}

/// The classified form of an argument list
#[derive(Debug, Clone, Default)]
pub struct ResolvedArgs {
    pub params: Option<Value>,
    pub data: Option<Value>,
    pub on_success: Option<Callback>,
    pub on_error: Option<Callback>,
}

fn as_value(arg: Option<Arg>, slot: &str) -> Option<Value> {
    match arg? {
        Arg::Value(v) => Some(v),
        Arg::Callback(_) => {
            tracing::warn!("callback passed in the {} position is ignored", slot);
            None
        }
    }
}

fn as_callback(arg: Option<Arg>, slot: &str) -> Option<Callback> {
    match arg? {
        Arg::Callback(c) => Some(c),
        Arg::Value(_) => {
            tracing::warn!("value passed in the {} callback position is ignored", slot);
            None
        }
    }
}

/// Classify a lone leading argument: callable → success, otherwise body for
/// body-carrying methods, otherwise params
fn classify_leading(arg: Option<Arg>, has_body: bool, resolved: &mut ResolvedArgs) {
    match arg {
        Some(Arg::Callback(c)) => resolved.on_success = Some(c),
        Some(Arg::Value(v)) if has_body => resolved.data = Some(v),
        Some(Arg::Value(v)) => resolved.params = Some(v),
        None => {}
    }
}

/// Classify a static call's arguments into params, body, and callbacks.
///
/// Callable-ness takes precedence over position: with two or more
/// arguments, a callable second argument means the call carries no body
/// argument, and the leading argument is classified on its own.
pub fn resolve_args(args: Vec<Arg>, has_body: bool) -> Result<ResolvedArgs, ResourceError> {
    let count = args.len();
    if count > MAX_STATIC_ARGS {
        return Err(ResourceError::TooManyArguments {
            got: count,
            max: MAX_STATIC_ARGS,
        });
    }

    let mut args = args.into_iter();
    let (a1, a2, a3, a4) = (args.next(), args.next(), args.next(), args.next());
    let mut resolved = ResolvedArgs::default();

    if count == 4 {
        resolved.on_error = as_callback(a4, "error");
    }

    match count {
        0 => {}
        1 => classify_leading(a1, has_body, &mut resolved),
        _ => {
            let second_callable = a2.as_ref().is_some_and(Arg::is_callable);
            let first_callable = a1.as_ref().is_some_and(Arg::is_callable);

            if second_callable && first_callable {
                resolved.on_success = as_callback(a1, "success");
                resolved.on_error = as_callback(a2, "error");
            } else if second_callable {
                resolved.on_success = as_callback(a2, "success");
                resolved.on_error = as_callback(a3, "error");
                classify_leading(a1, has_body, &mut resolved);
            } else {
                resolved.params = as_value(a1, "params");
                resolved.data = as_value(a2, "data");
                resolved.on_success = as_callback(a3, "success");
            }
        }
    }

    Ok(resolved)
}

/// Classify an instance call's `(params, success, error)`; a callable first
/// argument shifts into the callback positions
pub fn resolve_instance_args(args: Vec<Arg>) -> Result<ResolvedArgs, ResourceError> {
    let count = args.len();
    if count > MAX_INSTANCE_ARGS {
        return Err(ResourceError::TooManyArguments {
            got: count,
            max: MAX_INSTANCE_ARGS,
        });
    }

    let mut args = args.into_iter();
    let (a1, a2, a3) = (args.next(), args.next(), args.next());

    let resolved = if a1.as_ref().is_some_and(Arg::is_callable) {
        ResolvedArgs {
            on_success: as_callback(a1, "success"),
            on_error: as_callback(a2, "error"),
            ..Default::default()
        }
    } else {
        ResolvedArgs {
            params: as_value(a1, "params"),
            on_success: as_callback(a2, "success"),
            on_error: as_callback(a3, "error"),
            ..Default::default()
        }
    };

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cb() -> Arg {
        Arg::Callback(Callback::new(|_| {}))
    }

    fn val(v: Value) -> Arg {
        Arg::Value(v)
    }

    #[test]
    fn test_no_arguments() {
        let r = resolve_args(vec![], false).unwrap();
        assert!(r.params.is_none() && r.data.is_none());
        assert!(r.on_success.is_none() && r.on_error.is_none());
    }

    #[test]
    fn test_single_value_depends_on_body() {
        let r = resolve_args(vec![val(json!(42))], true).unwrap();
        assert_eq!(r.data, Some(json!(42)));
        assert!(r.params.is_none());

        let r = resolve_args(vec![val(json!(42))], false).unwrap();
        assert_eq!(r.params, Some(json!(42)));
        assert!(r.data.is_none());
    }

    #[test]
    fn test_single_callback_is_success_for_any_method() {
        for has_body in [true, false] {
            let r = resolve_args(vec![cb()], has_body).unwrap();
            assert!(r.on_success.is_some());
            assert!(r.params.is_none() && r.data.is_none() && r.on_error.is_none());
        }
    }

    #[test]
    fn test_two_callbacks() {
        let r = resolve_args(vec![cb(), cb()], false).unwrap();
        assert!(r.on_success.is_some() && r.on_error.is_some());
        assert!(r.params.is_none());
    }

    #[test]
    fn test_two_values() {
        let r = resolve_args(vec![val(json!({"id": 1})), val(json!({"name": "x"}))], true).unwrap();
        assert_eq!(r.params, Some(json!({"id": 1})));
        assert_eq!(r.data, Some(json!({"name": "x"})));
        assert!(r.on_success.is_none());
    }

    #[test]
    fn test_params_then_callback() {
        let r = resolve_args(vec![val(json!({"id": 1})), cb()], false).unwrap();
        assert_eq!(r.params, Some(json!({"id": 1})));
        assert!(r.on_success.is_some() && r.on_error.is_none());

        let r = resolve_args(vec![val(json!({"name": "x"})), cb()], true).unwrap();
        assert_eq!(r.data, Some(json!({"name": "x"})));
        assert!(r.params.is_none());
    }

    #[test]
    fn test_three_arguments() {
        let r = resolve_args(vec![val(json!({"id": 1})), cb(), cb()], false).unwrap();
        assert_eq!(r.params, Some(json!({"id": 1})));
        assert!(r.on_success.is_some() && r.on_error.is_some());

        let r = resolve_args(vec![val(json!({"id": 1})), val(json!({"a": 1})), cb()], true).unwrap();
        assert_eq!(r.params, Some(json!({"id": 1})));
        assert_eq!(r.data, Some(json!({"a": 1})));
        assert!(r.on_success.is_some() && r.on_error.is_none());
    }

    #[test]
    fn test_four_arguments() {
        let r = resolve_args(
            vec![val(json!({"id": 1})), val(json!({"a": 1})), cb(), cb()],
            true,
        )
        .unwrap();
        assert_eq!(r.params, Some(json!({"id": 1})));
        assert_eq!(r.data, Some(json!({"a": 1})));
        assert!(r.on_success.is_some() && r.on_error.is_some());
    }

    #[test]
    fn test_too_many_arguments() {
        let err = resolve_args(vec![cb(), cb(), cb(), cb(), cb()], false).unwrap_err();
        assert_eq!(err, ResourceError::TooManyArguments { got: 5, max: 4 });
    }

    #[test]
    fn test_positions_pick_the_right_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let success = Arg::success(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let r = resolve_args(vec![val(json!({})), success, cb()], false).unwrap();

        let output = ActionOutput::Raw(Value::Null);
        let headers = BTreeMap::new();
        r.on_success.unwrap().invoke(CallbackEvent::Success {
            value: &output,
            headers: &headers,
        });
        r.on_error
            .unwrap()
            .invoke(CallbackEvent::Failure(&ResourceError::UnknownAction("x".into())));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_instance_args_shift_when_first_is_callable() {
        let r = resolve_instance_args(vec![cb(), cb()]).unwrap();
        assert!(r.params.is_none());
        assert!(r.on_success.is_some() && r.on_error.is_some());

        let r = resolve_instance_args(vec![val(json!({"id": 2})), cb()]).unwrap();
        assert_eq!(r.params, Some(json!({"id": 2})));
        assert!(r.on_success.is_some() && r.on_error.is_none());

        let err = resolve_instance_args(vec![cb(), cb(), cb(), cb()]).unwrap_err();
        assert_eq!(err, ResourceError::TooManyArguments { got: 4, max: 3 });
    }
}
