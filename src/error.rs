//! Error types for resource classes and cached resources.

use crate::transport::TransportError;
use thiserror::Error;

/// Shape of a response payload, used to report configuration mismatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Array,
    Object,
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Array => f.write_str("array"),
            Shape::Object => f.write_str("object"),
        }
    }
}

/// Errors raised while building, sending, or reconciling a resource request.
///
/// Build-time variants (`InvalidParameterName`, `TooManyArguments`,
/// `UnknownAction`, `NoRuntime`) are returned synchronously from the call site before any
/// request leaves the process. Response-time variants settle the pending
/// result and are handed to the error callback. The type is `Clone` because
/// every holder of a pending handle observes the same outcome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResourceError {
    /// A URL placeholder or `@member` path is malformed or reserved.
    #[error("invalid parameter name \"{name}\": {reason}")]
    InvalidParameterName { name: String, reason: String },

    /// More positional arguments than `[params, data, success, error]`.
    #[error("expected up to {max} arguments [params, data, success, error], got {got}")]
    TooManyArguments { got: usize, max: usize },

    /// The action table has no entry with this name.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Actions start their request on the current Tokio runtime, and there is none.
    #[error("no Tokio runtime is running to start the request on")]
    NoRuntime,

    /// The payload's array-ness disagrees with the action's `is_array` flag.
    #[error("error in resource configuration: expected response to contain an {expected} but got an {actual}")]
    ResponseShapeMismatch { expected: Shape, actual: Shape },

    /// The transport failed or the server answered with a non-success status.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ResourceError {
    pub(crate) fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ResourceError::InvalidParameterName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status of the failed response, if the failure came from the server
    pub fn status(&self) -> Option<u16> {
        match self {
            ResourceError::Transport(e) => e.status,
            _ => None,
        }
    }
}
