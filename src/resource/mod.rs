//! Resource object model
//!
//! A resource class turns a URL template plus an action table into callable
//! operations whose results are shared, mutable records.
//!
//! # Architecture
//!
//! - [`template`] - URL template expansion and parameter values
//! - [`dispatch`] - Positional argument resolution and callbacks
//! - [`action`] - Action descriptors and the default action table
//! - [`class`] - Resource classes: request building, sending, reconciling
//! - [`instance`] - Instances, collections and pending results
//! - [`registry`] - Resource definitions loaded from JSON or YAML
//!
//! # Example
//!
//! ```ignore
//! use resmodel::resource::{Arg, ResourceDefinition};
//!
//! let users = ResourceDefinition::new("user", "/api/users/:id").build_class(transport);
//! let user = users.get(vec![Arg::Value(json!({"id": 5}))])?;
//! let user = user.pending().unwrap().await?;
//! ```

pub mod action;
mod class;
pub mod dispatch;
mod instance;
mod registry;
pub mod template;

pub use action::{default_actions, ActionDescriptor, ActionResponse, Actions};
pub use class::ResourceClass;
pub use dispatch::{Arg, Callback, CallbackEvent};
pub use instance::{ActionOutput, Collection, Instance, Outcome, Pending};
pub use registry::*;
pub use template::{ParamValue, Params, UrlTemplate};
