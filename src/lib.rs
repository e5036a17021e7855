//! resmodel - declarative REST resources with a per-type instance cache
//!
//! Resources are described by a URL template and a table of actions. Each
//! action call returns a record straight away and fills it in once the
//! response arrives; a [`CachedResource`] keeps one canonical record per key
//! and skips the network when the cached record already has what the caller
//! asked for.

pub mod cache;
pub mod config;
pub mod error;
pub mod resource;
pub mod transport;

pub use cache::{is_complete, CacheLookup, CachePolicy, CachedResource};
pub use error::{ResourceError, Shape};
pub use resource::{
    ActionDescriptor, ActionOutput, Arg, Callback, Collection, Instance, Pending, ResourceClass,
    ResourceDefinition, ResourceRegistry,
};
pub use transport::{HttpTransport, Method, Transport};
