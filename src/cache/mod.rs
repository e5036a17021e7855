//! Cached resources
//!
//! A [`CachedResource`] sits in front of a [`ResourceClass`] and keeps one
//! canonical instance per key. Lookups that can be answered from the cache
//! return that instance without touching the network; everything else goes
//! through the class's `get` action and the response is merged back into the
//! cache entry keyed by the response's own `id`.
//!
//! # Completeness
//!
//! A cached entry may hold only part of a record, for example when it was
//! primed from a listing. Parameters named in the resource's hot set mark
//! attributes that must already be present for the entry to count as a full
//! answer; see [`is_complete`].

mod store;

pub use store::{CachePolicy, InstanceCache, DEFAULT_MAX_ENTRIES};

use crate::error::{ResourceError, Shape};
use crate::resource::{ActionOutput, Arg, Callback, Instance, Pending, ResourceClass, ResourceDefinition};
use crate::transport::Transport;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Decides whether a cached entry answers a request with these params
pub type CompletenessCheck =
    Arc<dyn Fn(&Instance, &Map<String, Value>, &[String]) -> bool + Send + Sync>;

/// Every requested parameter that is hot must already be an attribute of
/// the cached entry
pub fn is_complete(entry: &Instance, requested: &Map<String, Value>, hot: &[String]) -> bool {
    requested
        .keys()
        .filter(|key| hot.iter().any(|h| h == *key))
        .all(|key| entry.has(key))
}

/// Stringify an id attribute into a cache key
pub fn cache_key(id: &Value) -> Option<String> {
    match id {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Result of [`CachedResource::get`]
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Answered from the cache; no request was made
    Cached(Instance),
    /// A request is in flight; the instance fills in when it resolves
    Fetching(Instance),
}

impl CacheLookup {
    pub fn instance(&self) -> &Instance {
        match self {
            CacheLookup::Cached(i) | CacheLookup::Fetching(i) => i,
        }
    }

    pub fn into_instance(self) -> Instance {
        match self {
            CacheLookup::Cached(i) | CacheLookup::Fetching(i) => i,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, CacheLookup::Cached(_))
    }

    /// The in-flight request, if this lookup started one
    pub fn pending(&self) -> Option<Pending> {
        match self {
            CacheLookup::Cached(_) => None,
            CacheLookup::Fetching(i) => i.pending(),
        }
    }
}

struct CachedInner {
    definition: ResourceDefinition,
    transport: Arc<dyn Transport>,
    resource: ResourceClass,
    cache: Mutex<InstanceCache>,
    completeness: CompletenessCheck,
}

/// A resource class fronted by a per-type instance cache
#[derive(Clone)]
pub struct CachedResource {
    inner: Arc<CachedInner>,
}

impl CachedResource {
    pub fn new(definition: ResourceDefinition, transport: Arc<dyn Transport>, policy: CachePolicy) -> Self {
        let resource = definition.build_class(transport.clone());
        let cache = InstanceCache::new(format!("{}Cache", definition.id), policy);
        Self {
            inner: Arc::new(CachedInner {
                definition,
                transport,
                resource,
                cache: Mutex::new(cache),
                completeness: Arc::new(is_complete),
            }),
        }
    }

    /// Replace the completeness heuristic. The returned resource starts
    /// with an empty cache.
    pub fn with_completeness(
        self,
        check: impl Fn(&Instance, &Map<String, Value>, &[String]) -> bool + Send + Sync + 'static,
    ) -> Self {
        let inner = &*self.inner;
        let policy = lock(&inner.cache).policy();
        Self {
            inner: Arc::new(CachedInner {
                definition: inner.definition.clone(),
                transport: inner.transport.clone(),
                resource: inner.resource.clone(),
                cache: Mutex::new(InstanceCache::new(format!("{}Cache", inner.definition.id), policy)),
                completeness: Arc::new(check),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.definition.id
    }

    pub fn hot_params(&self) -> &[String] {
        &self.inner.definition.hot_params
    }

    /// The cached class itself
    pub fn resource(&self) -> &ResourceClass {
        &self.inner.resource
    }

    /// A fresh, uncached class with the same definition
    pub fn shell(&self) -> ResourceClass {
        self.inner.definition.build_class(self.inner.transport.clone())
    }

    /// Answer from the cache when the entry for `key` is complete for
    /// `params`, otherwise fetch through the `get` action and merge the
    /// response into the cache. Non-object `params` count as none.
    pub fn get(&self, key: &str, params: Value) -> Result<CacheLookup, ResourceError> {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let cached = lock(&self.inner.cache).get(key);
        if let Some(entry) = cached {
            if (self.inner.completeness)(&entry, &params, self.hot_params()) {
                tracing::debug!(resource = %self.id(), key, "cache hit");
                return Ok(CacheLookup::Cached(entry));
            }
            tracing::debug!(resource = %self.id(), key, "cache entry incomplete");
        } else {
            tracing::debug!(resource = %self.id(), key, "cache miss");
        }

        if self.inner.resource.action("get").is_some_and(|a| a.is_array) {
            return Err(ResourceError::ResponseShapeMismatch {
                expected: Shape::Object,
                actual: Shape::Array,
            });
        }

        let cache = self.clone();
        let store = Callback::on_success(move |value, _| match value {
            ActionOutput::Instance(fresh) => cache.absorb(fresh),
            ActionOutput::Raw(data @ Value::Object(_)) => {
                let fresh = cache.inner.resource.instance(data.clone());
                cache.absorb(&fresh);
            }
            _ => tracing::warn!(resource = %cache.id(), "response is not a record; not cached"),
        });

        let output = self
            .inner
            .resource
            .get(vec![Arg::Value(Value::Object(params)), Arg::Callback(store)])?;
        let instance = output
            .as_instance()
            .cloned()
            .ok_or(ResourceError::ResponseShapeMismatch {
                expected: Shape::Object,
                actual: Shape::Array,
            })?;
        Ok(CacheLookup::Fetching(instance))
    }

    /// Merge `attrs` into the entry for `key`, creating it if absent
    pub fn put(&self, key: &str, attrs: Value) -> Instance {
        let fresh = self.inner.resource.instance(attrs);
        let attrs = fresh.attributes();
        lock(&self.inner.cache).merge(key, &attrs, &fresh)
    }

    /// Peek at an entry without completeness checks or network access
    pub fn cached(&self, key: &str) -> Option<Instance> {
        lock(&self.inner.cache).get(key)
    }

    pub fn remove(&self, key: &str) -> Option<Instance> {
        lock(&self.inner.cache).remove(key)
    }

    pub fn clear(&self) {
        lock(&self.inner.cache).clear()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold a freshly resolved instance into the cache under its own id
    fn absorb(&self, fresh: &Instance) {
        let Some(key) = fresh.get("id").as_ref().and_then(cache_key) else {
            tracing::warn!(resource = %self.id(), "response has no id; not cached");
            return;
        };
        let attrs = fresh.attributes();
        lock(&self.inner.cache).merge(&key, &attrs, fresh);
    }
}

fn lock(cache: &Mutex<InstanceCache>) -> MutexGuard<'_, InstanceCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

impl fmt::Debug for CachedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedResource")
            .field("id", &self.id())
            .field("url", &self.inner.resource.url())
            .field("hot_params", &self.hot_params())
            .finish()
    }
}
