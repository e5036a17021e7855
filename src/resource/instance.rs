//! Resource instances, collections, and pending results
//!
//! Instances and collections are shared handles: cloning one yields another
//! view of the same record, so a response that arrives later is visible to
//! every holder. Attribute merges are the only way a response touches an
//! existing record.

use super::class::ResourceClass;
use super::dispatch::Arg;
use crate::error::ResourceError;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};

/// What a settled action yields
pub type Outcome = Result<ActionOutput, ResourceError>;

/// Settlement as stored inside a record. Success normally means "the
/// record itself", which is kept implicit so a record never owns a handle
/// that owns the record.
#[derive(Debug, Clone)]
pub(crate) enum Settled {
    Target,
    Output(ActionOutput),
}

pub(crate) type SharedOutcome = Shared<BoxFuture<'static, Result<Settled, ResourceError>>>;

pub(crate) fn share(
    future: impl Future<Output = Result<Settled, ResourceError>> + Send + 'static,
) -> SharedOutcome {
    future.boxed().shared()
}

/// Handle on an in-flight or settled request. Clones share one outcome.
#[derive(Clone)]
pub struct Pending {
    shared: SharedOutcome,
    target: ActionOutput,
}

impl Pending {
    pub(crate) fn new(shared: SharedOutcome, target: ActionOutput) -> Self {
        Self { shared, target }
    }

    fn finish(&self, settled: &Result<Settled, ResourceError>) -> Outcome {
        match settled {
            Ok(Settled::Target) => Ok(self.target.clone()),
            Ok(Settled::Output(output)) => Ok(output.clone()),
            Err(e) => Err(e.clone()),
        }
    }

    /// The outcome, if the request has settled
    pub fn peek(&self) -> Option<Outcome> {
        self.shared.peek().map(|settled| self.finish(settled))
    }
}

impl Future for Pending {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        match self.shared.poll_unpin(cx) {
            Poll::Ready(settled) => Poll::Ready(self.finish(&settled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("settled", &self.shared.peek().is_some())
            .finish()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct InstanceState {
    attrs: Map<String, Value>,
    resolved: bool,
    pending: Option<SharedOutcome>,
}

/// A keyed attribute record plus its resolution flag and pending handle
#[derive(Clone)]
pub struct Instance {
    state: Arc<RwLock<InstanceState>>,
    class: Option<ResourceClass>,
}

impl Instance {
    /// A detached instance; non-object values produce an empty record
    pub fn new(value: Value) -> Self {
        Self::with_class(value, None)
    }

    pub(crate) fn with_class(value: Value, class: Option<ResourceClass>) -> Self {
        let attrs = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            state: Arc::new(RwLock::new(InstanceState {
                attrs,
                ..Default::default()
            })),
            class,
        }
    }

    /// Whether both handles point at the same record
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        read(&self.state).attrs.get(key).cloned()
    }

    /// Whether the record owns `key`, even with a null value
    pub fn has(&self, key: &str) -> bool {
        read(&self.state).attrs.contains_key(key)
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        write(&self.state).attrs.insert(key.into(), value);
    }

    pub fn attributes(&self) -> Map<String, Value> {
        read(&self.state).attrs.clone()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.attributes())
    }

    /// Copy every attribute of `attrs` onto this record, keeping its identity
    pub fn merge(&self, attrs: &Map<String, Value>) {
        let mut state = write(&self.state);
        for (key, value) in attrs {
            state.attrs.insert(key.clone(), value.clone());
        }
    }

    /// True once the response for this record has been reconciled
    pub fn is_resolved(&self) -> bool {
        read(&self.state).resolved
    }

    /// Handle on the request this record was created by
    pub fn pending(&self) -> Option<Pending> {
        let shared = read(&self.state).pending.clone()?;
        Some(Pending::new(shared, ActionOutput::Instance(self.clone())))
    }

    pub fn class(&self) -> Option<&ResourceClass> {
        self.class.as_ref()
    }

    /// Run `action` against this record: its attributes are the body and
    /// the response is merged back into it. Accepts `(params, success,
    /// error)`, with a callable first argument shifting into the callbacks.
    pub fn invoke(&self, action: &str, args: Vec<Arg>) -> Result<Pending, ResourceError> {
        let Some(class) = &self.class else {
            return Err(ResourceError::UnknownAction(action.to_string()));
        };
        class.call_on_instance(action, self, args)
    }

    pub(crate) fn begin(&self, pending: SharedOutcome) {
        let mut state = write(&self.state);
        state.resolved = false;
        state.pending = Some(pending);
    }

    pub(crate) fn mark_resolved(&self) {
        write(&self.state).resolved = true;
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = read(&self.state);
        f.debug_struct("Instance")
            .field("attrs", &state.attrs)
            .field("resolved", &state.resolved)
            .finish()
    }
}

#[derive(Default)]
struct CollectionState {
    items: Vec<Instance>,
    resolved: bool,
    pending: Option<SharedOutcome>,
}

/// A shared list of instances, repopulated in place by its response
#[derive(Clone, Default)]
pub struct Collection {
    state: Arc<RwLock<CollectionState>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub fn len(&self) -> usize {
        read(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Instance> {
        read(&self.state).items.get(index).cloned()
    }

    pub fn items(&self) -> Vec<Instance> {
        read(&self.state).items.clone()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(read(&self.state).items.iter().map(Instance::to_value).collect())
    }

    pub fn is_resolved(&self) -> bool {
        read(&self.state).resolved
    }

    pub fn pending(&self) -> Option<Pending> {
        let shared = read(&self.state).pending.clone()?;
        Some(Pending::new(shared, ActionOutput::Collection(self.clone())))
    }

    pub(crate) fn replace_items(&self, items: Vec<Instance>) {
        let mut state = write(&self.state);
        state.items.clear();
        state.items.extend(items);
    }

    pub(crate) fn begin(&self, pending: SharedOutcome) {
        let mut state = write(&self.state);
        state.resolved = false;
        state.pending = Some(pending);
    }

    pub(crate) fn mark_resolved(&self) {
        write(&self.state).resolved = true;
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = read(&self.state);
        f.debug_struct("Collection")
            .field("items", &state.items)
            .field("resolved", &state.resolved)
            .finish()
    }
}

/// Result value of an action: the reconciled record(s), or whatever a
/// response interceptor chose to return
#[derive(Debug, Clone)]
pub enum ActionOutput {
    Instance(Instance),
    Collection(Collection),
    Raw(Value),
}

impl ActionOutput {
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            ActionOutput::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            ActionOutput::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ActionOutput::Instance(i) => i.to_value(),
            ActionOutput::Collection(c) => c.to_value(),
            ActionOutput::Raw(v) => v.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        match self {
            ActionOutput::Instance(i) => i.is_resolved(),
            ActionOutput::Collection(c) => c.is_resolved(),
            ActionOutput::Raw(_) => true,
        }
    }

    pub fn pending(&self) -> Option<Pending> {
        match self {
            ActionOutput::Instance(i) => i.pending(),
            ActionOutput::Collection(c) => c.pending(),
            ActionOutput::Raw(_) => None,
        }
    }
}
