//! Keyed instance store with bounded size and optional expiry

use crate::resource::Instance;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default upper bound on cached entries per resource type
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Eviction policy for one cache namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Entries beyond this count evict the least recently touched one;
    /// `None` means unbounded
    pub max_entries: Option<usize>,
    /// Entries older than this (since last write) are treated as misses
    pub ttl: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            ttl: None,
        }
    }
}

struct CacheEntry {
    instance: Instance,
    written_at: Instant,
    touched_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.duration_since(self.written_at) >= ttl)
    }
}

/// Key → instance map. Writes to an existing key merge into the cached
/// instance so every holder of it sees the update.
pub struct InstanceCache {
    name: String,
    policy: CachePolicy,
    entries: HashMap<String, CacheEntry>,
}

impl InstanceCache {
    pub fn new(name: impl Into<String>, policy: CachePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a live entry, dropping it if it has expired
    pub fn get(&mut self, key: &str) -> Option<Instance> {
        let now = Instant::now();
        let expired = self
            .entries
            .get(key)
            .is_some_and(|e| e.is_expired(self.policy.ttl, now));
        if expired {
            tracing::debug!(cache = %self.name, key, "cache entry expired");
            self.entries.remove(key);
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.touched_at = now;
        Some(entry.instance.clone())
    }

    /// Merge `attrs` into the entry for `key`, creating it from `fresh` if
    /// absent. Returns the canonical cached instance.
    pub fn merge(&mut self, key: &str, attrs: &Map<String, Value>, fresh: &Instance) -> Instance {
        let now = Instant::now();
        if let Some(entry) = self.entries.get_mut(key) {
            if !entry.instance.ptr_eq(fresh) {
                entry.instance.merge(attrs);
            }
            entry.written_at = now;
            entry.touched_at = now;
            return entry.instance.clone();
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                instance: fresh.clone(),
                written_at: now,
                touched_at: now,
            },
        );
        self.evict_overflow();
        fresh.clone()
    }

    pub fn remove(&mut self, key: &str) -> Option<Instance> {
        self.entries.remove(key).map(|e| e.instance)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_overflow(&mut self) {
        let Some(max) = self.policy.max_entries else {
            return;
        };
        while self.entries.len() > max {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.touched_at)
                .map(|(k, _)| k.clone());
            let Some(key) = oldest else {
                break;
            };
            tracing::debug!(cache = %self.name, key = %key, "evicting cache entry");
            self.entries.remove(&key);
        }
    }
}
