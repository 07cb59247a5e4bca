//! Short-lived storage for query results, addressable by a generated id.
//!
//! Retention is bounded: at most `capacity` entries are kept (least recently used go first) and,
//! when a TTL is configured, entries older than it are treated as gone.

use crate::error::{CubeError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub capacity: usize,
    pub ttl: Option<Duration>,
}

impl RetentionPolicy {
    pub const DEFAULT_CAPACITY: usize = 256;
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            ttl: None,
        }
    }
}

/// A stored, immutable result.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    pub payload: Arc<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    resource: Resource,
    inserted: Instant,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_lru(&mut self) -> Option<String> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(id, _)| id.clone())?;
        self.entries.remove(&victim);
        Some(victim)
    }
}

#[derive(Clone)]
pub struct ResourceStore {
    policy: RetentionPolicy,
    inner: Arc<RwLock<Inner>>,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl ResourceStore {
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy: RetentionPolicy {
                capacity: policy.capacity.max(1),
                ttl: policy.ttl,
            },
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    #[must_use]
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Store a payload under a fresh random id and return the id.
    pub fn put(&self, payload: Value) -> String {
        self.put_shared(Arc::new(payload))
    }

    /// [`ResourceStore::put`] for a payload the caller keeps a handle to.
    pub fn put_shared(&self, payload: Arc<Value>) -> String {
        let id = Uuid::new_v4().to_string();
        let resource = Resource {
            id: id.clone(),
            payload,
            created_at: Utc::now(),
        };

        let mut inner = self.inner.write();
        self.purge_expired(&mut inner);
        let last_used = inner.tick();
        inner.entries.insert(
            id.clone(),
            Entry {
                resource,
                inserted: Instant::now(),
                last_used,
            },
        );
        while inner.entries.len() > self.policy.capacity {
            if let Some(evicted) = inner.evict_lru() {
                tracing::debug!(resource_id = %evicted, "evicted least recently used resource");
            }
        }
        id
    }

    /// Fetch a payload by id.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::NotFound`] if the id was never issued, was evicted, or has expired.
    pub fn get(&self, id: &str) -> Result<Arc<Value>> {
        self.resource(id).map(|r| r.payload)
    }

    /// Like [`ResourceStore::get`], with metadata.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::NotFound`] if the id is unknown or expired.
    pub fn resource(&self, id: &str) -> Result<Resource> {
        // Write lock: a hit updates recency, a stale hit is purged.
        let mut inner = self.inner.write();
        let expired = inner
            .entries
            .get(id)
            .is_some_and(|e| self.is_expired(e, Instant::now()));
        if expired {
            inner.entries.remove(id);
        }
        let tick = inner.tick();
        let entry = inner
            .entries
            .get_mut(id)
            .ok_or_else(|| CubeError::NotFound(format!("data://{id}")))?;
        entry.last_used = tick;
        Ok(entry.resource.clone())
    }

    /// Live resources, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<(String, DateTime<Utc>)> {
        let now = Instant::now();
        let inner = self.inner.read();
        let mut out: Vec<(String, DateTime<Utc>)> = inner
            .entries
            .values()
            .filter(|e| !self.is_expired(e, now))
            .map(|e| (e.resource.id.clone(), e.resource.created_at))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        self.policy
            .ttl
            .is_some_and(|ttl| now.duration_since(entry.inserted) >= ttl)
    }

    fn purge_expired(&self, inner: &mut Inner) {
        if self.policy.ttl.is_none() {
            return;
        }
        let now = Instant::now();
        inner.entries.retain(|_, e| !self.is_expired(e, now));
    }
}
