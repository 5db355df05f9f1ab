//! In-memory TTL store.

use super::key::CacheKey;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Readers share the lock; writers and the sweep take it exclusively.
pub(crate) struct MemoryStore<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> MemoryStore<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    // A poisoned lock only means another thread panicked mid-operation; the
    // map itself is still a valid cache.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Expired entries are reported as absent but left for the sweep.
    pub(crate) fn get(&self, key: &CacheKey) -> Option<V> {
        let entries = self.read();
        let entry = entries.get(key.as_str())?;
        if entry.is_expired_at(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    pub(crate) fn set(&self, key: &CacheKey, value: V, ttl: Duration) {
        self.write()
            .insert(key.as_str().to_string(), CacheEntry::new(value, ttl));
    }

    /// Remove every expired entry, returning how many were dropped.
    pub(crate) fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired_at(now));
        before - entries.len()
    }

    /// Raw entry count, expired entries included.
    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }

    pub(crate) fn clear(&self) {
        self.write().clear();
    }
}
