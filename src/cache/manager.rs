//! Response cache with statistics and a cancellable background sweep.

use super::backend::MemoryStore;
use super::key::CacheKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub swept: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    swept: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            swept: AtomicU64::new(0),
        }
    }

    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
        }
    }
}

/// TTL-bounded memo of prior responses.
///
/// There is no size bound and no LRU; entries leave only when they expire.
/// When created with [`ResponseCache::with_sweeper`] a background task removes
/// expired entries every `ttl` until [`ResponseCache::stop`] is called or the
/// cache is dropped.
pub struct ResponseCache<V> {
    store: Arc<MemoryStore<V>>,
    ttl: Duration,
    stats: Arc<AtomicStats>,
    shutdown: CancellationToken,
}

impl<V: Clone + Send + Sync + 'static> ResponseCache<V> {
    /// Cache without a sweep task; call [`ResponseCache::sweep`] manually.
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            ttl,
            stats: Arc::new(AtomicStats::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cache whose sweep runs on the current tokio runtime.
    ///
    /// The task stops when `shutdown` (or a parent of it) is cancelled, or
    /// when this cache is dropped.
    pub fn with_sweeper(ttl: Duration, shutdown: CancellationToken) -> Self {
        let cache = Self {
            store: Arc::new(MemoryStore::new()),
            ttl,
            stats: Arc::new(AtomicStats::new()),
            shutdown,
        };
        cache.spawn_sweeper();
        cache
    }

    fn spawn_sweeper(&self) {
        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        let shutdown = self.shutdown.clone();
        let period = self.ttl.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            stats.swept.fetch_add(removed as u64, Ordering::Relaxed);
                            debug!(removed, "swept expired cache entries");
                        }
                    }
                }
            }
            debug!("cache sweeper stopped");
        });
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        match self.store.get(key) {
            Some(v) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: &CacheKey, value: V) {
        self.store.set(key, value, self.ttl);
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sweep(&self) -> usize {
        let removed = self.store.sweep();
        self.stats
            .swept
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Stored entries, including expired ones the sweep has not reclaimed yet.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    /// Stop the background sweep. Idempotent.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl<V> Drop for ResponseCache<V> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
