// ── TTL response cache ──
//
// Concurrent key -> payload store with expiry checked at read time.
// Expired entries are evicted lazily on lookup; nothing sweeps them.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

/// Type-erased response cache keyed by deterministic request strings.
///
/// Writes are last-write-wins. A lookup whose stored type differs from the
/// requested type is treated as a miss.
#[derive(Default)]
pub(crate) struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Return a live entry, evicting it first if it has expired.
    pub(crate) fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        {
            // The shard guard must be released before `remove_if` takes it again.
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return entry.value.downcast_ref::<T>().cloned();
            }
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        None
    }

    pub(crate) fn insert<T: Send + Sync + 'static>(&self, key: String, value: T, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(
            key,
            CacheEntry {
                value: Arc::new(value),
                expires_at,
            },
        );
    }

    /// Whether a live entry exists. Does not evict.
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.expires_at > Instant::now())
    }

    /// Remove every entry, or only those whose key starts with `prefix`.
    pub(crate) fn clear(&self, prefix: Option<&str>) {
        match prefix {
            Some(p) => self.entries.retain(|key, _| !key.starts_with(p)),
            None => self.entries.clear(),
        }
    }

    /// Number of stored entries, expired ones included.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
