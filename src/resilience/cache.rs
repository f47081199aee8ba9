//! Bounded TTL cache for idempotent upstream reads.
//!
//! Staleness is checked on lookup (no background sweeper). The table is capped at
//! `max_entries`: inserting into a full table purges expired entries first and then
//! evicts the entry with the oldest `stored_at`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 300_000,
            max_entries: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_ms: u64,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(cfg: CacheConfig) -> Self {
        Self {
            ttl: Duration::from_millis(cfg.ttl_ms),
            max_entries: cfg.max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached value if `now - stored_at <= ttl`; a stale entry is evicted and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut map = self.entries.lock();
        let fresh = map
            .get(key)
            .map(|e| now.saturating_duration_since(e.stored_at) <= self.ttl);
        match fresh {
            Some(true) => map.get(key).map(|e| e.value.clone()),
            Some(false) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: K, value: V) {
        let now = Instant::now();
        let mut map = self.entries.lock();

        if !map.contains_key(&key) && map.len() >= self.max_entries {
            let ttl = self.ttl;
            map.retain(|_, e| now.saturating_duration_since(e.stored_at) <= ttl);

            if map.len() >= self.max_entries {
                let oldest = map
                    .iter()
                    .min_by_key(|(_, e)| e.stored_at)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    map.remove(&k);
                }
            }
        }

        map.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            entries: self.len(),
            max_entries: self.max_entries,
            ttl_ms: self.ttl.as_millis() as u64,
        }
    }
}
