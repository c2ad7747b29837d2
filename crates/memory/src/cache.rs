//! Read-through cache with per-entry TTL and bounded size.
//!
//! One mutex guards the map and the eviction order together, so reads,
//! writes, eviction, and the TTL sweep never interleave.

use inkweave_config::{CacheConfig, EvictionPolicy};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::{Duration, Instant};

struct CacheEntry {
    value: Value,
    expires_at: Instant,
    /// Position in `CacheState::order`.
    tick: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Eviction order: lowest tick goes first.
    order: BTreeMap<u64, String>,
    next_tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct TtlCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    max_entries: usize,
    policy: EvictionPolicy,
}

impl TtlCache {
    pub fn new(ttl: Duration, max_entries: usize, policy: EvictionPolicy) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            max_entries: max_entries.max(1),
            policy,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.ttl_secs),
            config.max_entries,
            config.eviction,
        )
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live value for `key`, or `None` on miss or expiry.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.lock();

        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.expires_at <= now,
        };
        if expired {
            state.remove(key);
            state.misses += 1;
            return None;
        }

        state.hits += 1;
        if self.policy == EvictionPolicy::Lru {
            let tick = state.bump();
            let old_tick = state.entries.get(key).map(|e| e.tick);
            if let Some(old) = old_tick {
                state.order.remove(&old);
            }
            state.order.insert(tick, key.to_string());
            if let Some(entry) = state.entries.get_mut(key) {
                entry.tick = tick;
            }
        }
        state.entries.get(key).map(|e| e.value.clone())
    }

    /// Insert or replace, evicting per policy when full.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let expires_at = Instant::now() + self.ttl;
        let mut state = self.lock();

        if state.remove(&key).is_none() {
            while state.entries.len() >= self.max_entries {
                if let Some(evicted) = state.evict_oldest() {
                    tracing::debug!(key = %evicted, "Cache full, evicted entry");
                } else {
                    break;
                }
            }
        }

        let tick = state.bump();
        state.order.insert(tick, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                tick,
            },
        );
    }

    /// Drop every key containing `pattern`. Returns how many were removed.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut state = self.lock();
        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|k| k.contains(pattern))
            .cloned()
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        doomed.len()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(max: usize, policy: EvictionPolicy) -> TtlCache {
        TtlCache::new(Duration::from_secs(300), max, policy)
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(5), 10, EvictionPolicy::Lru);
        cache.put("entity:saga:Mara", json!({"name": "Mara"}));
        assert!(cache.get("entity:saga:Mara").is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get("entity:saga:Mara").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_keeps_recently_read() {
        let cache = cache(2, EvictionPolicy::Lru);
        cache.put("a", json!(1));
        cache.put("b", json!(2));
        cache.get("a");
        cache.put("c", json!(3));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn insertion_order_ignores_reads() {
        let cache = cache(2, EvictionPolicy::InsertionOrder);
        cache.put("a", json!(1));
        cache.put("b", json!(2));
        cache.get("a");
        cache.put("c", json!(3));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let cache = cache(2, EvictionPolicy::Lru);
        cache.put("a", json!(1));
        cache.put("b", json!(2));
        cache.put("a", json!(10));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(json!(10)));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn invalidate_by_substring() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.put("units:saga:1", json!([]));
        cache.put("unit:saga:1:4", json!({}));
        cache.put("units:other:1", json!([]));

        assert_eq!(cache.invalidate("saga:1"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("units:other:1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let cache = TtlCache::new(Duration::from_secs(10), 10, EvictionPolicy::Lru);
        cache.put("old", json!(1));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.put("new", json!(2));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.sweep(), 1);
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.put("k", json!(true));
        cache.get("k");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }
}
