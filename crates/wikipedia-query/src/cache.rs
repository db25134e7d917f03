//! Memoized results keyed by normalized intent.
//!
//! Entries expire after their TTL; when the cache is full the least recently used
//! entry is evicted. A single lock guards the whole map, two racing calls for the
//! same key may both fetch, and the later store wins.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    created: Instant,
    ttl: Duration,
    /// Value of the access counter when last read or written
    last_used: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created) >= self.ttl
    }
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    /// Entries removed for capacity or expiry, not explicit invalidations
    pub evictions: u64,
    pub entries: usize,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    clock: u64,
    stats: CacheStats,
}

impl<K, V> CacheState<K, V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct Cache<K, V> {
    capacity: usize,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    V: Clone,
{
    /// A capacity of zero disables caching
    pub fn new(capacity: usize) -> Self {
        Cache {
            capacity,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                clock: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    // A panic while holding the lock can't leave the map half updated
    fn state(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        let mut guard = self.state();
        let state = &mut *guard;
        let now = Instant::now();
        let tick = state.tick();

        let expired = match state.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_used = tick;
                let value = entry.value.clone();

                state.stats.hits += 1;
                log::debug!("Cache hit for '{key}'");

                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            state.stats.evictions += 1;
            log::debug!("Cache entry for '{key}' expired");
        }

        state.stats.misses += 1;
        log::debug!("Cache miss for '{key}'");

        None
    }

    pub fn store(&self, key: K, value: V, ttl: Duration) {
        if self.capacity == 0 {
            return;
        }

        let mut guard = self.state();
        let state = &mut *guard;
        let now = Instant::now();
        let tick = state.tick();

        log::debug!("Caching '{key}' for {ttl:?}");

        state.entries.insert(
            key,
            CacheEntry {
                value,
                created: now,
                ttl,
                last_used: tick,
            },
        );
        state.stats.insertions += 1;

        if state.entries.len() > self.capacity {
            let before = state.entries.len();
            state.entries.retain(|_, entry| !entry.is_expired(now));
            state.stats.evictions += (before - state.entries.len()) as u64;
        }

        while state.entries.len() > self.capacity {
            let Some(oldest) = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };

            log::debug!("Evicting least recently used '{oldest}'");

            state.entries.remove(&oldest);
            state.stats.evictions += 1;
        }
    }

    /// Drop one entry, returns whether it was present
    pub fn invalidate(&self, key: &K) -> bool {
        self.state().entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.state().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();

        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }
}
