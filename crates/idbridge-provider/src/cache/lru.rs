//! Bounded LRU cache with expire-after-write.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::QueryCache;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    /// Recency stamp, key into `State::order`.
    stamp: u64,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Recency order, oldest stamp first.
    order: BTreeMap<u64, K>,
    next_stamp: u64,
}

impl<K: Eq + Hash + Clone, V> State<K, V> {
    fn bump(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.stamp);
        Some(entry)
    }
}

/// In-memory LRU cache with an optional time-to-live.
///
/// Entries expire `ttl` after they were written; reads do not extend their
/// lifetime. Expired entries are misses and are dropped when touched or by
/// [`purge_expired`](Self::purge_expired). When the cache is full, `put`
/// evicts the least recently read or written entry.
pub struct LruQueryCache<K, V> {
    state: Mutex<State<K, V>>,
    max_size: usize,
    ttl: Option<Duration>,
}

impl<K, V> LruQueryCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize, ttl: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(State {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_stamp: 0,
            }),
            max_size,
            ttl,
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Time-to-live of entries.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Drops all expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.inserted_at) >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "Purged expired cache entries");
        }
        expired.len()
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(entry.inserted_at) >= ttl)
    }
}

impl<K, V> QueryCache<K, V> for LruQueryCache<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = self.is_expired(state.entries.get(key)?, now);
        if expired {
            state.remove(key);
            return None;
        }

        let stamp = state.bump();
        let entry = state.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut entry.stamp, stamp);
        let value = entry.value.clone();
        state.order.remove(&previous);
        state.order.insert(stamp, key.clone());
        Some(value)
    }

    fn put(&self, key: K, value: V) {
        if self.max_size == 0 {
            return;
        }

        let now = Instant::now();
        let mut state = self.state.lock();
        state.remove(&key);

        while state.entries.len() >= self.max_size {
            let Some((_, oldest)) = state.order.pop_first() else {
                break;
            };
            state.entries.remove(&oldest);
        }

        let stamp = state.bump();
        state.order.insert(stamp, key.clone());
        state.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                stamp,
            },
        );
    }

    fn invalidate(&self, key: &K) {
        self.state.lock().remove(key);
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_get_after_put() {
        let cache = LruQueryCache::new(10, None);
        cache.put(key("a"), vec![1, 2, 3]);
        assert_eq!(cache.get(&key("a")), Some(vec![1, 2, 3]));
        assert_eq!(cache.get(&key("b")), None);
    }

    #[test]
    fn test_put_replaces_value() {
        let cache = LruQueryCache::new(10, None);
        cache.put(key("a"), 1);
        cache.put(key("a"), 2);
        assert_eq!(cache.get(&key("a")), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = LruQueryCache::new(2, None);
        cache.put(key("A"), 1);
        cache.put(key("B"), 2);
        cache.put(key("C"), 3);

        assert_eq!(cache.get(&key("A")), None);
        assert_eq!(cache.get(&key("B")), Some(2));
        assert_eq!(cache.get(&key("C")), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_read_refreshes_recency() {
        let cache = LruQueryCache::new(2, None);
        cache.put(key("A"), 1);
        cache.put(key("B"), 2);
        assert_eq!(cache.get(&key("A")), Some(1));
        cache.put(key("C"), 3);

        assert_eq!(cache.get(&key("B")), None);
        assert_eq!(cache.get(&key("A")), Some(1));
        assert_eq!(cache.get(&key("C")), Some(3));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = LruQueryCache::new(0, None);
        cache.put(key("A"), 1);
        assert_eq!(cache.get(&key("A")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = LruQueryCache::new(10, None);
        cache.put(key("A"), 1);
        cache.put(key("B"), 2);
        cache.put(key("C"), 3);

        cache.invalidate(&key("B"));
        assert_eq!(cache.get(&key("B")), None);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key("A")), None);
        assert_eq!(cache.get(&key("C")), None);

        cache.put(key("A"), 4);
        assert_eq!(cache.get(&key("A")), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_write() {
        let cache = LruQueryCache::new(10, Some(Duration::from_secs(60)));
        cache.put(key("A"), true);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(&key("A")), Some(true));

        // Reads do not extend the lifetime.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key("A")), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewrite_restarts_ttl() {
        let cache = LruQueryCache::new(10, Some(Duration::from_secs(10)));
        cache.put(key("A"), 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put(key("A"), 2);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&key("A")), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_ttls() {
        let login = LruQueryCache::new(10, Some(Duration::from_secs(30)));
        let directory = LruQueryCache::new(10, Some(Duration::from_secs(900)));
        login.put(key("alice"), false);
        directory.put(key("alice"), vec!["alice".to_string()]);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(login.get(&key("alice")), None);
        assert!(directory.get(&key("alice")).is_some());

        tokio::time::advance(Duration::from_secs(870)).await;
        assert_eq!(directory.get(&key("alice")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = LruQueryCache::new(10, Some(Duration::from_secs(5)));
        cache.put(key("old"), 1);
        tokio::time::advance(Duration::from_secs(3)).await;
        cache.put(key("new"), 2);
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("new")), Some(2));
    }

    #[test]
    fn test_concurrent_access_keeps_structure_consistent() {
        let cache = Arc::new(LruQueryCache::new(64, None));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..2_000u32 {
                        let k = format!("k{}", (i * 7 + worker) % 100);
                        match i % 5 {
                            0 => cache.invalidate(&k),
                            1 | 2 => {
                                if let Some(v) = cache.get(&k) {
                                    assert_eq!(format!("k{v}"), k);
                                }
                            }
                            _ => {
                                let v: u32 = k[1..].parse().unwrap();
                                cache.put(k, v);
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 64);
        let state = cache.state.lock();
        assert_eq!(state.entries.len(), state.order.len());
        for (stamp, k) in &state.order {
            assert_eq!(state.entries[k].stamp, *stamp);
        }
    }

    #[test]
    fn test_concurrent_writers_fill_to_capacity() {
        let cache = Arc::new(LruQueryCache::new(1_000, None));
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..250u32 {
                        cache.put(worker * 1_000 + i, i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // No entry lost below the capacity bound.
        assert_eq!(cache.len(), 1_000);
        for worker in 0..4u32 {
            for i in 0..250u32 {
                assert_eq!(cache.get(&(worker * 1_000 + i)), Some(i));
            }
        }
    }
}
