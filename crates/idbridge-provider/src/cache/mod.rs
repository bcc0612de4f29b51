//! Query result caches.
//!
//! One generic [`QueryCache`] abstraction is instantiated three times by the
//! factory, each instance with its own storage, capacity and time-to-live:
//!
//! - [`UserQueryCache`] - user query criteria to matching users
//! - [`GroupQueryCache`] - group query criteria to matching groups
//! - [`CheckPasswordCache`] - user id + password digest to the check outcome
//!
//! Instances never share state, so clearing or tuning one leaves the others
//! untouched.
//!
//! # Example
//!
//! ```ignore
//! use idbridge_provider::cache::{create_cache, QueryCache};
//! use idbridge_provider::config::CacheConfig;
//! use std::time::Duration;
//!
//! let cache = create_cache::<String, bool>(&CacheConfig::new(100, Duration::from_secs(60)));
//! cache.put("alice".to_string(), true);
//! assert_eq!(cache.get(&"alice".to_string()), Some(true));
//! ```

mod lru;

use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

pub use lru::LruQueryCache;

use crate::config::CacheConfig;
use crate::query::{CheckPasswordKey, GroupQuery, UserQuery};
use crate::types::{Group, User};

/// A thread-safe key to result store.
///
/// Implementations synchronize internally; callers never lock. Two callers
/// missing on the same key may both `put`, the last write wins.
pub trait QueryCache<K, V>: Send + Sync {
    /// Returns the cached result for `key` if present and not expired.
    fn get(&self, key: &K) -> Option<V>;

    /// Stores a result, evicting the least recently used entry when full.
    fn put(&self, key: K, value: V);

    /// Removes a single entry.
    fn invalidate(&self, key: &K);

    /// Removes all entries. Reads that start after this returns miss.
    fn clear(&self);

    /// Number of stored entries, including expired ones not yet evicted.
    fn len(&self) -> usize;

    /// Returns `true` if the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared handle to a cache instance.
pub type SharedCache<K, V> = Arc<dyn QueryCache<K, V>>;

/// Cache for user queries.
pub type UserQueryCache = SharedCache<UserQuery, Vec<User>>;

/// Cache for group queries.
pub type GroupQueryCache = SharedCache<GroupQuery, Vec<Group>>;

/// Cache for password checks.
pub type CheckPasswordCache = SharedCache<CheckPasswordKey, bool>;

/// A cache that stores nothing.
pub struct PassThroughCache<K, V> {
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> PassThroughCache<K, V> {
    /// Creates a pass-through cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, V> Default for PassThroughCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> QueryCache<K, V> for PassThroughCache<K, V> {
    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn put(&self, _key: K, _value: V) {}

    fn invalidate(&self, _key: &K) {}

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }
}

/// Builds a cache instance for the given policy.
///
/// Inactive policies (disabled, zero size or zero expiration) produce a
/// [`PassThroughCache`].
#[must_use]
pub fn create_cache<K, V>(config: &CacheConfig) -> SharedCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    if !config.is_active() {
        return Arc::new(PassThroughCache::new());
    }

    let max_size = usize::try_from(config.max_size).unwrap_or(usize::MAX);
    Arc::new(LruQueryCache::new(max_size, Some(config.expiration)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pass_through_always_misses() {
        let cache: PassThroughCache<String, u32> = PassThroughCache::new();
        cache.put("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_create_cache_inactive_policies() {
        for config in [
            CacheConfig::disabled(),
            CacheConfig::new(0, Duration::from_secs(60)),
            CacheConfig::new(10, Duration::ZERO),
        ] {
            let cache = create_cache::<String, u32>(&config);
            cache.put("a".to_string(), 1);
            assert_eq!(cache.get(&"a".to_string()), None, "{config:?}");
        }
    }

    #[test]
    fn test_create_cache_active_policy() {
        let cache = create_cache::<String, u32>(&CacheConfig::new(2, Duration::from_secs(60)));
        cache.put("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_instances_are_independent() {
        let config = CacheConfig::new(10, Duration::from_secs(60));
        let users = create_cache::<String, u32>(&config);
        let groups = create_cache::<String, u32>(&config);

        users.put("shared".to_string(), 1);
        groups.put("shared".to_string(), 2);
        users.clear();

        assert_eq!(users.get(&"shared".to_string()), None);
        assert_eq!(groups.get(&"shared".to_string()), Some(2));
    }
}
