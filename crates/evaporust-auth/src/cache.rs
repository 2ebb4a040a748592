//! Bounded FIFO cache of derived signing keys.
//!
//! Deriving a signing key costs four HMAC rounds and the result only changes
//! when the date, region, service or credentials change, so it is cached.
//! Eviction is first-in first-out: once [`MAX_CACHE_SIZE`] keys are held, the
//! oldest inserted key is dropped.

use std::collections::{HashMap, VecDeque};

/// Maximum number of signing keys held by one cache.
pub const MAX_CACHE_SIZE: usize = 50;

/// FIFO-evicting map from cache key to derived signing key.
#[derive(Debug, Default)]
pub struct SigningKeyCache {
    keys: HashMap<String, Vec<u8>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SigningKeyCache {
    /// Create a cache holding at most [`MAX_CACHE_SIZE`] keys.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHE_SIZE)
    }

    /// Create a cache holding at most `capacity` keys (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            keys: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Return the cached key for `cache_key`, deriving and inserting it with
    /// `derive` on a miss.
    pub fn get_or_insert_with<F>(&mut self, cache_key: &str, derive: F) -> Vec<u8>
    where
        F: FnOnce() -> Vec<u8>,
    {
        if let Some(key) = self.keys.get(cache_key) {
            return key.clone();
        }

        let key = derive();
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        self.order.push_back(cache_key.to_owned());
        self.keys.insert(cache_key.to_owned(), key.clone());
        key
    }

    /// Whether a key is cached under `cache_key`.
    #[must_use]
    pub fn contains(&self, cache_key: &str) -> bool {
        self.keys.contains_key(cache_key)
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_derive_once_per_key() {
        let mut cache = SigningKeyCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let key = cache.get_or_insert_with("20240101:us-east-1:s3:abc", || {
                calls += 1;
                vec![1, 2, 3]
            });
            assert_eq!(key, vec![1, 2, 3]);
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_should_evict_oldest_key_first() {
        let mut cache = SigningKeyCache::with_capacity(2);
        cache.get_or_insert_with("a", || vec![1]);
        cache.get_or_insert_with("b", || vec![2]);
        // A hit does not refresh insertion order.
        cache.get_or_insert_with("a", || vec![9]);
        cache.get_or_insert_with("c", || vec![3]);

        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_should_stay_within_default_capacity() {
        let mut cache = SigningKeyCache::new();
        for i in 0..(MAX_CACHE_SIZE + 10) {
            cache.get_or_insert_with(&format!("key-{i}"), || vec![0]);
        }
        assert_eq!(cache.len(), MAX_CACHE_SIZE);
        assert!(!cache.contains("key-0"));
        assert!(cache.contains(&format!("key-{}", MAX_CACHE_SIZE + 9)));
    }
}
