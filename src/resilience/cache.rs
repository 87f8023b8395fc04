//! Last-good response cache.
//!
//! Holds the most recent successful result per key. Entries past
//! `max_age` are stale but kept: they may still serve as a last-resort
//! fallback, flagged as such. Nothing is evicted; cardinality is bounded by
//! the number of distinct subjects seen.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    timestamp: Instant,
}

/// A cached value as handed back to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub data: T,
    pub is_fresh: bool,
    pub age: Duration,
}

/// Thread-safe keyed cache of last successful results.
#[derive(Debug)]
pub struct ResponseCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    max_age: Duration,
}

impl<T: Clone> ResponseCache<T> {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.max_age_secs))
    }

    /// Store `data` for `key`, replacing any previous entry.
    pub fn put(&self, key: &str, data: T) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                timestamp: Instant::now(),
            },
        );
    }

    /// Latest entry for `key`, fresh or stale.
    pub fn get(&self, key: &str) -> Option<Cached<T>> {
        self.entries.get(key).map(|entry| {
            let age = entry.timestamp.elapsed();
            Cached {
                data: entry.data.clone(),
                is_fresh: age < self.max_age,
                age,
            }
        })
    }

    /// Latest entry for `key` only if still fresh.
    pub fn get_fresh(&self, key: &str) -> Option<Cached<T>> {
        self.get(key).filter(|c| c.is_fresh)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
