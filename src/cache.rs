// src/cache.rs
//! Bounded page-result cache with absolute TTL and least-recently-used eviction.
//!
//! Keys are `(platform, app_id, options)` where `options` encodes region,
//! sort order and page. TTL is absolute (no sliding refresh on hit).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::{Platform, RawReview, SortOrder};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);
pub const DEFAULT_CAPACITY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub platform: Platform,
    pub app_id: String,
    pub options: String,
}

impl CacheKey {
    pub fn page(platform: Platform, app_id: &str, region: &str, sort: SortOrder, page: u32) -> Self {
        Self {
            platform,
            app_id: app_id.to_string(),
            options: format!("{}|{}|{}", region.to_ascii_lowercase(), sort.as_str(), page),
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Vec<RawReview>,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Debug)]
struct Inner {
    map: HashMap<CacheKey, Entry>,
    tick: u64,
}

/// Fixed-capacity LRU with TTL. Thread-safe.
#[derive(Debug)]
pub struct ResultCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl ResultCache {
    /// `capacity == 0` disables caching.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                tick: 0,
            }),
            capacity,
            ttl,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<RawReview>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Vec<RawReview>> {
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let expired = match g.map.get(key) {
            None => return None,
            Some(e) => now.duration_since(e.inserted_at) > self.ttl,
        };
        if expired {
            g.map.remove(key);
            return None;
        }
        g.tick += 1;
        let tick = g.tick;
        let e = g.map.get_mut(key)?;
        e.last_used = tick;
        Some(e.value.clone())
    }

    pub fn insert(&self, key: CacheKey, value: Vec<RawReview>) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: CacheKey, value: Vec<RawReview>, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.tick += 1;
        let tick = g.tick;
        g.map.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_used: tick,
            },
        );

        // Drop expired entries first, then least recently used.
        let ttl = self.ttl;
        if g.map.len() > self.capacity {
            g.map.retain(|_, e| now.duration_since(e.inserted_at) <= ttl);
        }
        while g.map.len() > self.capacity {
            let oldest = g
                .map
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    g.map.remove(&k);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(page: u32) -> CacheKey {
        CacheKey::page(Platform::Ios, "123", "us", SortOrder::Newest, page)
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ResultCache::new(2, DEFAULT_TTL);
        let t0 = Instant::now();
        cache.insert_at(key(1), vec![], t0);
        cache.insert_at(key(2), vec![], t0);
        // touch 1 so 2 becomes the eviction victim
        assert!(cache.get_at(&key(1), t0).is_some());
        cache.insert_at(key(3), vec![], t0);
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at(&key(1), t0).is_some());
        assert!(cache.get_at(&key(2), t0).is_none());
        assert!(cache.get_at(&key(3), t0).is_some());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ResultCache::new(4, Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at(key(1), vec![], t0);
        assert!(cache.get_at(&key(1), t0 + Duration::from_secs(5)).is_some());
        assert!(cache.get_at(&key(1), t0 + Duration::from_secs(11)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_disables() {
        let cache = ResultCache::new(0, DEFAULT_TTL);
        cache.insert(key(1), vec![]);
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn key_options_distinguish_region_and_page() {
        assert_ne!(key(1), key(2));
        assert_ne!(
            CacheKey::page(Platform::Ios, "123", "US", SortOrder::Newest, 1),
            CacheKey::page(Platform::Ios, "123", "gb", SortOrder::Newest, 1)
        );
        assert_eq!(
            CacheKey::page(Platform::Ios, "123", "US", SortOrder::Newest, 1),
            key(1)
        );
    }
}
