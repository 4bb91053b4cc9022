// src/state.rs
//! Mutable state shared by the fetches of one collector instance.

use crate::cache::{ResultCache, DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::rate_limit::RateLimiter;
use crate::registry::SourceRegistry;

/// Rate-limit counters and the page cache. Constructed per collector and
/// shared via `Arc`; jobs for different apps can use separate instances.
#[derive(Debug, Default)]
pub struct CollectorState {
    pub rate_limiter: RateLimiter,
    pub cache: ResultCache,
}

impl CollectorState {
    pub fn new(rate_limiter: RateLimiter, cache: ResultCache) -> Self {
        Self {
            rate_limiter,
            cache,
        }
    }

    /// Limits from the registry, default cache sizing.
    pub fn for_registry(registry: &SourceRegistry) -> Self {
        Self::new(
            RateLimiter::new(registry.rate_limit_rules()),
            ResultCache::new(DEFAULT_CAPACITY, DEFAULT_TTL),
        )
    }
}
