//! Per-source call budgets with lazy, time-triggered reset.
//!
//! Each configured source gets `{count, limit, reset_at}` on first access.
//! Windows are never reset proactively: `allow` checks the clock and starts
//! a fresh window once `now > reset_at`. Sources without a rule are
//! unlimited, so a missing entry never blocks a free source.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Budget for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub requests: u32,
    pub period_secs: u64,
}

impl RateLimitRule {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitState {
    count: u32,
    limit: u32,
    reset_at: Instant,
}

/// Thread-safe limiter shared by all fetches of one collector.
#[derive(Debug, Default)]
pub struct RateLimiter {
    rules: HashMap<String, RateLimitRule>,
    states: Mutex<HashMap<String, RateLimitState>>,
}

impl RateLimiter {
    pub fn new(rules: HashMap<String, RateLimitRule>) -> Self {
        Self {
            rules,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn rule(&self, source: &str) -> Option<RateLimitRule> {
        self.rules.get(source).copied()
    }

    /// May `source` be called now?
    pub fn allow(&self, source: &str) -> bool {
        self.allow_at(source, Instant::now())
    }

    pub fn allow_at(&self, source: &str, now: Instant) -> bool {
        let Some(rule) = self.rule(source) else {
            return true;
        };
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let st = states
            .entry(source.to_string())
            .or_insert_with(|| fresh_state(rule, now));
        if now > st.reset_at {
            *st = fresh_state(rule, now);
            return true;
        }
        st.count < st.limit
    }

    /// Record one call against `source`.
    pub fn increment(&self, source: &str) {
        self.increment_at(source, Instant::now());
    }

    pub fn increment_at(&self, source: &str, now: Instant) {
        let Some(rule) = self.rule(source) else {
            return;
        };
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let st = states
            .entry(source.to_string())
            .or_insert_with(|| fresh_state(rule, now));
        st.count = st.count.saturating_add(1);
    }

    /// Calls left in the current window, without touching state.
    /// `None` means unlimited.
    pub fn remaining(&self, source: &str) -> Option<u32> {
        self.remaining_at(source, Instant::now())
    }

    pub fn remaining_at(&self, source: &str, now: Instant) -> Option<u32> {
        let rule = self.rule(source)?;
        let states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        Some(match states.get(source) {
            Some(st) if now <= st.reset_at => st.limit.saturating_sub(st.count),
            _ => rule.requests,
        })
    }
}

fn fresh_state(rule: RateLimitRule, now: Instant) -> RateLimitState {
    RateLimitState {
        count: 0,
        limit: rule.requests,
        reset_at: now + rule.period(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests: u32, period_secs: u64) -> RateLimiter {
        let mut rules = HashMap::new();
        rules.insert(
            "play".to_string(),
            RateLimitRule {
                requests,
                period_secs,
            },
        );
        RateLimiter::new(rules)
    }

    #[test]
    fn unknown_source_is_unlimited() {
        let rl = limiter(1, 60);
        for _ in 0..100 {
            rl.increment("other");
        }
        assert!(rl.allow("other"));
        assert_eq!(rl.remaining("other"), None);
    }

    #[test]
    fn blocks_after_limit_within_window() {
        let rl = limiter(2, 60);
        let t0 = Instant::now();
        assert!(rl.allow_at("play", t0));
        rl.increment_at("play", t0);
        rl.increment_at("play", t0);
        assert!(!rl.allow_at("play", t0 + Duration::from_secs(1)));
        assert_eq!(rl.remaining_at("play", t0 + Duration::from_secs(1)), Some(0));
    }

    #[test]
    fn resets_lazily_after_window() {
        let rl = limiter(1, 10);
        let t0 = Instant::now();
        rl.increment_at("play", t0);
        assert!(!rl.allow_at("play", t0 + Duration::from_secs(5)));
        // remaining() already reports the fresh budget; allow() performs the reset
        assert_eq!(rl.remaining_at("play", t0 + Duration::from_secs(11)), Some(1));
        assert!(rl.allow_at("play", t0 + Duration::from_secs(11)));
        rl.increment_at("play", t0 + Duration::from_secs(11));
        assert!(!rl.allow_at("play", t0 + Duration::from_secs(12)));
    }

    #[test]
    fn concurrent_increments_are_counted() {
        let rl = std::sync::Arc::new(limiter(1000, 3600));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        rl.increment("play");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(rl.remaining("play"), Some(600));
    }
}
