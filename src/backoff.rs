// src/backoff.rs
//! One jittered-backoff utility for every delay in the pipeline:
//! politeness pauses between page fetches and the wait before falling
//! through to the next source after a transient error.

use rand::Rng;
use std::time::Duration;

/// Fraction of the nominal delay used as +/- jitter.
pub const DEFAULT_JITTER: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
            jitter: DEFAULT_JITTER,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: DEFAULT_JITTER,
        }
    }

    /// No delay at all; used by tests and offline runs.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Exponential delay for `attempt` (0-based), capped at `max`, then jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let nominal = self.base.saturating_mul(factor).min(self.max);
        jittered(nominal, self.jitter)
    }

    pub async fn wait(&self, attempt: u32) {
        sleep_nonzero(self.delay_for(attempt)).await;
    }
}

/// `nominal` scaled by a random factor in `[1 - ratio, 1 + ratio]`.
pub fn jittered(nominal: Duration, ratio: f64) -> Duration {
    if nominal.is_zero() {
        return Duration::ZERO;
    }
    let ratio = ratio.clamp(0.0, 1.0);
    if ratio == 0.0 {
        return nominal;
    }
    let factor = rand::rng().random_range((1.0 - ratio)..=(1.0 + ratio));
    nominal.mul_f64(factor)
}

/// Politeness pause between calls to the same upstream. Never shorter
/// than `floor_ms`, which keeps jitter from undercutting a source's tolerance.
pub async fn politeness_pause(nominal_ms: u64, floor_ms: u64) {
    sleep_nonzero(politeness_delay(nominal_ms, floor_ms)).await;
}

/// Length of one politeness pause: the jittered nominal, raised to the floor.
pub fn politeness_delay(nominal_ms: u64, floor_ms: u64) -> Duration {
    jittered(Duration::from_millis(nominal_ms), DEFAULT_JITTER).max(Duration::from_millis(floor_ms))
}

async fn sleep_nonzero(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_band() {
        let nominal = Duration::from_millis(1000);
        for _ in 0..200 {
            let d = jittered(nominal, 0.25);
            assert!(d >= Duration::from_millis(750) && d <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn exponential_and_capped() {
        let b = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_millis(400),
            jitter: 0.0,
        };
        assert_eq!(b.delay_for(0), Duration::from_millis(100));
        assert_eq!(b.delay_for(1), Duration::from_millis(200));
        assert_eq!(b.delay_for(5), Duration::from_millis(400));
        assert_eq!(b.delay_for(u32::MAX), Duration::from_millis(400));
    }

    #[test]
    fn none_is_zero() {
        assert_eq!(Backoff::none().delay_for(3), Duration::ZERO);
    }

    #[test]
    fn floor_applies_even_without_nominal_delay() {
        assert_eq!(politeness_delay(0, 500), Duration::from_millis(500));
        assert_eq!(politeness_delay(0, 0), Duration::ZERO);
        for _ in 0..50 {
            assert!(politeness_delay(100, 400) >= Duration::from_millis(400));
        }
    }

    #[tokio::test]
    async fn zero_delay_with_floor_still_pauses() {
        let started = std::time::Instant::now();
        politeness_pause(0, 50).await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
