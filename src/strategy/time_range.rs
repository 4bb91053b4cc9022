// src/strategy/time_range.rs
//! Weighted pulls from recent, medium and old review windows.
//!
//! Bucket `i` covers `[now - days_i, now - days_{i-1})`; the first bucket's
//! inner edge is `now`. Each bucket fetches at most
//! `ceil(ceil(needed * weight) / page_size)` pages and keeps only the
//! in-window items of those pages.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::{div_ceil, CollectionPhase, PhaseContext};
use crate::backoff::politeness_pause;
use crate::config::TimeBucket;
use crate::error::{CollectError, CollectResult};
use crate::types::{RawReview, Strategy};

#[derive(Debug, Default, Clone, Copy)]
pub struct TimeRangePhase;

/// Half-open date window of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWindow {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl BucketWindow {
    pub fn new(now: DateTime<Utc>, days: u32, prior_days: u32) -> Self {
        Self {
            from: now - Duration::days(i64::from(days)),
            until: now - Duration::days(i64::from(prior_days)),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from && ts < self.until
    }
}

/// Review target of a bucket for the given need.
pub fn bucket_target(needed: usize, weight: f32) -> usize {
    // f32 weights are not exact (0.6 is 0.6000000238); shave the error before ceil
    let raw = needed as f64 * f64::from(weight.max(0.0));
    (raw - 1e-4).ceil().max(0.0) as usize
}

impl TimeRangePhase {
    async fn collect_bucket(
        &self,
        ctx: &PhaseContext<'_>,
        bucket: &TimeBucket,
        window: BucketWindow,
        target: usize,
    ) -> CollectResult<Vec<RawReview>> {
        let cfg = &ctx.config.time_range;
        let max_pages = div_ceil(target, cfg.page_size as usize).max(1) as u32;
        let region = ctx.config.default_region.as_str();
        let mut got: Vec<RawReview> = Vec::new();

        for page in 1..=max_pages {
            if got.len() >= target {
                break;
            }
            if page > 1 {
                politeness_pause(cfg.delay_ms, ctx.config.politeness_floor_ms).await;
            }
            let batch = match ctx.fetch_page(region, bucket.sort, page).await {
                Ok(b) => b,
                Err(e) if got.is_empty() => return Err(e),
                Err(e) => {
                    warn!(target: "collect", bucket = %bucket.name, page, error = %e, "bucket pagination abandoned");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len();
            got.extend(
                batch
                    .into_iter()
                    .filter(|r| window.contains(r.date))
                    .map(|mut r| {
                        r.time_range_bucket = Some(bucket.name.clone());
                        r.bucket_days = Some(bucket.days);
                        r
                    }),
            );
            debug!(target: "collect", bucket = %bucket.name, page, fetched, kept = got.len(), "bucket page");
        }
        got.truncate(target);
        Ok(got)
    }
}

#[async_trait]
impl CollectionPhase for TimeRangePhase {
    fn strategy(&self) -> Strategy {
        Strategy::TimeRange
    }

    async fn run(&self, ctx: &PhaseContext<'_>, needed: usize) -> CollectResult<Vec<RawReview>> {
        let buckets = &ctx.config.time_range.buckets;
        let mut out: Vec<RawReview> = Vec::new();
        let mut attempted = 0usize;
        let mut failed = 0usize;
        let mut last_err: Option<CollectError> = None;
        let mut prior_days = 0u32;

        for bucket in buckets {
            let window = BucketWindow::new(ctx.now, bucket.days, prior_days);
            prior_days = bucket.days;
            let target = bucket_target(needed, bucket.weight);
            if target == 0 {
                continue;
            }
            if attempted > 0 {
                politeness_pause(ctx.config.time_range.delay_ms, ctx.config.politeness_floor_ms)
                    .await;
            }
            attempted += 1;
            match self.collect_bucket(ctx, bucket, window, target).await {
                Ok(got) => out.extend(got),
                Err(e) => {
                    warn!(target: "collect", bucket = %bucket.name, error = %e, "bucket failed");
                    failed += 1;
                    last_err = Some(e);
                }
            }
        }

        if attempted > 0 && failed == attempted {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_are_half_open_and_adjacent() {
        let now = Utc::now();
        let recent = BucketWindow::new(now, 30, 0);
        let medium = BucketWindow::new(now, 90, 30);
        let edge = now - Duration::days(30);
        assert!(!recent.contains(edge));
        assert!(medium.contains(edge));
        assert!(recent.contains(now - Duration::days(29)));
        assert!(!medium.contains(now - Duration::days(91)));
    }

    #[test]
    fn targets_round_up() {
        assert_eq!(bucket_target(100, 0.6), 60);
        assert_eq!(bucket_target(7, 0.1), 1);
        assert_eq!(bucket_target(0, 0.6), 0);
        assert_eq!(bucket_target(10, -1.0), 0);
    }
}
