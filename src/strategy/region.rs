// src/strategy/region.rs
//! Spread the remaining need across secondary locales.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{div_ceil, CollectionPhase, PhaseContext};
use crate::backoff::politeness_pause;
use crate::config::RegionSpec;
use crate::error::{CollectError, CollectResult};
use crate::types::{RawReview, SortOrder, Strategy};

#[derive(Debug, Default, Clone, Copy)]
pub struct RegionPhase;

impl RegionPhase {
    /// Configured regions by priority, without the default region.
    pub fn ordered_regions(ctx: &PhaseContext<'_>) -> Vec<RegionSpec> {
        let default = ctx.config.default_region.as_str();
        let mut regions: Vec<RegionSpec> = ctx
            .config
            .region
            .regions
            .iter()
            .filter(|r| !r.code.eq_ignore_ascii_case(default))
            .cloned()
            .collect();
        regions.sort_by_key(|r| r.priority);
        regions
    }

    async fn collect_region(
        &self,
        ctx: &PhaseContext<'_>,
        spec: &RegionSpec,
        target: usize,
    ) -> CollectResult<Vec<RawReview>> {
        let cfg = &ctx.config.region;
        let mut got: Vec<RawReview> = Vec::new();
        for page in 1..=cfg.max_pages_per_region {
            if got.len() >= target {
                break;
            }
            if page > 1 {
                politeness_pause(cfg.delay_ms, ctx.config.politeness_floor_ms).await;
            }
            let batch = match ctx.fetch_page(&spec.code, SortOrder::Newest, page).await {
                Ok(b) => b,
                Err(e) if got.is_empty() => return Err(e),
                Err(e) => {
                    warn!(target: "collect", region = %spec.code, page, error = %e, "region pagination abandoned");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            got.extend(batch.into_iter().map(|mut r| {
                r.region = Some(spec.code.clone());
                r.region_priority = Some(spec.priority);
                r
            }));
        }
        Ok(got)
    }
}

#[async_trait]
impl CollectionPhase for RegionPhase {
    fn strategy(&self) -> Strategy {
        Strategy::Region
    }

    async fn run(&self, ctx: &PhaseContext<'_>, needed: usize) -> CollectResult<Vec<RawReview>> {
        let regions = Self::ordered_regions(ctx);
        let mut out: Vec<RawReview> = Vec::new();
        let mut attempted = 0usize;
        let mut failed = 0usize;
        let mut last_err: Option<CollectError> = None;

        for (i, spec) in regions.iter().enumerate() {
            if out.len() >= needed {
                break;
            }
            if i > 0 {
                politeness_pause(ctx.config.region.delay_ms, ctx.config.politeness_floor_ms).await;
            }
            let remaining_regions = regions.len() - i;
            let target = div_ceil(needed - out.len(), remaining_regions);
            attempted += 1;
            match self.collect_region(ctx, spec, target).await {
                Ok(got) => {
                    debug!(target: "collect", region = %spec.code, target, fetched = got.len(), "region done");
                    out.extend(got);
                }
                Err(e) => {
                    warn!(target: "collect", region = %spec.code, error = %e, "region failed");
                    failed += 1;
                    last_err = Some(e);
                }
            }
        }

        // Every region that was tried failed: report the phase as failed.
        if attempted > 0 && failed == attempted {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        info!(target: "collect", regions = attempted, fetched = out.len(), "region phase finished");
        Ok(out)
    }
}
