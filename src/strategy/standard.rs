// src/strategy/standard.rs
//! Incremental pass over the default region.
//!
//! Pages are walked newest first. Pagination stops on an empty page, once
//! `needed` reviews were fetched, or when a whole page is already stored
//! (everything older was collected by an earlier run).

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{CollectionPhase, PhaseContext};
use crate::backoff::politeness_pause;
use crate::error::CollectResult;
use crate::types::{RawReview, Strategy};

#[derive(Debug, Default, Clone, Copy)]
pub struct StandardPhase;

#[async_trait]
impl CollectionPhase for StandardPhase {
    fn strategy(&self) -> Strategy {
        Strategy::Standard
    }

    async fn run(&self, ctx: &PhaseContext<'_>, needed: usize) -> CollectResult<Vec<RawReview>> {
        let cfg = &ctx.config.standard;
        let region = ctx.config.default_region.as_str();
        let mut out: Vec<RawReview> = Vec::new();

        for page in 1..=cfg.max_pages {
            if out.len() >= needed {
                break;
            }
            if page > 1 {
                politeness_pause(cfg.delay_ms, ctx.config.politeness_floor_ms).await;
            }
            let batch = match ctx.fetch_page(region, cfg.sort, page).await {
                Ok(b) => b,
                // Nothing fetched yet: the phase itself failed.
                Err(e) if out.is_empty() => return Err(e),
                Err(e) => {
                    warn!(target: "collect", page, error = %e, "standard pagination abandoned");
                    break;
                }
            };
            if batch.is_empty() {
                debug!(target: "collect", page, "standard source exhausted");
                break;
            }
            let caught_up = ctx.page_already_stored(&batch);
            out.extend(batch.into_iter().map(|mut r| {
                r.region.get_or_insert_with(|| region.to_string());
                r
            }));
            if caught_up {
                debug!(target: "collect", page, "reached previously stored reviews");
                break;
            }
        }
        Ok(out)
    }
}
