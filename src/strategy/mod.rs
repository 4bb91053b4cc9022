// src/strategy/mod.rs
//! Collection phases and the fetch seams they drive.
//!
//! Each phase turns a still-needed count into more raw reviews. Phases only
//! see the world through [`PhaseContext`]: the resolved config, a
//! [`SourcePool`] that picks a data source per page, and optional metadata
//! and competitor collaborators.

pub mod competitor;
pub mod region;
pub mod standard;
pub mod time_range;

pub use competitor::{adapt_competitor_review, confidence_score, CompetitorPhase};
pub use region::RegionPhase;
pub use standard::StandardPhase;
pub use time_range::TimeRangePhase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::cache::CacheKey;
use crate::config::ScrapeConfig;
use crate::dedup::{content_hash, DedupIndex};
use crate::error::{CollectError, CollectResult};
use crate::normalize::normalize_review_text;
use crate::registry::SourceRegistry;
use crate::state::CollectorState;
use crate::types::{Platform, RawReview, SortOrder, Strategy};

/// One marketplace adapter. Registered with the collector under the
/// registry name of the source it serves.
#[async_trait]
pub trait ReviewFetcher: Send + Sync {
    async fn fetch_reviews(
        &self,
        app_id: &str,
        region: &str,
        sort: SortOrder,
        page: u32,
    ) -> CollectResult<Vec<RawReview>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub category: Option<String>,
    pub rating: Option<f32>,
    pub review_count: Option<u64>,
}

#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch_app_metadata(&self, app_id: &str, region: &str) -> CollectResult<AppMetadata>;
}

/// An app considered adjacent to the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorApp {
    pub app_id: String,
    pub name: String,
    pub category: String,
    pub platform: Platform,
    /// Similarity to the target in `[0, 1]`.
    pub similarity: f32,
    /// Lower is preferred.
    pub priority: u32,
}

#[async_trait]
pub trait CompetitorCatalog: Send + Sync {
    async fn find_competitors(
        &self,
        category: &str,
        platform: Platform,
    ) -> CollectResult<Vec<CompetitorApp>>;
}

/// One rung of the escalation ladder.
#[async_trait]
pub trait CollectionPhase: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Fetch up to roughly `needed` additional reviews.
    async fn run(&self, ctx: &PhaseContext<'_>, needed: usize) -> CollectResult<Vec<RawReview>>;
}

/// What a phase may look at while it runs.
pub struct PhaseContext<'a> {
    pub config: &'a ScrapeConfig,
    pub sources: &'a SourcePool,
    pub metadata: Option<&'a dyn MetadataFetcher>,
    pub competitors: Option<&'a dyn CompetitorCatalog>,
    /// Index over reviews that were already stored before this run.
    pub stored: &'a DedupIndex,
    pub now: DateTime<Utc>,
}

impl PhaseContext<'_> {
    pub fn app_id(&self) -> &str {
        &self.config.app.app_id
    }

    pub fn platform(&self) -> Platform {
        self.config.app.platform
    }

    /// Fetch one page of the target app.
    pub async fn fetch_page(
        &self,
        region: &str,
        sort: SortOrder,
        page: u32,
    ) -> CollectResult<Vec<RawReview>> {
        self.sources
            .fetch_page(self.platform(), self.app_id(), region, sort, page)
            .await
    }

    /// True when every review on the page is already stored.
    pub fn page_already_stored(&self, page: &[RawReview]) -> bool {
        !page.is_empty()
            && page
                .iter()
                .all(|r| self.stored.contains_hash(&content_hash(&normalize_review_text(&r.content))))
    }
}

/// Picks a data source for each page request.
///
/// Sources are tried in registry priority order. A rate-limited source is
/// skipped for the call; a failing source is abandoned after a jittered
/// backoff and the next one is tried. Pages are cached in the shared
/// [`CollectorState`].
pub struct SourcePool {
    registry: Arc<SourceRegistry>,
    fetchers: HashMap<String, Arc<dyn ReviewFetcher>>,
    state: Arc<CollectorState>,
    backoff: Backoff,
}

impl SourcePool {
    pub fn new(
        registry: Arc<SourceRegistry>,
        fetchers: HashMap<String, Arc<dyn ReviewFetcher>>,
        state: Arc<CollectorState>,
        backoff: Backoff,
    ) -> Self {
        Self {
            registry,
            fetchers,
            state,
            backoff,
        }
    }

    pub fn state(&self) -> &CollectorState {
        &self.state
    }

    /// Registered source names usable for `platform`, best first.
    pub fn usable_sources(&self, platform: Platform) -> Vec<String> {
        self.registry
            .available_sources(platform)
            .into_iter()
            .filter(|s| self.fetchers.contains_key(&s.name))
            .map(|s| s.name.clone())
            .collect()
    }

    pub async fn fetch_page(
        &self,
        platform: Platform,
        app_id: &str,
        region: &str,
        sort: SortOrder,
        page: u32,
    ) -> CollectResult<Vec<RawReview>> {
        let key = CacheKey::page(platform, app_id, region, sort, page);
        if let Some(hit) = self.state.cache.get(&key) {
            debug!(target: "collect", app_id, region, page, "page cache hit");
            return Ok(hit);
        }

        let names = self.usable_sources(platform);
        if names.is_empty() {
            return Err(CollectError::NoSource(platform.to_string()));
        }

        let mut limited = 0usize;
        let mut attempt = 0u32;
        let mut last_err: Option<CollectError> = None;
        for name in &names {
            let Some(fetcher) = self.fetchers.get(name) else {
                continue;
            };
            if !self.state.rate_limiter.allow(name) {
                limited += 1;
                debug!(target: "collect", source = %name, "rate limited, skipping");
                continue;
            }
            self.state.rate_limiter.increment(name);

            match fetcher.fetch_reviews(app_id, region, sort, page).await {
                Ok(mut reviews) => {
                    for r in &mut reviews {
                        if r.source_name.is_empty() {
                            r.source_name = name.clone();
                        }
                        r.platform = platform;
                    }
                    self.state.cache.insert(key, reviews.clone());
                    return Ok(reviews);
                }
                Err(e) => {
                    warn!(target: "collect", source = %name, app_id, region, page, error = %e, "fetch failed");
                    if matches!(e, CollectError::Transient { .. }) {
                        self.backoff.wait(attempt).await;
                        attempt += 1;
                    }
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None if limited > 0 => Err(CollectError::RateLimited(names.join(","))),
            None => Err(CollectError::NoSource(platform.to_string())),
        }
    }
}

/// `ceil(a / b)` for counts; zero when `b` is zero.
pub(crate) fn div_ceil(a: usize, b: usize) -> usize {
    if b == 0 {
        0
    } else {
        a.div_ceil(b)
    }
}
