// tests/common/mod.rs
//
// Shared fakes for integration tests: a scripted marketplace, a counting
// phase, and a competitor catalog.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use review_harvester::backoff::Backoff;
use review_harvester::error::{CollectError, CollectResult};
use review_harvester::registry::{DataSourceDescriptor, SourceRegistry};
use review_harvester::store::MemoryStore;
use review_harvester::strategy::{
    AppMetadata, CollectionPhase, CompetitorApp, CompetitorCatalog, MetadataFetcher,
    PhaseContext, ReviewFetcher,
};
use review_harvester::types::{Platform, RawReview, SortOrder, SourcePlatform, Strategy};
use review_harvester::{Collector, CollectorBuilder};

pub const SOURCE: &str = "mock_store";

/// Page-addressed fake marketplace. Unknown pages are empty.
#[derive(Default)]
pub struct FakeMarket {
    pages: Mutex<HashMap<(String, String, u32), Vec<RawReview>>>,
    failing_regions: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<(String, String, SortOrder, u32)>>,
}

impl FakeMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, app_id: &str, region: &str, page: u32, reviews: Vec<RawReview>) {
        self.pages
            .lock()
            .insert((app_id.to_string(), region.to_string(), page), reviews);
    }

    pub fn fail_region(&self, region: &str) {
        self.failing_regions.lock().insert(region.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ReviewFetcher for FakeMarket {
    async fn fetch_reviews(
        &self,
        app_id: &str,
        region: &str,
        sort: SortOrder,
        page: u32,
    ) -> CollectResult<Vec<RawReview>> {
        self.calls
            .lock()
            .push((app_id.to_string(), region.to_string(), sort, page));
        if self.failing_regions.lock().contains(region) {
            return Err(CollectError::transient(SOURCE, "connection reset by peer"));
        }
        Ok(self
            .pages
            .lock()
            .get(&(app_id.to_string(), region.to_string(), page))
            .cloned()
            .unwrap_or_default())
    }
}

/// `count` reviews with pairwise-dissimilar content, ids starting at `first`.
pub fn distinct_reviews(first: usize, count: usize, region: &str) -> Vec<RawReview> {
    (first..first + count)
        .map(|i| {
            RawReview::new(
                SOURCE,
                Platform::Ios,
                format!("user{i}"),
                3,
                format!("review {i} mentions feature{i} and widget{i} plus extra{i}"),
                Utc::now() - Duration::hours(2),
            )
            .with_source_id(format!("{region}-{i}"))
        })
        .collect()
}

/// `uniques` distinct reviews followed by `dups` exact repeats of the first ones.
pub fn reviews_with_repeats(first: usize, uniques: usize, dups: usize, region: &str) -> Vec<RawReview> {
    let mut v = distinct_reviews(first, uniques, region);
    let repeats: Vec<RawReview> = v
        .iter()
        .take(dups)
        .enumerate()
        .map(|(k, r)| {
            let mut d = r.clone();
            d.author = format!("repeat{k}");
            d.source_id = Some(format!("{region}-dup-{k}"));
            d
        })
        .collect();
    v.extend(repeats);
    v
}

pub fn registry() -> Arc<SourceRegistry> {
    Arc::new(SourceRegistry::with_env_lookup(
        vec![DataSourceDescriptor {
            name: SOURCE.into(),
            platform: SourcePlatform::Both,
            free: true,
            priority: 0,
            quality: 0.9,
            available: true,
            credential_env: None,
            rate_limit: None,
            cost_per_call: None,
        }],
        |_| None,
    ))
}

pub fn builder(market: Arc<FakeMarket>, store: Arc<MemoryStore>) -> CollectorBuilder {
    Collector::builder(registry(), store)
        .fetcher(SOURCE, market)
        .backoff(Backoff::none())
}

/// Phase double that records invocations and returns nothing.
pub struct CountingPhase {
    pub strategy: Strategy,
    pub calls: Arc<AtomicUsize>,
}

impl CountingPhase {
    pub fn boxed(strategy: Strategy) -> (Box<dyn CollectionPhase>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Self {
                strategy,
                calls: calls.clone(),
            }),
            calls,
        )
    }
}

#[async_trait]
impl CollectionPhase for CountingPhase {
    fn strategy(&self) -> Strategy {
        self.strategy
    }

    async fn run(&self, _ctx: &PhaseContext<'_>, _needed: usize) -> CollectResult<Vec<RawReview>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Phase double that never finishes in time.
pub struct SleepyPhase(pub Strategy, pub std::time::Duration);

#[async_trait]
impl CollectionPhase for SleepyPhase {
    fn strategy(&self) -> Strategy {
        self.0
    }

    async fn run(&self, _ctx: &PhaseContext<'_>, _needed: usize) -> CollectResult<Vec<RawReview>> {
        tokio::time::sleep(self.1).await;
        Ok(Vec::new())
    }
}

pub struct FixedCatalog(pub Vec<CompetitorApp>);

#[async_trait]
impl CompetitorCatalog for FixedCatalog {
    async fn find_competitors(
        &self,
        category: &str,
        platform: Platform,
    ) -> CollectResult<Vec<CompetitorApp>> {
        Ok(self
            .0
            .iter()
            .filter(|a| a.category == category && a.platform == platform)
            .cloned()
            .collect())
    }
}

pub struct FixedMetadata(pub Option<String>);

#[async_trait]
impl MetadataFetcher for FixedMetadata {
    async fn fetch_app_metadata(&self, _app_id: &str, _region: &str) -> CollectResult<AppMetadata> {
        Ok(AppMetadata {
            category: self.0.clone(),
            rating: Some(4.2),
            review_count: Some(12_000),
        })
    }
}
