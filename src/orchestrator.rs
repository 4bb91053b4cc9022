// src/orchestrator.rs
//! # Collector
//!
//! Escalation state machine: `Standard → [Region] → [TimeRange] →
//! [Competitor] → rank & truncate → store`.
//!
//! - After every phase the pool is re-measured against the stored index;
//!   the next phase runs only while `new_count < min_new_reviews`
//!   (competitor additionally needs `new_count < competitor.threshold`).
//! - A phase error or timeout is logged and recorded in the phase report;
//!   the run moves on with what it has.
//! - `collect` never fails. Config, store and overall-budget failures come
//!   back as `success = false` with `error` set and the partial result.
//! - The overall budget covers the phases and the store write. A phase cut
//!   off by it is reported `TimedOut`, the phases after it `Skipped`.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::config::ScrapeConfig;
use crate::dedup::{DedupEngine, DedupIndex};
use crate::error::{CollectError, CollectResult};
use crate::metrics::ensure_metrics_described;
use crate::registry::{DataSourcesInfo, SourceRegistry};
use crate::state::CollectorState;
use crate::store::{ReviewStore, StoredReview};
use crate::strategy::{
    CollectionPhase, CompetitorCatalog, CompetitorPhase, MetadataFetcher, PhaseContext,
    RegionPhase, ReviewFetcher, SourcePool, StandardPhase, TimeRangePhase,
};
use crate::types::{
    PhaseReport, PhaseStatus, Platform, ReviewCandidate, ScrapeResult, Strategy,
};

pub struct Collector {
    registry: Arc<SourceRegistry>,
    sources: SourcePool,
    metadata: Option<Arc<dyn MetadataFetcher>>,
    competitors: Option<Arc<dyn CompetitorCatalog>>,
    store: Arc<dyn ReviewStore>,
    state: Arc<CollectorState>,
    phases: BTreeMap<Strategy, Box<dyn CollectionPhase>>,
}

pub struct CollectorBuilder {
    registry: Arc<SourceRegistry>,
    store: Arc<dyn ReviewStore>,
    fetchers: HashMap<String, Arc<dyn ReviewFetcher>>,
    metadata: Option<Arc<dyn MetadataFetcher>>,
    competitors: Option<Arc<dyn CompetitorCatalog>>,
    state: Option<Arc<CollectorState>>,
    backoff: Backoff,
    phases: BTreeMap<Strategy, Box<dyn CollectionPhase>>,
}

impl CollectorBuilder {
    /// Register the adapter serving the registry source `name`.
    pub fn fetcher(mut self, name: impl Into<String>, fetcher: Arc<dyn ReviewFetcher>) -> Self {
        self.fetchers.insert(name.into(), fetcher);
        self
    }

    pub fn metadata(mut self, metadata: Arc<dyn MetadataFetcher>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn competitors(mut self, catalog: Arc<dyn CompetitorCatalog>) -> Self {
        self.competitors = Some(catalog);
        self
    }

    pub fn state(mut self, state: Arc<CollectorState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the built-in implementation of one phase.
    pub fn phase(mut self, phase: Box<dyn CollectionPhase>) -> Self {
        self.phases.insert(phase.strategy(), phase);
        self
    }

    pub fn build(self) -> Collector {
        let state = self
            .state
            .unwrap_or_else(|| Arc::new(CollectorState::for_registry(&self.registry)));
        let sources = SourcePool::new(
            self.registry.clone(),
            self.fetchers,
            state.clone(),
            self.backoff,
        );
        Collector {
            registry: self.registry,
            sources,
            metadata: self.metadata,
            competitors: self.competitors,
            store: self.store,
            state,
            phases: self.phases,
        }
    }
}

/// Everything accumulated during one run; survives a budget timeout.
struct RunState {
    started: DateTime<Utc>,
    stored: DedupIndex,
    pool: Vec<ReviewCandidate>,
    phases: Vec<PhaseReport>,
    sources: Vec<String>,
    new_count: usize,
    /// Phase in flight, or the last one started.
    current: Option<Strategy>,
}

impl RunState {
    fn new(started: DateTime<Utc>) -> Self {
        Self {
            started,
            stored: DedupIndex::new(),
            pool: Vec::new(),
            phases: Vec::new(),
            sources: Vec::new(),
            new_count: 0,
            current: None,
        }
    }

    fn has_report(&self, strategy: Strategy) -> bool {
        self.phases.iter().any(|p| p.strategy == strategy)
    }

    /// Fill in reports for phases the overall budget cut off or never reached.
    fn close_interrupted(&mut self, reason: &str) {
        let in_flight = self.current.filter(|s| !self.has_report(*s));
        if let Some(strategy) = in_flight {
            self.report(strategy, PhaseStatus::TimedOut, 0, Some(reason.to_string()));
        }
        for strategy in Strategy::ALL {
            if !self.has_report(strategy) {
                self.report(strategy, PhaseStatus::Skipped, 0, None);
            }
        }
    }

    fn report(&mut self, strategy: Strategy, status: PhaseStatus, candidates: usize, error: Option<String>) {
        self.phases.push(PhaseReport {
            strategy,
            status,
            candidates,
            new_count_after: self.new_count,
            error,
        });
    }
}

impl Collector {
    pub fn builder(registry: Arc<SourceRegistry>, store: Arc<dyn ReviewStore>) -> CollectorBuilder {
        let mut phases: BTreeMap<Strategy, Box<dyn CollectionPhase>> = BTreeMap::new();
        phases.insert(Strategy::Standard, Box::new(StandardPhase));
        phases.insert(Strategy::Region, Box::new(RegionPhase));
        phases.insert(Strategy::TimeRange, Box::new(TimeRangePhase));
        phases.insert(Strategy::Competitor, Box::new(CompetitorPhase));
        CollectorBuilder {
            registry,
            store,
            fetchers: HashMap::new(),
            metadata: None,
            competitors: None,
            state: None,
            backoff: Backoff::default(),
            phases,
        }
    }

    pub fn state(&self) -> &CollectorState {
        &self.state
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Operator snapshot of sources, narrowed by platform when given.
    pub fn data_sources_info(&self, app_id: Option<&str>, platform: Option<Platform>) -> DataSourcesInfo {
        self.registry.info(&self.state.rate_limiter, app_id, platform)
    }

    /// Run the escalation ladder for `config.app`. Always returns.
    pub async fn collect(&self, config: &ScrapeConfig) -> ScrapeResult {
        ensure_metrics_described();
        counter!("collect_runs_total").increment(1);

        let clock = tokio::time::Instant::now();
        let mut run = RunState::new(Utc::now());
        let engine = DedupEngine::new(config.dedup.clone());
        let budget = config.budget.overall_timeout();

        let mut error: Option<CollectError> =
            match tokio::time::timeout(budget, self.run_phases(config, &engine, &mut run)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => {
                    let e = CollectError::BudgetExhausted(budget);
                    run.close_interrupted(&e.to_string());
                    Some(e)
                }
            };
        if let Some(e) = &error {
            warn!(target: "collect", app_id = %config.app.app_id, error = %e, "collection ended early");
        }

        let pool = std::mem::take(&mut run.pool);
        let pool_size = pool.len();
        let outcome = engine.run(pool, &mut run.stored);
        let duplicate_reviews = outcome.duplicates.len();
        let mut scraped = outcome.unique;
        scraped.truncate(config.target_total);

        let config_ok = !matches!(error, Some(CollectError::Config(_)));
        let mut stored_total = None;
        if config_ok {
            let remaining = budget.saturating_sub(clock.elapsed());
            match tokio::time::timeout(remaining, self.persist(config, &scraped, run.started)).await {
                Ok(Ok(total)) => stored_total = Some(total),
                Ok(Err(e)) => {
                    warn!(target: "collect", app_id = %config.app.app_id, error = %e, "store write failed");
                    error.get_or_insert(e);
                }
                Err(_) => {
                    warn!(target: "collect", app_id = %config.app.app_id, "store write ran past the collection budget");
                    error.get_or_insert(CollectError::BudgetExhausted(budget));
                }
            }
        }

        let competitor_reviews = scraped.iter().filter(|c| c.is_competitor_review()).count();
        let new_reviews = scraped.len();
        let success = error.is_none() && new_reviews >= config.min_new_reviews;
        gauge!("collect_last_run_ts").set(run.started.timestamp() as f64);
        info!(
            target: "collect",
            app_id = %config.app.app_id,
            pool = pool_size,
            new = new_reviews,
            duplicates = duplicate_reviews,
            competitor = competitor_reviews,
            success,
            "collection finished"
        );

        ScrapeResult {
            total_reviews: new_reviews,
            new_reviews,
            duplicate_reviews,
            competitor_reviews,
            scraped_reviews: scraped,
            sources: run.sources,
            last_crawled_at: run.started,
            success,
            error: error.map(|e| e.to_string()),
            phases: run.phases,
            stored_total,
        }
    }

    async fn run_phases(
        &self,
        config: &ScrapeConfig,
        engine: &DedupEngine,
        run: &mut RunState,
    ) -> CollectResult<()> {
        config.validate()?;
        let existing = self.store.find_existing(&config.app.app_id).await?;
        run.stored = DedupIndex::from_stored(&existing);
        info!(
            target: "collect",
            app_id = %config.app.app_id,
            platform = %config.app.platform,
            stored = existing.len(),
            "collection started"
        );

        for strategy in Strategy::ALL {
            if !config.is_enabled(strategy) {
                run.report(strategy, PhaseStatus::Skipped, 0, None);
                continue;
            }
            let Some(needed) = self.needed_for(strategy, config, run.new_count) else {
                run.report(strategy, PhaseStatus::Skipped, 0, None);
                continue;
            };
            let Some(phase) = self.phases.get(&strategy) else {
                run.report(strategy, PhaseStatus::Skipped, 0, None);
                continue;
            };
            run.current = Some(strategy);
            self.run_phase(phase.as_ref(), strategy, needed, config, engine, run)
                .await;
        }
        Ok(())
    }

    /// Still-needed count for a phase, or `None` when it must not run.
    fn needed_for(&self, strategy: Strategy, config: &ScrapeConfig, new_count: usize) -> Option<usize> {
        let needed = match strategy {
            Strategy::Standard => config.target_total.saturating_sub(new_count),
            Strategy::Region | Strategy::TimeRange => {
                if new_count >= config.min_new_reviews {
                    return None;
                }
                config.target_total.saturating_sub(new_count)
            }
            Strategy::Competitor => {
                if new_count >= config.min_new_reviews
                    || new_count >= config.competitor.threshold
                {
                    return None;
                }
                config
                    .competitor
                    .max_reviews
                    .min(config.min_new_reviews - new_count)
            }
        };
        (needed > 0).then_some(needed)
    }

    async fn run_phase(
        &self,
        phase: &dyn CollectionPhase,
        strategy: Strategy,
        needed: usize,
        config: &ScrapeConfig,
        engine: &DedupEngine,
        run: &mut RunState,
    ) {
        let ctx = PhaseContext {
            config,
            sources: &self.sources,
            metadata: self.metadata.as_deref(),
            competitors: self.competitors.as_deref(),
            stored: &run.stored,
            now: run.started,
        };
        let limit = config.budget.phase_timeout();
        let result = match tokio::time::timeout(limit, phase.run(&ctx, needed)).await {
            Ok(r) => r,
            Err(_) => Err(CollectError::PhaseTimeout(strategy, limit)),
        };

        match result {
            Ok(raws) => {
                let candidates = raws.len();
                counter!("collect_phase_candidates_total", "strategy" => strategy.as_str())
                    .increment(candidates as u64);
                run.pool.extend(raws.into_iter().map(|mut r| {
                    r.strategy = Some(strategy);
                    ReviewCandidate::seal(r, run.started, &config.default_region)
                }));
                if candidates > 0 {
                    run.sources.push(strategy.provenance_tag().to_string());
                }
                run.new_count = engine.count_unique(&run.pool, &run.stored);
                info!(
                    target: "collect",
                    strategy = %strategy,
                    needed,
                    candidates,
                    new_count = run.new_count,
                    "phase completed"
                );
                run.report(strategy, PhaseStatus::Completed, candidates, None);
            }
            Err(e) => {
                counter!("collect_phase_errors_total", "strategy" => strategy.as_str()).increment(1);
                warn!(target: "collect", strategy = %strategy, error = %e, "phase failed");
                let status = if matches!(e, CollectError::PhaseTimeout(..)) {
                    PhaseStatus::TimedOut
                } else {
                    PhaseStatus::Failed
                };
                run.report(strategy, status, 0, Some(e.to_string()));
            }
        }
    }

    /// Write accepted reviews and stamp the crawl time; returns the store count.
    async fn persist(
        &self,
        config: &ScrapeConfig,
        accepted: &[ReviewCandidate],
        crawled_at: DateTime<Utc>,
    ) -> CollectResult<usize> {
        let app_id = config.app.app_id.as_str();
        if !accepted.is_empty() {
            let rows: Vec<StoredReview> = accepted
                .iter()
                .map(|c| StoredReview::from_candidate(app_id, c))
                .collect();
            let inserted = self.store.insert_new(rows).await?;
            info!(target: "collect", app_id, inserted, "reviews stored");
        }
        self.store.update_last_crawled_at(app_id, crawled_at).await?;
        Ok(self.store.count_existing(app_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn collector() -> Collector {
        Collector::builder(
            Arc::new(SourceRegistry::with_env_lookup(Vec::new(), |_| None)),
            Arc::new(MemoryStore::new()),
        )
        .backoff(Backoff::none())
        .build()
    }

    #[test]
    fn competitor_need_is_bounded_by_min_new_and_cap() {
        let c = collector();
        let mut cfg = ScrapeConfig::for_app("1", "A", Platform::Ios);
        cfg.min_new_reviews = 200;
        cfg.competitor.threshold = 100;
        cfg.competitor.max_reviews = 50;
        assert_eq!(c.needed_for(Strategy::Competitor, &cfg, 90), Some(50));
        cfg.competitor.max_reviews = 500;
        assert_eq!(c.needed_for(Strategy::Competitor, &cfg, 90), Some(110));
        assert_eq!(c.needed_for(Strategy::Competitor, &cfg, 100), None);
    }

    #[test]
    fn later_phases_stop_once_minimum_is_met() {
        let c = collector();
        let cfg = ScrapeConfig::for_app("1", "A", Platform::Ios);
        assert_eq!(c.needed_for(Strategy::Region, &cfg, 200), None);
        assert_eq!(c.needed_for(Strategy::TimeRange, &cfg, 150), Some(350));
        assert_eq!(c.needed_for(Strategy::Standard, &cfg, 0), Some(500));
    }

    #[test]
    fn interrupted_run_reports_every_phase_once() {
        let mut run = RunState::new(Utc::now());
        run.report(Strategy::Standard, PhaseStatus::Completed, 10, None);
        run.current = Some(Strategy::TimeRange);
        run.report(Strategy::Region, PhaseStatus::Skipped, 0, None);
        run.close_interrupted("budget gone");

        let statuses: Vec<_> = run.phases.iter().map(|p| (p.strategy, p.status.clone())).collect();
        assert_eq!(
            statuses,
            vec![
                (Strategy::Standard, PhaseStatus::Completed),
                (Strategy::Region, PhaseStatus::Skipped),
                (Strategy::TimeRange, PhaseStatus::TimedOut),
                (Strategy::Competitor, PhaseStatus::Skipped),
            ]
        );
        assert_eq!(run.phases[2].error.as_deref(), Some("budget gone"));
    }

    #[tokio::test]
    async fn invalid_config_returns_failed_result() {
        let c = collector();
        let res = c.collect(&ScrapeConfig::default()).await;
        assert!(!res.success);
        assert!(res.error.unwrap().contains("app_id"));
        assert!(res.scraped_reviews.is_empty());
        assert!(res.stored_total.is_none());
    }

    #[tokio::test]
    async fn no_fetchers_means_failed_phases_not_a_failed_call() {
        let c = collector();
        let mut cfg = ScrapeConfig::for_app("1", "A", Platform::Ios).without_delays();
        cfg.min_new_reviews = 1;
        cfg.competitor.threshold = 1;
        let res = c.collect(&cfg).await;
        assert!(!res.success);
        assert!(res.error.is_none());
        assert_eq!(res.phases[0].status, PhaseStatus::Failed);
        assert_eq!(res.stored_total, Some(0));
    }
}
