// src/config/scrape.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::dedup::DedupParams;
use crate::error::CollectError;
use crate::types::{Platform, SortOrder, Strategy};

/// The app being collected for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppTarget {
    pub app_id: String,
    /// Display name; competitor adaptation substitutes this.
    pub name: String,
    pub platform: Platform,
    /// Store category; resolved through metadata when absent.
    #[serde(default)]
    pub category: Option<String>,
}

impl Default for AppTarget {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            name: String::new(),
            platform: Platform::Ios,
            category: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardConfig {
    pub enabled: bool,
    pub max_pages: u32,
    pub sort: SortOrder,
    pub delay_ms: u64,
}

impl Default for StandardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_pages: 10,
            sort: SortOrder::Newest,
            delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub code: String,
    pub priority: u32,
}

impl RegionSpec {
    pub fn new(code: &str, priority: u32) -> Self {
        Self {
            code: code.to_string(),
            priority,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub enabled: bool,
    pub regions: Vec<RegionSpec>,
    pub max_pages_per_region: u32,
    pub delay_ms: u64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            regions: vec![
                RegionSpec::new("gb", 1),
                RegionSpec::new("ca", 2),
                RegionSpec::new("au", 3),
                RegionSpec::new("in", 4),
                RegionSpec::new("ie", 5),
                RegionSpec::new("nz", 6),
            ],
            max_pages_per_region: 5,
            delay_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub name: String,
    /// Outer edge of the window, in days before now.
    pub days: u32,
    pub weight: f32,
    #[serde(default)]
    pub sort: SortOrder,
}

impl TimeBucket {
    pub fn new(name: &str, days: u32, weight: f32, sort: SortOrder) -> Self {
        Self {
            name: name.to_string(),
            days,
            weight,
            sort,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRangeConfig {
    pub enabled: bool,
    /// Ordered recent → old; `days` must increase.
    pub buckets: Vec<TimeBucket>,
    pub page_size: u32,
    pub delay_ms: u64,
}

impl Default for TimeRangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buckets: vec![
                TimeBucket::new("recent", 30, 0.6, SortOrder::Newest),
                TimeBucket::new("medium", 90, 0.3, SortOrder::MostHelpful),
                TimeBucket::new("old", 365, 0.1, SortOrder::MostHelpful),
            ],
            page_size: 50,
            delay_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitorConfig {
    pub enabled: bool,
    /// Competitor reviews are only pulled while new reviews are below this.
    pub threshold: usize,
    pub similarity_threshold: f32,
    pub max_reviews: usize,
    pub max_priority: u32,
    pub max_pages_per_competitor: u32,
    pub delay_ms: u64,
}

impl Default for CompetitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 100,
            similarity_threshold: 0.6,
            max_reviews: 100,
            max_priority: 10,
            max_pages_per_competitor: 5,
            delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub phase_timeout_secs: u64,
    pub overall_timeout_secs: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            phase_timeout_secs: 120,
            overall_timeout_secs: 600,
        }
    }
}

impl BudgetConfig {
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs.max(1))
    }
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs.max(1))
    }
}

/// Everything one `collect()` run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub app: AppTarget,
    pub target_total: usize,
    pub min_new_reviews: usize,
    pub default_region: String,
    /// Lower bound for any jittered politeness pause.
    pub politeness_floor_ms: u64,
    pub standard: StandardConfig,
    pub region: RegionConfig,
    pub time_range: TimeRangeConfig,
    pub competitor: CompetitorConfig,
    pub dedup: DedupParams,
    pub budget: BudgetConfig,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            app: AppTarget::default(),
            target_total: 500,
            min_new_reviews: 200,
            default_region: "us".to_string(),
            politeness_floor_ms: 0,
            standard: StandardConfig::default(),
            region: RegionConfig::default(),
            time_range: TimeRangeConfig::default(),
            competitor: CompetitorConfig::default(),
            dedup: DedupParams::default(),
            budget: BudgetConfig::default(),
        }
    }
}

impl ScrapeConfig {
    /// Defaults for the given app.
    pub fn for_app(app_id: &str, name: &str, platform: Platform) -> Self {
        Self {
            app: AppTarget {
                app_id: app_id.to_string(),
                name: name.to_string(),
                platform,
                category: None,
            },
            ..Self::default()
        }
    }

    /// Strip every politeness delay (tests, fixture runs).
    pub fn without_delays(mut self) -> Self {
        self.standard.delay_ms = 0;
        self.region.delay_ms = 0;
        self.time_range.delay_ms = 0;
        self.competitor.delay_ms = 0;
        self.politeness_floor_ms = 0;
        self
    }

    pub fn is_enabled(&self, strategy: Strategy) -> bool {
        match strategy {
            Strategy::Standard => self.standard.enabled,
            Strategy::Region => self.region.enabled,
            Strategy::TimeRange => self.time_range.enabled,
            Strategy::Competitor => self.competitor.enabled,
        }
    }

    pub fn validate(&self) -> Result<(), CollectError> {
        let bad = |m: &str| Err(CollectError::Config(m.to_string()));
        if self.app.app_id.trim().is_empty() {
            return bad("app.app_id must not be empty");
        }
        if self.target_total == 0 {
            return bad("target_total must be positive");
        }
        let d = &self.dedup;
        if !(0.0..=1.0).contains(&d.content_similarity_threshold) {
            return bad("dedup.content_similarity_threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&d.duplicate_allowance_ratio) {
            return bad("dedup.duplicate_allowance_ratio must be within [0, 1]");
        }
        if d.time_window_hours < 0 {
            return bad("dedup.time_window_hours must not be negative");
        }
        if self.competitor.enabled {
            if !(0.0..=1.0).contains(&self.competitor.similarity_threshold) {
                return bad("competitor.similarity_threshold must be within [0, 1]");
            }
            if self.competitor.threshold > self.min_new_reviews {
                return bad("competitor.threshold must not exceed min_new_reviews");
            }
        }
        if self.time_range.enabled {
            let b = &self.time_range.buckets;
            if b.is_empty() {
                return bad("time_range.buckets must not be empty when enabled");
            }
            if b.windows(2).any(|w| w[0].days >= w[1].days) {
                return bad("time_range.buckets days must strictly increase");
            }
            if b.iter().any(|x| x.weight < 0.0) {
                return bad("time_range.buckets weights must not be negative");
            }
            if self.time_range.page_size == 0 {
                return bad("time_range.page_size must be positive");
            }
        }
        Ok(())
    }
}
