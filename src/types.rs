// src/types.rs
//! Core data model: raw fetched reviews, sealed candidates, and run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dedup::content_hash;
use crate::quality;

/// Marketplace platform of an app or review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }

    /// Case-insensitive parse; accepts a couple of common aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ios" | "apple" | "app_store" | "appstore" => Some(Platform::Ios),
            "android" | "google" | "google_play" | "play" => Some(Platform::Android),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform coverage of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePlatform {
    Ios,
    Android,
    Both,
}

impl SourcePlatform {
    pub fn covers(&self, platform: Platform) -> bool {
        matches!(
            (self, platform),
            (SourcePlatform::Both, _)
                | (SourcePlatform::Ios, Platform::Ios)
                | (SourcePlatform::Android, Platform::Android)
        )
    }
}

/// Collection phases in escalation order. `Ord` follows the phase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Standard,
    Region,
    TimeRange,
    Competitor,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Standard,
        Strategy::Region,
        Strategy::TimeRange,
        Strategy::Competitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Standard => "standard",
            Strategy::Region => "region",
            Strategy::TimeRange => "time_range",
            Strategy::Competitor => "competitor",
        }
    }

    /// Provenance tag recorded in `ScrapeResult::sources`.
    pub fn provenance_tag(&self) -> &'static str {
        match self {
            Strategy::Standard => "standard_incremental",
            Strategy::Region => "multi_region",
            Strategy::TimeRange => "time_range",
            Strategy::Competitor => "competitor_supplement",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort order requested from a marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    MostHelpful,
    MostCritical,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::MostHelpful => "most_helpful",
            SortOrder::MostCritical => "most_critical",
        }
    }
}

/// A review as returned by a fetch adapter, before scoring.
///
/// Strategies tag these freely (region, bucket, competitor adaptation).
/// Once passed to [`ReviewCandidate::seal`] the data is frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReview {
    /// Native id in the marketplace, if it exposes one.
    pub source_id: Option<String>,
    /// Name of the data source that produced the review.
    pub source_name: String,
    pub platform: Platform,
    pub author: String,
    pub rating: u8,
    pub title: Option<String>,
    pub content: String,
    pub date: DateTime<Utc>,
    pub app_version: Option<String>,
    pub region: Option<String>,
    pub region_priority: Option<u32>,
    pub time_range_bucket: Option<String>,
    pub bucket_days: Option<u32>,
    pub is_competitor_review: bool,
    pub competitor_similarity: Option<f32>,
    pub competitor_app_id: Option<String>,
    pub confidence_score: Option<f32>,
    /// Phase that produced the review; set by the orchestrator.
    pub strategy: Option<Strategy>,
}

impl RawReview {
    /// Minimal constructor; optional fields start empty.
    pub fn new(
        source_name: impl Into<String>,
        platform: Platform,
        author: impl Into<String>,
        rating: u8,
        content: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: None,
            source_name: source_name.into(),
            platform,
            author: author.into(),
            rating: rating.clamp(1, 5),
            title: None,
            content: content.into(),
            date,
            app_version: None,
            region: None,
            region_priority: None,
            time_range_bucket: None,
            bucket_days: None,
            is_competitor_review: false,
            competitor_similarity: None,
            competitor_app_id: None,
            confidence_score: None,
            strategy: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// A scored, hashed review. Fields are read-only after sealing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewCandidate {
    review: RawReview,
    quality_score: f32,
    content_hash: String,
}

impl ReviewCandidate {
    /// Score and hash a raw review. `now` anchors the recency factor.
    pub fn seal(mut review: RawReview, now: DateTime<Utc>, default_region: &str) -> Self {
        review.content = crate::normalize::normalize_review_text(&review.content);
        if let Some(t) = review.title.take() {
            let t = crate::normalize::normalize_review_text(&t);
            review.title = (!t.is_empty()).then_some(t);
        }
        let quality_score = quality::score(&review, now, default_region);
        let content_hash = content_hash(&review.content);
        Self {
            review,
            quality_score,
            content_hash,
        }
    }

    pub fn quality_score(&self) -> f32 {
        self.quality_score
    }
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
    pub fn source_id(&self) -> Option<&str> {
        self.review.source_id.as_deref()
    }
    pub fn source_name(&self) -> &str {
        &self.review.source_name
    }
    pub fn platform(&self) -> Platform {
        self.review.platform
    }
    pub fn author(&self) -> &str {
        &self.review.author
    }
    pub fn rating(&self) -> u8 {
        self.review.rating
    }
    pub fn title(&self) -> Option<&str> {
        self.review.title.as_deref()
    }
    pub fn content(&self) -> &str {
        &self.review.content
    }
    pub fn date(&self) -> DateTime<Utc> {
        self.review.date
    }
    pub fn app_version(&self) -> Option<&str> {
        self.review.app_version.as_deref()
    }
    pub fn region(&self) -> Option<&str> {
        self.review.region.as_deref()
    }
    pub fn time_range_bucket(&self) -> Option<&str> {
        self.review.time_range_bucket.as_deref()
    }
    pub fn is_competitor_review(&self) -> bool {
        self.review.is_competitor_review
    }
    pub fn competitor_similarity(&self) -> Option<f32> {
        self.review.competitor_similarity
    }
    pub fn confidence_score(&self) -> Option<f32> {
        self.review.confidence_score
    }
    pub fn strategy(&self) -> Option<Strategy> {
        self.review.strategy
    }
    /// Borrow the underlying frozen review.
    pub fn raw(&self) -> &RawReview {
        &self.review
    }
}

/// Outcome of a single phase, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    Failed,
    TimedOut,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub strategy: Strategy,
    pub status: PhaseStatus,
    pub candidates: usize,
    /// Unique new reviews measured after the phase.
    pub new_count_after: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final result of one `collect()` run.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub total_reviews: usize,
    pub new_reviews: usize,
    pub duplicate_reviews: usize,
    pub competitor_reviews: usize,
    pub scraped_reviews: Vec<ReviewCandidate>,
    pub sources: Vec<String>,
    pub last_crawled_at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub phases: Vec<PhaseReport>,
    /// Reviews held by the store after this run's write, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_total: Option<usize>,
}

impl ScrapeResult {
    /// Reviews that did not come from competitor supplementation.
    pub fn organic_reviews(&self) -> impl Iterator<Item = &ReviewCandidate> {
        self.scraped_reviews
            .iter()
            .filter(|r| !r.is_competitor_review())
    }
}
