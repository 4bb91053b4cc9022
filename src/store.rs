// src/store.rs
//! Persistence contract for collected reviews, plus an in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::types::{Platform, ReviewCandidate};

/// A review as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReview {
    pub review_id: String,
    pub platform: Platform,
    pub app_id: String,
    pub author: String,
    pub rating: u8,
    pub title: Option<String>,
    pub content: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub is_competitor_review: bool,
}

impl StoredReview {
    pub fn from_candidate(app_id: &str, c: &ReviewCandidate) -> Self {
        Self {
            review_id: derive_review_id(c.source_id(), c.author(), c.date(), c.rating()),
            platform: c.platform(),
            app_id: app_id.to_string(),
            author: c.author().to_string(),
            rating: c.rating(),
            title: c.title().map(str::to_string),
            content: c.content().to_string(),
            date: c.date(),
            is_competitor_review: c.is_competitor_review(),
        }
    }
}

/// Deterministic review id: the native id when present, otherwise a
/// hash of author + date + rating. Unique only within one app and platform.
pub fn derive_review_id(
    native_id: Option<&str>,
    author: &str,
    date: DateTime<Utc>,
    rating: u8,
) -> String {
    if let Some(id) = native_id.map(str::trim).filter(|s| !s.is_empty()) {
        return id.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(author.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(date.timestamp().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update([rating]);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(24);
    out.push_str("gen-");
    for b in digest.iter().take(10) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Storage backend used by the collector. Writes must be idempotent
/// under (platform, app_id, review_id).
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn find_existing(&self, app_id: &str) -> Result<Vec<StoredReview>, StoreError>;
    async fn count_existing(&self, app_id: &str) -> Result<usize, StoreError>;
    /// Returns the number of rows actually inserted.
    async fn insert_new(&self, reviews: Vec<StoredReview>) -> Result<usize, StoreError>;
    async fn update_last_crawled_at(
        &self,
        app_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

type ReviewKey = (Platform, String, String);

/// In-memory store for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    reviews: Mutex<HashMap<ReviewKey, StoredReview>>,
    crawled: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with existing reviews.
    pub fn with_reviews(reviews: Vec<StoredReview>) -> Self {
        let store = Self::new();
        {
            let mut g = store.reviews.lock().unwrap_or_else(|p| p.into_inner());
            for r in reviews {
                g.insert((r.platform, r.app_id.clone(), r.review_id.clone()), r);
            }
        }
        store
    }

    pub fn last_crawled_at(&self, app_id: &str) -> Option<DateTime<Utc>> {
        self.crawled
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(app_id)
            .copied()
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn find_existing(&self, app_id: &str) -> Result<Vec<StoredReview>, StoreError> {
        let g = self.reviews.lock().unwrap_or_else(|p| p.into_inner());
        let mut v: Vec<StoredReview> = g
            .values()
            .filter(|r| r.app_id == app_id)
            .cloned()
            .collect();
        v.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(v)
    }

    async fn count_existing(&self, app_id: &str) -> Result<usize, StoreError> {
        let g = self.reviews.lock().unwrap_or_else(|p| p.into_inner());
        Ok(g.values().filter(|r| r.app_id == app_id).count())
    }

    async fn insert_new(&self, reviews: Vec<StoredReview>) -> Result<usize, StoreError> {
        let mut g = self.reviews.lock().unwrap_or_else(|p| p.into_inner());
        let mut inserted = 0usize;
        for r in reviews {
            let key = (r.platform, r.app_id.clone(), r.review_id.clone());
            if let std::collections::hash_map::Entry::Vacant(e) = g.entry(key) {
                e.insert(r);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn update_last_crawled_at(
        &self,
        app_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.crawled
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(app_id.to_string(), ts);
        Ok(())
    }
}
