//! Exact and near-duplicate filtering with a bounded diversity allowance.
//!
//! - Exact duplicates share a `content_hash` (normalized first 100 chars).
//! - Near duplicates have Jaccard word-set similarity at or above
//!   `content_similarity_threshold` AND a content length difference below
//!   `min_length_diff`.
//! - A budget of `floor(pool * duplicate_allowance_ratio)` near duplicates may
//!   still be accepted, provided the author has no other accepted review
//!   within `time_window_hours`. Near-identical complaints from different
//!   people are still signal.
//!
//! The index is updated after every acceptance, so later candidates are
//! compared against earlier winners as well as stored reviews.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::normalize::fold_for_comparison;
use crate::store::StoredReview;
use crate::types::ReviewCandidate;

/// Number of normalized chars that feed the content hash.
pub const HASH_PREFIX_CHARS: usize = 100;

/// Stable hash of normalized content (lowercased, punctuation-stripped, first 100 chars).
pub fn content_hash(content: &str) -> String {
    let folded = fold_for_comparison(content);
    let prefix: String = folded.chars().take(HASH_PREFIX_CHARS).collect();
    let digest = Sha256::digest(prefix.as_bytes());
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Jaccard similarity over two word sets. Two empty sets are identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    if union == 0.0 {
        0.0
    } else {
        inter / union
    }
}

pub fn word_set(content: &str) -> HashSet<String> {
    fold_for_comparison(content)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tunables for the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupParams {
    pub content_similarity_threshold: f32,
    pub time_window_hours: i64,
    pub duplicate_allowance_ratio: f32,
    pub min_length_diff: usize,
}

impl Default for DedupParams {
    fn default() -> Self {
        Self {
            content_similarity_threshold: 0.8,
            time_window_hours: 24,
            duplicate_allowance_ratio: 0.3,
            min_length_diff: 20,
        }
    }
}

impl DedupParams {
    /// Clamp out-of-range values instead of failing.
    pub fn sanitized(mut self) -> Self {
        self.content_similarity_threshold = self.content_similarity_threshold.clamp(0.0, 1.0);
        self.duplicate_allowance_ratio = self.duplicate_allowance_ratio.clamp(0.0, 1.0);
        if self.time_window_hours < 0 {
            self.time_window_hours = 0;
        }
        self
    }
}

#[derive(Debug, Clone)]
struct IndexedItem {
    words: HashSet<String>,
    content_len: usize,
}

/// Hashes, word sets and per-author history of accepted content.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    hashes: HashSet<String>,
    items: Vec<IndexedItem>,
    by_author: HashMap<String, Vec<DateTime<Utc>>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the index with previously stored reviews.
    pub fn from_stored(stored: &[StoredReview]) -> Self {
        let mut idx = Self::new();
        for r in stored {
            idx.insert(&r.author, &r.content, r.date);
        }
        idx
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    fn insert(&mut self, author: &str, content: &str, date: DateTime<Utc>) {
        self.insert_prepared(content_hash(content), word_set(content), content, author, date);
    }

    fn insert_prepared(
        &mut self,
        hash: String,
        words: HashSet<String>,
        content: &str,
        author: &str,
        date: DateTime<Utc>,
    ) {
        self.hashes.insert(hash);
        self.items.push(IndexedItem {
            words,
            content_len: content.chars().count(),
        });
        let key = author_key(author);
        if !key.is_empty() {
            self.by_author.entry(key).or_default().push(date);
        }
    }

    /// Highest similarity among indexed items that also fall within the length tolerance.
    fn best_near_match(
        &self,
        words: &HashSet<String>,
        content_len: usize,
        params: &DedupParams,
    ) -> Option<f32> {
        let mut best: Option<f32> = None;
        for item in &self.items {
            if content_len.abs_diff(item.content_len) >= params.min_length_diff {
                continue;
            }
            let sim = jaccard(words, &item.words);
            if sim >= params.content_similarity_threshold && best.is_none_or(|b| sim > b) {
                best = Some(sim);
            }
        }
        best
    }

    fn author_active_near(&self, author: &str, date: DateTime<Utc>, window: Duration) -> bool {
        self.by_author
            .get(&author_key(author))
            .is_some_and(|dates| dates.iter().any(|d| (*d - date).abs() <= window))
    }
}

fn author_key(author: &str) -> String {
    author.trim().to_lowercase()
}

/// How a single candidate was classified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Unique,
    Exact,
    NearDuplicate { similarity: f32, admitted: bool },
}

/// Accepted and rejected candidates of one run plus counters.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Accepted candidates, best quality first.
    pub unique: Vec<ReviewCandidate>,
    pub duplicates: Vec<ReviewCandidate>,
    pub exact: usize,
    pub near_rejected: usize,
    pub allowance_admitted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DedupEngine {
    params: DedupParams,
}

impl DedupEngine {
    pub fn new(params: DedupParams) -> Self {
        Self {
            params: params.sanitized(),
        }
    }

    pub fn params(&self) -> &DedupParams {
        &self.params
    }

    /// Order the pool by quality (best first) and filter it against `index`,
    /// which is extended with every accepted candidate.
    pub fn run(&self, pool: Vec<ReviewCandidate>, index: &mut DedupIndex) -> DedupOutcome {
        let out = self.filter(pool, index);
        counter!("dedup_exact_total").increment(out.exact as u64);
        counter!("dedup_near_rejected_total").increment(out.near_rejected as u64);
        counter!("dedup_allowance_total").increment(out.allowance_admitted as u64);
        debug!(
            target: "dedup",
            unique = out.unique.len(),
            exact = out.exact,
            near_rejected = out.near_rejected,
            allowance = out.allowance_admitted,
            "dedup pass finished"
        );
        out
    }

    /// Number of candidates a full pass would accept, leaving `index` untouched.
    /// Does not record metrics.
    pub fn count_unique(&self, pool: &[ReviewCandidate], index: &DedupIndex) -> usize {
        let mut scratch = index.clone();
        self.filter(pool.to_vec(), &mut scratch).unique.len()
    }

    fn filter(&self, mut pool: Vec<ReviewCandidate>, index: &mut DedupIndex) -> DedupOutcome {
        pool.sort_by(|a, b| b.quality_score().total_cmp(&a.quality_score()));

        let mut allowance =
            (pool.len() as f32 * self.params.duplicate_allowance_ratio).floor() as usize;
        let window = Duration::hours(self.params.time_window_hours);
        let mut out = DedupOutcome::default();

        for cand in pool {
            match self.classify(&cand, index, &mut allowance, window) {
                Verdict::Exact => {
                    out.exact += 1;
                    out.duplicates.push(cand);
                }
                Verdict::NearDuplicate {
                    admitted: false, ..
                } => {
                    out.near_rejected += 1;
                    out.duplicates.push(cand);
                }
                Verdict::NearDuplicate { admitted: true, .. } => {
                    out.allowance_admitted += 1;
                    out.unique.push(cand);
                }
                Verdict::Unique => out.unique.push(cand),
            }
        }

        out
    }

    /// Classify one candidate and, when accepted, index it.
    fn classify(
        &self,
        cand: &ReviewCandidate,
        index: &mut DedupIndex,
        allowance: &mut usize,
        window: Duration,
    ) -> Verdict {
        if index.contains_hash(cand.content_hash()) {
            return Verdict::Exact;
        }

        let words = word_set(cand.content());
        let len = cand.content().chars().count();
        let verdict = match index.best_near_match(&words, len, &self.params) {
            None => Verdict::Unique,
            Some(similarity) => {
                let admitted = *allowance > 0
                    && !index.author_active_near(cand.author(), cand.date(), window);
                if admitted {
                    *allowance -= 1;
                }
                Verdict::NearDuplicate {
                    similarity,
                    admitted,
                }
            }
        };

        if matches!(
            verdict,
            Verdict::Unique | Verdict::NearDuplicate { admitted: true, .. }
        ) {
            index.insert_prepared(
                cand.content_hash().to_string(),
                words,
                cand.content(),
                cand.author(),
                cand.date(),
            );
        }
        verdict
    }
}
