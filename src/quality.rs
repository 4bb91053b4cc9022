//! Quality scoring for review candidates.
//!
//! Additive over independent factors; the result orders candidates into
//! deduplication and decides what survives final truncation.
//!
//! | factor                  | points                              |
//! |-------------------------|-------------------------------------|
//! | content length          | +1 each for >50, >100, >200 chars   |
//! | title present           | +0.5                                |
//! | rating 2..=4 / extreme  | +1.0 / +0.5                         |
//! | domain keywords         | +0.5 per distinct hit, max +2.0     |
//! | non-default region      | +0.5                                |
//! | recency                 | +1.0 under 7 days, +0.5 under 30    |
//! | sentiment polarity word | +0.5                                |
//!
//! Competitor reviews are scored without their adaptation marker, then
//! multiplied by their similarity and then lose [`COMPETITOR_PENALTY`] points.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::normalize::fold_for_comparison;
use crate::strategy::competitor::COMPETITOR_MARKER;
use crate::types::RawReview;

pub const COMPETITOR_PENALTY: f32 = 2.0;
const KEYWORD_POINTS: f32 = 0.5;
const KEYWORD_CAP: f32 = 2.0;

static DOMAIN_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "crash", "crashes", "crashing", "freeze", "freezes", "lag", "laggy", "slow", "bug",
        "bugs", "login", "password", "payment", "subscription", "refund", "billing", "ads",
        "battery", "update", "sync", "notification", "notifications", "offline", "loading",
        "error", "support", "feature", "performance",
    ]
    .into_iter()
    .collect()
});

static POLARITY_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "love", "great", "excellent", "amazing", "awesome", "perfect", "helpful", "best",
        "hate", "terrible", "awful", "worst", "useless", "horrible", "disappointed",
        "frustrating", "annoying", "broken",
    ]
    .into_iter()
    .collect()
});

/// Content without the adaptation marker of competitor reviews.
fn scored_body(review: &RawReview) -> &str {
    if !review.is_competitor_review {
        return &review.content;
    }
    review
        .content
        .strip_prefix(COMPETITOR_MARKER.trim_end())
        .map(str::trim_start)
        .unwrap_or(&review.content)
}

/// Score a review. Pure: same input and `now` give the same number.
pub fn score(review: &RawReview, now: DateTime<Utc>, default_region: &str) -> f32 {
    let mut s = 0.0f32;

    let body = scored_body(review);

    // Content length tiers
    let len = body.chars().count();
    for tier in [50, 100, 200] {
        if len > tier {
            s += 1.0;
        }
    }

    // Title
    if review.title.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        s += 0.5;
    }

    // Informative middle ratings beat extremes
    s += match review.rating {
        2..=4 => 1.0,
        _ => 0.5,
    };

    let folded = fold_for_comparison(body);
    let words: HashSet<&str> = folded.split(' ').filter(|w| !w.is_empty()).collect();

    let hits = words.iter().filter(|w| DOMAIN_KEYWORDS.contains(*w)).count() as f32;
    s += (hits * KEYWORD_POINTS).min(KEYWORD_CAP);

    if review
        .region
        .as_deref()
        .is_some_and(|r| !r.eq_ignore_ascii_case(default_region))
    {
        s += 0.5;
    }

    let age_days = now.signed_duration_since(review.date).num_days();
    if age_days < 7 {
        s += 1.0;
    } else if age_days < 30 {
        s += 0.5;
    }

    if words.iter().any(|w| POLARITY_WORDS.contains(*w)) {
        s += 0.5;
    }

    if review.is_competitor_review {
        let sim = review.competitor_similarity.unwrap_or(0.0).clamp(0.0, 1.0);
        s = s * sim - COMPETITOR_PENALTY;
    }

    s
}
