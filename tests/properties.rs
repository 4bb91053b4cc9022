// tests/properties.rs
//
// Invariants of hashing, dedup and scoring, checked through the public API.

use chrono::{Duration, Utc};
use review_harvester::dedup::{content_hash, DedupEngine, DedupIndex, DedupParams};
use review_harvester::quality;
use review_harvester::types::{Platform, RawReview, ReviewCandidate};

fn seal(author: &str, content: &str) -> ReviewCandidate {
    let now = Utc::now();
    let raw = RawReview::new("t", Platform::Ios, author, 3, content, now - Duration::hours(3));
    ReviewCandidate::seal(raw, now, "us")
}

#[test]
fn hash_is_case_and_punctuation_insensitive() {
    assert_eq!(content_hash("Great app!!"), content_hash("great app"));
    assert_eq!(seal("a", "Great app!!").content_hash(), content_hash("great app"));
}

#[test]
fn identical_normalized_content_is_rejected_second() {
    let engine = DedupEngine::default();
    let mut index = DedupIndex::new();
    let out = engine.run(
        vec![
            seal("first", "The sync button does nothing."),
            seal("second", "the SYNC button does nothing"),
        ],
        &mut index,
    );
    assert_eq!(out.unique.len(), 1);
    assert_eq!(out.duplicates.len(), 1);
    assert_eq!(out.exact, 1);
}

#[test]
fn allowance_admits_at_most_thirty_percent_of_pool() {
    // 100 near-identical complaints from different people.
    let pool: Vec<_> = (0..100)
        .map(|i| {
            seal(
                &format!("user{i}"),
                &format!("app crashes every single time when opening settings screen v{i}"),
            )
        })
        .collect();
    let engine = DedupEngine::new(DedupParams {
        duplicate_allowance_ratio: 0.3,
        ..DedupParams::default()
    });
    let mut index = DedupIndex::new();
    let out = engine.run(pool, &mut index);

    assert!(out.allowance_admitted <= 30);
    assert_eq!(out.allowance_admitted, 30);
    assert_eq!(out.unique.len(), 31);
    assert_eq!(out.near_rejected, 69);
    assert_eq!(out.exact, 0);
}

#[test]
fn longer_content_never_scores_lower() {
    let now = Utc::now();
    let short = RawReview::new("t", Platform::Ios, "a", 4, "x".repeat(10), now);
    let long = RawReview::new("t", Platform::Ios, "a", 4, "x".repeat(200), now);
    assert!(quality::score(&long, now, "us") >= quality::score(&short, now, "us"));
}

#[test]
fn competitor_scores_strictly_lower_than_organic_twin() {
    let now = Utc::now();
    let organic = RawReview::new(
        "t",
        Platform::Ios,
        "a",
        2,
        "Login fails after the update and support never answers",
        now - Duration::days(2),
    );
    let mut competitor = organic.clone();
    competitor.is_competitor_review = true;
    competitor.competitor_similarity = Some(1.0);
    assert!(quality::score(&competitor, now, "us") < quality::score(&organic, now, "us"));
}
