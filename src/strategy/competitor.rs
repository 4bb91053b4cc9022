// src/strategy/competitor.rs
//! Competitor supplementation.
//!
//! Last rung of the ladder. Reviews of similar apps in the same category are
//! fetched, rewritten to name the target app, marked with a visible prefix
//! and flagged `is_competitor_review`, so consumers can filter them out.

use async_trait::async_trait;
use regex::RegexBuilder;
use tracing::{debug, info, warn};

use super::{div_ceil, CollectionPhase, CompetitorApp, PhaseContext};
use crate::backoff::politeness_pause;
use crate::error::CollectResult;
use crate::types::{RawReview, SortOrder, Strategy};

/// Prepended to the content of every adapted review.
pub const COMPETITOR_MARKER: &str = "[Competitor Insight] ";
pub const MAX_CONFIDENCE: f32 = 100.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct CompetitorPhase;

/// Ranking key: `similarity * (max_priority - priority)`.
pub fn rank_key(app: &CompetitorApp, max_priority: u32) -> f32 {
    app.similarity * max_priority.saturating_sub(app.priority) as f32
}

/// Filter and rank catalog entries for the target.
pub fn rank_competitors(
    mut apps: Vec<CompetitorApp>,
    ctx: &PhaseContext<'_>,
    category: &str,
) -> Vec<CompetitorApp> {
    let cfg = &ctx.config.competitor;
    apps.retain(|a| {
        a.app_id != ctx.app_id()
            && a.platform == ctx.platform()
            && a.category.eq_ignore_ascii_case(category)
            && a.similarity >= cfg.similarity_threshold
    });
    apps.sort_by(|a, b| {
        rank_key(b, cfg.max_priority).total_cmp(&rank_key(a, cfg.max_priority))
    });
    apps
}

/// `similarity*100 + min(len/20, 10) + 5 (title) + 3 (rating 1 or 5)`, capped at 100.
pub fn confidence_score(similarity: f32, content: &str, title: Option<&str>, rating: u8) -> f32 {
    let length_bonus = (content.chars().count() / 20).min(10) as f32;
    let title_bonus = if title.is_some_and(|t| !t.trim().is_empty()) {
        5.0
    } else {
        0.0
    };
    let extreme_bonus = if matches!(rating, 1 | 5) { 3.0 } else { 0.0 };
    (similarity.clamp(0.0, 1.0) * 100.0 + length_bonus + title_bonus + extreme_bonus)
        .min(MAX_CONFIDENCE)
}

fn replace_name(text: &str, from: &str, to: &str) -> String {
    if from.trim().is_empty() {
        return text.to_string();
    }
    match RegexBuilder::new(&regex::escape(from))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.replace_all(text, regex::NoExpand(to)).into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Rewrite a competitor's review for the target app.
pub fn adapt_competitor_review(
    mut review: RawReview,
    competitor: &CompetitorApp,
    target_name: &str,
) -> RawReview {
    let content = replace_name(&review.content, &competitor.name, target_name);
    review.content = format!("{COMPETITOR_MARKER}{content}");
    review.title = review
        .title
        .map(|t| replace_name(&t, &competitor.name, target_name));
    // scored on the text consumers will see, marker included
    review.confidence_score = Some(confidence_score(
        competitor.similarity,
        &review.content,
        review.title.as_deref(),
        review.rating,
    ));
    review.is_competitor_review = true;
    review.competitor_similarity = Some(competitor.similarity);
    review.competitor_app_id = Some(competitor.app_id.clone());
    review
}

impl CompetitorPhase {
    async fn resolve_category(&self, ctx: &PhaseContext<'_>) -> Option<String> {
        if let Some(c) = ctx.config.app.category.as_deref().filter(|c| !c.is_empty()) {
            return Some(c.to_string());
        }
        let meta = ctx.metadata?;
        match meta
            .fetch_app_metadata(ctx.app_id(), &ctx.config.default_region)
            .await
        {
            Ok(m) => m.category.filter(|c| !c.is_empty()),
            Err(e) => {
                warn!(target: "collect", error = %e, "metadata lookup failed");
                None
            }
        }
    }

    async fn fetch_competitor(
        &self,
        ctx: &PhaseContext<'_>,
        app: &CompetitorApp,
        allocation: usize,
    ) -> CollectResult<Vec<RawReview>> {
        let cfg = &ctx.config.competitor;
        let region = ctx.config.default_region.as_str();
        let mut got: Vec<RawReview> = Vec::new();
        for page in 1..=cfg.max_pages_per_competitor {
            if got.len() >= allocation {
                break;
            }
            if page > 1 {
                politeness_pause(cfg.delay_ms, ctx.config.politeness_floor_ms).await;
            }
            let batch = match ctx
                .sources
                .fetch_page(ctx.platform(), &app.app_id, region, SortOrder::MostHelpful, page)
                .await
            {
                Ok(b) => b,
                Err(e) if got.is_empty() => return Err(e),
                Err(e) => {
                    warn!(target: "collect", competitor = %app.app_id, page, error = %e, "competitor pagination abandoned");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            got.extend(batch);
        }
        got.truncate(allocation);
        Ok(got)
    }
}

#[async_trait]
impl CollectionPhase for CompetitorPhase {
    fn strategy(&self) -> Strategy {
        Strategy::Competitor
    }

    async fn run(&self, ctx: &PhaseContext<'_>, needed: usize) -> CollectResult<Vec<RawReview>> {
        let Some(catalog) = ctx.competitors else {
            debug!(target: "collect", "no competitor catalog configured");
            return Ok(Vec::new());
        };
        let Some(category) = self.resolve_category(ctx).await else {
            info!(target: "collect", app_id = ctx.app_id(), "category unknown, competitor phase yields nothing");
            return Ok(Vec::new());
        };

        let found = catalog.find_competitors(&category, ctx.platform()).await?;
        let ranked = rank_competitors(found, ctx, &category);
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let per_competitor_cap = div_ceil(ctx.config.competitor.max_reviews, ranked.len());
        let target_name = ctx.config.app.name.as_str();
        let mut remaining = needed;
        let mut out: Vec<RawReview> = Vec::new();

        for (i, app) in ranked.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            let by_similarity = (app.similarity.clamp(0.0, 1.0) as f64 * remaining as f64).ceil() as usize;
            let allocation = by_similarity.min(per_competitor_cap);
            if allocation == 0 {
                continue;
            }
            if i > 0 {
                politeness_pause(ctx.config.competitor.delay_ms, ctx.config.politeness_floor_ms)
                    .await;
            }
            match self.fetch_competitor(ctx, app, allocation).await {
                Ok(got) => {
                    remaining = remaining.saturating_sub(got.len());
                    debug!(target: "collect", competitor = %app.app_id, allocation, fetched = got.len(), "competitor done");
                    out.extend(
                        got.into_iter()
                            .map(|r| adapt_competitor_review(r, app, target_name)),
                    );
                }
                Err(e) => {
                    warn!(target: "collect", competitor = %app.app_id, error = %e, "competitor fetch failed");
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;
    use chrono::Utc;

    fn app(name: &str, similarity: f32) -> CompetitorApp {
        CompetitorApp {
            app_id: format!("{name}-id"),
            name: name.into(),
            category: "Productivity".into(),
            platform: Platform::Ios,
            similarity,
            priority: 2,
        }
    }

    #[test]
    fn adaptation_replaces_name_and_marks_provenance() {
        let raw = RawReview::new(
            "rss",
            Platform::Ios,
            "pat",
            5,
            "NoteZilla syncs faster than anything, notezilla rocks",
            Utc::now(),
        )
        .with_title("Love Notezilla");
        let out = adapt_competitor_review(raw, &app("NoteZilla", 0.8), "Acme Notes");
        assert_eq!(
            out.content,
            "[Competitor Insight] Acme Notes syncs faster than anything, Acme Notes rocks"
        );
        assert_eq!(out.title.as_deref(), Some("Love Acme Notes"));
        assert!(out.is_competitor_review);
        assert_eq!(out.competitor_app_id.as_deref(), Some("NoteZilla-id"));
    }

    #[test]
    fn name_with_regex_metacharacters_is_literal() {
        let raw = RawReview::new("rss", Platform::Ios, "a", 3, "Notes+ (beta) is fine", Utc::now());
        let out = adapt_competitor_review(raw, &app("Notes+ (beta)", 0.7), "$1 Acme");
        assert_eq!(out.content, "[Competitor Insight] $1 Acme is fine");
    }

    #[test]
    fn confidence_reflects_adapted_text() {
        // 19 chars before adaptation, 41 after the rename and the marker
        let raw = RawReview::new("rss", Platform::Ios, "kim", 3, "Zed is fine for me.", Utc::now());
        let out = adapt_competitor_review(raw, &app("Zed", 0.5), "Acme");
        assert_eq!(out.content.chars().count(), 41);
        let c = out.confidence_score.unwrap();
        assert!((c - 52.0).abs() < 1e-4, "got {c}");
        assert_eq!(c, confidence_score(0.5, &out.content, None, 3));
    }

    #[test]
    fn confidence_is_capped() {
        let long = "x".repeat(400);
        assert_eq!(confidence_score(1.0, &long, Some("t"), 5), 100.0);
        // 0.5*100 + 2 (40 chars) + 0 + 0
        let c = confidence_score(0.5, &"y".repeat(40), None, 3);
        assert!((c - 52.0).abs() < 1e-4);
    }

    #[test]
    fn rank_key_prefers_similar_and_urgent() {
        let mut a = app("A", 0.9);
        a.priority = 8;
        let b = app("B", 0.7);
        assert!(rank_key(&b, 10) > rank_key(&a, 10));
    }
}
