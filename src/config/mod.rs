// src/config/mod.rs
//! Loading `ScrapeConfig` from TOML with env overrides.
//!
//! Lookup order:
//! 1) explicit path passed by the caller
//! 2) `$HARVEST_CONFIG_PATH` (must exist when set)
//! 3) `config/scrape.toml`
//! 4) built-in defaults
//!
//! Afterwards `HARVEST_TARGET_TOTAL` and `HARVEST_MIN_NEW` override the
//! volume targets when they parse as positive integers.

pub mod scrape;

pub use scrape::{
    AppTarget, BudgetConfig, CompetitorConfig, RegionConfig, RegionSpec, ScrapeConfig,
    StandardConfig, TimeBucket, TimeRangeConfig,
};

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "HARVEST_CONFIG_PATH";
pub const ENV_TARGET_TOTAL: &str = "HARVEST_TARGET_TOTAL";
pub const ENV_MIN_NEW: &str = "HARVEST_MIN_NEW";
pub const DEFAULT_CONFIG_PATH: &str = "config/scrape.toml";

pub fn parse_scrape_config(s: &str) -> Result<ScrapeConfig> {
    toml::from_str(s).context("parsing scrape config TOML")
}

pub fn load_scrape_config_from(path: &Path) -> Result<ScrapeConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading scrape config from {}", path.display()))?;
    parse_scrape_config(&content)
}

/// Resolve config via env var and fallbacks, then apply env overrides.
pub fn load_scrape_config_default() -> Result<ScrapeConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        load_scrape_config_from(&pb)?
    } else {
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            load_scrape_config_from(&p)?
        } else {
            ScrapeConfig::default()
        }
    };
    apply_env_overrides(&mut cfg, |k| std::env::var(k).ok());
    Ok(cfg)
}

/// Apply volume overrides; unparsable or zero values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut ScrapeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let parse = |k: &str| {
        lookup(k)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
    };
    if let Some(v) = parse(ENV_TARGET_TOTAL) {
        cfg.target_total = v;
    }
    if let Some(v) = parse(ENV_MIN_NEW) {
        cfg.min_new_reviews = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Platform, SortOrder};
    use std::{env, fs};

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = parse_scrape_config(
            r#"
            target_total = 300
            [app]
            app_id = "com.acme.notes"
            name = "Acme Notes"
            platform = "android"

            [region]
            regions = [{ code = "de", priority = 1 }]

            [dedup]
            duplicate_allowance_ratio = 0.1
            "#,
        )
        .unwrap();
        assert_eq!(cfg.target_total, 300);
        assert_eq!(cfg.min_new_reviews, 200);
        assert_eq!(cfg.app.platform, Platform::Android);
        assert_eq!(cfg.region.regions.len(), 1);
        assert_eq!(cfg.region.max_pages_per_region, 5);
        assert!((cfg.dedup.duplicate_allowance_ratio - 0.1).abs() < 1e-6);
        assert!((cfg.dedup.content_similarity_threshold - 0.8).abs() < 1e-6);
        assert_eq!(cfg.time_range.buckets[0].sort, SortOrder::Newest);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_ignore_garbage() {
        let mut cfg = ScrapeConfig::default();
        apply_env_overrides(&mut cfg, |k| match k {
            ENV_TARGET_TOTAL => Some(" 800 ".into()),
            ENV_MIN_NEW => Some("lots".into()),
            _ => None,
        });
        assert_eq!(cfg.target_total, 800);
        assert_eq!(cfg.min_new_reviews, 200);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD in a temp dir so the repo's config/ does not interfere
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_TARGET_TOTAL);
        env::remove_var(ENV_MIN_NEW);

        // No files → defaults
        let c = load_scrape_config_default().unwrap();
        assert_eq!(c.target_total, 500);

        // Env path wins
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "target_total = 42\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        assert_eq!(load_scrape_config_default().unwrap().target_total, 42);

        // Dangling env path is an error
        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(load_scrape_config_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
