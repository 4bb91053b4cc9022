//! # Source Registry
//!
//! Catalog of review data sources with platform coverage, cost, priority
//! (lower is preferred) and a quality estimate in `[0.0, 1.0]`.
//!
//! - Loads from TOML (`[[sources]]` tables) or falls back to a built-in seed.
//! - A source naming a `credential_env` is only available when that variable
//!   is set and non-empty. Missing credentials are not an error; the source
//!   is silently left out of `available_sources`.
//! - Lookup order for the catalog file: `$HARVEST_SOURCES_PATH` →
//!   `config/sources.toml` → seed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::rate_limit::{RateLimitRule, RateLimiter};
use crate::types::{Platform, SourcePlatform};

pub const ENV_SOURCES_PATH: &str = "HARVEST_SOURCES_PATH";
pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

fn default_true() -> bool {
    true
}

fn default_quality() -> f32 {
    0.5
}

/// Static description of one data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceDescriptor {
    pub name: String,
    pub platform: SourcePlatform,
    #[serde(default = "default_true")]
    pub free: bool,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_quality")]
    pub quality: f32,
    #[serde(default = "default_true")]
    pub available: bool,
    /// Environment variable holding the credential this source needs.
    #[serde(default)]
    pub credential_env: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitRule>,
    /// Free-form cost label for operators, e.g. "$0.002/call".
    #[serde(default)]
    pub cost_per_call: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    sources: Vec<DataSourceDescriptor>,
}

/// Operator-facing status of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Available,
    RateLimited,
    Unavailable,
}

/// Introspection snapshot returned by `data_sources_info`.
#[derive(Debug, Clone, Serialize)]
pub struct DataSourcesInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// Usable source names, best priority first.
    pub available: Vec<String>,
    pub quality: BTreeMap<String, f32>,
    pub costs: BTreeMap<String, String>,
    pub status: BTreeMap<String, SourceStatus>,
    /// Calls left in the current window for rate-limited sources.
    pub remaining_calls: BTreeMap<String, u32>,
}

/// Read-only catalog, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<DataSourceDescriptor>,
}

impl SourceRegistry {
    /// Resolve credentials against the process environment.
    pub fn new(sources: Vec<DataSourceDescriptor>) -> Self {
        Self::with_env_lookup(sources, |k| std::env::var(k).ok())
    }

    /// Resolve credentials with a custom lookup (tests).
    pub fn with_env_lookup<F>(sources: Vec<DataSourceDescriptor>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let sources = sources
            .into_iter()
            .map(|mut s| {
                s.quality = s.quality.clamp(0.0, 1.0);
                if let Some(var) = s.credential_env.as_deref() {
                    let present = lookup(var).is_some_and(|v| !v.trim().is_empty());
                    if !present && s.available {
                        info!(target: "sources", source = %s.name, env = var, "credential missing, source disabled");
                        s.available = false;
                    }
                }
                s
            })
            .collect();
        Self { sources }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(s).context("parsing source catalog TOML")?;
        Ok(Self::new(file.sources))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading source catalog from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Env path, then `config/sources.toml`, then the built-in seed.
    /// A broken file is logged and replaced by the seed.
    pub fn load_default() -> Self {
        let path = std::env::var(ENV_SOURCES_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOURCES_PATH));
        if !path.exists() {
            return Self::default_seed();
        }
        match Self::load_from_file(&path) {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "sources", error = ?e, path = %path.display(), "falling back to seed catalog");
                Self::default_seed()
            }
        }
    }

    pub fn all(&self) -> &[DataSourceDescriptor] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&DataSourceDescriptor> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Available sources covering `platform`, ascending by priority.
    pub fn available_sources(&self, platform: Platform) -> Vec<&DataSourceDescriptor> {
        let mut v: Vec<&DataSourceDescriptor> = self
            .sources
            .iter()
            .filter(|s| s.available && s.platform.covers(platform))
            .collect();
        v.sort_by_key(|s| s.priority);
        v
    }

    pub fn rate_limit_rules(&self) -> HashMap<String, RateLimitRule> {
        self.sources
            .iter()
            .filter_map(|s| s.rate_limit.map(|r| (s.name.clone(), r)))
            .collect()
    }

    /// Snapshot for operators; `platform` narrows the listing.
    pub fn info(
        &self,
        limiter: &RateLimiter,
        app_id: Option<&str>,
        platform: Option<Platform>,
    ) -> DataSourcesInfo {
        let mut listed: Vec<&DataSourceDescriptor> = self
            .sources
            .iter()
            .filter(|s| platform.is_none_or(|p| s.platform.covers(p)))
            .collect();
        listed.sort_by_key(|s| s.priority);

        let mut info = DataSourcesInfo {
            app_id: app_id.map(str::to_string),
            platform,
            available: Vec::new(),
            quality: BTreeMap::new(),
            costs: BTreeMap::new(),
            status: BTreeMap::new(),
            remaining_calls: BTreeMap::new(),
        };

        for s in listed {
            let remaining = limiter.remaining(&s.name);
            let status = if !s.available {
                SourceStatus::Unavailable
            } else if remaining == Some(0) {
                SourceStatus::RateLimited
            } else {
                SourceStatus::Available
            };
            if status == SourceStatus::Available {
                info.available.push(s.name.clone());
            }
            info.quality.insert(s.name.clone(), s.quality);
            let cost = match (&s.cost_per_call, s.free) {
                (Some(c), _) => c.clone(),
                (None, true) => "free".to_string(),
                (None, false) => "paid".to_string(),
            };
            info.costs.insert(s.name.clone(), cost);
            info.status.insert(s.name.clone(), status);
            if let Some(r) = remaining {
                info.remaining_calls.insert(s.name.clone(), r);
            }
        }
        info
    }

    /// Built-in catalog used when no file is configured.
    pub fn default_seed() -> Self {
        let mk = |name: &str,
                  platform: SourcePlatform,
                  free: bool,
                  priority: u32,
                  quality: f32,
                  credential_env: Option<&str>,
                  rate: Option<(u32, u64)>,
                  cost: Option<&str>| DataSourceDescriptor {
            name: name.to_string(),
            platform,
            free,
            priority,
            quality,
            available: true,
            credential_env: credential_env.map(str::to_string),
            rate_limit: rate.map(|(requests, period_secs)| RateLimitRule {
                requests,
                period_secs,
            }),
            cost_per_call: cost.map(str::to_string),
        };

        Self::new(vec![
            mk(
                "app_store_connect",
                SourcePlatform::Ios,
                true,
                0,
                0.95,
                Some("APP_STORE_CONNECT_KEY"),
                Some((300, 3600)),
                None,
            ),
            mk(
                "app_store_rss",
                SourcePlatform::Ios,
                true,
                1,
                0.80,
                None,
                Some((60, 60)),
                None,
            ),
            mk(
                "google_play_developer_api",
                SourcePlatform::Android,
                true,
                0,
                0.95,
                Some("GOOGLE_PLAY_SERVICE_ACCOUNT"),
                Some((200, 3600)),
                None,
            ),
            mk(
                "google_play_scraper",
                SourcePlatform::Android,
                true,
                1,
                0.75,
                None,
                Some((30, 60)),
                None,
            ),
            mk(
                "review_aggregator_api",
                SourcePlatform::Both,
                false,
                5,
                0.65,
                Some("REVIEW_AGGREGATOR_API_KEY"),
                Some((1000, 86_400)),
                Some("$0.002/call"),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, platform: SourcePlatform, priority: u32) -> DataSourceDescriptor {
        DataSourceDescriptor {
            name: name.into(),
            platform,
            free: true,
            priority,
            quality: 0.7,
            available: true,
            credential_env: None,
            rate_limit: None,
            cost_per_call: None,
        }
    }

    #[test]
    fn filters_by_platform_and_sorts_by_priority() {
        let reg = SourceRegistry::with_env_lookup(
            vec![
                desc("b", SourcePlatform::Ios, 3),
                desc("a", SourcePlatform::Both, 1),
                desc("droid", SourcePlatform::Android, 0),
            ],
            |_| None,
        );
        let names: Vec<_> = reg
            .available_sources(Platform::Ios)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn missing_credentials_exclude_silently() {
        let mut paid = desc("paid", SourcePlatform::Ios, 0);
        paid.credential_env = Some("PAID_KEY".into());
        let reg = SourceRegistry::with_env_lookup(vec![paid.clone()], |_| None);
        assert!(reg.available_sources(Platform::Ios).is_empty());

        let reg = SourceRegistry::with_env_lookup(vec![paid], |k| {
            (k == "PAID_KEY").then(|| "secret".to_string())
        });
        assert_eq!(reg.available_sources(Platform::Ios).len(), 1);
    }

    #[test]
    fn parses_toml_catalog() {
        let toml = r#"
            [[sources]]
            name = "rss"
            platform = "ios"
            priority = 2
            quality = 1.7
            rate_limit = { requests = 10, period_secs = 60 }

            [[sources]]
            name = "off"
            platform = "both"
            available = false
        "#;
        let reg = SourceRegistry::from_toml_str(toml).unwrap();
        assert_eq!(reg.all().len(), 2);
        assert_eq!(reg.get("rss").unwrap().quality, 1.0);
        assert_eq!(reg.rate_limit_rules().len(), 1);
        assert_eq!(reg.available_sources(Platform::Android).len(), 0);
    }

    #[test]
    fn info_reports_status_and_costs() {
        let mut limited = desc("limited", SourcePlatform::Ios, 1);
        limited.rate_limit = Some(RateLimitRule {
            requests: 1,
            period_secs: 3600,
        });
        let mut off = desc("off", SourcePlatform::Ios, 2);
        off.available = false;
        off.free = false;
        let reg = SourceRegistry::with_env_lookup(
            vec![desc("open", SourcePlatform::Ios, 0), limited, off],
            |_| None,
        );
        let rl = RateLimiter::new(reg.rate_limit_rules());
        rl.increment("limited");

        let info = reg.info(&rl, Some("123"), Some(Platform::Ios));
        assert_eq!(info.available, vec!["open".to_string()]);
        assert_eq!(info.status["limited"], SourceStatus::RateLimited);
        assert_eq!(info.status["off"], SourceStatus::Unavailable);
        assert_eq!(info.costs["off"], "paid");
        assert_eq!(info.costs["open"], "free");
        assert_eq!(info.remaining_calls["limited"], 0);
    }

    #[test]
    fn seed_has_free_fallback_per_platform() {
        let reg = SourceRegistry::with_env_lookup(SourceRegistry::default_seed().all().to_vec(), |_| None);
        assert_eq!(reg.available_sources(Platform::Ios)[0].name, "app_store_rss");
        assert_eq!(reg.available_sources(Platform::Android)[0].name, "google_play_scraper");
    }
}
