// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod api;
pub mod backoff;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod orchestrator;
pub mod quality;
pub mod rate_limit;
pub mod registry;
pub mod state;
pub mod store;
pub mod strategy;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::ScrapeConfig;
pub use crate::error::{CollectError, StoreError};
pub use crate::orchestrator::{Collector, CollectorBuilder};
pub use crate::types::{Platform, ReviewCandidate, ScrapeResult, Strategy};

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tracing::info;

use crate::registry::SourceRegistry;
use crate::store::MemoryStore;

/// Full in-process app: introspection routes plus `/metrics`.
///
/// The catalog is resolved from `$HARVEST_SOURCES_PATH` or
/// `config/sources.toml`; the collector starts with an in-memory store.
pub async fn app() -> Result<Router> {
    let registry = Arc::new(SourceRegistry::load_default());
    info!(target: "api", sources = registry.all().len(), "source catalog loaded");
    let collector = Collector::builder(registry, Arc::new(MemoryStore::new())).build();
    let metrics = crate::metrics::Metrics::init()?;
    Ok(router(AppState::new(collector)).merge(metrics.router()))
}
