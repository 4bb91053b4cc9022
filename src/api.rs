// src/api.rs
//! Operator-facing HTTP surface: health and source introspection.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::orchestrator::Collector;
use crate::types::Platform;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
}

impl AppState {
    pub fn new(collector: Collector) -> Self {
        Self {
            collector: Arc::new(collector),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/sources", get(sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SourcesQuery {
    app_id: Option<String>,
    platform: Option<String>,
}

async fn sources(State(state): State<AppState>, Query(q): Query<SourcesQuery>) -> Response {
    let platform = match q.platform.as_deref().filter(|p| !p.is_empty()) {
        None => None,
        Some(raw) => match Platform::parse(raw) {
            Some(p) => Some(p),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("unknown platform: {raw}"),
                )
                    .into_response()
            }
        },
    };
    debug!(target: "api", app_id = ?q.app_id, ?platform, "sources requested");
    let info = state
        .collector
        .data_sources_info(q.app_id.as_deref(), platform);
    Json(info).into_response()
}
