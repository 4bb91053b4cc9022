// src/metrics.rs
//! Prometheus recorder and the `/metrics` route.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// One-time metric descriptions (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_runs_total", "collect() invocations.");
        describe_counter!(
            "collect_phase_candidates_total",
            "Raw candidates produced per phase."
        );
        describe_counter!(
            "collect_phase_errors_total",
            "Phases that failed or timed out."
        );
        describe_counter!("dedup_exact_total", "Candidates rejected as exact duplicates.");
        describe_counter!(
            "dedup_near_rejected_total",
            "Candidates rejected as near duplicates."
        );
        describe_counter!(
            "dedup_allowance_total",
            "Near duplicates admitted through the diversity allowance."
        );
        describe_gauge!("collect_last_run_ts", "Unix ts when collect() last ran.");
    });
}

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder. Later calls reuse it.
    pub fn init() -> Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("installing prometheus recorder")
            })?
            .clone();
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus text format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
