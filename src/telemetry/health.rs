//! Minimal axum router exposing `/health` and `/metrics` for process
//! supervision — ambient observability surface, not a dashboard.

use std::sync::Arc;

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::middleware::request_logging_simple;
use crate::telemetry::MetricsRegistry;

#[derive(Clone)]
pub struct HealthState {
    pub metrics: Arc<MetricsRegistry>,
    pub prometheus: PrometheusHandle,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    uptime_secs: u64,
    error_rate_per_min: f64,
    markets_tracked: u64,
    signals_generated: u64,
    anomalies_detected: u64,
    alerts_sent: u64,
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let counters = state.metrics.business_counters();
    let error_rate = state.metrics.error_rate_per_min();
    let status = if error_rate >= 20.0 { "critical" } else if error_rate >= 5.0 { "degraded" } else { "ok" };

    Json(HealthBody {
        status,
        uptime_secs: state.metrics.uptime_secs(),
        error_rate_per_min: error_rate,
        markets_tracked: counters.markets_tracked,
        signals_generated: counters.signals_generated,
        anomalies_detected: counters.anomalies_detected,
        alerts_sent: counters.alerts_sent,
    })
}

async fn metrics_text(State(state): State<HealthState>) -> impl IntoResponse {
    state.prometheus.render()
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route_layer(middleware::from_fn(request_logging_simple))
        .with_state(state)
}
