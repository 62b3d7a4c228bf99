//! Health and Prometheus endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

/// State of the operational endpoints.
#[derive(Clone)]
pub struct OpsState {
    pub metrics: PrometheusHandle,

    /// `postgres` or `memory`.
    pub storage: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health(State(ops): State<OpsState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        storage: ops.storage,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /metrics: Prometheus text exposition.
pub async fn metrics(State(ops): State<OpsState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        ops.metrics.render(),
    )
}
