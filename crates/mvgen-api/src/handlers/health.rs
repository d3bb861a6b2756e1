//! Liveness and readiness probes.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Process is up.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Ready once the queue backend answers; submissions and status queries both need it.
pub async fn ready(State(state): State<AppState>) -> Response {
    let started = Instant::now();

    match state.orchestrator.ping().await {
        Ok(()) => Json(json!({
            "status": "ready",
            "checks": {
                "redis": {"status": "ok", "latency_ms": started.elapsed().as_millis() as u64}
            }
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "checks": {"redis": {"status": "error", "error": e.to_string()}}
                })),
            )
                .into_response()
        }
    }
}
