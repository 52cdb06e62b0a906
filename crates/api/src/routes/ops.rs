//! Operational endpoints: liveness with outbox state, and Prometheus metrics.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::AppState;

/// Pending outbox messages counted per health check.
const OUTBOX_SAMPLE: usize = 1000;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when messages were dead-lettered or the store failed.
    pub status: &'static str,
    pub pending_outbox: Option<usize>,
    pub dead_letters: Option<usize>,
}

/// GET /health
pub async fn health<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let pending = state.store.pending_outbox(OUTBOX_SAMPLE).await;
    let dead = state.store.dead_letters().await;
    if let Err(e) = pending.as_ref().and(dead.as_ref()) {
        tracing::warn!(error = %e, "health check could not read the outbox");
    }

    let pending_outbox = pending.ok().map(|m| m.len());
    let dead_letters = dead.ok().map(|m| m.len());
    let status = match (pending_outbox, dead_letters) {
        (Some(_), Some(0)) => "ok",
        _ => "degraded",
    };
    Json(HealthResponse {
        status,
        pending_outbox,
        dead_letters,
    })
}

/// GET /metrics
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
