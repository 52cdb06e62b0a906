//! Dashboard summary endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use projections::DashboardStatistics;

use crate::AppState;
use crate::error::ApiError;

/// GET /api/dashboard: Totals maintained by the aggregation daemon.
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<DashboardStatistics>, ApiError> {
    Ok(Json(state.read.dashboard().await?))
}
