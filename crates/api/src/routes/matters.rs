//! Intake, matter lifecycle and matter query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use domain::{
    Aggregate, AssignAttorney, AttorneyId, CaseType, Matter, MatterStatus, Money, OpenMatter,
    RecordSettlementOffer, UpdateStatus,
};
use event_store::{EventEnvelope, EventStore, Version};
use projections::{MatterDetails, MatterQuery, Page, SortDirection, SortField};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::parse_aggregate_id;

// -- Request types --

/// Amounts are integer cents.
#[derive(Deserialize)]
pub struct IntakeRequest {
    pub client_id: String,
    pub opposing_party: String,
    pub case_type: CaseType,
    pub initial_claim_amount: Money,
    #[serde(default)]
    pub confirm_duplicate: bool,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub new_status: MatterStatus,
    #[serde(default)]
    pub reason: String,
    /// Version the caller last saw; defaults to the read document's.
    pub expected_version: Option<i64>,
}

#[derive(Deserialize)]
pub struct AssignAttorneyRequest {
    pub attorney_id: uuid::Uuid,
}

#[derive(Deserialize)]
pub struct SettlementOfferRequest {
    pub amount: Money,
}

#[derive(Debug, Default, Deserialize)]
pub struct MatterListParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub status: Option<String>,
    pub high_priority: Option<bool>,
}

impl MatterListParams {
    fn into_query(self) -> Result<MatterQuery, ApiError> {
        let defaults = MatterQuery::default();
        let mut query = MatterQuery::default()
            .page(self.page.unwrap_or(defaults.page))
            .page_size(self.page_size.unwrap_or(defaults.page_size))
            .sort_by(
                self.sort.as_deref().map(SortField::parse).unwrap_or_default(),
                self.direction
                    .as_deref()
                    .map(SortDirection::parse)
                    .unwrap_or_default(),
            );
        if let Some(status) = self.status {
            query = query.with_status(status.parse().map_err(ApiError::BadRequest)?);
        }
        if let Some(flag) = self.high_priority {
            query = query.high_priority(flag);
        }
        Ok(query)
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct MatterOpenedResponse {
    pub matter_id: String,
    pub is_high_priority: bool,
    pub version: i64,
}

#[derive(Serialize)]
pub struct StatusChangedResponse {
    pub matter_id: String,
    pub version: i64,
    pub event: EventEnvelope,
}

#[derive(Serialize)]
pub struct MatterCommandResponse {
    pub matter_id: String,
    pub status: MatterStatus,
    pub version: i64,
}

impl MatterCommandResponse {
    fn from_matter(matter: &Matter) -> Self {
        Self {
            matter_id: matter.id().map(|id| id.to_string()).unwrap_or_default(),
            status: matter.status(),
            version: matter.version().as_i64(),
        }
    }
}

// -- Handlers --

/// POST /api/intake: Open a matter after conflict and duplicate checks.
#[tracing::instrument(skip(state, req))]
pub async fn intake<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<IntakeRequest>,
) -> Result<(StatusCode, Json<MatterOpenedResponse>), ApiError> {
    let client_id = parse_aggregate_id(&req.client_id)?;
    let mut cmd = OpenMatter::new(
        client_id,
        req.opposing_party,
        req.case_type,
        req.initial_claim_amount,
    );
    if req.confirm_duplicate {
        cmd = cmd.confirm_duplicate();
    }
    let matter_id = cmd.matter_id;

    let result = state.matters.open_matter(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(MatterOpenedResponse {
            matter_id: matter_id.to_string(),
            is_high_priority: result.aggregate.is_high_priority(),
            version: result.aggregate.version().as_i64(),
        }),
    ))
}

/// GET /api/matters: Filtered, sorted, paged matter list.
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<MatterListParams>,
) -> Result<Json<Page<MatterDetails>>, ApiError> {
    let query = params.into_query()?;
    Ok(Json(state.read.matters(&query).await?))
}

/// GET /api/matters/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<MatterDetails>, ApiError> {
    let matter_id = parse_aggregate_id(&id)?;
    state
        .read
        .matter(matter_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Matter {id} not found")))
}

/// GET /api/matters/{id}/history: The matter's raw events, oldest first.
#[tracing::instrument(skip(state))]
pub async fn history<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelope>>, ApiError> {
    let matter_id = parse_aggregate_id(&id)?;
    let events = state.read.history(matter_id).await?;
    if events.is_empty() {
        return Err(ApiError::NotFound(format!("Matter {id} not found")));
    }
    Ok(Json(events))
}

/// POST /api/matters/{id}/status: Record a published status change.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<(StatusCode, Json<StatusChangedResponse>), ApiError> {
    let matter_id = parse_aggregate_id(&id)?;
    let mut cmd = UpdateStatus::new(matter_id, req.new_status, req.reason);
    if let Some(version) = req.expected_version {
        cmd = cmd.expecting(Version::new(version));
    }

    let (version, mut envelopes) = state.matters.update_status(cmd).await?;
    let event = envelopes
        .pop()
        .ok_or_else(|| ApiError::NotFound(format!("Matter {id} not found")))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StatusChangedResponse {
            matter_id: matter_id.to_string(),
            version: version.as_i64(),
            event,
        }),
    ))
}

/// POST /api/matters/{id}/attorney
#[tracing::instrument(skip(state, req))]
pub async fn assign_attorney<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AssignAttorneyRequest>,
) -> Result<Json<MatterCommandResponse>, ApiError> {
    let matter_id = parse_aggregate_id(&id)?;
    let result = state
        .matters
        .assign_attorney(AssignAttorney::new(
            matter_id,
            AttorneyId::from_uuid(req.attorney_id),
        ))
        .await?;
    Ok(Json(MatterCommandResponse::from_matter(&result.aggregate)))
}

/// POST /api/matters/{id}/settlement-offers: Amount in cents.
#[tracing::instrument(skip(state, req))]
pub async fn record_settlement_offer<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<SettlementOfferRequest>,
) -> Result<(StatusCode, Json<MatterCommandResponse>), ApiError> {
    let matter_id = parse_aggregate_id(&id)?;
    let result = state
        .matters
        .record_settlement_offer(RecordSettlementOffer::new(matter_id, req.amount))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MatterCommandResponse::from_matter(&result.aggregate)),
    ))
}
