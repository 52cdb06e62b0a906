//! Client registration and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::RegisterClient;
use event_store::EventStore;
use projections::ClientDetails;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::parse_aggregate_id;

#[derive(Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct ClientCreatedResponse {
    pub client_id: String,
    pub name: String,
}

/// POST /api/clients: Register a client under a unique name.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<ClientCreatedResponse>), ApiError> {
    let cmd = RegisterClient::new(req.name);
    let client_id = cmd.client_id;
    let result = state.clients.register(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(ClientCreatedResponse {
            client_id: client_id.to_string(),
            name: result.aggregate.name().to_string(),
        }),
    ))
}

/// GET /api/clients: All clients ordered by name.
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ClientDetails>>, ApiError> {
    Ok(Json(state.read.clients().await?))
}

/// GET /api/clients/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ClientDetails>, ApiError> {
    let client_id = parse_aggregate_id(&id)?;
    state
        .read
        .client(client_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Client {id} not found")))
}
