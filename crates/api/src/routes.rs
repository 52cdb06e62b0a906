//! HTTP route handlers.

pub mod clients;
pub mod dashboard;
pub mod matters;
pub mod ops;

use common::AggregateId;

use crate::error::ApiError;

pub(crate) fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    id.parse::<AggregateId>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
