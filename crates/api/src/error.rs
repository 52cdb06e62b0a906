//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use projections::ProjectionError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Command rejected or failed in the domain.
    Domain(DomainError),
    /// Read model failure.
    Projection(ProjectionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            ApiError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => return domain_error_to_response(err),
            ApiError::Projection(err) => {
                tracing::error!(error = %err, "read model failure");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        body.into_response()
    }
}

fn error_body(status: StatusCode, message: String) -> (StatusCode, axum::Json<serde_json::Value>) {
    (status, axum::Json(serde_json::json!({ "error": message })))
}

fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match err {
        DomainError::DuplicateWarning { existing_matter_id } => (
            StatusCode::CONFLICT,
            axum::Json(serde_json::json!({
                "error": message,
                "type": "duplicate",
                "existing_matter_id": existing_matter_id,
            })),
        )
            .into_response(),
        DomainError::ConcurrencyConflict { .. } | DomainError::BusinessRule(_) => {
            error_body(StatusCode::CONFLICT, message).into_response()
        }
        DomainError::NotFound { .. } => error_body(StatusCode::NOT_FOUND, message).into_response(),
        DomainError::Validation(_) => error_body(StatusCode::BAD_REQUEST, message).into_response(),
        DomainError::EventStore(_) | DomainError::Serialization(_) => {
            tracing::error!(error = %message, "internal server error");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;
    use domain::BusinessRuleViolation;
    use event_store::Version;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn domain_errors_map_to_status_codes() {
        let id = AggregateId::new();
        assert_eq!(
            status_of(DomainError::ConcurrencyConflict {
                stream_id: id,
                expected: Version::new(1),
                actual: Version::new(2),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::from(BusinessRuleViolation::DuplicateClientName {
                name: "Acme".to_string(),
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::DuplicateWarning {
                existing_matter_id: id
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::NotFound {
                aggregate_type: "Matter",
                id
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::validation("bad amount")),
            StatusCode::BAD_REQUEST
        );
    }
}
