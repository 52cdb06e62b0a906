//! Domain error types.

use common::AggregateId;
use event_store::{EventStoreError, Version};
use thiserror::Error;

/// A rejected command whose resubmission with the same input would fail again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusinessRuleViolation {
    /// The opposing party is a client, or the client is adverse in another matter.
    #[error("Conflict of interest: {party} {reason}")]
    ConflictOfInterest { party: String, reason: &'static str },

    /// A client with this name is already registered.
    #[error("A client named '{name}' already exists")]
    DuplicateClientName { name: String },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The stream moved on since the caller read it; reload and retry.
    #[error("Concurrency conflict on {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        stream_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The referenced stream or read document does not exist.
    #[error("{aggregate_type} not found: {id}")]
    NotFound {
        aggregate_type: &'static str,
        id: AggregateId,
    },

    /// The command breaks a business rule.
    #[error(transparent)]
    BusinessRule(#[from] BusinessRuleViolation),

    /// An identical matter exists; resubmit with confirmation to proceed.
    #[error("A matter with identical client, opposing party, type and amount already exists: {existing_matter_id}")]
    DuplicateWarning { existing_matter_id: AggregateId },

    /// The command input is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true when retrying after a reload may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::ConcurrencyConflict { .. })
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }
}

impl From<EventStoreError> for DomainError {
    fn from(e: EventStoreError) -> Self {
        match e {
            EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            } => DomainError::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            },
            EventStoreError::Serialization(e) => DomainError::Serialization(e),
            other => DomainError::EventStore(other),
        }
    }
}
