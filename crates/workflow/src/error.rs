//! Workflow error types.

use domain::DomainError;
use event_store::{EventId, EventStoreError};
use thiserror::Error;

/// Errors that can occur while reacting to published events.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A handler gave up on an event.
    #[error("Workflow '{workflow}' failed: {reason}")]
    HandlerFailed { workflow: String, reason: String },

    /// Every delivery attempt for an event failed.
    #[error("Delivery of event {event_id} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        event_id: EventId,
        attempts: u32,
        last_error: String,
    },

    /// The external notification channel failed.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// A delivery task ended without reporting an outcome.
    #[error("Delivery task failed: {0}")]
    TaskFailed(String),

    /// The relay was shut down while waiting for a delivery slot.
    #[error("Outbox relay is closed")]
    RelayClosed,

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Event store error.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// True for optimistic concurrency failures.
    pub fn is_conflict(&self) -> bool {
        match self {
            WorkflowError::EventStore(e) => e.is_conflict(),
            WorkflowError::Domain(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience type alias for workflow results.
pub type Result<T> = std::result::Result<T, WorkflowError>;
