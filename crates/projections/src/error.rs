//! Projection error types.

use event_store::EventStoreError;
use thiserror::Error;

/// Errors raised while folding events into read documents or querying them.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// An event payload or stored document did not match its type.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A projection refused to fold an event.
    #[error("Projection '{projection}' cannot fold {event_type}: {reason}")]
    Fold {
        projection: &'static str,
        event_type: String,
        reason: String,
    },
}

impl ProjectionError {
    /// True when another writer committed the projection first.
    pub fn is_checkpoint_conflict(&self) -> bool {
        matches!(
            self,
            ProjectionError::EventStore(EventStoreError::CheckpointConflict { .. })
        )
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
