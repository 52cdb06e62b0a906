use thiserror::Error;

use crate::{AggregateId, GlobalSequence, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream's current version did not match the caller's expectation.
    #[error(
        "Concurrency conflict for stream {stream_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        stream_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// Another writer advanced the projection checkpoint first.
    #[error(
        "Checkpoint conflict for projection {projection}: expected {expected}, found {actual}"
    )]
    CheckpointConflict {
        projection: String,
        expected: GlobalSequence,
        actual: GlobalSequence,
    },

    /// The append batch was rejected before touching storage.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// An inline projection failed; the append was rolled back.
    #[error("Projection {projection} failed: {message}")]
    Projection { projection: String, message: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Returns true for optimistic-concurrency failures a caller may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EventStoreError::ConcurrencyConflict { .. } | EventStoreError::CheckpointConflict { .. }
        )
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
