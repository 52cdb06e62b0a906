//! Append-only event log with per-stream and global ordering.
//!
//! The store also owns everything that must commit atomically with an
//! append: inline read documents and outbox markers for published events.
//! Background projections keep their checkpoints and leases here too.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{CAUSATION_ID, EventEnvelope, EventId, GlobalSequence, NewEvent, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{
    AppendBatch, AppendOptions, AppendResult, DocumentWrite, EventStore, EventStoreExt,
    EventStream, InlineProjection, OutboxMessage, OutboxStatus, ProjectionCommit,
    ProjectionOutput, stream_global, validate_batch,
};
