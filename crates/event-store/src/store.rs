use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, GlobalSequence, NewEvent, Result,
    Version,
};

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected version of the stream for optimistic concurrency control.
    /// If None, no version check is performed (use with caution).
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stream to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the stream to not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Events destined for a single stream, committed as one unit.
#[derive(Debug, Clone)]
pub struct AppendBatch {
    pub stream_id: AggregateId,
    pub stream_type: String,
    pub events: Vec<NewEvent>,
}

impl AppendBatch {
    pub fn new(stream_id: AggregateId, stream_type: impl Into<String>) -> Self {
        Self {
            stream_id,
            stream_type: stream_type.into(),
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: NewEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = NewEvent>) -> Self {
        self.events.extend(events);
        self
    }
}

/// Outcome of a successful append.
#[derive(Debug, Clone)]
pub struct AppendResult {
    /// Version of the stream after the append.
    pub new_version: Version,
    /// The committed envelopes, in stream order.
    pub events: Vec<EventEnvelope>,
}

/// Output of an inline projection for one event.
///
/// `Ok(None)` leaves the document untouched.
pub type ProjectionOutput =
    std::result::Result<Option<serde_json::Value>, Box<dyn std::error::Error + Send + Sync>>;

/// A read model maintained inside the append transaction.
///
/// Each stream has at most one document per collection, keyed by the
/// stream id. The store calls `project` for every appended event, threading
/// the document through the batch; an error aborts the whole append.
pub trait InlineProjection: Send + Sync {
    /// Name used in error reports.
    fn name(&self) -> &str;

    /// Collection the documents are stored under.
    fn collection(&self) -> &str;

    /// Computes the next document for `event` given the current one.
    fn project(&self, current: Option<&serde_json::Value>, event: &EventEnvelope)
    -> ProjectionOutput;
}

/// A document replacement written by an asynchronous projection.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub collection: String,
    pub id: Uuid,
    pub body: serde_json::Value,
}

/// Documents plus checkpoint, committed atomically by a background projection.
#[derive(Debug, Clone)]
pub struct ProjectionCommit {
    pub projection: String,
    /// Checkpoint the writer read before processing; compared-and-swapped.
    pub expected: GlobalSequence,
    /// Global sequence of the last event folded into `documents`.
    pub checkpoint: GlobalSequence,
    pub documents: Vec<DocumentWrite>,
}

/// Delivery state of an outbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    Delivered,
    DeadLettered,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "Pending",
            OutboxStatus::Delivered => "Delivered",
            OutboxStatus::DeadLettered => "DeadLettered",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Pending" => Some(OutboxStatus::Pending),
            "Delivered" => Some(OutboxStatus::Delivered),
            "DeadLettered" => Some(OutboxStatus::DeadLettered),
            _ => None,
        }
    }
}

/// A published event awaiting (or done with) delivery to workflows.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub envelope: EventEnvelope,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxMessage {
    pub(crate) fn pending(envelope: EventEnvelope) -> Self {
        Self {
            envelope,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.envelope.event_id
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for event store implementations.
///
/// Besides the event log itself, a store owns the tables that must change
/// in the same transaction as an append (inline documents and the outbox)
/// and the progress records of background projections.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events to one stream.
    ///
    /// Events are appended atomically - either all succeed or none do.
    /// If `options.expected_version` is set, the operation fails with
    /// `ConcurrencyConflict` when the current version doesn't match.
    /// Inline projections and outbox markers commit with the events.
    async fn append(&self, batch: AppendBatch, options: AppendOptions) -> Result<AppendResult>;

    /// Retrieves all events of a stream in version order.
    ///
    /// Returns an empty list for an unknown stream.
    async fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Retrieves up to `limit` events with a global sequence greater than
    /// `after`, in global order.
    async fn read_global(&self, after: GlobalSequence, limit: usize)
    -> Result<Vec<EventEnvelope>>;

    /// Gets the current version of a stream, or None if it doesn't exist.
    async fn stream_version(&self, stream_id: AggregateId) -> Result<Option<Version>>;

    /// Loads a document by collection and id.
    async fn load_document(&self, collection: &str, id: Uuid) -> Result<Option<serde_json::Value>>;

    /// Lists every document of a collection.
    async fn list_documents(&self, collection: &str) -> Result<Vec<serde_json::Value>>;

    /// Returns the last global sequence a projection has committed.
    ///
    /// `GlobalSequence::start()` if it has never committed.
    async fn load_checkpoint(&self, projection: &str) -> Result<GlobalSequence>;

    /// Writes documents and advances the checkpoint in one transaction.
    ///
    /// Fails with `CheckpointConflict` if the stored checkpoint differs from
    /// `commit.expected`.
    async fn commit_projection(&self, commit: ProjectionCommit) -> Result<()>;

    /// Acquires or renews the lease on `projection` for `owner`.
    ///
    /// Returns false while another owner holds an unexpired lease.
    async fn try_acquire_lease(&self, projection: &str, owner: &str, ttl: Duration)
    -> Result<bool>;

    /// Releases a lease if `owner` still holds it.
    async fn release_lease(&self, projection: &str, owner: &str) -> Result<()>;

    /// Returns up to `limit` pending outbox messages in global order.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>>;

    /// Marks a message delivered.
    async fn ack_outbox(&self, event_id: EventId) -> Result<()>;

    /// Adds `attempts` failed deliveries to a message and returns its total.
    async fn record_outbox_attempt(
        &self,
        event_id: EventId,
        attempts: u32,
        error: &str,
    ) -> Result<u32>;

    /// Moves a message to the dead-letter state.
    async fn dead_letter_outbox(&self, event_id: EventId, reason: &str) -> Result<()>;

    /// Lists dead-lettered messages.
    async fn dead_letters(&self) -> Result<Vec<OutboxMessage>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if a stream exists (has any events).
    async fn stream_exists(&self, stream_id: AggregateId) -> Result<bool> {
        Ok(self.stream_version(stream_id).await?.is_some())
    }

    /// Loads a document and deserializes it.
    async fn load_typed<T>(&self, collection: &str, id: Uuid) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        match self.load_document(collection, id).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Streams the global log from `after`, fetching `page_size` events at a time.
///
/// The stream ends at the current head of the log.
pub fn stream_global<S>(store: S, after: GlobalSequence, page_size: usize) -> EventStream
where
    S: std::ops::Deref + Send + Sync + 'static,
    S::Target: EventStore,
{
    use futures_util::{StreamExt, stream};

    let page_size = page_size.max(1);
    let pages = stream::unfold((store, Some(after)), move |(store, cursor)| async move {
        let after = cursor?;
        match store.read_global(after, page_size).await {
            Ok(events) if events.is_empty() => None,
            Ok(events) => {
                let next = events
                    .last()
                    .map(|event| event.global_sequence)
                    .filter(|_| events.len() == page_size);
                let page = stream::iter(events.into_iter().map(Ok)).left_stream();
                Some((page, (store, next)))
            }
            Err(error) => {
                let page = stream::once(async move { Err(error) }).right_stream();
                Some((page, (store, None)))
            }
        }
    });

    Box::pin(pages.flatten())
}

/// Rejects batches that can never be committed.
pub fn validate_batch(batch: &AppendBatch) -> Result<()> {
    if batch.events.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    }
    if batch.stream_type.trim().is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "stream type is required".to_string(),
        ));
    }
    if let Some(event) = batch.events.iter().find(|e| e.event_type.trim().is_empty()) {
        return Err(EventStoreError::InvalidAppend(format!(
            "event {} has no event type",
            event.event_id
        )));
    }
    Ok(())
}

/// Rejects an append to an existing stream of a different kind.
pub(crate) fn check_stream_type(
    stream_id: AggregateId,
    existing: &str,
    requested: &str,
) -> Result<()> {
    if existing != requested {
        return Err(EventStoreError::InvalidAppend(format!(
            "stream {stream_id} is a {existing} stream, cannot append {requested} events"
        )));
    }
    Ok(())
}
