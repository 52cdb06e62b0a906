use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, GlobalSequence, Result, Version,
    store::{
        AppendBatch, AppendOptions, AppendResult, EventStore, InlineProjection, OutboxMessage,
        OutboxStatus, ProjectionCommit, check_stream_type, validate_batch,
    },
};

struct StreamEntry {
    stream_type: String,
    /// Indexes into `State::events`, in version order.
    positions: Vec<usize>,
}

impl StreamEntry {
    fn version(&self) -> Version {
        Version::new(self.positions.len() as i64)
    }
}

struct Lease {
    owner: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    /// The global log; the event at index `i` has global sequence `i + 1`.
    events: Vec<EventEnvelope>,
    streams: HashMap<AggregateId, StreamEntry>,
    documents: HashMap<String, BTreeMap<Uuid, serde_json::Value>>,
    outbox: Vec<OutboxMessage>,
    checkpoints: HashMap<String, GlobalSequence>,
    leases: HashMap<String, Lease>,
}

impl State {
    fn document(&self, collection: &str, id: Uuid) -> Option<&serde_json::Value> {
        self.documents.get(collection).and_then(|docs| docs.get(&id))
    }

    fn outbox_entry(&mut self, event_id: EventId) -> Option<&mut OutboxMessage> {
        self.outbox.iter_mut().find(|m| m.envelope.event_id == event_id)
    }
}

/// In-memory event store for tests and local runs.
///
/// All tables live behind one `RwLock`. Every mutation is computed
/// synchronously while the write guard is held, so a cancelled append
/// never leaves a partial commit.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<State>>,
    inline: Vec<Arc<dyn InlineProjection>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a projection to run inside every append.
    pub fn with_inline_projection<P>(mut self, projection: P) -> Self
    where
        P: InlineProjection + 'static,
    {
        self.inline.push(Arc::new(projection));
        self
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Returns every outbox message regardless of status.
    pub async fn outbox(&self) -> Vec<OutboxMessage> {
        self.state.read().await.outbox.clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self, batch), fields(stream_id = %batch.stream_id, count = batch.events.len()))]
    async fn append(&self, batch: AppendBatch, options: AppendOptions) -> Result<AppendResult> {
        validate_batch(&batch)?;
        let AppendBatch {
            stream_id,
            stream_type,
            events,
        } = batch;

        let mut state = self.state.write().await;

        let current_version = match state.streams.get(&stream_id) {
            Some(entry) => {
                check_stream_type(stream_id, &entry.stream_type, &stream_type)?;
                entry.version()
            }
            None => Version::initial(),
        };

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual: current_version,
            });
        }

        let mut version = current_version;
        let mut sequence = GlobalSequence::new(state.events.len() as i64);
        let mut publish = Vec::with_capacity(events.len());
        let envelopes: Vec<EventEnvelope> = events
            .into_iter()
            .map(|event| {
                version = version.next();
                sequence = sequence.next();
                publish.push(event.publish);
                event.into_envelope(stream_id, &stream_type, version, sequence)
            })
            .collect();

        // Stage document changes first; nothing is written if one fails.
        let mut staged: Vec<(String, serde_json::Value)> = Vec::new();
        for projection in &self.inline {
            let collection = projection.collection();
            let mut current = state.document(collection, stream_id.as_uuid()).cloned();
            let mut changed = false;
            for envelope in &envelopes {
                let next = projection
                    .project(current.as_ref(), envelope)
                    .map_err(|e| EventStoreError::Projection {
                        projection: projection.name().to_string(),
                        message: e.to_string(),
                    })?;
                if let Some(document) = next {
                    current = Some(document);
                    changed = true;
                }
            }
            if changed && let Some(document) = current {
                staged.push((collection.to_string(), document));
            }
        }

        for (collection, document) in staged {
            state
                .documents
                .entry(collection)
                .or_default()
                .insert(stream_id.as_uuid(), document);
        }

        let first_position = state.events.len();
        for (envelope, publish) in envelopes.iter().zip(publish) {
            if publish {
                state.outbox.push(OutboxMessage::pending(envelope.clone()));
            }
        }
        state.events.extend(envelopes.iter().cloned());
        let positions = first_position..state.events.len();
        state
            .streams
            .entry(stream_id)
            .or_insert_with(|| StreamEntry {
                stream_type: stream_type.clone(),
                positions: Vec::new(),
            })
            .positions
            .extend(positions);

        metrics::counter!("events_appended_total").increment(envelopes.len() as u64);
        tracing::debug!(new_version = %version, "appended events");

        Ok(AppendResult {
            new_version: version,
            events: envelopes,
        })
    }

    async fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        let events = state
            .streams
            .get(&stream_id)
            .map(|entry| {
                entry
                    .positions
                    .iter()
                    .map(|&position| state.events[position].clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    async fn read_global(
        &self,
        after: GlobalSequence,
        limit: usize,
    ) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        let start = after.as_i64().max(0) as usize;
        Ok(state.events.iter().skip(start).take(limit).cloned().collect())
    }

    async fn stream_version(&self, stream_id: AggregateId) -> Result<Option<Version>> {
        let state = self.state.read().await;
        Ok(state.streams.get(&stream_id).map(StreamEntry::version))
    }

    async fn load_document(&self, collection: &str, id: Uuid) -> Result<Option<serde_json::Value>> {
        let state = self.state.read().await;
        Ok(state.document(collection, id).cloned())
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn load_checkpoint(&self, projection: &str) -> Result<GlobalSequence> {
        let state = self.state.read().await;
        Ok(state
            .checkpoints
            .get(projection)
            .copied()
            .unwrap_or_else(GlobalSequence::start))
    }

    async fn commit_projection(&self, commit: ProjectionCommit) -> Result<()> {
        let mut state = self.state.write().await;
        let actual = state
            .checkpoints
            .get(&commit.projection)
            .copied()
            .unwrap_or_else(GlobalSequence::start);
        if actual != commit.expected {
            return Err(EventStoreError::CheckpointConflict {
                projection: commit.projection,
                expected: commit.expected,
                actual,
            });
        }

        for write in commit.documents {
            state
                .documents
                .entry(write.collection)
                .or_default()
                .insert(write.id, write.body);
        }
        state
            .checkpoints
            .insert(commit.projection, commit.checkpoint);
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        projection: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        if let Some(lease) = state.leases.get(projection)
            && lease.owner != owner
            && lease.expires_at > now
        {
            return Ok(false);
        }

        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        state.leases.insert(
            projection.to_string(),
            Lease {
                owner: owner.to_string(),
                expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        Ok(true)
    }

    async fn release_lease(&self, projection: &str, owner: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .leases
            .get(projection)
            .is_some_and(|lease| lease.owner == owner)
        {
            state.leases.remove(projection);
        }
        Ok(())
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|m| m.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ack_outbox(&self, event_id: EventId) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(message) = state.outbox_entry(event_id) {
            message.status = OutboxStatus::Delivered;
        }
        Ok(())
    }

    async fn record_outbox_attempt(
        &self,
        event_id: EventId,
        attempts: u32,
        error: &str,
    ) -> Result<u32> {
        let mut state = self.state.write().await;
        Ok(match state.outbox_entry(event_id) {
            Some(message) => {
                message.attempts = message.attempts.saturating_add(attempts);
                message.last_error = Some(error.to_string());
                message.attempts
            }
            None => 0,
        })
    }

    async fn dead_letter_outbox(&self, event_id: EventId, reason: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(message) = state.outbox_entry(event_id) {
            message.status = OutboxStatus::DeadLettered;
            message.last_error = Some(reason.to_string());
        }
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<OutboxMessage>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|m| m.status == OutboxStatus::DeadLettered)
            .cloned()
            .collect())
    }
}
