//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendBatch, AppendOptions, EventEnvelope, EventStore, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The committed envelopes, with their log positions.
    pub envelopes: Vec<EventEnvelope>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;
}

/// Rebuilds an aggregate by folding a stream's envelopes in order.
///
/// State at version N depends only on events 1..N.
pub fn rehydrate<A: Aggregate>(envelopes: &[EventEnvelope]) -> Result<A, DomainError> {
    let mut aggregate = A::default();
    for envelope in envelopes {
        let event = A::Event::from_payload(&envelope.event_type, envelope.payload.clone())?;
        aggregate.apply(event);
        aggregate.set_version(envelope.stream_version);
    }
    Ok(aggregate)
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Rehydrating the aggregate from its stream
/// 2. Executing the command to produce events
/// 3. Appending the events with the version it loaded as expected version
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn fold_stream(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let envelopes = self.store.read_stream(aggregate_id).await?;
        rehydrate(&envelopes)
    }

    /// Loads an aggregate at its current version.
    ///
    /// Fails with `NotFound` if the stream has no events.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        self.load_existing(aggregate_id)
            .await?
            .ok_or(DomainError::NotFound {
                aggregate_type: A::aggregate_type(),
                id: aggregate_id,
            })
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.fold_stream(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Executes a command and persists the resulting events.
    ///
    /// The command function receives the current aggregate state (the default
    /// state for a new stream) and returns either a list of events to apply,
    /// or an error. A stale load surfaces as `ConcurrencyConflict`.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.fold_stream(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                envelopes: vec![],
                new_version: current_version,
            });
        }

        let options = if current_version == Version::initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(current_version)
        };
        let (new_version, envelopes) = self.append_events(aggregate_id, &events, options).await?;

        for event in &events {
            aggregate.apply(event.clone());
        }
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            envelopes,
            new_version,
        })
    }

    /// Appends already-decided events to a stream in one commit.
    pub async fn append_events(
        &self,
        aggregate_id: AggregateId,
        events: &[A::Event],
        options: AppendOptions,
    ) -> Result<(Version, Vec<EventEnvelope>), DomainError> {
        let new_events = events
            .iter()
            .map(DomainEvent::to_new_event)
            .collect::<Result<Vec<_>, _>>()?;
        let batch = AppendBatch::new(aggregate_id, A::aggregate_type()).with_events(new_events);

        let result = self.store.append(batch, options).await?;
        Ok((result.new_version, result.events))
    }
}
