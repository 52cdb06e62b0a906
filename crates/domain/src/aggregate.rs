//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::{NewEvent, Version};
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
///
/// Implementors are enums serialized with `#[serde(tag = "type", content = "data")]`
/// whose variant names equal their event type names. The stored payload is
/// the `data` part; the `type` part lives in the envelope's `event_type`.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// This is used for serialization and event store filtering.
    fn event_type(&self) -> &'static str;

    /// Whether committing this event should also publish it through the outbox.
    fn is_published(&self) -> bool {
        false
    }

    /// Serializes the event into its stored payload.
    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Rebuilds an event from an envelope's type and payload.
    fn from_payload(event_type: &str, payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "type": event_type, "data": payload }))
    }

    /// Converts the event into an uncommitted store event.
    fn to_new_event(&self) -> Result<NewEvent, serde_json::Error> {
        let event = NewEvent::new(self.event_type(), self.to_payload()?);
        Ok(if self.is_published() {
            event.published()
        } else {
            event
        })
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate is a cluster of domain objects that can be treated as a single unit.
/// The aggregate root ensures consistency of changes being made within the aggregate.
///
/// In event sourcing, aggregates:
/// - Are rebuilt by replaying events
/// - Generate events from commands
/// - Apply events to update state (pure, deterministic)
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name, used as the stream type.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the current version of the aggregate.
    ///
    /// Version starts at 0 for a new aggregate and increments with each event.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by the command handler after loading events.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
