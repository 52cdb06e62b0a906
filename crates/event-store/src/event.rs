use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AggregateId;

/// Metadata key linking a follow-on event to the event that caused it.
pub const CAUSATION_ID: &str = "causation_id";

/// Unique identifier for an event.
///
/// Doubles as the delivery id of the event's outbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Position of an event within its stream, used for optimistic concurrency.
///
/// Versions start at 1 for the first event and increment by 1 for each
/// subsequent event. Version 0 means "the stream does not exist yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a stream that has no events (0).
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version of the first event (1).
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Position of an event in the log-wide order.
///
/// Assigned at commit time. Readers never observe a gap that is filled later.
/// `GlobalSequence::start()` (0) sits before the first event and is the
/// checkpoint of a consumer that has processed nothing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GlobalSequence(i64);

impl GlobalSequence {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn start() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for GlobalSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event that has been decided but not yet committed.
///
/// Positions (stream version, global sequence) are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
    /// When set, the append also writes an outbox marker for this event.
    pub publish: bool,
}

impl NewEvent {
    /// Creates an unpublished event with a fresh id, occurring now.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            payload,
            metadata: HashMap::new(),
            occurred_at: Utc::now(),
            publish: false,
        }
    }

    /// Creates an event from a serializable payload.
    pub fn from_payload<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_value(payload)?))
    }

    /// Marks the event for publication through the outbox.
    pub fn published(mut self) -> Self {
        self.publish = true;
        self
    }

    /// Overrides the time at which the event occurred.
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Records the event that caused this one.
    pub fn caused_by(self, cause: EventId) -> Self {
        self.with_metadata(CAUSATION_ID, serde_json::Value::String(cause.to_string()))
    }

    pub(crate) fn into_envelope(
        self,
        stream_id: AggregateId,
        stream_type: &str,
        stream_version: Version,
        global_sequence: GlobalSequence,
    ) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id,
            stream_id,
            stream_type: stream_type.to_string(),
            stream_version,
            global_sequence,
            event_type: self.event_type,
            payload: self.payload,
            metadata: self.metadata,
            occurred_at: self.occurred_at,
        }
    }
}

/// A committed event along with its position in the log.
///
/// Immutable once written; this shape is the persisted wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The stream (entity) this event belongs to.
    pub stream_id: AggregateId,

    /// The entity kind of the stream (e.g. "Matter", "Client").
    pub stream_type: String,

    /// Position within the stream, starting at 1.
    pub stream_version: Version,

    /// Position within the whole log.
    pub global_sequence: GlobalSequence,

    /// The type of the event (e.g. "MatterOpened").
    pub event_type: String,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata about the event.
    pub metadata: HashMap<String, serde_json::Value>,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Returns the id of the event that caused this one, if recorded.
    pub fn causation_id(&self) -> Option<EventId> {
        self.metadata
            .get(CAUSATION_ID)
            .and_then(|value| value.as_str())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .map(EventId::from_uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn version_initial_and_first() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::first().as_i64(), 1);
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::new(1) < Version::new(2));
    }

    #[test]
    fn global_sequence_starts_before_first_event() {
        assert_eq!(GlobalSequence::start().as_i64(), 0);
        assert_eq!(GlobalSequence::start().next(), GlobalSequence::new(1));
    }

    #[test]
    fn new_event_defaults_to_unpublished() {
        let event = NewEvent::new("ClientCreated", serde_json::json!({"name": "Acme"}));
        assert!(!event.publish);
        assert!(event.published().publish);
    }

    #[test]
    fn causation_id_survives_envelope_conversion() {
        let cause = EventId::new();
        let envelope = NewEvent::new("TaskCreated", serde_json::json!({}))
            .caused_by(cause)
            .into_envelope(
                AggregateId::new(),
                "Matter",
                Version::new(4),
                GlobalSequence::new(9),
            );

        assert_eq!(envelope.causation_id(), Some(cause));
        assert_eq!(envelope.stream_version, Version::new(4));
        assert_eq!(envelope.global_sequence, GlobalSequence::new(9));
    }

    #[test]
    fn causation_id_absent_by_default() {
        let envelope = NewEvent::new("MatterOpened", serde_json::json!({})).into_envelope(
            AggregateId::new(),
            "Matter",
            Version::first(),
            GlobalSequence::new(1),
        );
        assert_eq!(envelope.causation_id(), None);
    }
}
