//! Per-stream projections and the adapter that runs them inside appends.

use domain::DomainEvent;
use event_store::{EventEnvelope, InlineProjection, ProjectionOutput};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// A projection that keeps one read document per stream.
///
/// `create` starts the document from the first event of a stream and `apply`
/// derives the next document from the previous one. Both are pure; the store
/// persists the returned value by replacement.
pub trait SingleStreamProjection: Send + Sync + 'static {
    /// Event enum of the stream type this projection follows.
    type Event: DomainEvent;

    /// The read document.
    type Document: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Collection the documents are stored under.
    fn collection(&self) -> &'static str;

    /// Stream type whose events this projection folds.
    fn stream_type(&self) -> &'static str;

    /// Returns true for event types this projection understands.
    fn accepts(&self, event_type: &str) -> bool;

    /// Starts a document. None if the event cannot start one.
    fn create(&self, event: &Self::Event, envelope: &EventEnvelope) -> Option<Self::Document>;

    /// Derives the next document. None leaves the current document as is.
    fn apply(
        &self,
        current: &Self::Document,
        event: &Self::Event,
        envelope: &EventEnvelope,
    ) -> Option<Self::Document>;

    /// Folds one envelope. `Ok(None)` means the document is unchanged.
    fn step(
        &self,
        current: Option<&Self::Document>,
        envelope: &EventEnvelope,
    ) -> Result<Option<Self::Document>> {
        if envelope.stream_type != self.stream_type() || !self.accepts(&envelope.event_type) {
            return Ok(None);
        }
        let event = Self::Event::from_payload(&envelope.event_type, envelope.payload.clone())?;
        Ok(match current {
            None => self.create(&event, envelope),
            Some(document) => self.apply(document, &event, envelope),
        })
    }

    /// Recomputes a document from scratch by folding a whole stream.
    fn replay(&self, envelopes: &[EventEnvelope]) -> Result<Option<Self::Document>> {
        let mut document = None;
        for envelope in envelopes {
            if let Some(next) = self.step(document.as_ref(), envelope)? {
                document = Some(next);
            }
        }
        Ok(document)
    }
}

/// Runs a [`SingleStreamProjection`] inside the store's append transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline<P>(pub P);

impl<P: SingleStreamProjection> InlineProjection for Inline<P> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn collection(&self) -> &str {
        self.0.collection()
    }

    fn project(&self, current: Option<&serde_json::Value>, event: &EventEnvelope) -> ProjectionOutput {
        let current: Option<P::Document> = current.cloned().map(serde_json::from_value).transpose()?;
        match self.0.step(current.as_ref(), event)? {
            Some(document) => Ok(Some(serde_json::to_value(document)?)),
            None => Ok(None),
        }
    }
}
