//! Cross-stream projections folded by the aggregation daemon.

use event_store::EventEnvelope;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::Result;

/// A projection folding events from many streams into one document.
///
/// The daemon treats a missing document as `Document::default()`.
pub trait AggregationProjection: Send + Sync + 'static {
    type Document: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static;

    /// Name under which the checkpoint and lease are stored.
    fn name(&self) -> &'static str;

    fn collection(&self) -> &'static str;

    /// Fixed identity of the summary document.
    fn document_id(&self) -> Uuid;

    /// Folds one envelope. Event types the projection ignores leave the
    /// document unchanged.
    fn apply(&self, document: Self::Document, envelope: &EventEnvelope) -> Result<Self::Document>;

    /// Folds a sequence of envelopes starting from the empty document.
    fn fold<'a, I>(&self, envelopes: I) -> Result<Self::Document>
    where
        I: IntoIterator<Item = &'a EventEnvelope>,
    {
        envelopes
            .into_iter()
            .try_fold(Self::Document::default(), |document, envelope| {
                self.apply(document, envelope)
            })
    }
}
