//! The seam between the dispatcher and the workflows it drives.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::error::Result;

/// A reaction to published events.
///
/// Deliveries are at least once, so `handle` must tolerate seeing the same
/// envelope again, including after an earlier attempt partially succeeded.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Returns true for event types this workflow reacts to.
    fn handles(&self, event_type: &str) -> bool;

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()>;
}
