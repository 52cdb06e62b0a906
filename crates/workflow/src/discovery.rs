//! Follow-up work when a matter enters discovery.
//!
//! The reaction is a task for the assigned attorney plus a record that the
//! client was notified, appended to the matter's own stream in one commit.
//! Both events carry the triggering event id as `causation_id`; finding one
//! in the stream means the reaction already happened.

use async_trait::async_trait;
use chrono::Utc;
use domain::matter::{DISCOVERY_NOTIFICATION, discovery_follow_up};
use domain::{Aggregate, DomainEvent, Matter, MatterEvent, MatterStatus};
use event_store::{AppendBatch, AppendOptions, EventEnvelope, EventStore, NewEvent, Version};

use crate::error::Result;
use crate::handler::WorkflowHandler;
use crate::notifier::Notifier;

pub const DISCOVERY_WORKFLOW: &str = "discovery";

/// Reacts to `StatusChanged` events that move a matter into discovery.
pub struct DiscoveryWorkflow<S, N> {
    store: S,
    notifier: N,
}

impl<S: EventStore, N: Notifier> DiscoveryWorkflow<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    async fn already_reacted(&self, trigger: &EventEnvelope) -> Result<Option<Version>> {
        let history = self.store.read_stream(trigger.stream_id).await?;
        if history
            .iter()
            .any(|e| e.causation_id() == Some(trigger.event_id))
        {
            return Ok(None);
        }
        Ok(Some(
            history
                .last()
                .map(|e| e.stream_version)
                .unwrap_or_else(Version::initial),
        ))
    }
}

#[async_trait]
impl<S, N> WorkflowHandler for DiscoveryWorkflow<S, N>
where
    S: EventStore + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        DISCOVERY_WORKFLOW
    }

    fn handles(&self, event_type: &str) -> bool {
        event_type == "StatusChanged"
    }

    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id, matter_id = %envelope.stream_id))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        if envelope.stream_type != Matter::aggregate_type() {
            return Ok(());
        }
        let MatterEvent::StatusChanged(change) =
            MatterEvent::from_payload(&envelope.event_type, envelope.payload.clone())?
        else {
            return Ok(());
        };
        if change.new_status != MatterStatus::Discovery {
            return Ok(());
        }

        let Some(current) = self.already_reacted(envelope).await? else {
            metrics::counter!("workflow_reactions_skipped_total", "workflow" => DISCOVERY_WORKFLOW)
                .increment(1);
            tracing::debug!("discovery follow-up already recorded");
            return Ok(());
        };

        let events = discovery_follow_up(change.matter_id, Utc::now())
            .iter()
            .map(|event| Ok(event.to_new_event()?.caused_by(envelope.event_id)))
            .collect::<Result<Vec<NewEvent>>>()?;
        let batch = AppendBatch::new(envelope.stream_id, Matter::aggregate_type()).with_events(events);
        let committed = self
            .store
            .append(batch, AppendOptions::expect_version(current))
            .await?;

        metrics::counter!("workflow_reactions_total", "workflow" => DISCOVERY_WORKFLOW).increment(1);
        tracing::info!(version = %committed.new_version, "discovery follow-up recorded");

        // The committed events are the record; a failed send is not retried.
        if let Err(e) = self
            .notifier
            .notify(change.matter_id, DISCOVERY_NOTIFICATION)
            .await
        {
            tracing::warn!(error = %e, "client notification failed");
        }
        Ok(())
    }
}
