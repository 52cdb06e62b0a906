//! Matter domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{AttorneyId, CaseType, MatterStatus, Money};

/// Events that can occur on a matter stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MatterEvent {
    /// Matter was opened for a client.
    MatterOpened(MatterOpenedData),

    /// Matter was flagged as high priority.
    MatterTaggedAsHighPriority(MatterTaggedAsHighPriorityData),

    /// An attorney was assigned.
    AttorneyAssigned(AttorneyAssignedData),

    /// Status moved from one value to another.
    StatusChanged(StatusChangedData),

    /// The opposing party made a settlement offer.
    SettlementOfferReceived(SettlementOfferReceivedData),

    /// A follow-up task was created.
    TaskCreated(TaskCreatedData),

    /// The client was notified.
    ClientNotificationSent(ClientNotificationSentData),
}

impl MatterEvent {
    /// Every event type a matter stream can contain.
    pub const EVENT_TYPES: [&'static str; 7] = [
        "MatterOpened",
        "MatterTaggedAsHighPriority",
        "AttorneyAssigned",
        "StatusChanged",
        "SettlementOfferReceived",
        "TaskCreated",
        "ClientNotificationSent",
    ];
}

impl DomainEvent for MatterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MatterEvent::MatterOpened(_) => "MatterOpened",
            MatterEvent::MatterTaggedAsHighPriority(_) => "MatterTaggedAsHighPriority",
            MatterEvent::AttorneyAssigned(_) => "AttorneyAssigned",
            MatterEvent::StatusChanged(_) => "StatusChanged",
            MatterEvent::SettlementOfferReceived(_) => "SettlementOfferReceived",
            MatterEvent::TaskCreated(_) => "TaskCreated",
            MatterEvent::ClientNotificationSent(_) => "ClientNotificationSent",
        }
    }

    /// Status changes drive workflows, so they go through the outbox.
    fn is_published(&self) -> bool {
        matches!(self, MatterEvent::StatusChanged(_))
    }
}

/// Data for MatterOpened event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatterOpenedData {
    pub matter_id: AggregateId,
    pub client_id: AggregateId,

    /// Client name at the moment the matter was opened. Not updated later.
    pub client_name: String,

    pub opposing_party: String,
    pub case_type: CaseType,
    pub initial_claim_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Data for MatterTaggedAsHighPriority event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatterTaggedAsHighPriorityData {
    pub matter_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Data for AttorneyAssigned event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttorneyAssignedData {
    pub matter_id: AggregateId,
    pub attorney_id: AttorneyId,
    pub assigned_at: DateTime<Utc>,
}

/// Data for StatusChanged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub matter_id: AggregateId,
    pub old_status: MatterStatus,
    pub new_status: MatterStatus,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Data for SettlementOfferReceived event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOfferReceivedData {
    pub matter_id: AggregateId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Data for TaskCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCreatedData {
    pub matter_id: AggregateId,
    pub description: String,
    pub assigned_to: String,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Data for ClientNotificationSent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientNotificationSentData {
    pub matter_id: AggregateId,
    pub notification_type: String,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_changed() -> MatterEvent {
        MatterEvent::StatusChanged(StatusChangedData {
            matter_id: AggregateId::new(),
            old_status: MatterStatus::Active,
            new_status: MatterStatus::Discovery,
            reason: "Evidence phase".to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn only_status_changes_are_published() {
        assert!(status_changed().is_published());

        let tagged = MatterEvent::MatterTaggedAsHighPriority(MatterTaggedAsHighPriorityData {
            matter_id: AggregateId::new(),
            occurred_at: Utc::now(),
        });
        assert!(!tagged.is_published());
    }

    #[test]
    fn payload_uses_snake_case_fields() {
        let payload = status_changed().to_payload().unwrap();
        assert_eq!(payload["new_status"], "Discovery");
        assert_eq!(payload["old_status"], "Active");
    }

    #[test]
    fn event_type_is_listed() {
        let event = status_changed();
        assert!(MatterEvent::EVENT_TYPES.contains(&event.event_type()));
        let restored =
            MatterEvent::from_payload(event.event_type(), event.to_payload().unwrap()).unwrap();
        assert_eq!(restored, event);
    }
}
