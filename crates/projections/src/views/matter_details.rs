//! Matter details read document.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, AttorneyId, CaseType, Matter, MatterEvent, MatterStatus, Money};
use event_store::{EventEnvelope, Version};
use serde::{Deserialize, Serialize};

use crate::projection::SingleStreamProjection;

/// Collection holding one [`MatterDetails`] per matter stream.
pub const MATTER_DETAILS: &str = "matter_details";

/// Inline read document of a matter, with the fields used for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatterDetails {
    pub id: AggregateId,
    pub client_id: AggregateId,
    pub client_name: String,
    pub opposing_party: String,
    pub case_type: CaseType,
    pub status: MatterStatus,
    pub is_high_priority: bool,
    pub current_claim_amount: Money,
    pub assigned_attorney_id: Option<AttorneyId>,
    pub latest_settlement_offer: Option<Money>,
    pub task_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Stream version this document reflects.
    pub version: Version,
}

/// Maintains [`MatterDetails`] from the matter stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatterDetailsProjection;

impl SingleStreamProjection for MatterDetailsProjection {
    type Event = MatterEvent;
    type Document = MatterDetails;

    fn name(&self) -> &'static str {
        "MatterDetailsProjection"
    }

    fn collection(&self) -> &'static str {
        MATTER_DETAILS
    }

    fn stream_type(&self) -> &'static str {
        Matter::aggregate_type()
    }

    fn accepts(&self, event_type: &str) -> bool {
        MatterEvent::EVENT_TYPES.contains(&event_type)
    }

    fn create(&self, event: &MatterEvent, envelope: &EventEnvelope) -> Option<MatterDetails> {
        match event {
            MatterEvent::MatterOpened(data) => Some(MatterDetails {
                id: data.matter_id,
                client_id: data.client_id,
                client_name: data.client_name.clone(),
                opposing_party: data.opposing_party.clone(),
                case_type: data.case_type,
                status: MatterStatus::New,
                is_high_priority: false,
                current_claim_amount: data.initial_claim_amount,
                assigned_attorney_id: None,
                latest_settlement_offer: None,
                task_count: 0,
                created_at: data.occurred_at,
                updated_at: data.occurred_at,
                version: envelope.stream_version,
            }),
            _ => None,
        }
    }

    fn apply(
        &self,
        current: &MatterDetails,
        event: &MatterEvent,
        envelope: &EventEnvelope,
    ) -> Option<MatterDetails> {
        let mut next = MatterDetails {
            version: envelope.stream_version,
            updated_at: envelope.occurred_at,
            ..current.clone()
        };
        match event {
            MatterEvent::MatterOpened(_) => return None,
            MatterEvent::MatterTaggedAsHighPriority(_) => {
                next.is_high_priority = true;
            }
            MatterEvent::AttorneyAssigned(data) => {
                next.assigned_attorney_id = Some(data.attorney_id);
                if next.status == MatterStatus::New {
                    next.status = MatterStatus::Active;
                }
            }
            MatterEvent::StatusChanged(data) => {
                next.status = data.new_status;
            }
            MatterEvent::SettlementOfferReceived(data) => {
                next.latest_settlement_offer = Some(data.amount);
            }
            MatterEvent::TaskCreated(_) => {
                next.task_count += 1;
            }
            MatterEvent::ClientNotificationSent(_) => {}
        }
        Some(next)
    }
}
