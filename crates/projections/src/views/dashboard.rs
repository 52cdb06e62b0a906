//! Dashboard statistics folded across every matter stream.

use domain::{Aggregate, DomainEvent, Matter, MatterEvent, MatterStatus, Money};
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregation::AggregationProjection;
use crate::{ProjectionError, Result};

/// Collection holding the dashboard document.
pub const DASHBOARD: &str = "dashboard_statistics";

/// Identity of the single dashboard document.
pub const DASHBOARD_ID: Uuid = Uuid::from_u128(0x018da675_9b36_7c98_a836_9321f6494901);

/// Running counters over all matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStatistics {
    pub id: Uuid,
    pub total_active_cases: i64,
    pub total_potential_settlement_value: Money,
    pub high_priority_case_count: i64,
}

impl Default for DashboardStatistics {
    fn default() -> Self {
        Self {
            id: DASHBOARD_ID,
            total_active_cases: 0,
            total_potential_settlement_value: Money::zero(),
            high_priority_case_count: 0,
        }
    }
}

impl DashboardStatistics {
    /// Returns the counters after `event`.
    ///
    /// Fails instead of wrapping when the settlement total would overflow.
    pub fn apply(mut self, event: &MatterEvent) -> Result<Self> {
        match event {
            MatterEvent::MatterOpened(data) => {
                self.total_active_cases += 1;
                self.total_potential_settlement_value = self
                    .total_potential_settlement_value
                    .checked_add(data.initial_claim_amount)
                    .ok_or_else(|| ProjectionError::Fold {
                        projection: DashboardProjection::NAME,
                        event_type: event.event_type().to_string(),
                        reason: format!(
                            "settlement total overflows adding {}",
                            data.initial_claim_amount
                        ),
                    })?;
            }
            MatterEvent::MatterTaggedAsHighPriority(_) => {
                self.high_priority_case_count += 1;
            }
            MatterEvent::StatusChanged(data) => {
                let was_closed = data.old_status == MatterStatus::Closed;
                let is_closed = data.new_status == MatterStatus::Closed;
                if is_closed && !was_closed {
                    self.total_active_cases -= 1;
                } else if was_closed && !is_closed {
                    self.total_active_cases += 1;
                }
            }
            MatterEvent::AttorneyAssigned(_)
            | MatterEvent::SettlementOfferReceived(_)
            | MatterEvent::TaskCreated(_)
            | MatterEvent::ClientNotificationSent(_) => {}
        }
        Ok(self)
    }
}

/// Folds matter events into [`DashboardStatistics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardProjection;

impl DashboardProjection {
    const NAME: &'static str = "DashboardStatisticsProjection";

    const FOLDED: [&'static str; 3] = [
        "MatterOpened",
        "MatterTaggedAsHighPriority",
        "StatusChanged",
    ];
}

impl AggregationProjection for DashboardProjection {
    type Document = DashboardStatistics;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn collection(&self) -> &'static str {
        DASHBOARD
    }

    fn document_id(&self) -> Uuid {
        DASHBOARD_ID
    }

    fn apply(&self, document: DashboardStatistics, envelope: &EventEnvelope) -> Result<DashboardStatistics> {
        if envelope.stream_type != Matter::aggregate_type()
            || !Self::FOLDED.contains(&envelope.event_type.as_str())
        {
            return Ok(document);
        }
        let event = MatterEvent::from_payload(&envelope.event_type, envelope.payload.clone())?;
        document.apply(&event)
    }
}
