//! Matter aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    AttorneyId, CaseType, MatterError, MatterEvent, MatterStatus, Money,
    events::{
        AttorneyAssignedData, ClientNotificationSentData, MatterOpenedData,
        MatterTaggedAsHighPriorityData, SettlementOfferReceivedData, StatusChangedData,
        TaskCreatedData,
    },
};

/// Claims strictly above this amount are tagged high priority at intake.
pub const HIGH_PRIORITY_THRESHOLD: Money = Money::from_units(1_000_000);

/// Largest claim or settlement amount a matter accepts.
pub const MAX_AMOUNT: Money = Money::from_units(1_000_000_000_000);

/// Description of the task created when discovery starts.
pub const DISCOVERY_TASK_DESCRIPTION: &str = "Request Evidence task for assigned attorney";

/// Assignee of the task created when discovery starts.
pub const DISCOVERY_TASK_ASSIGNEE: &str = "Assigned Attorney";

/// Notification sent to the client when discovery starts.
pub const DISCOVERY_NOTIFICATION: &str = "Discovery Started Email";

/// Days until the discovery task is due.
pub const DISCOVERY_TASK_DUE_DAYS: i64 = 7;

/// Input for opening a matter, after the client has been resolved.
#[derive(Debug, Clone)]
pub struct OpenMatterInput {
    pub matter_id: AggregateId,
    pub client_id: AggregateId,
    pub client_name: String,
    pub opposing_party: String,
    pub case_type: CaseType,
    pub initial_claim_amount: Money,
}

/// Matter aggregate root.
///
/// A legal case opened for a client against an opposing party.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Matter {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    client_id: Option<AggregateId>,
    client_name: String,
    opposing_party: String,
    case_type: Option<CaseType>,
    status: MatterStatus,
    is_high_priority: bool,
    current_claim_amount: Money,
    assigned_attorney_id: Option<AttorneyId>,
    latest_settlement_offer: Option<Money>,
}

impl Aggregate for Matter {
    type Event = MatterEvent;
    type Error = MatterError;

    fn aggregate_type() -> &'static str {
        "Matter"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            MatterEvent::MatterOpened(data) => self.apply_opened(data),
            MatterEvent::MatterTaggedAsHighPriority(_) => {
                self.is_high_priority = true;
            }
            MatterEvent::AttorneyAssigned(data) => {
                self.assigned_attorney_id = Some(data.attorney_id);
                if self.status == MatterStatus::New {
                    self.status = MatterStatus::Active;
                }
            }
            MatterEvent::StatusChanged(data) => {
                self.status = data.new_status;
            }
            MatterEvent::SettlementOfferReceived(data) => {
                self.latest_settlement_offer = Some(data.amount);
            }
            MatterEvent::TaskCreated(_) | MatterEvent::ClientNotificationSent(_) => {}
        }
    }
}

impl Matter {
    fn apply_opened(&mut self, data: MatterOpenedData) {
        self.id = Some(data.matter_id);
        self.client_id = Some(data.client_id);
        self.client_name = data.client_name;
        self.opposing_party = data.opposing_party;
        self.case_type = Some(data.case_type);
        self.status = MatterStatus::New;
        self.current_claim_amount = data.initial_claim_amount;
    }

    fn ensure_opened(&self) -> Result<AggregateId, MatterError> {
        self.id.ok_or(MatterError::NotOpened)
    }

    // Accessors

    pub fn client_id(&self) -> Option<AggregateId> {
        self.client_id
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn opposing_party(&self) -> &str {
        &self.opposing_party
    }

    pub fn case_type(&self) -> Option<CaseType> {
        self.case_type
    }

    pub fn status(&self) -> MatterStatus {
        self.status
    }

    pub fn is_high_priority(&self) -> bool {
        self.is_high_priority
    }

    pub fn current_claim_amount(&self) -> Money {
        self.current_claim_amount
    }

    pub fn assigned_attorney_id(&self) -> Option<AttorneyId> {
        self.assigned_attorney_id
    }

    pub fn latest_settlement_offer(&self) -> Option<Money> {
        self.latest_settlement_offer
    }

    // Command methods - return events to be applied

    /// Opens the matter, tagging it high priority when the claim is large.
    pub fn open(&self, input: OpenMatterInput) -> Result<Vec<MatterEvent>, MatterError> {
        if self.id.is_some() {
            return Err(MatterError::AlreadyOpened);
        }
        check_amount("initial_claim_amount", input.initial_claim_amount)?;
        let opposing_party = input.opposing_party.trim().to_string();
        if opposing_party.is_empty() {
            return Err(MatterError::MissingField("opposing_party"));
        }

        let now = Utc::now();
        let mut events = vec![MatterEvent::MatterOpened(MatterOpenedData {
            matter_id: input.matter_id,
            client_id: input.client_id,
            client_name: input.client_name,
            opposing_party,
            case_type: input.case_type,
            initial_claim_amount: input.initial_claim_amount,
            occurred_at: now,
        })];

        if input.initial_claim_amount > HIGH_PRIORITY_THRESHOLD {
            events.push(MatterEvent::MatterTaggedAsHighPriority(
                MatterTaggedAsHighPriorityData {
                    matter_id: input.matter_id,
                    occurred_at: now,
                },
            ));
        }

        Ok(events)
    }

    /// Assigns an attorney to the matter.
    pub fn assign_attorney(&self, attorney_id: AttorneyId) -> Result<Vec<MatterEvent>, MatterError> {
        let matter_id = self.ensure_opened()?;
        Ok(vec![MatterEvent::AttorneyAssigned(AttorneyAssignedData {
            matter_id,
            attorney_id,
            assigned_at: Utc::now(),
        })])
    }

    /// Records a settlement offer from the opposing party.
    pub fn record_settlement_offer(&self, amount: Money) -> Result<Vec<MatterEvent>, MatterError> {
        let matter_id = self.ensure_opened()?;
        check_amount("amount", amount)?;
        Ok(vec![MatterEvent::SettlementOfferReceived(
            SettlementOfferReceivedData {
                matter_id,
                amount,
                occurred_at: Utc::now(),
            },
        )])
    }

}

/// Accepts amounts in `(0, MAX_AMOUNT]`.
pub fn check_amount(field: &'static str, amount: Money) -> Result<(), MatterError> {
    if amount.is_positive() && amount <= MAX_AMOUNT {
        Ok(())
    } else {
        Err(MatterError::InvalidAmount { field, amount })
    }
}

/// Builds a status change event from an externally observed old status.
///
/// Any transition is allowed.
pub fn status_changed(
    matter_id: AggregateId,
    old_status: MatterStatus,
    new_status: MatterStatus,
    reason: String,
) -> MatterEvent {
    MatterEvent::StatusChanged(StatusChangedData {
        matter_id,
        old_status,
        new_status,
        reason,
        occurred_at: Utc::now(),
    })
}

/// The follow-up events appended when a matter enters discovery.
pub fn discovery_follow_up(matter_id: AggregateId, now: DateTime<Utc>) -> Vec<MatterEvent> {
    vec![
        MatterEvent::TaskCreated(TaskCreatedData {
            matter_id,
            description: DISCOVERY_TASK_DESCRIPTION.to_string(),
            assigned_to: DISCOVERY_TASK_ASSIGNEE.to_string(),
            due_date: now + Duration::days(DISCOVERY_TASK_DUE_DAYS),
            created_at: now,
        }),
        MatterEvent::ClientNotificationSent(ClientNotificationSentData {
            matter_id,
            notification_type: DISCOVERY_NOTIFICATION.to_string(),
            sent_at: now,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(amount: Money) -> OpenMatterInput {
        OpenMatterInput {
            matter_id: AggregateId::new(),
            client_id: AggregateId::new(),
            client_name: "Acme Corp".to_string(),
            opposing_party: "Globex".to_string(),
            case_type: CaseType::Commercial,
            initial_claim_amount: amount,
        }
    }

    fn opened(amount: Money) -> Matter {
        let mut matter = Matter::default();
        let events = matter.open(input(amount)).unwrap();
        matter.apply_events(events);
        matter
    }

    #[test]
    fn open_emits_matter_opened() {
        let events = Matter::default().open(input(Money::from_units(50_000))).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MatterEvent::MatterOpened(_)));
    }

    #[test]
    fn open_above_threshold_tags_high_priority() {
        let events = Matter::default()
            .open(input(Money::from_units(1_500_000)))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], MatterEvent::MatterTaggedAsHighPriority(_)));
    }

    #[test]
    fn open_at_threshold_is_not_high_priority() {
        let events = Matter::default().open(input(HIGH_PRIORITY_THRESHOLD)).unwrap();
        assert_eq!(events.len(), 1);
    }

    fn change_status(matter: &mut Matter, status: MatterStatus) {
        let matter_id = matter.id().unwrap();
        matter.apply(status_changed(matter_id, matter.status(), status, "manual".to_string()));
    }

    #[test]
    fn open_rejects_non_positive_claims() {
        let result = Matter::default().open(input(Money::zero()));
        assert!(matches!(result, Err(MatterError::InvalidAmount { .. })));
    }

    #[test]
    fn open_rejects_claims_above_max() {
        assert!(Matter::default().open(input(MAX_AMOUNT)).is_ok());
        for amount in [
            Money::from_cents(MAX_AMOUNT.cents() + 1),
            Money::from_cents(i64::MAX),
        ] {
            assert!(matches!(
                Matter::default().open(input(amount)),
                Err(MatterError::InvalidAmount {
                    field: "initial_claim_amount",
                    ..
                })
            ));
        }
    }

    #[test]
    fn open_rejects_blank_opposing_party() {
        let mut request = input(Money::from_units(10));
        request.opposing_party = "  ".to_string();
        assert!(matches!(
            Matter::default().open(request),
            Err(MatterError::MissingField("opposing_party"))
        ));
    }

    #[test]
    fn open_twice_is_rejected() {
        let matter = opened(Money::from_units(10));
        assert!(matches!(
            matter.open(input(Money::from_units(10))),
            Err(MatterError::AlreadyOpened)
        ));
    }

    #[test]
    fn apply_opened_sets_state() {
        let matter = opened(Money::from_units(2_000_000));
        assert_eq!(matter.status(), MatterStatus::New);
        assert_eq!(matter.client_name(), "Acme Corp");
        assert_eq!(matter.opposing_party(), "Globex");
        assert_eq!(matter.case_type(), Some(CaseType::Commercial));
        assert!(matter.is_high_priority());
        assert_eq!(matter.current_claim_amount(), Money::from_units(2_000_000));
    }

    #[test]
    fn attorney_assignment_activates_new_matter() {
        let mut matter = opened(Money::from_units(10));
        let attorney = AttorneyId::new();
        let events = matter.assign_attorney(attorney).unwrap();
        matter.apply_events(events);

        assert_eq!(matter.status(), MatterStatus::Active);
        assert_eq!(matter.assigned_attorney_id(), Some(attorney));
    }

    #[test]
    fn attorney_assignment_keeps_later_status() {
        let mut matter = opened(Money::from_units(10));
        change_status(&mut matter, MatterStatus::Discovery);

        let events = matter.assign_attorney(AttorneyId::new()).unwrap();
        matter.apply_events(events);
        assert_eq!(matter.status(), MatterStatus::Discovery);
    }

    #[test]
    fn status_change_is_permissive() {
        let mut matter = opened(Money::from_units(10));
        for status in [
            MatterStatus::Closed,
            MatterStatus::New,
            MatterStatus::Settled,
            MatterStatus::Discovery,
        ] {
            change_status(&mut matter, status);
            assert_eq!(matter.status(), status);
        }
    }

    #[test]
    fn commands_on_unopened_matter_fail() {
        let matter = Matter::default();
        assert!(matches!(
            matter.assign_attorney(AttorneyId::new()),
            Err(MatterError::NotOpened)
        ));
        assert!(matches!(
            matter.record_settlement_offer(Money::from_units(5)),
            Err(MatterError::NotOpened)
        ));
    }

    #[test]
    fn settlement_offer_must_be_positive() {
        let mut matter = opened(Money::from_units(10));
        assert!(matter.record_settlement_offer(Money::zero()).is_err());
        assert!(matter
            .record_settlement_offer(Money::from_cents(i64::MAX))
            .is_err());

        let events = matter
            .record_settlement_offer(Money::from_units(5))
            .unwrap();
        matter.apply_events(events);
        assert_eq!(matter.latest_settlement_offer(), Some(Money::from_units(5)));
    }

    #[test]
    fn discovery_follow_up_is_task_then_notification() {
        let matter_id = AggregateId::new();
        let now = Utc::now();
        let events = discovery_follow_up(matter_id, now);

        match &events[..] {
            [
                MatterEvent::TaskCreated(task),
                MatterEvent::ClientNotificationSent(notification),
            ] => {
                assert_eq!(task.description, DISCOVERY_TASK_DESCRIPTION);
                assert_eq!(task.assigned_to, DISCOVERY_TASK_ASSIGNEE);
                assert_eq!(task.due_date, now + Duration::days(7));
                assert_eq!(notification.notification_type, DISCOVERY_NOTIFICATION);
            }
            other => panic!("unexpected follow-up: {other:?}"),
        }
    }
}
