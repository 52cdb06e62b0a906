//! Integration tests for client registration and matter intake.
//!
//! The directory used here replays the event log directly, so these tests
//! exercise the services without the projections crate.

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    Aggregate, AssignAttorney, AttorneyId, BusinessRuleViolation, CaseType, ClientService,
    DomainError, DomainEvent, MAX_AMOUNT, Matter, MatterCommand, MatterDirectory, MatterEvent,
    MatterFingerprint, MatterService, MatterStatus, Money, OpenMatter, RecordSettlementOffer,
    RegisterClient, UpdateStatus, rehydrate,
};
use event_store::{EventStore, GlobalSequence, InMemoryEventStore, Version};

/// Answers directory queries by scanning the whole log.
#[derive(Clone)]
struct ReplayDirectory {
    store: InMemoryEventStore,
}

impl ReplayDirectory {
    async fn opened(&self) -> Vec<domain::matter::MatterOpenedData> {
        let events = self
            .store
            .read_global(GlobalSequence::start(), usize::MAX)
            .await
            .unwrap();
        events
            .into_iter()
            .filter(|e| e.event_type == "MatterOpened")
            .filter_map(|e| match MatterEvent::from_payload(&e.event_type, e.payload) {
                Ok(MatterEvent::MatterOpened(data)) => Some(data),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MatterDirectory for ReplayDirectory {
    async fn client_named(&self, name: &str) -> Result<Option<AggregateId>, DomainError> {
        let events = self
            .store
            .read_global(GlobalSequence::start(), usize::MAX)
            .await?;
        Ok(events
            .into_iter()
            .find(|e| e.event_type == "ClientCreated" && e.payload["name"] == name)
            .map(|e| e.stream_id))
    }

    async fn is_opposing_party(&self, name: &str) -> Result<bool, DomainError> {
        Ok(self.opened().await.iter().any(|m| m.opposing_party == name))
    }

    async fn find_duplicate(
        &self,
        fingerprint: &MatterFingerprint,
    ) -> Result<Option<AggregateId>, DomainError> {
        Ok(self
            .opened()
            .await
            .into_iter()
            .find(|m| {
                m.client_id == fingerprint.client_id
                    && m.opposing_party == fingerprint.opposing_party
                    && m.case_type == fingerprint.case_type
                    && m.initial_claim_amount == fingerprint.claim_amount
            })
            .map(|m| m.matter_id))
    }

    async fn matter_status(
        &self,
        matter_id: AggregateId,
    ) -> Result<Option<(MatterStatus, Version)>, DomainError> {
        let envelopes = self.store.read_stream(matter_id).await?;
        let matter: Matter = rehydrate(&envelopes)?;
        Ok(matter.id().map(|_| (matter.status(), matter.version())))
    }
}

struct Fixture {
    store: InMemoryEventStore,
    clients: ClientService<InMemoryEventStore, ReplayDirectory>,
    matters: MatterService<InMemoryEventStore, ReplayDirectory>,
}

fn fixture() -> Fixture {
    let store = InMemoryEventStore::new();
    let directory = ReplayDirectory {
        store: store.clone(),
    };
    Fixture {
        clients: ClientService::new(store.clone(), directory.clone()),
        matters: MatterService::new(store.clone(), directory),
        store,
    }
}

async fn register(fixture: &Fixture, name: &str) -> AggregateId {
    fixture
        .clients
        .register(RegisterClient::new(name))
        .await
        .unwrap()
        .aggregate
        .id()
        .unwrap()
}

fn open(client_id: AggregateId, opposing: &str, units: i64) -> OpenMatter {
    OpenMatter::new(
        client_id,
        opposing,
        CaseType::PersonalInjury,
        Money::from_units(units),
    )
}

mod clients {
    use super::*;

    #[tokio::test]
    async fn register_trims_name() {
        let fixture = fixture();
        let result = fixture
            .clients
            .register(RegisterClient::new("  Acme Corp  "))
            .await
            .unwrap();

        assert_eq!(result.aggregate.name(), "Acme Corp");
        assert_eq!(result.new_version, Version::first());
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let fixture = fixture();
        register(&fixture, "Acme Corp").await;

        let result = fixture
            .clients
            .register(RegisterClient::new("Acme Corp "))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::BusinessRule(
                BusinessRuleViolation::DuplicateClientName { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn blank_name_is_a_validation_error() {
        let fixture = fixture();
        let result = fixture.clients.register(RegisterClient::new("   ")).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(fixture.store.event_count().await, 0);
    }
}

mod intake {
    use super::*;

    #[tokio::test]
    async fn open_matter_for_existing_client() {
        let fixture = fixture();
        let client_id = register(&fixture, "Jane Doe").await;

        let result = fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 50_000))
            .await
            .unwrap();

        assert_eq!(result.events.len(), 1);
        assert_eq!(result.aggregate.status(), MatterStatus::New);
        assert_eq!(result.aggregate.client_name(), "Jane Doe");
        assert!(!result.aggregate.is_high_priority());
    }

    #[tokio::test]
    async fn large_claim_is_tagged_in_same_commit() {
        let fixture = fixture();
        let client_id = register(&fixture, "Jane Doe").await;

        let result = fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 1_500_000))
            .await
            .unwrap();

        assert_eq!(result.new_version, Version::new(2));
        let types: Vec<_> = result.events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["MatterOpened", "MatterTaggedAsHighPriority"]);
        let sequences: Vec<_> = result
            .envelopes
            .iter()
            .map(|e| e.global_sequence.as_i64())
            .collect();
        assert_eq!(sequences, vec![2, 3]);
    }

    #[tokio::test]
    async fn unknown_client_is_not_found() {
        let fixture = fixture();
        let result = fixture
            .matters
            .open_matter(open(AggregateId::new(), "MegaCorp", 10))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::NotFound {
                aggregate_type: "Client",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn opposing_party_that_is_a_client_conflicts() {
        let fixture = fixture();
        let client_id = register(&fixture, "Jane Doe").await;
        register(&fixture, "MegaCorp").await;

        let result = fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 10))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::BusinessRule(
                BusinessRuleViolation::ConflictOfInterest { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn client_adverse_in_another_matter_conflicts() {
        let fixture = fixture();
        let jane = register(&fixture, "Jane Doe").await;
        fixture
            .matters
            .open_matter(open(jane, "Bob Smith", 10))
            .await
            .unwrap();

        let bob = register(&fixture, "Bob Smith").await;
        let result = fixture
            .matters
            .open_matter(open(bob, "Someone Else", 10))
            .await;

        match result {
            Err(DomainError::BusinessRule(BusinessRuleViolation::ConflictOfInterest {
                party,
                ..
            })) => assert_eq!(party, "Bob Smith"),
            other => panic!("expected conflict of interest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_requires_confirmation() {
        let fixture = fixture();
        let client_id = register(&fixture, "Jane Doe").await;
        let first = fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 50_000))
            .await
            .unwrap();

        let warning = fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 50_000))
            .await;
        match warning {
            Err(DomainError::DuplicateWarning { existing_matter_id }) => {
                assert_eq!(Some(existing_matter_id), first.aggregate.id());
            }
            other => panic!("expected duplicate warning, got {other:?}"),
        }

        let confirmed = fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 50_000).confirm_duplicate())
            .await
            .unwrap();
        assert_ne!(confirmed.aggregate.id(), first.aggregate.id());
    }

    #[tokio::test]
    async fn different_amount_is_not_a_duplicate() {
        let fixture = fixture();
        let client_id = register(&fixture, "Jane Doe").await;
        fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 50_000))
            .await
            .unwrap();

        fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 60_000))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_positive_claim_writes_nothing() {
        let fixture = fixture();
        let client_id = register(&fixture, "Jane Doe").await;

        let result = fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 0))
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(fixture.store.event_count().await, 1);
    }

    #[tokio::test]
    async fn claims_summing_past_i64_are_bounded() {
        let fixture = fixture();
        let client_id = register(&fixture, "Jane Doe").await;

        let mut huge = open(client_id, "MegaCorp", 0);
        huge.initial_claim_amount = Money::from_cents(i64::MAX);
        let result = fixture.matters.open_matter(huge).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));

        let mut largest = open(client_id, "MegaCorp", 0);
        largest.initial_claim_amount = MAX_AMOUNT;
        fixture.matters.open_matter(largest).await.unwrap();
        assert_eq!(fixture.store.event_count().await, 3);
    }
}

mod lifecycle {
    use super::*;

    async fn opened(fixture: &Fixture) -> AggregateId {
        let client_id = register(fixture, "Jane Doe").await;
        fixture
            .matters
            .open_matter(open(client_id, "MegaCorp", 50_000))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap()
    }

    #[tokio::test]
    async fn status_change_is_published_to_outbox() {
        let fixture = fixture();
        let matter_id = opened(&fixture).await;

        let (version, envelopes) = fixture
            .matters
            .update_status(UpdateStatus::new(
                matter_id,
                MatterStatus::Discovery,
                "Evidence phase",
            ))
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        assert_eq!(envelopes[0].payload["old_status"], "New");
        assert_eq!(envelopes[0].payload["new_status"], "Discovery");

        let outbox = fixture.store.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].event_id(), envelopes[0].event_id);
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let fixture = fixture();
        let matter_id = opened(&fixture).await;

        fixture
            .matters
            .update_status(UpdateStatus::new(matter_id, MatterStatus::Active, "go"))
            .await
            .unwrap();

        let stale = fixture
            .matters
            .update_status(
                UpdateStatus::new(matter_id, MatterStatus::Closed, "late")
                    .expecting(Version::first()),
            )
            .await;
        assert!(matches!(stale, Err(DomainError::ConcurrencyConflict { .. })));
        assert!(stale.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn status_of_unknown_matter_is_not_found() {
        let fixture = fixture();
        let result = fixture
            .matters
            .update_status(UpdateStatus::new(
                AggregateId::new(),
                MatterStatus::Active,
                "x",
            ))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::NotFound {
                aggregate_type: "Matter",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn attorney_assignment_activates_matter() {
        let fixture = fixture();
        let matter_id = opened(&fixture).await;

        let result = fixture
            .matters
            .assign_attorney(AssignAttorney::new(matter_id, AttorneyId::new()))
            .await
            .unwrap();
        assert_eq!(result.aggregate.status(), MatterStatus::Active);

        let loaded = fixture.matters.get_matter(matter_id).await.unwrap().unwrap();
        assert_eq!(loaded.version(), Version::new(2));
    }

    #[tokio::test]
    async fn commands_on_unknown_matter_are_not_found() {
        let fixture = fixture();
        let result = fixture
            .matters
            .record_settlement_offer(RecordSettlementOffer::new(
                AggregateId::new(),
                Money::from_units(100),
            ))
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn submit_routes_every_command() {
        let fixture = fixture();
        let client_id = register(&fixture, "Jane Doe").await;
        let cmd = open(client_id, "MegaCorp", 50_000);
        let matter_id = cmd.matter_id;

        let commands: Vec<MatterCommand> = vec![
            cmd.into(),
            AssignAttorney::new(matter_id, AttorneyId::new()).into(),
            RecordSettlementOffer::new(matter_id, Money::from_units(25_000)).into(),
            UpdateStatus::new(matter_id, MatterStatus::Settled, "Accepted").into(),
        ];
        for command in commands {
            assert_eq!(command.matter_id(), matter_id);
            let envelopes = fixture.matters.submit(command).await.unwrap();
            assert_eq!(envelopes.len(), 1);
        }

        let matter = fixture.matters.get_matter(matter_id).await.unwrap().unwrap();
        assert_eq!(matter.status(), MatterStatus::Settled);
        assert_eq!(matter.latest_settlement_offer(), Some(Money::from_units(25_000)));
        assert_eq!(matter.version(), Version::new(4));
    }
}
