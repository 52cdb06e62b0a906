//! Matter service: intake and lifecycle commands.

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};

use crate::aggregate::Aggregate;
use crate::client::Client;
use crate::command::{CommandHandler, CommandResult};
use crate::directory::{MatterDirectory, MatterFingerprint};
use crate::error::{BusinessRuleViolation, DomainError};

use super::{
    AssignAttorney, Matter, MatterCommand, MatterError, MatterEvent, OpenMatter, OpenMatterInput,
    RecordSettlementOffer, UpdateStatus, check_amount, status_changed,
};

impl From<MatterError> for DomainError {
    fn from(e: MatterError) -> Self {
        match e {
            MatterError::NotFound(id) => DomainError::NotFound {
                aggregate_type: Matter::aggregate_type(),
                id,
            },
            other => DomainError::Validation(other.to_string()),
        }
    }
}

/// Service for managing matters.
///
/// Wraps the command handlers for matters and clients, plus the read-side
/// directory used for conflict, duplicate and status lookups.
pub struct MatterService<S: EventStore + Clone, D: MatterDirectory> {
    matters: CommandHandler<S, Matter>,
    clients: CommandHandler<S, Client>,
    directory: D,
}

impl<S: EventStore + Clone, D: MatterDirectory> MatterService<S, D> {
    /// Creates a new matter service with the given event store and directory.
    pub fn new(store: S, directory: D) -> Self {
        Self {
            matters: CommandHandler::new(store.clone()),
            clients: CommandHandler::new(store),
            directory,
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Matter> {
        &self.matters
    }

    /// Submits any matter command and returns the committed envelopes.
    pub async fn submit(&self, command: MatterCommand) -> Result<Vec<EventEnvelope>, DomainError> {
        match command {
            MatterCommand::OpenMatter(cmd) => Ok(self.open_matter(cmd).await?.envelopes),
            MatterCommand::UpdateStatus(cmd) => Ok(self.update_status(cmd).await?.1),
            MatterCommand::AssignAttorney(cmd) => Ok(self.assign_attorney(cmd).await?.envelopes),
            MatterCommand::RecordSettlementOffer(cmd) => {
                Ok(self.record_settlement_offer(cmd).await?.envelopes)
            }
        }
    }

    /// Opens a matter for an existing client.
    ///
    /// Rejects conflicts of interest, and unconfirmed duplicates with a
    /// `DuplicateWarning`. Large claims are tagged high priority in the
    /// same commit.
    #[tracing::instrument(skip(self), fields(matter_id = %cmd.matter_id))]
    pub async fn open_matter(&self, cmd: OpenMatter) -> Result<CommandResult<Matter>, DomainError> {
        check_amount("initial_claim_amount", cmd.initial_claim_amount)?;

        let client = self.clients.load(cmd.client_id).await?;
        let opposing_party = cmd.opposing_party.trim();

        if self.directory.client_named(opposing_party).await?.is_some() {
            return Err(BusinessRuleViolation::ConflictOfInterest {
                party: opposing_party.to_string(),
                reason: "is an existing client",
            }
            .into());
        }
        if self.directory.is_opposing_party(client.name()).await? {
            return Err(BusinessRuleViolation::ConflictOfInterest {
                party: client.name().to_string(),
                reason: "is an opposing party in another matter",
            }
            .into());
        }

        if !cmd.confirm_duplicate {
            let fingerprint = MatterFingerprint {
                client_id: cmd.client_id,
                opposing_party: opposing_party.to_string(),
                case_type: cmd.case_type,
                claim_amount: cmd.initial_claim_amount,
            };
            if let Some(existing_matter_id) = self.directory.find_duplicate(&fingerprint).await? {
                return Err(DomainError::DuplicateWarning { existing_matter_id });
            }
        }

        let input = OpenMatterInput {
            matter_id: cmd.matter_id,
            client_id: cmd.client_id,
            client_name: client.name().to_string(),
            opposing_party: opposing_party.to_string(),
            case_type: cmd.case_type,
            initial_claim_amount: cmd.initial_claim_amount,
        };
        let result = self
            .matters
            .execute(cmd.matter_id, |matter| matter.open(input))
            .await?;

        metrics::counter!("matters_opened_total").increment(1);
        if result.aggregate.is_high_priority() {
            metrics::counter!("matters_high_priority_total").increment(1);
        }
        tracing::info!(
            high_priority = result.aggregate.is_high_priority(),
            "matter opened"
        );
        Ok(result)
    }

    /// Appends a published status change.
    ///
    /// The old status and expected version come from the matter's read
    /// document unless the caller supplies the version it observed.
    #[tracing::instrument(skip(self), fields(matter_id = %cmd.matter_id))]
    pub async fn update_status(
        &self,
        cmd: UpdateStatus,
    ) -> Result<(Version, Vec<EventEnvelope>), DomainError> {
        let (old_status, read_version) = self
            .directory
            .matter_status(cmd.matter_id)
            .await?
            .ok_or(MatterError::NotFound(cmd.matter_id))?;
        let expected = cmd.expected_version.unwrap_or(read_version);

        let event = status_changed(cmd.matter_id, old_status, cmd.new_status, cmd.reason);
        let committed = self
            .matters
            .append_events(
                cmd.matter_id,
                &[event],
                AppendOptions::expect_version(expected),
            )
            .await?;

        metrics::counter!("matter_status_changes_total", "status" => cmd.new_status.as_str())
            .increment(1);
        tracing::info!(%old_status, new_status = %cmd.new_status, "matter status changed");
        Ok(committed)
    }

    /// Assigns an attorney; a new matter becomes active.
    #[tracing::instrument(skip(self))]
    pub async fn assign_attorney(
        &self,
        cmd: AssignAttorney,
    ) -> Result<CommandResult<Matter>, DomainError> {
        let attorney_id = cmd.attorney_id;
        self.execute_existing(cmd.matter_id, |matter| matter.assign_attorney(attorney_id))
            .await
    }

    /// Records a settlement offer.
    #[tracing::instrument(skip(self))]
    pub async fn record_settlement_offer(
        &self,
        cmd: RecordSettlementOffer,
    ) -> Result<CommandResult<Matter>, DomainError> {
        let amount = cmd.amount;
        self.execute_existing(cmd.matter_id, |matter| matter.record_settlement_offer(amount))
            .await
    }

    /// Loads a matter by ID.
    ///
    /// Returns None if the matter doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_matter(&self, matter_id: AggregateId) -> Result<Option<Matter>, DomainError> {
        self.matters.load_existing(matter_id).await
    }

    async fn execute_existing<F>(
        &self,
        matter_id: AggregateId,
        decide: F,
    ) -> Result<CommandResult<Matter>, DomainError>
    where
        F: FnOnce(&Matter) -> Result<Vec<MatterEvent>, MatterError>,
    {
        self.matters
            .execute(matter_id, |matter| match matter.id() {
                Some(_) => decide(matter),
                None => Err(MatterError::NotFound(matter_id)),
            })
            .await
    }
}
