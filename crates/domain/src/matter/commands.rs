//! Matter commands.

use common::AggregateId;
use event_store::Version;

use crate::command::Command;

use super::{AttorneyId, CaseType, Matter, MatterStatus, Money};

/// Command to open a new matter for an existing client.
#[derive(Debug, Clone)]
pub struct OpenMatter {
    /// The matter ID to create.
    pub matter_id: AggregateId,

    pub client_id: AggregateId,
    pub opposing_party: String,
    pub case_type: CaseType,
    pub initial_claim_amount: Money,

    /// Proceed even if an identical matter already exists.
    pub confirm_duplicate: bool,
}

impl OpenMatter {
    /// Creates an unconfirmed OpenMatter command with a generated matter ID.
    pub fn new(
        client_id: AggregateId,
        opposing_party: impl Into<String>,
        case_type: CaseType,
        initial_claim_amount: Money,
    ) -> Self {
        Self {
            matter_id: AggregateId::new(),
            client_id,
            opposing_party: opposing_party.into(),
            case_type,
            initial_claim_amount,
            confirm_duplicate: false,
        }
    }

    /// Marks a possible duplicate as intentional.
    pub fn confirm_duplicate(mut self) -> Self {
        self.confirm_duplicate = true;
        self
    }
}

impl Command for OpenMatter {
    type Aggregate = Matter;

    fn aggregate_id(&self) -> AggregateId {
        self.matter_id
    }
}

/// Command to move a matter to another status.
#[derive(Debug, Clone)]
pub struct UpdateStatus {
    pub matter_id: AggregateId,
    pub new_status: MatterStatus,
    pub reason: String,

    /// Version the caller last observed. Defaults to the read model's version.
    pub expected_version: Option<Version>,
}

impl UpdateStatus {
    pub fn new(matter_id: AggregateId, new_status: MatterStatus, reason: impl Into<String>) -> Self {
        Self {
            matter_id,
            new_status,
            reason: reason.into(),
            expected_version: None,
        }
    }

    /// Fails the update if the stream is no longer at `version`.
    pub fn expecting(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }
}

impl Command for UpdateStatus {
    type Aggregate = Matter;

    fn aggregate_id(&self) -> AggregateId {
        self.matter_id
    }
}

/// Command to assign an attorney to a matter.
#[derive(Debug, Clone)]
pub struct AssignAttorney {
    pub matter_id: AggregateId,
    pub attorney_id: AttorneyId,
}

impl AssignAttorney {
    pub fn new(matter_id: AggregateId, attorney_id: AttorneyId) -> Self {
        Self {
            matter_id,
            attorney_id,
        }
    }
}

impl Command for AssignAttorney {
    type Aggregate = Matter;

    fn aggregate_id(&self) -> AggregateId {
        self.matter_id
    }
}

/// Command to record a settlement offer.
#[derive(Debug, Clone)]
pub struct RecordSettlementOffer {
    pub matter_id: AggregateId,
    pub amount: Money,
}

impl RecordSettlementOffer {
    pub fn new(matter_id: AggregateId, amount: Money) -> Self {
        Self { matter_id, amount }
    }
}

impl Command for RecordSettlementOffer {
    type Aggregate = Matter;

    fn aggregate_id(&self) -> AggregateId {
        self.matter_id
    }
}

/// Any command accepted by the matter submission interface.
#[derive(Debug, Clone)]
pub enum MatterCommand {
    OpenMatter(OpenMatter),
    UpdateStatus(UpdateStatus),
    AssignAttorney(AssignAttorney),
    RecordSettlementOffer(RecordSettlementOffer),
}

impl MatterCommand {
    /// Returns the matter the command targets.
    pub fn matter_id(&self) -> AggregateId {
        match self {
            MatterCommand::OpenMatter(cmd) => cmd.aggregate_id(),
            MatterCommand::UpdateStatus(cmd) => cmd.aggregate_id(),
            MatterCommand::AssignAttorney(cmd) => cmd.aggregate_id(),
            MatterCommand::RecordSettlementOffer(cmd) => cmd.aggregate_id(),
        }
    }
}

impl From<OpenMatter> for MatterCommand {
    fn from(cmd: OpenMatter) -> Self {
        MatterCommand::OpenMatter(cmd)
    }
}

impl From<UpdateStatus> for MatterCommand {
    fn from(cmd: UpdateStatus) -> Self {
        MatterCommand::UpdateStatus(cmd)
    }
}

impl From<AssignAttorney> for MatterCommand {
    fn from(cmd: AssignAttorney) -> Self {
        MatterCommand::AssignAttorney(cmd)
    }
}

impl From<RecordSettlementOffer> for MatterCommand {
    fn from(cmd: RecordSettlementOffer) -> Self {
        MatterCommand::RecordSettlementOffer(cmd)
    }
}
