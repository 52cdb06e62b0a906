//! Read-side lookups the command handlers depend on.
//!
//! Implemented over the inline read documents by the projections crate.

use async_trait::async_trait;
use common::AggregateId;
use event_store::Version;

use crate::error::DomainError;
use crate::matter::{CaseType, MatterStatus, Money};

/// The fields that make two matters duplicates of each other.
#[derive(Debug, Clone, PartialEq)]
pub struct MatterFingerprint {
    pub client_id: AggregateId,
    pub opposing_party: String,
    pub case_type: CaseType,
    pub claim_amount: Money,
}

#[async_trait]
pub trait MatterDirectory: Send + Sync {
    /// Finds a registered client by exact name.
    async fn client_named(&self, name: &str) -> Result<Option<AggregateId>, DomainError>;

    /// Returns true if `name` is the opposing party of any matter.
    async fn is_opposing_party(&self, name: &str) -> Result<bool, DomainError>;

    /// Finds an existing matter with the same fingerprint.
    async fn find_duplicate(
        &self,
        fingerprint: &MatterFingerprint,
    ) -> Result<Option<AggregateId>, DomainError>;

    /// Current status and stream version of a matter, from its read document.
    async fn matter_status(
        &self,
        matter_id: AggregateId,
    ) -> Result<Option<(MatterStatus, Version)>, DomainError>;
}
