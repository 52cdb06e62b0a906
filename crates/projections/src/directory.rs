//! Intake lookups answered from the inline read documents.

use async_trait::async_trait;
use common::AggregateId;
use domain::{DomainError, MatterDirectory, MatterFingerprint, MatterStatus};
use event_store::{EventStore, EventStoreExt, Version};
use serde::de::DeserializeOwned;

use crate::views::{CLIENT_DETAILS, ClientDetails, MATTER_DETAILS, MatterDetails};

/// [`MatterDirectory`] over `client_details` and `matter_details`.
///
/// Documents are written in the append transaction, so answers reflect every
/// committed command.
#[derive(Debug, Clone)]
pub struct DocumentDirectory<S> {
    store: S,
}

impl<S: EventStore> DocumentDirectory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn all<T: DeserializeOwned + Send>(&self, collection: &str) -> Result<Vec<T>, DomainError> {
        self.store
            .list_documents(collection)
            .await?
            .into_iter()
            .map(|body| serde_json::from_value(body).map_err(DomainError::from))
            .collect()
    }
}

#[async_trait]
impl<S: EventStore> MatterDirectory for DocumentDirectory<S> {
    async fn client_named(&self, name: &str) -> Result<Option<AggregateId>, DomainError> {
        let clients: Vec<ClientDetails> = self.all(CLIENT_DETAILS).await?;
        Ok(clients.into_iter().find(|c| c.name == name).map(|c| c.id))
    }

    async fn is_opposing_party(&self, name: &str) -> Result<bool, DomainError> {
        let matters: Vec<MatterDetails> = self.all(MATTER_DETAILS).await?;
        Ok(matters.iter().any(|m| m.opposing_party == name))
    }

    async fn find_duplicate(
        &self,
        fingerprint: &MatterFingerprint,
    ) -> Result<Option<AggregateId>, DomainError> {
        let matters: Vec<MatterDetails> = self.all(MATTER_DETAILS).await?;
        Ok(matters
            .into_iter()
            .find(|m| {
                m.client_id == fingerprint.client_id
                    && m.opposing_party == fingerprint.opposing_party
                    && m.case_type == fingerprint.case_type
                    && m.current_claim_amount == fingerprint.claim_amount
            })
            .map(|m| m.id))
    }

    async fn matter_status(
        &self,
        matter_id: AggregateId,
    ) -> Result<Option<(MatterStatus, Version)>, DomainError> {
        let details: Option<MatterDetails> = self
            .store
            .load_typed(MATTER_DETAILS, matter_id.as_uuid())
            .await?;
        Ok(details.map(|d| (d.status, d.version)))
    }
}
