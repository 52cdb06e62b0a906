//! Client service providing the registration API.

use common::AggregateId;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::directory::MatterDirectory;
use crate::error::{BusinessRuleViolation, DomainError};

use super::{Client, ClientError, RegisterClient};

impl From<ClientError> for DomainError {
    fn from(e: ClientError) -> Self {
        DomainError::Validation(e.to_string())
    }
}

/// Service for registering and loading clients.
pub struct ClientService<S: EventStore, D: MatterDirectory> {
    handler: CommandHandler<S, Client>,
    directory: D,
}

impl<S: EventStore, D: MatterDirectory> ClientService<S, D> {
    /// Creates a new client service.
    pub fn new(store: S, directory: D) -> Self {
        Self {
            handler: CommandHandler::new(store),
            directory,
        }
    }

    /// Registers a client. Names are trimmed and must be unique.
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, cmd: RegisterClient) -> Result<CommandResult<Client>, DomainError> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(ClientError::NameRequired.into());
        }
        if self.directory.client_named(name).await?.is_some() {
            return Err(BusinessRuleViolation::DuplicateClientName {
                name: name.to_string(),
            }
            .into());
        }

        let client_id = cmd.client_id;
        let result = self
            .handler
            .execute(client_id, |client| client.create(client_id, name))
            .await?;

        metrics::counter!("clients_registered_total").increment(1);
        tracing::info!(%client_id, "client registered");
        Ok(result)
    }

    /// Loads a client by ID.
    ///
    /// Returns None if the client doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_client(&self, client_id: AggregateId) -> Result<Option<Client>, DomainError> {
        self.handler.load_existing(client_id).await
    }
}
