//! Client aggregate implementation.

use chrono::Utc;
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::command::Command;

use super::{ClientCreatedData, ClientError, ClientEvent};

/// Client aggregate root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Client {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    name: String,
}

impl Aggregate for Client {
    type Event = ClientEvent;
    type Error = ClientError;

    fn aggregate_type() -> &'static str {
        "Client"
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
            ClientEvent::ClientCreated(data) => {
                self.id = Some(data.client_id);
                self.name = data.name;
            }
        }
    }
}

impl Client {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the client under a trimmed, non-empty name.
    pub fn create(&self, client_id: AggregateId, name: &str) -> Result<Vec<ClientEvent>, ClientError> {
        if self.id.is_some() {
            return Err(ClientError::AlreadyCreated);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::NameRequired);
        }

        Ok(vec![ClientEvent::ClientCreated(ClientCreatedData {
            client_id,
            name: name.to_string(),
            occurred_at: Utc::now(),
        })])
    }
}

/// Command to register a new client.
#[derive(Debug, Clone)]
pub struct RegisterClient {
    pub client_id: AggregateId,
    pub name: String,
}

impl RegisterClient {
    /// Creates a RegisterClient command with a generated client ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            client_id: AggregateId::new(),
            name: name.into(),
        }
    }
}

impl Command for RegisterClient {
    type Aggregate = Client;

    fn aggregate_id(&self) -> AggregateId {
        self.client_id
    }
}
