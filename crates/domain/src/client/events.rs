//! Client domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a client stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    /// Client was registered.
    ClientCreated(ClientCreatedData),
}

impl DomainEvent for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ClientCreated(_) => "ClientCreated",
        }
    }
}

/// Data for ClientCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCreatedData {
    pub client_id: AggregateId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}
