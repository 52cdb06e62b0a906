//! Client details read document.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, Client, ClientEvent};
use event_store::{EventEnvelope, Version};
use serde::{Deserialize, Serialize};

use crate::projection::SingleStreamProjection;

/// Collection holding one [`ClientDetails`] per client stream.
pub const CLIENT_DETAILS: &str = "client_details";

/// Inline read document of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientDetails {
    pub id: AggregateId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub version: Version,
}

/// Maintains [`ClientDetails`] from the client stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientDetailsProjection;

impl SingleStreamProjection for ClientDetailsProjection {
    type Event = ClientEvent;
    type Document = ClientDetails;

    fn name(&self) -> &'static str {
        "ClientDetailsProjection"
    }

    fn collection(&self) -> &'static str {
        CLIENT_DETAILS
    }

    fn stream_type(&self) -> &'static str {
        Client::aggregate_type()
    }

    fn accepts(&self, event_type: &str) -> bool {
        event_type == "ClientCreated"
    }

    fn create(&self, event: &ClientEvent, envelope: &EventEnvelope) -> Option<ClientDetails> {
        match event {
            ClientEvent::ClientCreated(data) => Some(ClientDetails {
                id: data.client_id,
                name: data.name.clone(),
                created_at: data.occurred_at,
                version: envelope.stream_version,
            }),
        }
    }

    fn apply(
        &self,
        _current: &ClientDetails,
        event: &ClientEvent,
        _envelope: &EventEnvelope,
    ) -> Option<ClientDetails> {
        match event {
            // A client stream is created once.
            ClientEvent::ClientCreated(_) => None,
        }
    }
}
