//! Client aggregate and registration.

mod aggregate;
mod events;
mod service;

pub use aggregate::{Client, RegisterClient};
pub use events::{ClientCreatedData, ClientEvent};
pub use service::ClientService;

use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Client name is required.
    #[error("Client name is required")]
    NameRequired,

    /// The client stream already exists.
    #[error("Client already created")]
    AlreadyCreated,
}
