//! Matter aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod status;
mod value_objects;

pub use aggregate::{
    DISCOVERY_NOTIFICATION, DISCOVERY_TASK_ASSIGNEE, DISCOVERY_TASK_DESCRIPTION,
    DISCOVERY_TASK_DUE_DAYS, HIGH_PRIORITY_THRESHOLD, MAX_AMOUNT, Matter, OpenMatterInput,
    check_amount, discovery_follow_up, status_changed,
};
pub use commands::*;
pub use events::{
    AttorneyAssignedData, ClientNotificationSentData, MatterEvent, MatterOpenedData,
    MatterTaggedAsHighPriorityData, SettlementOfferReceivedData, StatusChangedData,
    TaskCreatedData,
};
pub use service::MatterService;
pub use status::{CaseType, MatterStatus};
pub use value_objects::{AttorneyId, Money};

use common::AggregateId;
use thiserror::Error;

/// Errors that can occur during matter operations.
#[derive(Debug, Error)]
pub enum MatterError {
    /// The matter stream has not been opened.
    #[error("Matter has not been opened")]
    NotOpened,

    /// The targeted matter does not exist.
    #[error("Matter not found: {0}")]
    NotFound(AggregateId),

    /// The matter stream already exists.
    #[error("Matter already opened")]
    AlreadyOpened,

    /// An amount was not positive or exceeded the allowed maximum.
    #[error("Invalid {field}: {amount} (must be greater than 0 and at most {max})", max = MAX_AMOUNT)]
    InvalidAmount { field: &'static str, amount: Money },

    /// A required field was blank.
    #[error("{0} is required")]
    MissingField(&'static str),
}
