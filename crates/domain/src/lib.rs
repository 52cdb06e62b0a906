//! Domain layer for case intake and matter tracking.
//!
//! This crate provides the core domain abstractions including:
//! - Aggregate trait and the stream rehydrator
//! - DomainEvent trait for domain events
//! - Command trait and CommandHandler for command processing
//! - Client and Matter aggregates with their services
//! - The read-side directory port used for intake checks

pub mod aggregate;
pub mod client;
pub mod command;
pub mod directory;
pub mod error;
pub mod matter;

pub use aggregate::{Aggregate, DomainEvent};
pub use client::{Client, ClientError, ClientEvent, ClientService, RegisterClient};
pub use command::{Command, CommandHandler, CommandResult, rehydrate};
pub use directory::{MatterDirectory, MatterFingerprint};
pub use error::{BusinessRuleViolation, DomainError};
pub use matter::{
    AssignAttorney, AttorneyId, CaseType, MAX_AMOUNT, Matter, MatterCommand, MatterError,
    MatterEvent, MatterService, MatterStatus, Money, OpenMatter, RecordSettlementOffer, UpdateStatus,
};
