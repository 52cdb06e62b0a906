//! Reactive workflows driven by the transactional outbox.
//!
//! Events appended with the publish flag get an outbox marker in the same
//! commit. The [`OutboxRelay`] polls those markers and hands each event to
//! the [`Dispatcher`], which runs every [`WorkflowHandler`] interested in
//! it. Delivery is at least once; duplicates are dropped by event id in the
//! dispatcher and by causation id inside each workflow.
//!
//! The only workflow today is [`DiscoveryWorkflow`]: when a matter moves to
//! discovery it records a task for the assigned attorney and notifies the
//! client.

pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod notifier;
pub mod relay;

pub use discovery::{DISCOVERY_WORKFLOW, DiscoveryWorkflow};
pub use dispatcher::{DEFAULT_DEDUP_WINDOW, Delivery, Dispatcher, RetryPolicy};
pub use error::{Result, WorkflowError};
pub use handler::WorkflowHandler;
pub use notifier::{LogNotifier, Notifier, RecordingNotifier};
pub use relay::{OutboxRelay, RelayConfig, RelayHandle, RelayStats};
