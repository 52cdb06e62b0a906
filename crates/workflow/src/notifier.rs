//! Outbound client notifications.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use tokio::sync::Mutex;

use crate::error::{Result, WorkflowError};

/// Channel used to tell a client about progress on their matter.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, matter_id: AggregateId, notification_type: &str) -> Result<()>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, matter_id: AggregateId, notification_type: &str) -> Result<()> {
        tracing::info!(%matter_id, notification_type, "[SIMULATED EMAIL] client notified");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordedNotifications {
    sent: Vec<(AggregateId, String)>,
    fail: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<Mutex<RecordedNotifications>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent notifications fail until reset.
    pub async fn set_failing(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }

    /// Notifications sent so far, oldest first.
    pub async fn sent(&self) -> Vec<(AggregateId, String)> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, matter_id: AggregateId, notification_type: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(WorkflowError::Notification("mail server unavailable".to_string()));
        }
        state.sent.push((matter_id, notification_type.to_string()));
        Ok(())
    }
}
