//! Moves published events from the outbox to the dispatcher.
//!
//! Each poll takes a batch of pending messages and delivers them with at
//! most `max_in_flight` running at once. A delivered message is acked; one
//! whose retries ran out is dead-lettered with the last error and the number
//! of attempts made. A delivery task that dies records one attempt and stays
//! pending until the retry budget is spent. Anything left pending, for
//! example after a crash between handling and ack, is delivered again on a
//! later poll.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use event_store::{EventId, EventStore};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::dispatcher::{Delivery, Dispatcher};
use crate::error::{Result, WorkflowError};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Sleep between polls when the outbox is empty.
    pub poll_interval: Duration,
    /// Pending messages fetched per poll.
    pub batch_size: usize,
    /// Deliveries running concurrently.
    pub max_in_flight: usize,
    pub max_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            batch_size: 50,
            max_in_flight: 5,
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Counts from one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: usize,
    pub duplicates: usize,
    pub dead_lettered: usize,
    /// Left pending after a failed attempt.
    pub failed: usize,
}

impl RelayStats {
    pub fn processed(&self) -> usize {
        self.delivered + self.duplicates + self.dead_lettered
    }
}

pub struct OutboxRelay<S> {
    store: Arc<S>,
    dispatcher: Arc<Dispatcher>,
    config: RelayConfig,
    permits: Arc<Semaphore>,
}

impl<S: EventStore + 'static> OutboxRelay<S> {
    pub fn new(store: S, dispatcher: Dispatcher) -> Self {
        let config = RelayConfig::default();
        Self {
            store: Arc::new(store),
            dispatcher: Arc::new(dispatcher),
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
        }
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        self.config = config;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Delivers one batch of pending messages and settles each of them.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RelayStats> {
        let pending = self.store.pending_outbox(self.config.batch_size).await?;
        let mut deliveries = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, EventId> = HashMap::new();

        for message in pending {
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|_| WorkflowError::RelayClosed)?;
            let dispatcher = Arc::clone(&self.dispatcher);
            let event_id = message.event_id();
            let task = deliveries.spawn(async move {
                let _permit = permit;
                dispatcher.dispatch(&message.envelope).await
            });
            in_flight.insert(task.id(), event_id);
        }

        let mut stats = RelayStats::default();
        while let Some(joined) = deliveries.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, outcome)) => (task_id, outcome),
                Err(e) => (e.id(), Err(WorkflowError::TaskFailed(e.to_string()))),
            };
            let Some(event_id) = in_flight.remove(&task_id) else {
                continue;
            };
            match outcome {
                Ok(delivery) => {
                    self.store.ack_outbox(event_id).await?;
                    if delivery == Delivery::Duplicate {
                        stats.duplicates += 1;
                    } else {
                        stats.delivered += 1;
                    }
                }
                Err(WorkflowError::RetriesExhausted {
                    attempts,
                    last_error,
                    ..
                }) => {
                    self.store
                        .record_outbox_attempt(event_id, attempts, &last_error)
                        .await?;
                    self.dead_letter(event_id, attempts, &last_error).await?;
                    stats.dead_lettered += 1;
                }
                Err(e) => {
                    let reason = e.to_string();
                    let attempts = self.store.record_outbox_attempt(event_id, 1, &reason).await?;
                    if attempts >= self.dispatcher.retry_policy().max_attempts {
                        self.dead_letter(event_id, attempts, &reason).await?;
                        stats.dead_lettered += 1;
                    } else {
                        tracing::warn!(%event_id, attempts, error = %reason, "outbox delivery failed, will retry");
                        stats.failed += 1;
                    }
                }
            }
        }

        if stats.processed() > 0 || stats.failed > 0 {
            tracing::debug!(?stats, "outbox batch settled");
        }
        Ok(stats)
    }

    async fn dead_letter(&self, event_id: EventId, attempts: u32, reason: &str) -> Result<()> {
        self.store.dead_letter_outbox(event_id, reason).await?;
        metrics::counter!("workflow_dead_lettered_total").increment(1);
        tracing::error!(%event_id, attempts, error = %reason, "outbox message dead-lettered");
        Ok(())
    }

    /// Starts polling on a background task.
    pub fn spawn(self) -> RelayHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        RelayHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.config.poll_interval;
        tracing::info!(
            max_in_flight = self.config.max_in_flight,
            workflows = ?self.dispatcher.workflows(),
            "outbox relay started"
        );

        while !*shutdown.borrow() {
            let delay = match self.run_once().await {
                Ok(stats) if stats.processed() > 0 => {
                    backoff = self.config.poll_interval;
                    Duration::ZERO
                }
                Ok(_) => {
                    backoff = self.config.poll_interval;
                    self.config.poll_interval
                }
                Err(e) => {
                    tracing::error!(error = %e, ?backoff, "outbox poll failed");
                    let delay = backoff;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                    delay
                }
            };

            if delay.is_zero() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("outbox relay stopped");
    }
}

/// Handle to a spawned [`OutboxRelay`].
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Signals the loop and waits for the batch in progress to settle.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "outbox relay task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RetryPolicy;
    use crate::handler::WorkflowHandler;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{
        AppendBatch, AppendOptions, EventEnvelope, InMemoryEventStore, NewEvent, OutboxStatus,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records peak concurrency; fails on events whose payload says so.
    #[derive(Default)]
    struct Recorder {
        running: AtomicUsize,
        peak: AtomicUsize,
        handled: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowHandler for Arc<Recorder> {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn handles(&self, _event_type: &str) -> bool {
            true
        }

        async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if envelope.payload["fail"] == true {
                return Err(WorkflowError::HandlerFailed {
                    workflow: "recorder".to_string(),
                    reason: "poisoned".to_string(),
                });
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn publish(store: &InMemoryEventStore, fail: bool) {
        store
            .append(
                AppendBatch::new(AggregateId::new(), "Test").with_event(
                    NewEvent::new("Ping", serde_json::json!({ "fail": fail })).published(),
                ),
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
    }

    fn relay(store: &InMemoryEventStore, recorder: &Arc<Recorder>, max_in_flight: usize) -> OutboxRelay<InMemoryEventStore> {
        let dispatcher = Dispatcher::new()
            .with_retry(RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            })
            .register(Arc::clone(recorder));
        OutboxRelay::new(store.clone(), dispatcher).with_config(RelayConfig {
            poll_interval: Duration::from_millis(5),
            max_in_flight,
            ..RelayConfig::default()
        })
    }

    #[tokio::test]
    async fn in_flight_deliveries_are_bounded() {
        let store = InMemoryEventStore::new();
        for _ in 0..12 {
            publish(&store, false).await;
        }
        let recorder = Arc::new(Recorder::default());

        let stats = relay(&store, &recorder, 3).run_once().await.unwrap();

        assert_eq!(stats.delivered, 12);
        assert_eq!(recorder.handled.load(Ordering::SeqCst), 12);
        assert!(recorder.peak.load(Ordering::SeqCst) <= 3);
        assert!(store.pending_outbox(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_messages_are_dead_lettered() {
        let store = InMemoryEventStore::new();
        publish(&store, false).await;
        publish(&store, true).await;
        let recorder = Arc::new(Recorder::default());

        let stats = relay(&store, &recorder, 5).run_once().await.unwrap();

        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dead_lettered, 1);
        let dead = store.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].status, OutboxStatus::DeadLettered);
        assert!(dead[0].last_error.as_deref().unwrap_or_default().contains("poisoned"));
        assert_eq!(dead[0].attempts, 2);
        assert!(store.pending_outbox(100).await.unwrap().is_empty());
    }

    /// Panics on the first `panics` calls.
    struct Panicky {
        panics: usize,
        calls: Arc<AtomicUsize>,
        handled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WorkflowHandler for Panicky {
        fn name(&self) -> &'static str {
            "panicky"
        }

        fn handles(&self, _event_type: &str) -> bool {
            true
        }

        async fn handle(&self, _envelope: &EventEnvelope) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.panics {
                panic!("handler blew up");
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn panicky_relay(store: &InMemoryEventStore, panics: usize) -> (OutboxRelay<InMemoryEventStore>, Arc<AtomicUsize>) {
        let handled = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new()
            .with_retry(RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            })
            .register(Panicky {
                panics,
                calls: Arc::new(AtomicUsize::new(0)),
                handled: Arc::clone(&handled),
            });
        (OutboxRelay::new(store.clone(), dispatcher), handled)
    }

    #[tokio::test]
    async fn handler_panic_is_retried_not_dropped() {
        let store = InMemoryEventStore::new();
        publish(&store, false).await;
        let (relay, handled) = panicky_relay(&store, 1);

        let first = relay.run_once().await.unwrap();
        assert_eq!(first.delivered, 1);
        assert_eq!(handled.load(Ordering::SeqCst), 1);

        let second = relay.run_once().await.unwrap();
        assert_eq!(second, RelayStats::default());
        assert!(store.pending_outbox(100).await.unwrap().is_empty());
        assert!(store.dead_letters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistent_panics_are_dead_lettered() {
        let store = InMemoryEventStore::new();
        publish(&store, false).await;
        let (relay, handled) = panicky_relay(&store, usize::MAX);

        let stats = relay.run_once().await.unwrap();

        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(handled.load(Ordering::SeqCst), 0);
        let dead = store.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert!(dead[0].last_error.as_deref().unwrap_or_default().contains("panicked"));
    }

    #[tokio::test]
    async fn spawned_relay_drains_new_messages() {
        let store = InMemoryEventStore::new();
        let recorder = Arc::new(Recorder::default());
        let handle = relay(&store, &recorder, 5).spawn();

        publish(&store, false).await;
        publish(&store, false).await;

        for _ in 0..200 {
            if recorder.handled.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.stop().await;

        assert_eq!(recorder.handled.load(Ordering::SeqCst), 2);
        assert!(store.pending_outbox(100).await.unwrap().is_empty());
    }
}
