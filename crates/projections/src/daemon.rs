//! Background daemon folding the global log into aggregation documents.
//!
//! Each batch is read after the stored checkpoint, folded, and committed
//! together with the new checkpoint. A failed batch is retried with
//! exponential backoff and the checkpoint stays where it was. A lease keeps
//! a single instance writing; standbys poll until it frees up.

use std::sync::Arc;
use std::time::Duration;

use event_store::{DocumentWrite, EventStore, EventStoreExt, GlobalSequence, ProjectionCommit, stream_global};
use futures_util::TryStreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::Result;
use crate::aggregation::AggregationProjection;

/// Tuning for [`AggregationDaemon`].
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Sleep between polls once caught up.
    pub poll_interval: Duration,
    /// Maximum events folded per commit.
    pub batch_size: usize,
    /// Lease duration; renewed on every poll.
    pub lease_ttl: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            lease_ttl: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Checkpointed consumer of the global log for one [`AggregationProjection`].
pub struct AggregationDaemon<S, P> {
    store: Arc<S>,
    projection: P,
    config: DaemonConfig,
    owner: String,
}

impl<S, P> AggregationDaemon<S, P>
where
    S: EventStore + 'static,
    P: AggregationProjection,
{
    pub fn new(store: S, projection: P) -> Self {
        Self {
            store: Arc::new(store),
            projection,
            config: DaemonConfig::default(),
            owner: format!("daemon-{}", Uuid::new_v4()),
        }
    }

    pub fn with_config(mut self, config: DaemonConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the lease owner name. Defaults to a random one per instance.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Last global sequence folded into the stored document.
    pub async fn checkpoint(&self) -> Result<GlobalSequence> {
        Ok(self.store.load_checkpoint(self.projection.name()).await?)
    }

    /// The stored document, or the empty one if nothing was committed yet.
    pub async fn current(&self) -> Result<P::Document> {
        Ok(self
            .store
            .load_typed(
                self.projection.collection(),
                self.projection.document_id(),
            )
            .await?
            .unwrap_or_default())
    }

    /// Folds and commits the next batch. Returns the number of events read.
    #[tracing::instrument(skip(self), fields(projection = self.projection.name()))]
    pub async fn process_batch(&self) -> Result<usize> {
        let name = self.projection.name();
        let checkpoint = self.checkpoint().await?;
        let batch = self
            .store
            .read_global(checkpoint, self.config.batch_size)
            .await?;
        let Some(last) = batch.last() else {
            return Ok(0);
        };
        let next_checkpoint = last.global_sequence;

        let mut document = self.current().await?;
        for envelope in &batch {
            document = self.projection.apply(document, envelope)?;
        }

        self.store
            .commit_projection(ProjectionCommit {
                projection: name.to_string(),
                expected: checkpoint,
                checkpoint: next_checkpoint,
                documents: vec![DocumentWrite {
                    collection: self.projection.collection().to_string(),
                    id: self.projection.document_id(),
                    body: serde_json::to_value(&document)?,
                }],
            })
            .await?;

        metrics::counter!("daemon_batches_committed", "projection" => name).increment(1);
        metrics::counter!("daemon_events_folded", "projection" => name)
            .increment(batch.len() as u64);
        tracing::debug!(checkpoint = %next_checkpoint, events = batch.len(), "batch committed");
        Ok(batch.len())
    }

    /// Processes batches until the log is drained. Does not take the lease.
    pub async fn catch_up(&self) -> Result<u64> {
        let mut total = 0u64;
        loop {
            let processed = self.process_batch().await?;
            if processed == 0 {
                return Ok(total);
            }
            total += processed as u64;
        }
    }

    /// Resets the document and checkpoint, then folds the whole log again.
    #[tracing::instrument(skip(self), fields(projection = self.projection.name()))]
    pub async fn rebuild(&self) -> Result<u64> {
        let checkpoint = self.checkpoint().await?;
        self.store
            .commit_projection(ProjectionCommit {
                projection: self.projection.name().to_string(),
                expected: checkpoint,
                checkpoint: GlobalSequence::start(),
                documents: vec![DocumentWrite {
                    collection: self.projection.collection().to_string(),
                    id: self.projection.document_id(),
                    body: serde_json::to_value(P::Document::default())?,
                }],
            })
            .await?;
        tracing::info!(from = %checkpoint, "projection reset");
        self.catch_up().await
    }

    /// Folds the entire log from scratch without touching stored state.
    pub async fn recompute(&self) -> Result<P::Document> {
        let mut events = stream_global(
            Arc::clone(&self.store),
            GlobalSequence::start(),
            self.config.batch_size,
        );
        let mut document = P::Document::default();
        while let Some(envelope) = events.try_next().await? {
            document = self.projection.apply(document, &envelope)?;
        }
        Ok(document)
    }

    /// Starts the polling loop on the runtime.
    pub fn spawn(self) -> DaemonHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        DaemonHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let name = self.projection.name();
        let mut backoff = self.config.initial_backoff;
        let mut holding = false;
        tracing::info!(projection = name, owner = %self.owner, "aggregation daemon started");

        while !*shutdown.borrow() {
            let delay = match self
                .store
                .try_acquire_lease(name, &self.owner, self.config.lease_ttl)
                .await
            {
                Ok(false) => {
                    if holding {
                        tracing::warn!(projection = name, "lease lost");
                        holding = false;
                    }
                    self.config.poll_interval
                }
                Ok(true) => {
                    if !holding {
                        tracing::info!(projection = name, owner = %self.owner, "lease acquired");
                        holding = true;
                    }
                    match self.process_batch().await {
                        Ok(0) => {
                            backoff = self.config.initial_backoff;
                            self.config.poll_interval
                        }
                        Ok(_) => {
                            backoff = self.config.initial_backoff;
                            Duration::ZERO
                        }
                        Err(e) if e.is_checkpoint_conflict() => {
                            tracing::warn!(projection = name, error = %e, "checkpoint moved by another writer");
                            self.config.poll_interval
                        }
                        Err(e) => {
                            metrics::counter!("daemon_batch_failures", "projection" => name)
                                .increment(1);
                            tracing::error!(projection = name, error = %e, ?backoff, "batch failed, will retry");
                            let delay = backoff;
                            backoff = (backoff * 2).min(self.config.max_backoff);
                            delay
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(projection = name, error = %e, "lease check failed");
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

        if holding && let Err(e) = self.store.release_lease(name, &self.owner).await {
            tracing::warn!(projection = name, error = %e, "failed to release lease");
        }
        tracing::info!(projection = name, "aggregation daemon stopped");
    }
}

/// Handle to a spawned [`AggregationDaemon`].
///
/// Dropping the handle does not stop the loop; call [`stop`](Self::stop).
pub struct DaemonHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DaemonHandle {
    /// Signals the loop and waits for it to release its lease and exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "aggregation daemon task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
