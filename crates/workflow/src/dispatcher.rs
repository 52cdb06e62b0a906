//! Routes published events to the workflows that react to them.

use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use event_store::{EventEnvelope, EventId};
use futures_util::FutureExt;

use crate::error::{Result, WorkflowError};
use crate::handler::WorkflowHandler;

/// Delivered event ids remembered for duplicate detection.
pub const DEFAULT_DEDUP_WINDOW: usize = 10_000;

/// Attempts per handler before a delivery is given up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// What happened to one delivered envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Every interested workflow handled it.
    Handled(usize),
    /// The event id was already delivered or is being delivered.
    Duplicate,
    /// No workflow reacts to this event type.
    Unrouted,
}

/// Event ids being delivered, plus the most recently delivered ones.
#[derive(Debug, Default)]
struct Claims {
    in_flight: HashSet<EventId>,
    delivered: HashSet<EventId>,
    order: VecDeque<EventId>,
}

impl Claims {
    fn claim(&mut self, event_id: EventId) -> bool {
        !self.delivered.contains(&event_id) && self.in_flight.insert(event_id)
    }

    fn settle(&mut self, event_id: EventId, delivered: bool, window: usize) {
        self.in_flight.remove(&event_id);
        if !delivered || window == 0 || !self.delivered.insert(event_id) {
            return;
        }
        self.order.push_back(event_id);
        while self.order.len() > window {
            if let Some(oldest) = self.order.pop_front() {
                self.delivered.remove(&oldest);
            }
        }
    }
}

/// Holds an event id while it is being delivered.
///
/// Dropping the guard releases the id even if the delivery future is
/// cancelled or unwinds.
struct Claim<'a> {
    dispatcher: &'a Dispatcher,
    event_id: EventId,
    delivered: bool,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.dispatcher
            .claims()
            .settle(self.event_id, self.delivered, self.dispatcher.dedup_window);
    }
}

/// Fans an envelope out to its workflows.
///
/// A delivered event id is remembered within a bounded window, so a
/// redelivered message is dropped here before any workflow sees it. A failed
/// delivery releases its claim and can be tried again. Redeliveries older
/// than the window reach the workflows, which must tolerate them.
pub struct Dispatcher {
    handlers: Vec<Arc<dyn WorkflowHandler>>,
    retry: RetryPolicy,
    dedup_window: usize,
    claims: Mutex<Claims>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            retry: RetryPolicy::default(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            claims: Mutex::new(Claims::default()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn register(mut self, handler: impl WorkflowHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn workflows(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    fn claims(&self) -> MutexGuard<'_, Claims> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id, event_type = %envelope.event_type))]
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> Result<Delivery> {
        let handlers: Vec<&Arc<dyn WorkflowHandler>> = self
            .handlers
            .iter()
            .filter(|h| h.handles(&envelope.event_type))
            .collect();
        if handlers.is_empty() {
            return Ok(Delivery::Unrouted);
        }

        let claimed = self.claims().claim(envelope.event_id);
        if !claimed {
            metrics::counter!("workflow_duplicate_deliveries_total").increment(1);
            tracing::debug!("duplicate delivery dropped");
            return Ok(Delivery::Duplicate);
        }
        let mut claim = Claim {
            dispatcher: self,
            event_id: envelope.event_id,
            delivered: false,
        };

        let count = handlers.len();
        for handler in handlers {
            self.deliver(handler.as_ref(), envelope).await?;
        }
        claim.delivered = true;
        Ok(Delivery::Handled(count))
    }

    async fn deliver(&self, handler: &dyn WorkflowHandler, envelope: &EventEnvelope) -> Result<()> {
        let workflow = handler.name();
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            let outcome = AssertUnwindSafe(handler.handle(envelope))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(WorkflowError::HandlerFailed {
                        workflow: workflow.to_string(),
                        reason: "handler panicked".to_string(),
                    })
                });
            match outcome {
                Ok(()) => {
                    metrics::counter!("workflow_deliveries_total", "workflow" => workflow)
                        .increment(1);
                    return Ok(());
                }
                Err(e) if attempt >= self.retry.max_attempts => {
                    tracing::error!(workflow, attempt, error = %e, "delivery failed, giving up");
                    return Err(WorkflowError::RetriesExhausted {
                        event_id: envelope.event_id,
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    metrics::counter!("workflow_delivery_retries_total", "workflow" => workflow)
                        .increment(1);
                    tracing::warn!(workflow, attempt, error = %e, ?backoff, "delivery failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                    attempt += 1;
                }
            }
        }
    }
}
