//! HTTP API for case intake and matter tracking.
//!
//! Provides REST endpoints for clients, intake, matter lifecycle, history
//! and the dashboard, with structured logging (tracing) and Prometheus
//! metrics. The background aggregation daemon and outbox relay are started
//! by [`spawn_background`].

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{ClientService, MatterService};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{AggregationDaemon, DaemonHandle, DashboardProjection, DocumentDirectory, ReadModel};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use workflow::{DiscoveryWorkflow, Dispatcher, LogNotifier, OutboxRelay, RelayHandle};

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore + Clone> {
    pub store: S,
    pub clients: ClientService<S, DocumentDirectory<S>>,
    pub matters: MatterService<S, DocumentDirectory<S>>,
    pub read: ReadModel<S>,
}

impl<S: EventStore + Clone> AppState<S> {
    /// Builds the services over a store with the inline projections registered.
    pub fn new(store: S) -> Self {
        let directory = DocumentDirectory::new(store.clone());
        Self {
            clients: ClientService::new(store.clone(), directory.clone()),
            matters: MatterService::new(store.clone(), directory),
            read: ReadModel::new(store.clone()),
            store,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health::<S>))
        .route(
            "/api/clients",
            get(routes::clients::list::<S>).post(routes::clients::create::<S>),
        )
        .route("/api/clients/{id}", get(routes::clients::get::<S>))
        .route("/api/intake", post(routes::matters::intake::<S>))
        .route("/api/matters", get(routes::matters::list::<S>))
        .route("/api/matters/{id}", get(routes::matters::get::<S>))
        .route("/api/matters/{id}/history", get(routes::matters::history::<S>))
        .route(
            "/api/matters/{id}/status",
            post(routes::matters::update_status::<S>),
        )
        .route(
            "/api/matters/{id}/attorney",
            post(routes::matters::assign_attorney::<S>),
        )
        .route(
            "/api/matters/{id}/settlement-offers",
            post(routes::matters::record_settlement_offer::<S>),
        )
        .route("/api/dashboard", get(routes::dashboard::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Handles to the background tasks; stop them on shutdown.
pub struct BackgroundTasks {
    pub daemon: DaemonHandle,
    pub relay: RelayHandle,
}

impl BackgroundTasks {
    pub async fn stop(self) {
        self.relay.stop().await;
        self.daemon.stop().await;
    }
}

/// Starts the dashboard daemon and the outbox relay running the discovery workflow.
pub fn spawn_background<S: EventStore + Clone + 'static>(store: &S, config: &Config) -> BackgroundTasks {
    let daemon = AggregationDaemon::new(store.clone(), DashboardProjection)
        .with_config(config.daemon_config())
        .spawn();

    let dispatcher = Dispatcher::new()
        .with_retry(config.retry_policy())
        .register(DiscoveryWorkflow::new(store.clone(), LogNotifier));
    let relay = OutboxRelay::new(store.clone(), dispatcher)
        .with_config(config.relay_config())
        .spawn();

    BackgroundTasks { daemon, relay }
}
