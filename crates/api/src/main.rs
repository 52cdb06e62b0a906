//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use event_store::{EventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{ClientDetailsProjection, Inline, MatterDetailsProjection};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S: EventStore + Clone + 'static>(store: S, config: Config, metrics_handle: PrometheusHandle) {
    let background = api::spawn_background(&store, &config);
    let app = api::create_app(Arc::new(api::AppState::new(store)), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    background.stop().await;
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the event store and run
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresEventStore::new(pool)
                .with_inline_projection(Inline(ClientDetailsProjection))
                .with_inline_projection(Inline(MatterDetailsProjection));
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL event store");
            serve(store, config, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory event store");
            serve(projections::in_memory_store(), config, metrics_handle).await;
        }
    }
}
