//! Read side of the intake core.
//!
//! - [`SingleStreamProjection`] and the [`Inline`] adapter maintaining
//!   per-stream documents inside the append transaction
//! - [`AggregationDaemon`] folding the global log into the dashboard
//! - [`ReadModel`] queries and the [`DocumentDirectory`] used by intake checks

pub mod aggregation;
pub mod daemon;
pub mod directory;
pub mod error;
pub mod projection;
pub mod read_model;
pub mod views;

pub use aggregation::AggregationProjection;
pub use daemon::{AggregationDaemon, DaemonConfig, DaemonHandle};
pub use directory::DocumentDirectory;
pub use error::{ProjectionError, Result};
pub use projection::{Inline, SingleStreamProjection};
pub use read_model::{MAX_PAGE_SIZE, MatterQuery, Page, ReadModel, SortDirection, SortField};
pub use views::{
    ClientDetails, ClientDetailsProjection, DASHBOARD_ID, DashboardProjection,
    DashboardStatistics, MatterDetails, MatterDetailsProjection,
};

use event_store::InMemoryEventStore;

/// In-memory store with both inline projections registered.
pub fn in_memory_store() -> InMemoryEventStore {
    InMemoryEventStore::new()
        .with_inline_projection(Inline(ClientDetailsProjection))
        .with_inline_projection(Inline(MatterDetailsProjection))
}
