//! Read documents: two inline per-stream views and the dashboard summary.

pub mod client_details;
pub mod dashboard;
pub mod matter_details;

pub use client_details::{CLIENT_DETAILS, ClientDetails, ClientDetailsProjection};
pub use dashboard::{DASHBOARD, DASHBOARD_ID, DashboardProjection, DashboardStatistics};
pub use matter_details::{MATTER_DETAILS, MatterDetails, MatterDetailsProjection};
