//! Composition of the live and history queries with the derived values

mod queries;
mod summary;

pub use queries::{history_key, history_query, live_key, live_query, records_key, records_query};
pub use summary::{DashboardSummary, PanelEfficiency};
