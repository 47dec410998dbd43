mod client;
mod generation;

pub use client::{ApiClient, REQUEST_TIMEOUT};
pub use generation::{HISTORY_BY_GRID_PATH, LIVE_PATH, RECORDS_PATH};
