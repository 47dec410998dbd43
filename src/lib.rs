pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod derived;
pub mod error;
pub mod models;
pub mod query;

// Re-export commonly used items
pub use api::ApiClient;
pub use auth::AuthContext;
pub use config::Config;
pub use error::{ApiError, AppError, Result};
pub use models::{HistoryBuckets, TelemetrySnapshot};
pub use query::{QueryClient, QueryHandle};
