//! Pure transforms from telemetry into display-ready values.
//!
//! None of these fail on missing data; each defines its own fallback.

pub mod aggregation;
pub mod efficiency;
pub mod panels;
pub mod status;

pub use aggregation::{aggregate_samples, downsample, downsample_buckets, sample_indices, Sample};
pub use efficiency::{efficiency, panel_efficiency, PanelCapacity};
pub use panels::{panel_columns, panel_table, PanelColumns, PanelField, PanelRow, PanelTable};
pub use status::{classify_status, StatusThresholds, SystemStatus};
