pub mod history;
pub mod selector;
pub mod telemetry;

pub use history::{Granularity, HistoryBuckets, Metric};
pub use selector::{DeviceSelector, TimeRange};
pub use telemetry::{PanelReading, SwitchState, TelemetrySnapshot, PANEL_TOTAL_ID};
