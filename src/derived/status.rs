use crate::models::TelemetrySnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display status of the system, recomputed from every snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SystemStatus {
    Connecting,
    Fault,
    Overheat,
    LowBattery,
    Operational,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Connecting => "CONNECTING",
            SystemStatus::Fault => "FAULT",
            SystemStatus::Overheat => "OVERHEAT",
            SystemStatus::LowBattery => "LOW BATTERY",
            SystemStatus::Operational => "OPERATIONAL",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusThresholds {
    /// Lower edge of the safe incoming-voltage band (inclusive)
    #[serde(default = "default_voltage_min")]
    pub voltage_min: f64,
    /// Upper edge of the safe incoming-voltage band (inclusive)
    #[serde(default = "default_voltage_max")]
    pub voltage_max: f64,
    #[serde(default = "default_overheat_temp_c")]
    pub overheat_temp_c: f64,
    #[serde(default = "default_low_battery_soc")]
    pub low_battery_soc: f64,
}

fn default_voltage_min() -> f64 {
    5.0
}
fn default_voltage_max() -> f64 {
    25.0
}
fn default_overheat_temp_c() -> f64 {
    60.0
}
fn default_low_battery_soc() -> f64 {
    20.0
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            voltage_min: default_voltage_min(),
            voltage_max: default_voltage_max(),
            overheat_temp_c: default_overheat_temp_c(),
            low_battery_soc: default_low_battery_soc(),
        }
    }
}

/// Classify a snapshot. Checks run top to bottom and the first match wins.
///
/// There is no hysteresis: a reading hovering at a threshold flips the status
/// on every poll. Absent readings count as 0.
pub fn classify_status(
    snapshot: Option<&TelemetrySnapshot>,
    thresholds: &StatusThresholds,
) -> SystemStatus {
    let Some(snapshot) = snapshot else {
        return SystemStatus::Connecting;
    };

    let voltage = snapshot.incoming_voltage.unwrap_or(0.0);
    if voltage < thresholds.voltage_min || voltage > thresholds.voltage_max {
        return SystemStatus::Fault;
    }

    if snapshot.temperature.unwrap_or(0.0) >= thresholds.overheat_temp_c {
        return SystemStatus::Overheat;
    }

    if snapshot.battery_soc.unwrap_or(0.0) < thresholds.low_battery_soc {
        return SystemStatus::LowBattery;
    }

    SystemStatus::Operational
}
