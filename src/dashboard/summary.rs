use crate::derived::{
    classify_status, panel_columns, panel_efficiency, PanelCapacity, StatusThresholds,
    SystemStatus,
};
use crate::models::TelemetrySnapshot;
use crate::query::CacheEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelEfficiency {
    pub panel_id: String,
    pub efficiency: f64,
}

/// Display-ready view of the live query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub status: SystemStatus,
    pub updated_at: Option<DateTime<Utc>>,
    pub incoming_voltage: f64,
    pub generation_kw: f64,
    pub consumption_kw: f64,
    pub temperature: f64,
    pub battery_soc: f64,
    pub inverter_on: bool,
    pub cooling_on: bool,
    /// Individual panels in display order, PANEL-TOTAL last
    pub panels: Vec<PanelEfficiency>,
    /// Set when the last poll failed; the readings above are then last-known-good
    pub warning: Option<String>,
    pub is_fetching: bool,
}

impl DashboardSummary {
    pub fn from_entry(
        entry: &CacheEntry<TelemetrySnapshot>,
        thresholds: &StatusThresholds,
        capacity: &PanelCapacity,
    ) -> Self {
        let snapshot = entry.data.as_deref();
        let reading = |read: fn(&TelemetrySnapshot) -> Option<f64>| {
            snapshot.and_then(read).unwrap_or(0.0)
        };

        Self {
            status: classify_status(snapshot, thresholds),
            updated_at: snapshot.map(|s| s.timestamp),
            incoming_voltage: reading(|s| s.incoming_voltage),
            generation_kw: reading(|s| s.generation_kw),
            consumption_kw: reading(|s| s.consumption_kw),
            temperature: reading(|s| s.temperature),
            battery_soc: reading(|s| s.battery_soc),
            inverter_on: snapshot.is_some_and(|s| s.inverter_status.is_on()),
            cooling_on: snapshot.is_some_and(|s| s.cooling_status.is_on()),
            panels: snapshot
                .map(|s| panel_efficiencies(s, capacity))
                .unwrap_or_default(),
            warning: entry.error.as_ref().map(|e| e.to_string()),
            is_fetching: entry.is_fetching,
        }
    }
}

fn panel_efficiencies(snapshot: &TelemetrySnapshot, capacity: &PanelCapacity) -> Vec<PanelEfficiency> {
    let columns = panel_columns(snapshot.panels.iter().map(|p| p.panel_id.as_str()));

    columns
        .all()
        .filter_map(|id| snapshot.panels.iter().find(|p| p.panel_id == id))
        .map(|panel| PanelEfficiency {
            panel_id: panel.panel_id.clone(),
            efficiency: panel_efficiency(panel, capacity),
        })
        .collect()
}
