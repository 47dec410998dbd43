use crate::models::{PanelReading, TelemetrySnapshot, PANEL_TOTAL_ID};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Sort class of a panel identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PanelRank {
    /// All-digit ids, e.g. "2501"
    Numeric(u64),
    /// "PANEL-<n>"
    Named(u64),
    Other,
}

fn rank(id: &str) -> PanelRank {
    fn digits(s: &str) -> Option<u64> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok()
    }

    if let Some(n) = digits(id) {
        return PanelRank::Numeric(n);
    }
    match id.strip_prefix("PANEL-").and_then(digits) {
        Some(n) => PanelRank::Named(n),
        None => PanelRank::Other,
    }
}

/// Column layout for tabular panel views
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelColumns {
    /// Individual panels in display order
    pub panels: Vec<String>,
    /// PANEL-TOTAL, rendered as a separate trailing column when present
    pub total: Option<String>,
}

impl PanelColumns {
    /// All columns in render order, total last
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.panels
            .iter()
            .map(String::as_str)
            .chain(self.total.as_deref())
    }
}

/// Order panel ids: numeric ids ascending, then PANEL-<n> by n, then the rest
/// lexicographically. PANEL-TOTAL never takes part in the sort and duplicates collapse.
pub fn panel_columns<'a, I>(ids: I) -> PanelColumns
where
    I: IntoIterator<Item = &'a str>,
{
    let mut total = None;
    let mut unique = BTreeSet::new();

    for id in ids {
        if id == PANEL_TOTAL_ID {
            total = Some(PANEL_TOTAL_ID.to_string());
        } else {
            unique.insert(id);
        }
    }

    let mut panels: Vec<&str> = unique.into_iter().collect();
    panels.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));

    PanelColumns {
        panels: panels.into_iter().map(str::to_string).collect(),
        total,
    }
}

/// Which panel reading fills the table cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelField {
    Voltage,
    Current,
    Generation,
    Ratio,
}

impl PanelField {
    fn read(&self, panel: &PanelReading) -> Option<f64> {
        match self {
            PanelField::Voltage => panel.voltage,
            PanelField::Current => panel.current,
            PanelField::Generation => panel.generation,
            PanelField::Ratio => panel.ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelRow {
    pub timestamp: DateTime<Utc>,
    /// One cell per column; `None` where the record has no such panel
    pub cells: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelTable {
    pub columns: Vec<String>,
    pub rows: Vec<PanelRow>,
}

/// Tabulate raw records: one row per record, one column per panel, PANEL-TOTAL last
pub fn panel_table(records: &[TelemetrySnapshot], field: PanelField) -> PanelTable {
    let layout = panel_columns(
        records
            .iter()
            .flat_map(|r| r.panels.iter().map(|p| p.panel_id.as_str())),
    );
    let columns: Vec<String> = layout.all().map(str::to_string).collect();

    let rows = records
        .iter()
        .map(|record| PanelRow {
            timestamp: record.timestamp,
            cells: columns
                .iter()
                .map(|column| {
                    record
                        .panels
                        .iter()
                        .find(|p| &p.panel_id == column)
                        .and_then(|p| field.read(p))
                })
                .collect(),
        })
        .collect();

    PanelTable { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SwitchState;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_panel_sort_order() {
        let columns = panel_columns(["2502", "PANEL-2", "2501", "PANEL-1", "PANEL-TOTAL", "X1"]);

        assert_eq!(columns.panels, vec!["2501", "2502", "PANEL-1", "PANEL-2", "X1"]);
        assert_eq!(columns.total.as_deref(), Some("PANEL-TOTAL"));
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let columns = panel_columns(["10", "9", "PANEL-10", "PANEL-9"]);
        assert_eq!(columns.panels, vec!["9", "10", "PANEL-9", "PANEL-10"]);
    }

    #[test]
    fn test_other_ids_sorted_lexicographically_last() {
        let columns = panel_columns(["west", "PANEL-X", "east", "7"]);
        assert_eq!(columns.panels, vec!["7", "PANEL-X", "east", "west"]);
        assert_eq!(columns.total, None);
    }

    #[test]
    fn test_duplicates_collapse() {
        let columns = panel_columns(["1", "1", "PANEL-TOTAL", "PANEL-TOTAL"]);
        assert_eq!(columns.panels, vec!["1"]);
        assert_eq!(columns.all().collect::<Vec<_>>(), vec!["1", "PANEL-TOTAL"]);
    }

    fn record(panels: &[(&str, f64)]) -> TelemetrySnapshot {
        TelemetrySnapshot {
            device_id: Some("INV-001".into()),
            location: None,
            timestamp: Utc::now(),
            incoming_voltage: None,
            generation_kw: None,
            consumption_kw: None,
            temperature: None,
            battery_soc: None,
            inverter_status: SwitchState::Unknown,
            cooling_status: SwitchState::Unknown,
            panels: panels
                .iter()
                .map(|(id, v)| PanelReading {
                    panel_id: id.to_string(),
                    voltage: Some(*v),
                    current: None,
                    generation: None,
                    ratio: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_panel_table_total_last_and_gaps() {
        let records = vec![
            record(&[("PANEL-TOTAL", 40.0), ("PANEL-2", 19.0), ("PANEL-1", 21.0)]),
            record(&[("PANEL-1", 20.0)]),
        ];

        let table = panel_table(&records, PanelField::Voltage);

        assert_eq!(table.columns, vec!["PANEL-1", "PANEL-2", "PANEL-TOTAL"]);
        assert_eq!(table.rows[0].cells, vec![Some(21.0), Some(19.0), Some(40.0)]);
        assert_eq!(table.rows[1].cells, vec![Some(20.0), None, None]);
    }
}
