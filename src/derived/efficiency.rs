use crate::models::PanelReading;
use serde::{Deserialize, Serialize};

/// Rated voltages used as the 100 % reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelCapacity {
    /// Single panel
    #[serde(default = "default_panel_volts")]
    pub panel_volts: f64,
    /// PANEL-TOTAL, several panels combined
    #[serde(default = "default_total_volts")]
    pub total_volts: f64,
}

fn default_panel_volts() -> f64 {
    22.0
}
fn default_total_volts() -> f64 {
    88.0
}

impl Default for PanelCapacity {
    fn default() -> Self {
        Self {
            panel_volts: default_panel_volts(),
            total_volts: default_total_volts(),
        }
    }
}

/// Voltage as a percentage of capacity, capped at 100.
///
/// An absent or non-positive voltage reads as 100 %, not 0 %.
pub fn efficiency(voltage: Option<f64>, capacity_volts: f64) -> f64 {
    match voltage {
        Some(v) if v > 0.0 && capacity_volts > 0.0 => (v / capacity_volts * 100.0).min(100.0),
        _ => 100.0,
    }
}

/// Efficiency of one panel against the capacity matching its kind
pub fn panel_efficiency(panel: &PanelReading, capacity: &PanelCapacity) -> f64 {
    let capacity_volts = if panel.is_total() {
        capacity.total_volts
    } else {
        capacity.panel_volts
    };
    efficiency(panel.voltage, capacity_volts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PANEL_TOTAL_ID;

    fn panel(id: &str, voltage: Option<f64>) -> PanelReading {
        PanelReading {
            panel_id: id.to_string(),
            voltage,
            current: None,
            generation: None,
            ratio: None,
        }
    }

    #[test]
    fn test_efficiency_ratio() {
        assert_eq!(efficiency(Some(11.0), 22.0), 50.0);
        assert_eq!(efficiency(Some(22.0), 22.0), 100.0);
    }

    #[test]
    fn test_efficiency_capped() {
        assert_eq!(efficiency(Some(30.0), 22.0), 100.0);
    }

    #[test]
    fn test_efficiency_absent_or_zero_is_full() {
        assert_eq!(efficiency(None, 22.0), 100.0);
        assert_eq!(efficiency(Some(0.0), 22.0), 100.0);
        assert_eq!(efficiency(Some(-3.0), 22.0), 100.0);
        assert_eq!(efficiency(Some(f64::NAN), 22.0), 100.0);
    }

    #[test]
    fn test_efficiency_matches_formula_across_range() {
        let capacity = 22.0;
        for tenth in 1..400 {
            let v = tenth as f64 / 10.0;
            assert_eq!(efficiency(Some(v), capacity), (v / capacity * 100.0).min(100.0));
        }
    }

    #[test]
    fn test_total_panel_uses_total_capacity() {
        let capacity = PanelCapacity::default();

        assert_eq!(panel_efficiency(&panel("PANEL-1", Some(11.0)), &capacity), 50.0);
        assert_eq!(
            panel_efficiency(&panel(PANEL_TOTAL_ID, Some(44.0)), &capacity),
            50.0
        );
    }
}
