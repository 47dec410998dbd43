use crate::error::ApiError;
use crate::models::history::Metric;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved identifier of the synthetic aggregate panel
pub const PANEL_TOTAL_ID: &str = "PANEL-TOTAL";

/// One polled reading from a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub device_id: Option<String>,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub incoming_voltage: Option<f64>,
    pub generation_kw: Option<f64>,
    pub consumption_kw: Option<f64>,
    pub temperature: Option<f64>,
    pub battery_soc: Option<f64>,
    pub inverter_status: SwitchState,
    pub cooling_status: SwitchState,
    pub panels: Vec<PanelReading>,
}

/// Reading for a single panel, or the PANEL-TOTAL aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelReading {
    pub panel_id: String,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub generation: Option<f64>,
    pub ratio: Option<f64>,
}

impl PanelReading {
    pub fn is_total(&self) -> bool {
        self.panel_id == PANEL_TOTAL_ID
    }
}

/// Inverter / cooling flag as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SwitchState {
    On,
    Off,
    /// Any other reported value, kept verbatim
    Other(String),
    Unknown,
}

impl SwitchState {
    pub fn is_on(&self) -> bool {
        matches!(self, SwitchState::On)
    }

    fn from_wire(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => SwitchState::Unknown,
            Some(Value::Bool(true)) => SwitchState::On,
            Some(Value::Bool(false)) => SwitchState::Off,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(v) if v != 0.0 => SwitchState::On,
                _ => SwitchState::Off,
            },
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "1" | "active" | "running" | "online" | "ok" => SwitchState::On,
                "off" | "false" | "0" | "inactive" | "stopped" | "offline" => SwitchState::Off,
                "" => SwitchState::Unknown,
                _ => SwitchState::Other(s.clone()),
            },
            Some(other) => SwitchState::Other(other.to_string()),
        }
    }
}

impl TelemetrySnapshot {
    /// The PANEL-TOTAL reading, if the backend sent one
    pub fn total_panel(&self) -> Option<&PanelReading> {
        self.panels.iter().find(|p| p.is_total())
    }

    /// Individual panels in wire order, PANEL-TOTAL excluded
    pub fn individual_panels(&self) -> impl Iterator<Item = &PanelReading> {
        self.panels.iter().filter(|p| !p.is_total())
    }

    /// Value of a chartable metric; absent readings count as 0
    pub fn metric_value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Voltage => self.incoming_voltage.unwrap_or(0.0),
            Metric::Power => self.generation_kw.unwrap_or(0.0),
            Metric::Battery => self.battery_soc.unwrap_or(0.0),
            Metric::Current => match self.total_panel() {
                Some(total) => total.current.unwrap_or(0.0),
                None => self.individual_panels().filter_map(|p| p.current).sum(),
            },
            Metric::SolarInput => match self.total_panel() {
                Some(total) => total.generation.unwrap_or(0.0),
                None => self.individual_panels().filter_map(|p| p.generation).sum(),
            },
        }
    }

    /// Normalize any accepted backend shape into the canonical snapshot
    pub fn from_wire(value: Value) -> Result<Self, ApiError> {
        let wire: WireSnapshot = serde_json::from_value(value)
            .map_err(|e| ApiError::Deserialization(format!("telemetry snapshot: {}", e)))?;

        let device_id = wire.device_id.and_then(non_empty);
        let location = wire.location.and_then(non_empty);
        if device_id.is_none() && location.is_none() {
            return Err(ApiError::Validation(
                "telemetry snapshot has neither deviceId nor location".to_string(),
            ));
        }

        let timestamp = match wire.timestamp {
            Some(ts) => parse_timestamp(&ts)?,
            // Readings without a timestamp are stamped on receipt
            None => Utc::now(),
        };

        let panels = wire
            .panels
            .unwrap_or_default()
            .into_iter()
            .map(PanelReading::from_wire)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            device_id,
            location,
            timestamp,
            incoming_voltage: number(wire.incoming_voltage.as_ref()),
            generation_kw: number(wire.generation_kw.as_ref()),
            consumption_kw: number(wire.consumption_kw.as_ref()),
            temperature: number(wire.temperature.as_ref()),
            battery_soc: number(wire.battery_soc.as_ref()),
            inverter_status: SwitchState::from_wire(wire.inverter_status.as_ref()),
            cooling_status: SwitchState::from_wire(wire.cooling_status.as_ref()),
            panels,
        })
    }
}

impl PanelReading {
    fn from_wire(wire: WirePanel) -> Result<Self, ApiError> {
        let panel_id = match wire.panel_id {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => match n.as_u64() {
                Some(v) => v.to_string(),
                None => n.to_string(),
            },
            other => {
                return Err(ApiError::Validation(format!(
                    "panel reading has no usable panelId: {}",
                    other
                )))
            }
        };

        Ok(Self {
            panel_id,
            voltage: number(wire.voltage.as_ref()),
            current: number(wire.current.as_ref()),
            generation: number(wire.generation.as_ref()),
            ratio: number(wire.ratio.as_ref()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSnapshot {
    #[serde(default, alias = "device_id", alias = "deviceID")]
    device_id: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, alias = "ts", alias = "time", alias = "createdAt", alias = "created_at")]
    timestamp: Option<Value>,
    #[serde(default, alias = "incoming_voltage", alias = "voltage")]
    incoming_voltage: Option<Value>,
    #[serde(
        default,
        rename = "generationKW",
        alias = "generationKw",
        alias = "generation_kw",
        alias = "generation"
    )]
    generation_kw: Option<Value>,
    #[serde(
        default,
        rename = "consumptionKW",
        alias = "consumptionKw",
        alias = "consumption_kw",
        alias = "consumption"
    )]
    consumption_kw: Option<Value>,
    #[serde(default, alias = "temp")]
    temperature: Option<Value>,
    #[serde(
        default,
        rename = "batterySOC",
        alias = "batterySoc",
        alias = "battery_soc",
        alias = "soc",
        alias = "battery"
    )]
    battery_soc: Option<Value>,
    #[serde(default, alias = "inverter_status", alias = "inverter")]
    inverter_status: Option<Value>,
    #[serde(default, alias = "cooling_status", alias = "cooling")]
    cooling_status: Option<Value>,
    #[serde(default, alias = "panelData", alias = "panel_data")]
    panels: Option<Vec<WirePanel>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePanel {
    #[serde(alias = "panel_id", alias = "id")]
    panel_id: Value,
    #[serde(default)]
    voltage: Option<Value>,
    #[serde(default)]
    current: Option<Value>,
    #[serde(default, alias = "power")]
    generation: Option<Value>,
    #[serde(default, alias = "efficiency")]
    ratio: Option<Value>,
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Numbers may arrive as JSON numbers or numeric strings
pub(crate) fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Timestamps arrive as RFC 3339 text, naive UTC text, or Unix milliseconds
pub(crate) fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, ApiError> {
    let invalid = || ApiError::Deserialization(format!("unrecognised timestamp: {}", value));

    match value {
        Value::Number(n) => {
            let millis = n.as_f64().ok_or_else(invalid)? as i64;
            Utc.timestamp_millis_opt(millis).single().ok_or_else(invalid)
        }
        Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Ok(ts.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}
