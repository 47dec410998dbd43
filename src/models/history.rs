use crate::error::ApiError;
use crate::models::telemetry::number;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Bucket width used when aggregating raw samples into a history series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }

    /// Grouping key for a timestamp. Keys sort chronologically as plain strings.
    pub fn bucket_key(&self, ts: DateTime<Utc>) -> String {
        match self {
            Granularity::Hour => format!(
                "{:04}-{:02}-{:02} {:02}:00",
                ts.year(),
                ts.month(),
                ts.day(),
                ts.hour()
            ),
            Granularity::Day => format!("{:04}-{:02}-{:02}", ts.year(), ts.month(), ts.day()),
            Granularity::Week => {
                let week = ts.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
            Granularity::Month => format!("{:04}-{:02}", ts.year(), ts.month()),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chartable metric names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Voltage,
    Current,
    Power,
    Battery,
    SolarInput,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Voltage,
        Metric::Current,
        Metric::Power,
        Metric::Battery,
        Metric::SolarInput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Voltage => "voltage",
            Metric::Current => "current",
            Metric::Power => "power",
            Metric::Battery => "battery",
            Metric::SolarInput => "solarInput",
        }
    }

    /// Every field name the backend has been seen to use for the metric
    fn wire_names(&self) -> &'static [&'static str] {
        match self {
            Metric::Voltage => &["voltage", "incomingVoltage"],
            Metric::Current => &["current"],
            Metric::Power => &["power", "generationKW", "generation"],
            Metric::Battery => &["battery", "batterySOC", "soc"],
            Metric::SolarInput => &["solarInput", "solar_input", "solar"],
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of aggregation buckets. Every metric series aligns positionally with `labels`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryBuckets {
    pub granularity: Granularity,
    pub labels: Vec<String>,
    pub metric_series: BTreeMap<Metric, Vec<f64>>,
}

impl HistoryBuckets {
    pub fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            labels: Vec::new(),
            metric_series: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Averages for one metric, empty if the metric was not requested
    pub fn series(&self, metric: Metric) -> &[f64] {
        self.metric_series
            .get(&metric)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_aligned(&self) -> bool {
        self.metric_series
            .values()
            .all(|values| values.len() == self.labels.len())
    }

    /// Normalize the aggregated-history response.
    ///
    /// Accepted shapes: a columnar object `{ labels, <series container>? }` where the
    /// series live under `metricSeries`, `datasets`, `series`, or at the top level;
    /// or an array of bucket rows each carrying a label and per-metric values.
    pub fn from_wire(value: Value, granularity: Granularity) -> Result<Self, ApiError> {
        let buckets = match value {
            Value::Array(rows) => Self::from_rows(rows, granularity)?,
            Value::Object(obj) => Self::from_columns(obj, granularity)?,
            other => {
                return Err(ApiError::Deserialization(format!(
                    "history response is neither an object nor an array: {}",
                    other
                )))
            }
        };

        if !buckets.is_aligned() {
            return Err(ApiError::Deserialization(
                "history series length does not match labels".to_string(),
            ));
        }

        Ok(buckets)
    }

    fn from_columns(obj: Map<String, Value>, granularity: Granularity) -> Result<Self, ApiError> {
        let labels = match obj.get("labels") {
            Some(Value::Array(items)) => items.iter().map(label_text).collect(),
            _ => {
                return Err(ApiError::Deserialization(
                    "history response has no labels array".to_string(),
                ))
            }
        };

        let container = ["metricSeries", "datasets", "series"]
            .iter()
            .find_map(|name| obj.get(*name).and_then(Value::as_object))
            .unwrap_or(&obj);

        let mut metric_series = BTreeMap::new();
        for metric in Metric::ALL {
            let values = metric
                .wire_names()
                .iter()
                .find_map(|name| container.get(*name).and_then(Value::as_array));

            if let Some(values) = values {
                let series = values.iter().map(|v| number(Some(v)).unwrap_or(0.0)).collect();
                metric_series.insert(metric, series);
            }
        }

        Ok(Self {
            granularity,
            labels,
            metric_series,
        })
    }

    fn from_rows(rows: Vec<Value>, granularity: Granularity) -> Result<Self, ApiError> {
        let rows = rows
            .into_iter()
            .map(|row| match row {
                Value::Object(row) => Ok(row),
                _ => Err(ApiError::Deserialization(
                    "history row is not an object".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        // A metric present in any row gets a value (0 when missing) in every row
        let present: Vec<Metric> = Metric::ALL
            .into_iter()
            .filter(|metric| rows.iter().any(|row| metric_field(row, *metric).is_some()))
            .collect();

        let mut buckets = Self::empty(granularity);
        for row in &rows {
            let label = ["period", "label", "bucket", "_id"]
                .iter()
                .find_map(|name| row.get(*name))
                .map(label_text)
                .ok_or_else(|| {
                    ApiError::Deserialization("history row has no period label".to_string())
                })?;
            buckets.labels.push(label);

            for metric in &present {
                buckets
                    .metric_series
                    .entry(*metric)
                    .or_default()
                    .push(number(metric_field(row, *metric)).unwrap_or(0.0));
            }
        }

        Ok(buckets)
    }
}

fn metric_field(row: &Map<String, Value>, metric: Metric) -> Option<&Value> {
    metric.wire_names().iter().find_map(|name| row.get(*name))
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
