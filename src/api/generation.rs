use super::ApiClient;
use crate::derived::{aggregate_samples, downsample_buckets};
use crate::error::ApiError;
use crate::models::{DeviceSelector, Granularity, HistoryBuckets, Metric, TelemetrySnapshot, TimeRange};
use serde_json::Value;
use tracing::{debug, info};

pub const LIVE_PATH: &str = "/api/generation/live";
pub const HISTORY_BY_GRID_PATH: &str = "/api/generation/history-by-grid";
pub const RECORDS_PATH: &str = "/api/generation/all";

impl ApiClient {
    /// Current snapshot for one device or location
    pub async fn live_snapshot(
        &self,
        selector: &DeviceSelector,
    ) -> Result<TelemetrySnapshot, ApiError> {
        selector.validate()?;

        let query = [selector.query_param()];
        let value: Value = self.get(LIVE_PATH, &query).await?;

        let value = match value {
            Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
            other => other,
        };
        if value.is_null() {
            return Err(ApiError::Deserialization(format!(
                "no live reading for {}={}",
                query[0].0, query[0].1
            )));
        }

        TelemetrySnapshot::from_wire(value)
    }

    /// Backend-aggregated history for the whole grid
    pub async fn history_by_grid(
        &self,
        range: &TimeRange,
        granularity: Granularity,
    ) -> Result<HistoryBuckets, ApiError> {
        let [start, end] = range.query_params();
        let query = [start, end, ("granularity", granularity.as_str().to_string())];

        let value: Value = self.get(HISTORY_BY_GRID_PATH, &query).await?;
        HistoryBuckets::from_wire(value, granularity)
    }

    /// Raw per-timestamp records, oldest first
    pub async fn records(
        &self,
        selector: &DeviceSelector,
        range: &TimeRange,
    ) -> Result<Vec<TelemetrySnapshot>, ApiError> {
        selector.validate()?;

        let [start, end] = range.query_params();
        let query = [selector.query_param(), start, end];

        let value: Value = self.get(RECORDS_PATH, &query).await?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => match ["records", "items", "data"]
                .iter()
                .find_map(|name| obj.remove(*name))
            {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(ApiError::Deserialization(
                        "records response has no record array".to_string(),
                    ))
                }
            },
            Value::Null => Vec::new(),
            other => {
                return Err(ApiError::Deserialization(format!(
                    "unexpected records response: {}",
                    other
                )))
            }
        };

        let mut records = items
            .into_iter()
            .map(TelemetrySnapshot::from_wire)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.timestamp);

        debug!("Fetched {} raw records", records.len());
        Ok(records)
    }

    /// History buckets, aggregated client-side from raw records when the
    /// backend aggregation endpoint is unavailable
    pub async fn history_with_fallback(
        &self,
        selector: &DeviceSelector,
        range: &TimeRange,
        granularity: Granularity,
        max_points: usize,
    ) -> Result<HistoryBuckets, ApiError> {
        match self.history_by_grid(range, granularity).await {
            Ok(buckets) => Ok(downsample_buckets(&buckets, max_points)),
            Err(err) if aggregation_unavailable(&err) => {
                info!(
                    "Backend history aggregation unavailable ({}), aggregating raw records",
                    err
                );
                let records = self.records(selector, range).await?;
                Ok(aggregate_samples(&records, granularity, &Metric::ALL, max_points))
            }
            Err(err) => Err(err),
        }
    }
}

fn aggregation_unavailable(err: &ApiError) -> bool {
    match err {
        ApiError::Http { status, .. } => matches!(status, 404 | 405 | 501),
        ApiError::Deserialization(_) => true,
        _ => false,
    }
}
