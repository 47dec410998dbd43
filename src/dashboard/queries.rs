use crate::api::ApiClient;
use crate::config::{HistoryConfig, PollingConfig};
use crate::error::ApiError;
use crate::models::{DeviceSelector, HistoryBuckets, TelemetrySnapshot, TimeRange};
use crate::query::{query_fn, QueryClient, QueryHandle, QueryKey, QueryOptions};
use std::time::Duration;

pub fn live_key(selector: &DeviceSelector) -> QueryKey {
    let (param, value) = selector.query_param();
    QueryKey::new(["generation", "live", param]).with(value)
}

pub fn history_key(selector: &DeviceSelector, history: &HistoryConfig) -> QueryKey {
    let (param, value) = selector.query_param();
    QueryKey::new(["generation", "history", param])
        .with(value)
        .with(history.granularity.as_str())
        .with(history.lookback_hours)
        .with(history.max_points)
}

pub fn records_key(selector: &DeviceSelector, range: &TimeRange) -> QueryKey {
    let (param, value) = selector.query_param();
    QueryKey::new(["generation", "all", param])
        .with(value)
        .with(range.start.timestamp_millis())
        .with(range.end.timestamp_millis())
}

/// Live snapshot, polled at the configured live interval
pub fn live_query(
    client: &QueryClient,
    api: &ApiClient,
    selector: DeviceSelector,
    polling: &PollingConfig,
) -> Result<QueryHandle<TelemetrySnapshot>, ApiError> {
    selector.validate()?;

    let key = live_key(&selector);
    let options = QueryOptions::from_config(
        polling,
        Some(Duration::from_millis(polling.live_interval_ms)),
    );

    let api = api.clone();
    client.subscribe(
        key,
        options,
        query_fn(move || {
            let api = api.clone();
            let selector = selector.clone();
            async move { api.live_snapshot(&selector).await }
        }),
    )
}

/// Rolling history window; the window end moves forward on every poll
pub fn history_query(
    client: &QueryClient,
    api: &ApiClient,
    selector: DeviceSelector,
    history: &HistoryConfig,
    polling: &PollingConfig,
) -> Result<QueryHandle<HistoryBuckets>, ApiError> {
    selector.validate()?;

    let key = history_key(&selector, history);
    let options = QueryOptions::from_config(
        polling,
        Some(Duration::from_millis(polling.history_interval_ms)),
    );

    let api = api.clone();
    let history = history.clone();
    client.subscribe(
        key,
        options,
        query_fn(move || {
            let api = api.clone();
            let selector = selector.clone();
            let history = history.clone();
            async move {
                let range = TimeRange::last_hours(history.lookback_hours);
                api.history_with_fallback(&selector, &range, history.granularity, history.max_points)
                    .await
            }
        }),
    )
}

/// Raw records for a fixed window, fetched once per enable
pub fn records_query(
    client: &QueryClient,
    api: &ApiClient,
    selector: DeviceSelector,
    range: TimeRange,
    polling: &PollingConfig,
) -> Result<QueryHandle<Vec<TelemetrySnapshot>>, ApiError> {
    selector.validate()?;

    let key = records_key(&selector, &range);
    let options = QueryOptions::from_config(polling, None);

    let api = api.clone();
    client.subscribe(
        key,
        options,
        query_fn(move || {
            let api = api.clone();
            let selector = selector.clone();
            async move { api.records(&selector, &range).await }
        }),
    )
}
