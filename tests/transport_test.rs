//! Transport adapter tests against a local mock backend

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use solargrid_monitor::{
    auth::{AuthContext, StoredToken, TokenStorage},
    config::ApiConfig,
    models::{DeviceSelector, Granularity, Metric, TimeRange},
    ApiClient, ApiError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// Storage that counts how often it is cleared
#[derive(Default)]
struct CountingStorage {
    token: Mutex<Option<StoredToken>>,
    clears: AtomicUsize,
}

impl TokenStorage for CountingStorage {
    fn load(&self) -> solargrid_monitor::Result<Option<StoredToken>> {
        Ok(self.token.lock().unwrap().clone())
    }

    fn store(&self, token: &StoredToken) -> solargrid_monitor::Result<()> {
        *self.token.lock().unwrap() = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> solargrid_monitor::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: &str, auth: Arc<AuthContext>) -> ApiClient {
    ApiClient::new(&ApiConfig::new(base_url), auth).unwrap()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn range() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_live_snapshot_sends_bearer_and_unwraps_envelope() {
    let app = Router::new().route(
        "/api/generation/live",
        get(
            |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                if bearer(&headers).as_deref() != Some("Bearer secret-token") {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "success": false }))).into_response();
                }
                assert_eq!(params.get("deviceId").map(String::as_str), Some("INV-001"));

                Json(json!({
                    "success": true,
                    "data": {
                        "deviceId": "INV-001",
                        "timestamp": "2026-03-01T10:00:00Z",
                        "incomingVoltage": 12.5,
                        "generationKW": "3.2",
                        "batterySOC": 80,
                        "inverterStatus": "ON",
                        "panels": [
                            { "panelId": "PANEL-1", "voltage": 11.0 },
                            { "panelId": "PANEL-TOTAL", "voltage": 44.0 }
                        ]
                    }
                }))
                .into_response()
            },
        ),
    );
    let base_url = serve(app).await;

    let auth = Arc::new(AuthContext::in_memory());
    auth.sign_in("secret-token", None).await.unwrap();
    let api = client(&base_url, auth);

    let snapshot = assert_ok!(
        api.live_snapshot(&DeviceSelector::DeviceId("INV-001".into()))
            .await
    );

    assert_eq!(snapshot.device_id.as_deref(), Some("INV-001"));
    assert_eq!(snapshot.incoming_voltage, Some(12.5));
    assert_eq!(snapshot.generation_kw, Some(3.2));
    assert_eq!(snapshot.panels.len(), 2);
    assert!(snapshot.total_panel().is_some());
}

#[tokio::test]
async fn test_unauthorized_clears_auth_once_and_propagates() {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let app = Router::new().route(
        "/api/generation/live",
        get(move || {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "success": false, "message": "Token expired" })),
                )
            }
        }),
    );
    let base_url = serve(app).await;

    let storage = Arc::new(CountingStorage::default());
    let auth = Arc::new(AuthContext::new(storage.clone()));
    auth.sign_in("stale-token", None).await.unwrap();
    let api = client(&base_url, Arc::clone(&auth));

    let err = api
        .live_snapshot(&DeviceSelector::Location("roof-east".into()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::Unauthorized {
            message: "Token expired".into()
        }
    );
    assert_eq!(err.status(), Some(401));
    assert_eq!(storage.clears.load(Ordering::SeqCst), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!auth.is_authenticated().await);
}

#[tokio::test]
async fn test_server_error_message_is_surfaced() {
    let app = Router::new().route(
        "/api/generation/live",
        get(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "database unavailable" })),
            )
        }),
    );
    let base_url = serve(app).await;
    let api = client(&base_url, Arc::new(AuthContext::in_memory()));

    let err = api
        .live_snapshot(&DeviceSelector::DeviceId("INV-001".into()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::Http {
            status: 500,
            message: "database unavailable".into()
        }
    );
}

#[tokio::test]
async fn test_plain_text_error_body_is_kept() {
    let app = Router::new().route(
        "/api/generation/live",
        get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let base_url = serve(app).await;
    let api = client(&base_url, Arc::new(AuthContext::in_memory()));

    let err = api
        .live_snapshot(&DeviceSelector::DeviceId("INV-001".into()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::Http {
            status: 502,
            message: "upstream down".into()
        }
    );
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let app = Router::new().route(
        "/api/generation/live",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "deviceId": "INV-001" }))
        }),
    );
    let base_url = serve(app).await;

    let api = ApiClient::with_timeout(
        &ApiConfig::new(base_url),
        Arc::new(AuthContext::in_memory()),
        Duration::from_secs(1),
    )
    .unwrap();

    let err = assert_err!(
        api.live_snapshot(&DeviceSelector::DeviceId("INV-001".into()))
            .await
    );
    assert_eq!(err, ApiError::Timeout);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Grab a free port, then release it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = client(&format!("http://{}", addr), Arc::new(AuthContext::in_memory()));
    let err = api
        .live_snapshot(&DeviceSelector::DeviceId("INV-001".into()))
        .await
        .unwrap_err();

    assert!(err.is_network(), "expected network error, got {:?}", err);
}

#[tokio::test]
async fn test_empty_selector_fails_before_request() {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let app = Router::new().route(
        "/api/generation/live",
        get(move || {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Json(json!({}))
            }
        }),
    );
    let base_url = serve(app).await;
    let api = client(&base_url, Arc::new(AuthContext::in_memory()));

    let err = api
        .live_snapshot(&DeviceSelector::DeviceId("".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_history_uses_backend_aggregation_when_available() {
    let app = Router::new().route(
        "/api/generation/history-by-grid",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params.get("granularity").map(String::as_str), Some("hour"));
            assert!(params.contains_key("start") && params.contains_key("end"));

            let labels: Vec<String> = (0..30).map(|i| format!("bucket-{:02}", i)).collect();
            let voltage: Vec<f64> = (0..30u32).map(f64::from).collect();
            Json(json!({
                "success": true,
                "data": { "labels": labels, "metricSeries": { "voltage": voltage } }
            }))
        }),
    );
    let base_url = serve(app).await;
    let api = client(&base_url, Arc::new(AuthContext::in_memory()));

    let buckets = api
        .history_with_fallback(
            &DeviceSelector::DeviceId("INV-001".into()),
            &range(),
            Granularity::Hour,
            10,
        )
        .await
        .unwrap();

    // stride ceil(30 / 10) = 3
    assert_eq!(buckets.len(), 10);
    assert_eq!(buckets.labels[0], "bucket-00");
    assert_eq!(buckets.labels[9], "bucket-27");
    assert_eq!(buckets.series(Metric::Voltage)[1], 3.0);
    assert!(buckets.is_aligned());
}

#[tokio::test]
async fn test_history_falls_back_to_raw_records() {
    let app = Router::new()
        .route(
            "/api/generation/history-by-grid",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))) }),
        )
        .route(
            "/api/generation/all",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("deviceId").map(String::as_str), Some("INV-001"));
                Json(json!({
                    "success": true,
                    "data": [
                        { "deviceId": "INV-001", "timestamp": "2026-03-01T09:40:00Z", "incomingVoltage": 14.0, "batterySOC": 70 },
                        { "deviceId": "INV-001", "timestamp": "2026-03-01T08:10:00Z", "incomingVoltage": 12.0, "batterySOC": 60 },
                        { "deviceId": "INV-001", "timestamp": "2026-03-01T08:50:00Z", "incomingVoltage": 13.0, "batterySOC": 62 }
                    ]
                }))
            }),
        );
    let base_url = serve(app).await;
    let api = client(&base_url, Arc::new(AuthContext::in_memory()));

    let buckets = api
        .history_with_fallback(
            &DeviceSelector::DeviceId("INV-001".into()),
            &range(),
            Granularity::Hour,
            24,
        )
        .await
        .unwrap();

    assert_eq!(buckets.labels, vec!["2026-03-01 08:00", "2026-03-01 09:00"]);
    assert_eq!(buckets.series(Metric::Voltage), &[12.5, 14.0]);
    assert_eq!(buckets.series(Metric::Battery), &[61.0, 70.0]);
    assert_eq!(buckets.metric_series.len(), Metric::ALL.len());
    assert!(buckets.is_aligned());
}

#[tokio::test]
async fn test_history_server_error_does_not_fall_back() {
    let app = Router::new().route(
        "/api/generation/history-by-grid",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "message": "maintenance" }))) }),
    );
    let base_url = serve(app).await;
    let api = client(&base_url, Arc::new(AuthContext::in_memory()));

    let err = api
        .history_with_fallback(
            &DeviceSelector::DeviceId("INV-001".into()),
            &range(),
            Granularity::Day,
            24,
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_records_sorted_oldest_first() {
    let app = Router::new().route(
        "/api/generation/all",
        get(|| async {
            Json(json!({
                "records": [
                    { "location": "roof-east", "timestamp": "2026-03-01T10:00:00Z" },
                    { "location": "roof-east", "timestamp": "2026-03-01T09:00:00Z" }
                ]
            }))
        }),
    );
    let base_url = serve(app).await;
    let api = client(&base_url, Arc::new(AuthContext::in_memory()));

    let records = assert_ok!(
        api.records(&DeviceSelector::Location("roof-east".into()), &range())
            .await
    );

    assert_eq!(records.len(), 2);
    assert!(records[0].timestamp < records[1].timestamp);
}
