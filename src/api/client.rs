use crate::auth::AuthContext;
use crate::config::ApiConfig;
use crate::error::{ApiError, AppError};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Per-request timeout, independent of any polling interval
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated HTTP client for the generation backend
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<AuthContext>,
}

impl ApiClient {
    /// Create a client with the configured base URL and the fixed [`REQUEST_TIMEOUT`]
    pub fn new(config: &ApiConfig, auth: Arc<AuthContext>) -> Result<Self, AppError> {
        Self::with_timeout(config, auth, REQUEST_TIMEOUT)
    }

    /// Same as [`ApiClient::new`] with a different timeout, for tests against slow mocks
    pub fn with_timeout(
        config: &ApiConfig,
        auth: Arc<AuthContext>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn auth(&self) -> &Arc<AuthContext> {
        &self.auth
    }

    /// Send a request and return the unwrapped response payload
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut builder = self.http.request(method, &url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(token) = self.auth.bearer_token().await {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            let err = ApiError::from(e);
            warn!("Request to {} failed: {}", url, err);
            err
        })?;

        self.handle_response(response).await
    }

    /// GET and deserialize the unwrapped payload
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let value = self.request::<()>(Method::GET, path, query, None).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// POST a JSON body and deserialize the unwrapped payload
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = self.request(Method::POST, path, &[], Some(body)).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Handle the HTTP response
    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!("Received 401 from {}, clearing auth state", response.url());
            if let Err(e) = self.auth.clear().await {
                error!("Failed to clear auth state: {}", e);
            }
            let text = response.text().await.unwrap_or_default();
            let message =
                error_message(&text).unwrap_or_else(|| "Unauthorized - please sign in".to_string());
            return Err(ApiError::Unauthorized { message });
        }

        let text = response.text().await.map_err(ApiError::from)?;

        if !status.is_success() {
            let message = error_message(&text).unwrap_or_else(|| {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown error").to_string()
                } else {
                    trimmed.to_string()
                }
            });
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialization(e.to_string()))?;
        unwrap_envelope(value, status.as_u16())
    }
}

/// Strip the `{ success, data }` envelope. A `success: false` body is an error
/// even when the status code says otherwise.
fn unwrap_envelope(value: Value, status: u16) -> Result<Value, ApiError> {
    let Value::Object(mut obj) = value else {
        return Ok(value);
    };

    match obj.get("success").and_then(Value::as_bool) {
        Some(false) => {
            let message = envelope_message(&Value::Object(obj))
                .unwrap_or_else(|| "Request was not successful".to_string());
            Err(ApiError::Http { status, message })
        }
        Some(true) => Ok(obj.remove("data").unwrap_or(Value::Null)),
        None => Ok(Value::Object(obj)),
    }
}

/// Server-provided message from an error body, if there is one
fn error_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    envelope_message(&value)
}

fn envelope_message(value: &Value) -> Option<String> {
    ["message", "error", "body"].iter().find_map(|field| {
        match value.get(*field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(nested) => nested
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    })
}
