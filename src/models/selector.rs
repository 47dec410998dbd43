use crate::error::ApiError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the device a query targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceSelector {
    DeviceId(String),
    Location(String),
}

impl DeviceSelector {
    /// Reject empty identifiers before any request is issued
    pub fn validate(&self) -> Result<(), ApiError> {
        let (name, value) = self.query_param();
        if value.trim().is_empty() {
            return Err(ApiError::Validation(format!("{} cannot be empty", name)));
        }
        Ok(())
    }

    /// Query-string pair understood by the generation endpoints
    pub fn query_param(&self) -> (&'static str, String) {
        match self {
            DeviceSelector::DeviceId(id) => ("deviceId", id.clone()),
            DeviceSelector::Location(location) => ("location", location.clone()),
        }
    }
}

/// Inclusive time window for history and record queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ApiError> {
        if start > end {
            return Err(ApiError::Validation(
                "Start time must be before end time".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Window ending now and reaching back the given number of hours
    pub fn last_hours(hours: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::hours(hours.max(0)),
            end,
        }
    }

    pub fn query_params(&self) -> [(&'static str, String); 2] {
        [
            ("start", self.start.to_rfc3339()),
            ("end", self.end.to_rfc3339()),
        ]
    }
}
