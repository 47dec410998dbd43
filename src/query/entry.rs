use crate::error::ApiError;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Latest known state of one query key, shared by every subscriber.
///
/// `data` and `error` are independent: a failed poll sets `error` but keeps the
/// last successful `data`.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub data: Option<Arc<T>>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub error: Option<ApiError>,
    pub error_at: Option<DateTime<Utc>>,
    pub is_fetching: bool,
    /// Consecutive failed polls since the last success
    pub failure_count: u32,
    pub(crate) epoch: u64,
    pub(crate) applied_seq: u64,
    pub(crate) in_flight: usize,
}

impl<T> CacheEntry<T> {
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Last-known-good data is displayed next to a fresh error
    pub fn is_stale_with_error(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self {
            data: None,
            fetched_at: None,
            error: None,
            error_at: None,
            is_fetching: false,
            failure_count: 0,
            epoch: 0,
            applied_seq: 0,
            in_flight: 0,
        }
    }
}

// Manual impl: cloning shares `data`, so `T` itself need not be `Clone`
impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            fetched_at: self.fetched_at,
            error: self.error.clone(),
            error_at: self.error_at,
            is_fetching: self.is_fetching,
            failure_count: self.failure_count,
            epoch: self.epoch,
            applied_seq: self.applied_seq,
            in_flight: self.in_flight,
        }
    }
}
