use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::PredictionCategory;

/// Consecutive failed refreshes before the service reports itself degraded
const DEGRADED_AFTER: usize = 5;
/// Consecutive failed refreshes before the health check fails outright
const UNAVAILABLE_AFTER: usize = 10;

/// Service health state
#[derive(Clone, Default)]
pub struct HealthState {
    pub last_refresh_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_refresh_count: Arc<RwLock<usize>>,
    pub error_count: Arc<RwLock<usize>>,
    pub last_regeneration_time: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_refresh(&self, count: usize) {
        *self.last_refresh_time.write().await = Some(Utc::now());
        *self.last_refresh_count.write().await = count;
        *self.error_count.write().await = 0;
    }

    pub async fn record_error(&self) {
        *self.error_count.write().await += 1;
    }

    pub async fn record_regeneration(&self) {
        *self.last_regeneration_time.write().await = Some(Utc::now());
    }

    /// Status code and body for `/health`
    pub async fn report(&self, pool_counts: Option<HashMap<PredictionCategory, usize>>) -> (StatusCode, Value) {
        let last_refresh = *self.last_refresh_time.read().await;
        let last_count = *self.last_refresh_count.read().await;
        let errors = *self.error_count.read().await;
        let last_regeneration = *self.last_regeneration_time.read().await;

        let status = if errors > DEGRADED_AFTER { "degraded" } else { "ok" };
        let http_status = if errors > UNAVAILABLE_AFTER {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };

        let pools = pool_counts.map(|counts| {
            counts
                .into_iter()
                .map(|(category, n)| (category.as_str().to_string(), json!(n)))
                .collect::<serde_json::Map<_, _>>()
        });

        (
            http_status,
            json!({
                "service": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "status": status,
                "last_refresh": last_refresh.map(|t| t.to_rfc3339()),
                "cached_matches": last_count,
                "consecutive_errors": errors,
                "last_regeneration": last_regeneration.map(|t| t.to_rfc3339()),
                "pools": pools,
            }),
        )
    }
}
