//! Pipeline notifications on a Redis stream.

use crate::error::Result;
use crate::types::PredictionCategory;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub const STREAM_KEY: &str = "predictions.events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MatchesRefreshed,
    PoolReplaced,
}

impl EventKind {
    fn as_str(&self) -> &'static str {
        match self {
            EventKind::MatchesRefreshed => "matches_refreshed",
            EventKind::PoolReplaced => "pool_replaced",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<PredictionCategory>,
    pub count: usize,
    pub at: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn matches_refreshed(count: usize) -> Self {
        Self {
            kind: EventKind::MatchesRefreshed,
            category: None,
            count,
            at: Utc::now(),
        }
    }

    pub fn pool_replaced(category: PredictionCategory, count: usize) -> Self {
        Self {
            kind: EventKind::PoolReplaced,
            category: Some(category),
            count,
            at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &PipelineEvent) -> Result<()>;
}

/// Used when no Redis is configured
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: &PipelineEvent) -> Result<()> {
        Ok(())
    }
}

pub struct RedisEventSink {
    conn: redis::aio::ConnectionManager,
}

impl RedisEventSink {
    pub async fn connect_with_retry(url: &str, max_retries: u32) -> anyhow::Result<Self> {
        let mut attempt = 0;
        loop {
            let connected = match redis::Client::open(url) {
                Ok(client) => redis::aio::ConnectionManager::new(client).await,
                Err(e) => Err(e),
            };
            match connected {
                Ok(conn) => {
                    info!("Connected to Redis");
                    return Ok(Self { conn });
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(anyhow!(
                            "Failed to connect to Redis after {} attempts: {}",
                            max_retries,
                            e
                        ));
                    }
                    warn!("Redis connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }
}

#[async_trait]
impl EventSink for RedisEventSink {
    async fn publish(&self, event: &PipelineEvent) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(event)?;
        let category = event.category.map(|c| c.as_str()).unwrap_or("");

        let _: String = conn
            .xadd(
                STREAM_KEY,
                "*",
                &[
                    ("kind", event.kind.as_str()),
                    ("category", category),
                    ("data", payload.as_str()),
                ],
            )
            .await?;
        Ok(())
    }
}

/// Publish without letting a notification failure fail the caller
pub async fn publish_best_effort(sink: &dyn EventSink, event: PipelineEvent) {
    if let Err(e) = sink.publish(&event).await {
        warn!("Failed to publish {:?} event: {}", event.kind, e);
    }
}
