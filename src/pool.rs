//! Precomputed prediction pool, one batch per category.

use crate::error::{PipelineError, Result};
use crate::events::{publish_best_effort, EventSink, PipelineEvent};
use crate::types::{Prediction, PredictionCategory};
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Swap the whole batch for `category` in one step
    async fn replace(&self, category: PredictionCategory, predictions: &[Prediction]) -> Result<()>;

    /// One uniformly random stored prediction, `None` when the batch is empty
    async fn draw_random(&self, category: PredictionCategory) -> Result<Option<Prediction>>;

    /// Stored predictions per category; every category is present
    async fn counts(&self) -> Result<HashMap<PredictionCategory, usize>>;
}

fn check_categories(category: PredictionCategory, predictions: &[Prediction]) -> Result<()> {
    match predictions.iter().find(|p| p.category() != category) {
        Some(p) => Err(PipelineError::InvalidRequest(format!(
            "{} prediction cannot be stored in the {} pool",
            p.category(),
            category
        ))),
        None => Ok(()),
    }
}

pub struct PgPoolStore {
    db: PgPool,
}

impl PgPoolStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PoolStore for PgPoolStore {
    async fn replace(&self, category: PredictionCategory, predictions: &[Prediction]) -> Result<()> {
        check_categories(category, predictions)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM predictions WHERE category = $1")
            .bind(category.as_str())
            .execute(&mut *tx)
            .await?;

        for prediction in predictions {
            sqlx::query(
                "INSERT INTO predictions (id, category, data, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(category.as_str())
            .bind(serde_json::to_string(prediction)?)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn draw_random(&self, category: PredictionCategory) -> Result<Option<Prediction>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT data FROM predictions WHERE category = $1 ORDER BY random() LIMIT 1",
        )
        .bind(category.as_str())
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some((data,)) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn counts(&self) -> Result<HashMap<PredictionCategory, usize>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT category, COUNT(*) FROM predictions GROUP BY category")
                .fetch_all(&self.db)
                .await?;

        let mut counts: HashMap<PredictionCategory, usize> =
            PredictionCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for (category, count) in rows {
            if let Ok(category) = category.parse::<PredictionCategory>() {
                counts.insert(category, count.max(0) as usize);
            }
        }
        Ok(counts)
    }
}

/// Batches held in memory, each swapped as a whole
#[derive(Default)]
pub struct MemoryPoolStore {
    batches: RwLock<HashMap<PredictionCategory, Arc<Vec<Prediction>>>>,
}

impl MemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PoolStore for MemoryPoolStore {
    async fn replace(&self, category: PredictionCategory, predictions: &[Prediction]) -> Result<()> {
        check_categories(category, predictions)?;
        let batch = Arc::new(predictions.to_vec());
        self.batches.write().await.insert(category, batch);
        Ok(())
    }

    async fn draw_random(&self, category: PredictionCategory) -> Result<Option<Prediction>> {
        let batch = self.batches.read().await.get(&category).cloned();
        Ok(batch.and_then(|b| b.choose(&mut rand::thread_rng()).cloned()))
    }

    async fn counts(&self) -> Result<HashMap<PredictionCategory, usize>> {
        let batches = self.batches.read().await;
        Ok(PredictionCategory::ALL
            .iter()
            .map(|c| (*c, batches.get(c).map_or(0, |b| b.len())))
            .collect())
    }
}

/// Pool access for the scheduler and the consumer surface
pub struct PredictionPool {
    store: Arc<dyn PoolStore>,
    events: Arc<dyn EventSink>,
}

impl PredictionPool {
    pub fn new(store: Arc<dyn PoolStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    pub async fn replace(&self, category: PredictionCategory, predictions: &[Prediction]) -> Result<()> {
        self.store.replace(category, predictions).await?;
        info!("Replaced {} pool with {} predictions", category, predictions.len());
        publish_best_effort(
            self.events.as_ref(),
            PipelineEvent::pool_replaced(category, predictions.len()),
        )
        .await;
        Ok(())
    }

    /// Random pooled prediction, or `EmptyPool` when nothing is stored yet
    pub async fn draw(&self, category: PredictionCategory) -> Result<Prediction> {
        self.store
            .draw_random(category)
            .await?
            .ok_or(PipelineError::EmptyPool(category))
    }

    pub async fn counts(&self) -> Result<HashMap<PredictionCategory, usize>> {
        self.store.counts().await
    }
}
