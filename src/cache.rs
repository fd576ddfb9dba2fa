//! Aggregated match cache.
//!
//! The cache holds exactly one snapshot of scraped matches. A refresh either
//! replaces the whole snapshot in one step or leaves the previous one in place;
//! readers never see a partially written or temporarily empty set.

use crate::error::{PipelineError, Result};
use crate::events::{publish_best_effort, EventSink, PipelineEvent};
use crate::source::MatchSource;
use crate::types::{MatchKey, MatchWithOdds, Odds};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Persistence for the match snapshot
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Atomically replace the stored snapshot
    async fn replace(&self, matches: &[MatchWithOdds]) -> Result<()>;

    /// Current snapshot ordered by date, then time
    async fn load(&self) -> Result<Vec<MatchWithOdds>>;
}

pub struct PgMatchStore {
    db: PgPool,
}

impl PgMatchStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

type MatchRow = (String, String, NaiveDate, Option<String>, Option<String>, f64, f64, f64);

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn replace(&self, matches: &[MatchWithOdds]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM matches").execute(&mut *tx).await?;

        for m in matches {
            sqlx::query(
                r#"
                INSERT INTO matches (
                    home_team, away_team, match_date, match_time, league,
                    odds_home, odds_draw, odds_away, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&m.home_team)
            .bind(&m.away_team)
            .bind(m.date)
            .bind(&m.time)
            .bind(&m.league)
            .bind(m.odds.home)
            .bind(m.odds.draw)
            .bind(m.odds.away)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<MatchWithOdds>> {
        let rows: Vec<MatchRow> = sqlx::query_as(
            r#"
            SELECT home_team, away_team, match_date, match_time, league,
                   odds_home, odds_draw, odds_away
            FROM matches
            ORDER BY match_date ASC, match_time ASC NULLS LAST
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(home_team, away_team, date, time, league, home, draw, away)| MatchWithOdds {
                home_team,
                away_team,
                date,
                time,
                league,
                odds: Odds { home, draw, away },
            })
            .collect())
    }
}

/// Snapshot swapped behind a lock; readers clone the `Arc` they saw
#[derive(Default)]
pub struct MemoryMatchStore {
    snapshot: RwLock<Arc<Vec<MatchWithOdds>>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn replace(&self, matches: &[MatchWithOdds]) -> Result<()> {
        let mut next = matches.to_vec();
        sort_for_reading(&mut next);
        *self.snapshot.write().await = Arc::new(next);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<MatchWithOdds>> {
        let current = self.snapshot.read().await.clone();
        Ok(current.as_ref().clone())
    }
}

fn sort_for_reading(matches: &mut [MatchWithOdds]) {
    matches.sort_by(|a, b| {
        (a.date, a.time.is_none(), &a.time).cmp(&(b.date, b.time.is_none(), &b.time))
    });
}

/// Drop repeated (home, away, date) keys, keeping the first occurrence
pub fn deduplicate(matches: Vec<MatchWithOdds>) -> Vec<MatchWithOdds> {
    let mut seen: HashSet<MatchKey> = HashSet::with_capacity(matches.len());
    matches.into_iter().filter(|m| seen.insert(m.key())).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub scraped: usize,
    pub cached: usize,
    pub degraded_sources: usize,
}

pub struct MatchCache {
    store: Arc<dyn MatchStore>,
    source: Arc<dyn MatchSource>,
    events: Arc<dyn EventSink>,
}

impl MatchCache {
    pub fn new(
        store: Arc<dyn MatchStore>,
        source: Arc<dyn MatchSource>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            source,
            events,
        }
    }

    /// Scrape all sources and swap in the deduplicated result.
    ///
    /// When scraping fails, or no source produced a recognized page, the stored
    /// snapshot is left untouched and the failure is returned.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        info!("Starting match cache refresh");

        let report = match self.source.collect().await {
            Ok(report) => report,
            Err(e) => {
                error!("Match refresh failed, keeping cached snapshot: {:#}", e);
                return Err(PipelineError::Other(e));
            }
        };

        let degraded_sources = report.sources.iter().filter(|s| s.degraded.is_some()).count();
        if report.all_degraded() {
            warn!(
                "All {} sources degraded, keeping cached snapshot",
                report.sources.len()
            );
            return Err(PipelineError::AcquisitionDegraded(format!(
                "{} of {} sources returned nothing usable",
                degraded_sources,
                report.sources.len()
            )));
        }

        let scraped = report.matches.len();
        let deduped = deduplicate(report.matches);

        if let Err(e) = self.store.replace(&deduped).await {
            error!("Failed to store refreshed matches, keeping cached snapshot: {}", e);
            return Err(e);
        }

        info!(
            "Match cache refreshed: {} matches ({} before dedup, {} degraded sources)",
            deduped.len(),
            scraped,
            degraded_sources
        );
        publish_best_effort(
            self.events.as_ref(),
            PipelineEvent::matches_refreshed(deduped.len()),
        )
        .await;

        Ok(RefreshReport {
            scraped,
            cached: deduped.len(),
            degraded_sources,
        })
    }

    /// Current snapshot, ordered by date then time
    pub async fn read(&self) -> Result<Vec<MatchWithOdds>> {
        self.store.load().await
    }
}
