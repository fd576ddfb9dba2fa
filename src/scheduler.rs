//! Background jobs: periodic cache refresh and pool regeneration at fixed
//! local hours (cron jobs).
//!
//! Both timers run independently. Model calls inside one regeneration run are
//! strictly sequential with a pause between them.

use crate::cache::{MatchCache, RefreshReport};
use crate::config::Config;
use crate::engine::PredictionEngine;
use crate::error::Result;
use crate::health::HealthState;
use crate::pacing::Pacer;
use crate::pool::PredictionPool;
use crate::types::PredictionCategory;
use anyhow::Context;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub cache_refresh_interval: Duration,
    pub cache_startup_delay: Duration,
    pub pool_refresh_hours: Vec<u32>,
    pub pool_startup_delay: Duration,
    pub model_delay: Duration,
    pub predictions_per_category: usize,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            cache_refresh_interval: config.cache_refresh_interval,
            cache_startup_delay: config.cache_startup_delay,
            pool_refresh_hours: config.pool_refresh_hours.clone(),
            pool_startup_delay: config.pool_startup_delay,
            model_delay: config.model_delay,
            predictions_per_category: config.predictions_per_category,
        }
    }
}

/// What one regeneration run did for a category
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryOutcome {
    /// Pool replaced with `stored` predictions; `failed` generations were dropped
    Replaced { stored: usize, failed: usize },
    /// Not enough cached matches; the existing pool was left alone
    Skipped { required: usize, available: usize },
    /// Every generation failed; the existing pool was left alone
    NothingGenerated { failed: usize },
    /// Generation worked but the pool could not be written
    StoreFailed,
}

#[derive(Debug, Clone, Default)]
pub struct RegenerationReport {
    pub outcomes: Vec<(PredictionCategory, CategoryOutcome)>,
}

impl RegenerationReport {
    pub fn outcome(&self, category: PredictionCategory) -> Option<&CategoryOutcome> {
        self.outcomes
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, outcome)| outcome)
    }
}

pub struct Scheduler {
    cache: Arc<MatchCache>,
    engine: Arc<PredictionEngine>,
    pool: Arc<PredictionPool>,
    health: HealthState,
    model_pacer: Pacer,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        cache: Arc<MatchCache>,
        engine: Arc<PredictionEngine>,
        pool: Arc<PredictionPool>,
        health: HealthState,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            cache,
            engine,
            pool,
            health,
            model_pacer: Pacer::new(settings.model_delay),
            settings,
        }
    }

    /// Refresh the match cache once, recording the outcome for `/health`
    pub async fn refresh_cache(&self) -> Result<RefreshReport> {
        let start = std::time::Instant::now();
        match self.cache.refresh().await {
            Ok(report) => {
                self.health.record_refresh(report.cached).await;
                info!(
                    "Cache refresh completed: {} matches ({} degraded sources) in {:?}",
                    report.cached,
                    report.degraded_sources,
                    start.elapsed()
                );
                Ok(report)
            }
            Err(e) => {
                self.health.record_error().await;
                error!("Cache refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Rebuild every category's pool from the current cache.
    ///
    /// A failed generation is logged and skipped; a category's pool is only
    /// replaced when at least one prediction was produced.
    pub async fn regenerate_pools(&self) -> Result<RegenerationReport> {
        let matches = self.cache.read().await?;
        let per_category = self.settings.predictions_per_category;
        info!(
            "Regenerating prediction pools from {} cached matches ({} per category)",
            matches.len(),
            per_category
        );

        let mut report = RegenerationReport::default();
        for category in PredictionCategory::ALL {
            let required = category.required_matches();
            if matches.len() < required {
                warn!(
                    "Skipping {}: need {} matches, have {}",
                    category,
                    required,
                    matches.len()
                );
                report.outcomes.push((
                    category,
                    CategoryOutcome::Skipped { required, available: matches.len() },
                ));
                continue;
            }

            let mut generated = Vec::with_capacity(per_category);
            let mut failed = 0;
            for i in 0..per_category {
                self.model_pacer.ready().await;
                match self.engine.generate(category, &matches).await {
                    Ok(prediction) => generated.push(prediction),
                    Err(e) => {
                        failed += 1;
                        error!("{} generation {}/{} failed: {}", category, i + 1, per_category, e);
                    }
                }
            }

            let outcome = if generated.is_empty() {
                warn!("No {} predictions generated, keeping the existing pool", category);
                CategoryOutcome::NothingGenerated { failed }
            } else {
                match self.pool.replace(category, &generated).await {
                    Ok(()) => CategoryOutcome::Replaced { stored: generated.len(), failed },
                    Err(e) => {
                        error!("Failed to store {} pool: {}", category, e);
                        CategoryOutcome::StoreFailed
                    }
                }
            };
            report.outcomes.push((category, outcome));
        }

        self.health.record_regeneration().await;
        Ok(report)
    }

    async fn run_cache_timer(&self) {
        let start = Instant::now() + self.settings.cache_startup_delay;
        let period = self.settings.cache_refresh_interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Cache refresh every {:?}, first run in {:?}",
            self.settings.cache_refresh_interval, self.settings.cache_startup_delay
        );

        loop {
            ticker.tick().await;
            // Failures are already logged and counted
            let _ = self.refresh_cache().await;
        }
    }

    /// One cron job per configured local hour, each running a regeneration
    pub async fn pool_jobs(self: &Arc<Self>) -> anyhow::Result<JobScheduler> {
        let expressions = pool_cron_expressions(&self.settings.pool_refresh_hours);
        if expressions.is_empty() {
            anyhow::bail!("No valid pool refresh hours configured");
        }

        let jobs = JobScheduler::new().await.context("creating pool scheduler")?;
        for cron in &expressions {
            let scheduler = Arc::clone(self);
            let job = Job::new_async_tz(cron.as_str(), Local, move |_uuid, _lock| {
                let scheduler = Arc::clone(&scheduler);
                Box::pin(async move {
                    scheduler.regenerate_logged().await;
                })
            })
            .with_context(|| format!("creating pool job for cron {}", cron))?;
            jobs.add(job).await.context("adding pool job")?;
        }
        info!("Pool regeneration scheduled at {:?} (local time)", expressions);
        Ok(jobs)
    }

    async fn run_pool_startup(&self) {
        tokio::time::sleep(self.settings.pool_startup_delay).await;
        self.regenerate_logged().await;
    }

    async fn regenerate_logged(&self) {
        match self.regenerate_pools().await {
            Ok(report) => info!("Pool regeneration finished: {:?}", report.outcomes),
            Err(e) => error!("Pool regeneration failed: {}", e),
        }
    }

    /// Run the cache timer and the pool jobs until the task is dropped
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let jobs = self.pool_jobs().await?;
        jobs.start().await.context("starting pool scheduler")?;

        tokio::join!(self.run_cache_timer(), self.run_pool_startup());
        Ok(())
    }
}

/// Six-field cron expressions (`sec min hour dom mon dow`) firing on the hour,
/// sorted and deduplicated; hours outside 0..24 are dropped
pub fn pool_cron_expressions(hours: &[u32]) -> Vec<String> {
    let mut hours: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
    hours.sort_unstable();
    hours.dedup();
    hours.iter().map(|h| format!("0 0 {} * * *", h)).collect()
}
