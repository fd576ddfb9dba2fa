//! Odds Predictions Service
//!
//! Scrapes sportsbook pages into a match cache every few hours and refills the
//! prediction pools twice a day. Serves matches, pooled predictions and
//! on-demand analysis over HTTP.

use anyhow::{Context, Result};
use odds_predictions::api::{self, AppState};
use odds_predictions::cache::{MatchCache, MatchStore, MemoryMatchStore, PgMatchStore};
use odds_predictions::config::Config;
use odds_predictions::db;
use odds_predictions::engine::PredictionEngine;
use odds_predictions::events::{EventSink, NullEventSink, RedisEventSink};
use odds_predictions::health::HealthState;
use odds_predictions::llm::{OpenAiClient, OpenAiConfig};
use odds_predictions::pacing::Pacer;
use odds_predictions::pool::{MemoryPoolStore, PgPoolStore, PoolStore, PredictionPool};
use odds_predictions::registry::SourceRegistry;
use odds_predictions::scheduler::{Scheduler, SchedulerSettings};
use odds_predictions::search::FallbackSearch;
use odds_predictions::source::browser::ChromeFetcher;
use odds_predictions::source::{SelectorSet, SourceAdapter, SourcePipeline};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SEARCH_PAUSE: Duration = Duration::from_millis(600);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("odds_predictions=info".parse()?),
        )
        .init();

    info!("Odds Predictions Service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    // Storage: Postgres when configured, in-memory otherwise
    let (match_store, pool_store, registry) = match &config.database_url {
        Some(url) => {
            let db = db::connect_with_retry(url, 5).await?;
            db::ensure_schema(&db).await?;
            (
                Arc::new(PgMatchStore::new(db.clone())) as Arc<dyn MatchStore>,
                Arc::new(PgPoolStore::new(db.clone())) as Arc<dyn PoolStore>,
                SourceRegistry::postgres(db),
            )
        }
        None => {
            warn!("DATABASE_URL not set, matches and predictions are kept in memory");
            (
                Arc::new(MemoryMatchStore::new()) as Arc<dyn MatchStore>,
                Arc::new(MemoryPoolStore::new()) as Arc<dyn PoolStore>,
                SourceRegistry::in_memory(),
            )
        }
    };
    let registry = Arc::new(registry);
    registry.seed_if_empty(&config.source_urls).await?;

    let events: Arc<dyn EventSink> = match &config.redis_url {
        Some(url) => Arc::new(RedisEventSink::connect_with_retry(url, 5).await?),
        None => {
            info!("REDIS_URL not set, pipeline events are not published");
            Arc::new(NullEventSink)
        }
    };

    // Acquisition
    let selectors = SelectorSet::default();
    let fetcher = Arc::new(ChromeFetcher::new(config.browser.clone(), selectors.clone()));
    let adapter = SourceAdapter::new(fetcher, selectors).with_debug_dir(config.debug_dir.clone());
    let source = Arc::new(SourcePipeline::new(
        registry.clone(),
        adapter,
        Pacer::new(config.scrape_delay),
    ));
    let cache = Arc::new(MatchCache::new(match_store, source, events.clone()));

    // Generation
    let generator = Arc::new(
        OpenAiClient::new(OpenAiConfig {
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.clone(),
            model: config.openai_model.clone(),
            ..Default::default()
        })
        .context("Failed to create model client")?,
    );
    let search = Arc::new(FallbackSearch::from_config(config.tavily_api_key.as_deref())?);
    let engine = Arc::new(PredictionEngine::new(generator, search, SEARCH_PAUSE));
    let pool = Arc::new(PredictionPool::new(pool_store, events));

    let health = HealthState::new();
    let scheduler = Arc::new(Scheduler::new(
        cache.clone(),
        engine.clone(),
        pool.clone(),
        health.clone(),
        SchedulerSettings::from(&config),
    ));

    // HTTP surface
    let app = api::router(AppState {
        cache,
        pool,
        engine,
        registry,
        health,
        admin_token: config.admin_token.as_deref().map(Arc::from),
    });
    if config.admin_token.is_none() {
        info!("ADMIN_TOKEN not set, PUT /api/sources is disabled");
    }
    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server stopped: {}", e);
        }
    });

    if config.run_once {
        info!("Running in one-shot mode (RUN_ONCE=true)");
        if let Err(e) = scheduler.refresh_cache().await {
            warn!("Refresh failed, generating from the existing cache: {}", e);
        }
        let report = scheduler.regenerate_pools().await?;
        info!("One-shot run completed: {:?}", report.outcomes);
        return Ok(());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        result = scheduler.run() => {
            match result {
                Ok(()) => error!("Scheduler stopped unexpectedly"),
                Err(e) => error!("Scheduler failed to start: {:#}", e),
            }
        }
        _ = ctrl_c => {
            info!("Shutting down...");
        }
    }

    Ok(())
}
