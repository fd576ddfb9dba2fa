//! End to end: canned sportsbook pages -> match cache -> engine -> pools.

use async_trait::async_trait;
use odds_predictions::cache::{MatchCache, MemoryMatchStore};
use odds_predictions::engine::PredictionEngine;
use odds_predictions::error::{PipelineError, Result};
use odds_predictions::events::NullEventSink;
use odds_predictions::health::HealthState;
use odds_predictions::llm::{Generator, OutputSchema};
use odds_predictions::pacing::Pacer;
use odds_predictions::pool::{MemoryPoolStore, PredictionPool};
use odds_predictions::registry::SourceRegistry;
use odds_predictions::scheduler::{CategoryOutcome, Scheduler, SchedulerSettings};
use odds_predictions::search::WebSearch;
use odds_predictions::source::{FetchedPage, PageFetcher, SelectorSet, SourceAdapter, SourcePipeline};
use odds_predictions::types::{round2, ExpressBet, ExpressPick, Prediction, PredictionCategory, SinglePick};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const SOURCE_URL: &str = "https://sportsbook.example/football";

const TEAMS: [(&str, &str); 5] = [
    ("Alpha", "Foxtrot"),
    ("Bravo", "Golf"),
    ("Charlie", "Hotel"),
    ("Delta", "India"),
    ("Echo", "Juliett"),
];

const HOME_ODDS: [f64; 5] = [1.50, 1.60, 1.70, 1.80, 1.90];

fn page(count: usize) -> String {
    let cards: String = TEAMS
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, (home, away))| {
            format!(
                r#"<ul class="multi-column-content"><li>
                  <div class="multi-column-time-icon"><time>1{i}:00</time></div>
                  <div class="multi-column-teams">
                    <div class="multi-column-single-team"><p>{home}</p></div>
                    <div class="multi-column-single-team"><p>{away}</p></div>
                  </div>
                  <span class="market-odd-bc">{h:.2}</span><span class="market-odd-bc">3.40</span><span class="market-odd-bc">4.10</span>
                </li></ul>"#,
                i = i,
                home = home,
                away = away,
                h = HOME_ODDS[i],
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", cards)
}

/// Serves one page until switched off, then fails like an unreachable host
struct SwitchableFetcher {
    html: String,
    online: AtomicBool,
}

#[async_trait]
impl PageFetcher for SwitchableFetcher {
    async fn fetch(&self, _url: &str) -> anyhow::Result<FetchedPage> {
        if !self.online.load(Ordering::SeqCst) {
            anyhow::bail!("net::ERR_NAME_NOT_RESOLVED");
        }
        Ok(FetchedPage {
            html: self.html.clone(),
            items_found: true,
        })
    }
}

/// Answers by schema: always picks the first matches, home win, made-up odds
#[derive(Default)]
struct SchemaGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for SchemaGenerator {
    async fn generate(&self, _prompt: &str, schema: &OutputSchema, _temperature: f32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bets = |n: usize| {
            TEAMS
                .iter()
                .take(n)
                .map(|(home, away)| {
                    json!({ "match": format!("{} - {}", home, away), "prediction": "Победа хозяев", "odds": 1.33 })
                })
                .collect::<Vec<_>>()
        };
        let reply = match schema.name {
            "single_prediction" => json!({
                "type": "single",
                "match": "Alpha - Foxtrot",
                "prediction": "Победа хозяев",
                "odds": 1.31,
                "confidence": 78
            }),
            "express_prediction" => json!({
                "type": "express", "bets": bets(3), "total_odds": 2.35, "confidence": 64
            }),
            "express5_prediction" => json!({
                "type": "express5", "bets": bets(5), "total_odds": 4.16, "confidence": 52
            }),
            other => panic!("unexpected schema {}", other),
        };
        Ok(reply.to_string())
    }
}

struct QuotaExhausted;

#[async_trait]
impl Generator for QuotaExhausted {
    async fn generate(&self, _prompt: &str, _schema: &OutputSchema, _temperature: f32) -> Result<String> {
        Err(PipelineError::QuotaExceeded)
    }
}

struct NoSearch;

#[async_trait]
impl WebSearch for NoSearch {
    async fn search(&self, _query: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

struct Harness {
    fetcher: Arc<SwitchableFetcher>,
    cache: Arc<MatchCache>,
    pool: Arc<PredictionPool>,
    scheduler: Scheduler,
}

async fn harness(match_count: usize, generator: Arc<dyn Generator>) -> Harness {
    let registry = Arc::new(SourceRegistry::in_memory());
    registry.replace(&[SOURCE_URL.to_string()]).await.unwrap();

    let fetcher = Arc::new(SwitchableFetcher {
        html: page(match_count),
        online: AtomicBool::new(true),
    });
    let adapter = SourceAdapter::new(fetcher.clone(), SelectorSet::default());
    let source = Arc::new(SourcePipeline::new(registry, adapter, Pacer::unlimited()));

    let events = Arc::new(NullEventSink);
    let cache = Arc::new(MatchCache::new(
        Arc::new(MemoryMatchStore::new()),
        source,
        events.clone(),
    ));
    let pool = Arc::new(PredictionPool::new(Arc::new(MemoryPoolStore::new()), events));
    let engine = Arc::new(PredictionEngine::new(generator, Arc::new(NoSearch), Duration::ZERO));

    let scheduler = Scheduler::new(
        cache.clone(),
        engine,
        pool.clone(),
        HealthState::new(),
        SchedulerSettings {
            cache_refresh_interval: Duration::from_secs(7200),
            cache_startup_delay: Duration::ZERO,
            pool_refresh_hours: vec![12, 18],
            pool_startup_delay: Duration::ZERO,
            model_delay: Duration::ZERO,
            predictions_per_category: 2,
        },
    );

    Harness {
        fetcher,
        cache,
        pool,
        scheduler,
    }
}

#[tokio::test]
async fn scraped_matches_flow_into_validated_pools() {
    let generator = Arc::new(SchemaGenerator::default());
    let h = harness(5, generator.clone()).await;

    let refreshed = assert_ok!(h.scheduler.refresh_cache().await);
    assert_eq!(refreshed.cached, 5);

    let report = h.scheduler.regenerate_pools().await.unwrap();
    for category in PredictionCategory::ALL {
        assert_eq!(
            report.outcome(category),
            Some(&CategoryOutcome::Replaced { stored: 2, failed: 0 })
        );
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 6);

    match h.pool.draw(PredictionCategory::Single).await.unwrap() {
        Prediction::Single(pick) => {
            assert_eq!(pick.odds, HOME_ODDS[0]);
            assert_eq!(pick.confidence, 78);
        }
        other => panic!("unexpected {:?}", other),
    }

    match h.pool.draw(PredictionCategory::Express5).await.unwrap() {
        Prediction::Express5(pick) => {
            let odds: Vec<f64> = pick.bets.iter().map(|b| b.odds).collect();
            assert_eq!(odds, HOME_ODDS.to_vec());
            let product: f64 = odds.iter().product();
            assert!((pick.total_odds - round2(product)).abs() < 0.01);
        }
        other => panic!("unexpected {:?}", other),
    }
}

fn yesterdays_single() -> Prediction {
    Prediction::Single(SinglePick {
        match_name: "Kilo - Lima".to_string(),
        prediction: "Победа хозяев".to_string(),
        odds: 1.42,
        confidence: 80,
    })
}

fn yesterdays_express5() -> Prediction {
    let bets = TEAMS
        .iter()
        .map(|(home, away)| ExpressBet {
            match_name: format!("{} - {}", home, away),
            prediction: "Ничья".to_string(),
            odds: 3.40,
        })
        .collect();
    Prediction::Express5(ExpressPick {
        bets,
        total_odds: 454.35,
        confidence: 20,
    })
}

#[tokio::test]
async fn short_cache_skips_larger_accumulators() {
    let h = harness(3, Arc::new(SchemaGenerator::default())).await;
    h.pool
        .replace(PredictionCategory::Express5, &[yesterdays_express5()])
        .await
        .unwrap();
    h.scheduler.refresh_cache().await.unwrap();

    let report = h.scheduler.regenerate_pools().await.unwrap();
    assert_eq!(
        report.outcome(PredictionCategory::Express5),
        Some(&CategoryOutcome::Skipped { required: 5, available: 3 })
    );
    assert!(matches!(
        report.outcome(PredictionCategory::Express3),
        Some(CategoryOutcome::Replaced { .. })
    ));

    let kept = assert_ok!(h.pool.draw(PredictionCategory::Express5).await);
    assert_eq!(kept, yesterdays_express5());
}

#[tokio::test]
async fn skipped_category_with_no_pool_reports_no_predictions() {
    let h = harness(3, Arc::new(SchemaGenerator::default())).await;
    h.scheduler.refresh_cache().await.unwrap();
    h.scheduler.regenerate_pools().await.unwrap();

    let err = assert_err!(h.pool.draw(PredictionCategory::Express5).await);
    assert_eq!(err.code(), "NO_PREDICTIONS");
}

#[tokio::test]
async fn failed_generations_keep_existing_pools() {
    let h = harness(5, Arc::new(QuotaExhausted)).await;
    h.pool
        .replace(PredictionCategory::Single, &[yesterdays_single()])
        .await
        .unwrap();
    h.scheduler.refresh_cache().await.unwrap();

    let report = h.scheduler.regenerate_pools().await.unwrap();
    assert_eq!(
        report.outcome(PredictionCategory::Single),
        Some(&CategoryOutcome::NothingGenerated { failed: 2 })
    );

    let kept = assert_ok!(h.pool.draw(PredictionCategory::Single).await);
    assert_eq!(kept, yesterdays_single());
    assert_eq!(h.pool.counts().await.unwrap()[&PredictionCategory::Single], 1);
}

#[tokio::test]
async fn unreachable_source_keeps_last_snapshot() {
    let h = harness(5, Arc::new(SchemaGenerator::default())).await;
    h.scheduler.refresh_cache().await.unwrap();

    h.fetcher.online.store(false, Ordering::SeqCst);
    let err = assert_err!(h.scheduler.refresh_cache().await);
    assert_eq!(err.code(), "ACQUISITION_DEGRADED");

    let cached = h.cache.read().await.unwrap();
    assert_eq!(cached.len(), 5);
    assert_eq!(cached[0].home_team, "Alpha");
}
