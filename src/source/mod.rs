//! Source adapter: rendered sportsbook pages in, `MatchWithOdds` out.
//!
//! A single URL never fails the caller. Anything that goes wrong while loading
//! or reading a page becomes a `SourceOutcome::Degraded` so the multi-source
//! run can move on to the next URL.

pub mod browser;
pub mod parse;

use crate::pacing::Pacer;
use crate::registry::SourceRegistry;
use crate::types::MatchWithOdds;
use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub use parse::SelectorSet;

/// Raw page as handed over by the browser
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    /// Whether match cards showed up before the element wait ran out
    pub items_found: bool,
}

/// Loads a page and returns its DOM after dynamic content settled
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<FetchedPage>;
}

/// Why a source produced nothing usable
#[derive(Debug, Clone, PartialEq)]
pub enum DegradedReason {
    /// Page loaded but no match cards were recognized
    NoMatchElements { snapshot: Option<PathBuf> },
    /// Browser launch, navigation or extraction failed
    Unreachable(String),
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradedReason::NoMatchElements { snapshot: Some(path) } => {
                write!(f, "no match elements (snapshot: {})", path.display())
            }
            DegradedReason::NoMatchElements { snapshot: None } => write!(f, "no match elements"),
            DegradedReason::Unreachable(msg) => write!(f, "unreachable: {}", msg),
        }
    }
}

/// Result of scraping one URL
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    /// Page was recognized; may legitimately hold zero complete matches
    Matches(Vec<MatchWithOdds>),
    Degraded(DegradedReason),
}

pub struct SourceAdapter {
    fetcher: Arc<dyn PageFetcher>,
    selectors: SelectorSet,
    debug_dir: Option<PathBuf>,
}

impl SourceAdapter {
    pub fn new(fetcher: Arc<dyn PageFetcher>, selectors: SelectorSet) -> Self {
        Self {
            fetcher,
            selectors,
            debug_dir: None,
        }
    }

    /// Directory for page snapshots of unrecognized pages
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    pub fn debug_dir(&self) -> Option<&Path> {
        self.debug_dir.as_deref()
    }

    pub async fn scrape(&self, url: &str, label: &str) -> SourceOutcome {
        self.scrape_on(url, label, Local::now().date_naive()).await
    }

    /// Scrape with an explicit "today" used to complete year-less dates
    pub async fn scrape_on(&self, url: &str, label: &str, today: NaiveDate) -> SourceOutcome {
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                error!("Scraping {} failed: {:#}", url, e);
                return SourceOutcome::Degraded(DegradedReason::Unreachable(format!("{:#}", e)));
            }
        };

        if !page.items_found && parse::count_match_elements(&page.html, &self.selectors) == 0 {
            let snapshot = self.save_snapshot(&page.html).await;
            warn!("No match elements on {} ({} bytes of HTML)", url, page.html.len());
            return SourceOutcome::Degraded(DegradedReason::NoMatchElements { snapshot });
        }

        let matches = parse::parse_matches(&page.html, label, today, &self.selectors);
        info!("{}: {} matches with complete odds", url, matches.len());
        SourceOutcome::Matches(matches)
    }

    async fn save_snapshot(&self, html: &str) -> Option<PathBuf> {
        let dir = self.debug_dir.as_ref()?;
        let path = dir.join(format!(
            "page-{}-{}.html",
            Utc::now().format("%Y%m%dT%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        ));
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("Cannot create debug dir {}: {}", dir.display(), e);
            return None;
        }
        match tokio::fs::write(&path, html).await {
            Ok(()) => {
                info!("Page snapshot saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Cannot write page snapshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Per-URL line of a scrape run
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub url: String,
    pub label: String,
    pub matches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

/// Everything a multi-source run produced, before dedup
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    pub matches: Vec<MatchWithOdds>,
    pub sources: Vec<SourceStatus>,
}

impl ScrapeReport {
    /// True when no source produced a recognized page
    pub fn all_degraded(&self) -> bool {
        self.sources.iter().all(|s| s.degraded.is_some())
    }
}

/// Source of fresh match data for the cache
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn collect(&self) -> anyhow::Result<ScrapeReport>;
}

/// Scrapes every registered URL, one after another
pub struct SourcePipeline {
    registry: Arc<SourceRegistry>,
    adapter: SourceAdapter,
    pacer: Pacer,
}

impl SourcePipeline {
    pub fn new(registry: Arc<SourceRegistry>, adapter: SourceAdapter, pacer: Pacer) -> Self {
        Self {
            registry,
            adapter,
            pacer,
        }
    }

    async fn write_report(&self, urls: &[String], report: &ScrapeReport) {
        let Some(dir) = self.adapter.debug_dir() else {
            return;
        };
        let body = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "urls": urls,
            "total_matches": report.matches.len(),
            "sources": report.sources,
            "matches": report.matches,
        });
        let path = dir.join("scrape-report.json");
        let written = match serde_json::to_vec_pretty(&body) {
            Ok(bytes) => match tokio::fs::create_dir_all(dir).await {
                Ok(()) => tokio::fs::write(&path, bytes).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            warn!("Cannot write scrape report {}: {}", path.display(), e);
        }
    }
}

#[async_trait]
impl MatchSource for SourcePipeline {
    async fn collect(&self) -> anyhow::Result<ScrapeReport> {
        let urls = self.registry.list().await?;
        if urls.is_empty() {
            warn!("No source URLs registered");
            return Ok(ScrapeReport::default());
        }

        let mut report = ScrapeReport::default();
        for (i, url) in urls.iter().enumerate() {
            self.pacer.ready().await;

            let label = format!("Лига {}", i + 1);
            info!("Scraping source {}/{}: {}", i + 1, urls.len(), url);

            let status = match self.adapter.scrape(url, &label).await {
                SourceOutcome::Matches(found) => {
                    if found.is_empty() {
                        warn!("Source {} returned 0 matches", i + 1);
                    }
                    let count = found.len();
                    report.matches.extend(found);
                    SourceStatus {
                        url: url.clone(),
                        label,
                        matches: count,
                        degraded: None,
                    }
                }
                SourceOutcome::Degraded(reason) => {
                    warn!("Source {} degraded: {}", i + 1, reason);
                    SourceStatus {
                        url: url.clone(),
                        label,
                        matches: 0,
                        degraded: Some(reason.to_string()),
                    }
                }
            };
            report.sources.push(status);
        }

        info!(
            "Scraped {} matches from {} sources",
            report.matches.len(),
            urls.len()
        );
        self.write_report(&urls, &report).await;
        Ok(report)
    }
}
