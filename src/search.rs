//! Best-effort web search used to enrich single-match analysis prompts.
//!
//! Providers are tried in order; a provider that errors or finds nothing hands
//! over to the next one. Total failure yields no context, never an error.

use crate::pacing::Pacer;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest snippet kept from a single query, in characters
pub const SNIPPET_LIMIT: usize = 1500;

/// Most queries issued per analysis
pub const MAX_QUERIES: usize = 4;

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Text found for `query`; empty when the provider has nothing
    async fn search(&self, query: &str) -> anyhow::Result<String>;
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    content: Option<String>,
    snippet: Option<String>,
    title: Option<String>,
}

fn tavily_text(response: TavilyResponse) -> String {
    let joined = response
        .results
        .into_iter()
        .filter_map(|r| {
            [r.content, r.snippet, r.title]
                .into_iter()
                .flatten()
                .find(|s| !s.trim().is_empty())
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, SNIPPET_LIMIT)
}

/// Tavily search API, needs a key
pub struct TavilySearch {
    api_key: String,
    http: Client,
}

impl TavilySearch {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .context("building Tavily client")?;
        Ok(Self { api_key, http })
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .post("https://api.tavily.com/search")
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "search_depth": "basic",
                "max_results": 3,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Tavily returned {}", response.status()));
        }

        let body: TavilyResponse = response.json().await?;
        Ok(tavily_text(body))
    }
}

/// Abstract, answer and the first related topics of an Instant Answer body
fn duckduckgo_text(body: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();

    for field in ["AbstractText", "Answer"] {
        if let Some(text) = body.get(field).and_then(Value::as_str) {
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }
    }

    if let Some(topics) = body.get("RelatedTopics").and_then(Value::as_array) {
        for topic in topics.iter().take(5) {
            let text = ["Text", "FirstURL"]
                .iter()
                .filter_map(|k| topic.get(*k).and_then(Value::as_str))
                .find(|s| !s.is_empty());
            if let Some(text) = text {
                parts.push(text.to_string());
            }
        }
    }

    truncate_chars(&parts.join("\n"), SNIPPET_LIMIT)
}

/// DuckDuckGo Instant Answer API, keyless
pub struct DuckDuckGoSearch {
    http: Client,
}

impl DuckDuckGoSearch {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("Mozilla/5.0 (compatible; SportsAnalytics/1.0)")
            .build()
            .context("building DuckDuckGo client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .get("https://api.duckduckgo.com/")
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("DuckDuckGo returned {}", response.status()));
        }

        // Served as application/x-javascript, so decode from text
        let body: Value = serde_json::from_str(&response.text().await?)?;
        Ok(duckduckgo_text(&body))
    }
}

/// Tries each provider in turn until one returns text
pub struct FallbackSearch {
    providers: Vec<(&'static str, Arc<dyn WebSearch>)>,
}

impl FallbackSearch {
    pub fn new() -> Self {
        Self { providers: Vec::new() }
    }

    pub fn with(mut self, name: &'static str, provider: Arc<dyn WebSearch>) -> Self {
        self.providers.push((name, provider));
        self
    }

    /// Tavily when a key is configured, then DuckDuckGo
    pub fn from_config(tavily_api_key: Option<&str>) -> anyhow::Result<Self> {
        let mut chain = Self::new();
        if let Some(key) = tavily_api_key {
            chain = chain.with("tavily", Arc::new(TavilySearch::new(key.to_string())?));
        }
        Ok(chain.with("duckduckgo", Arc::new(DuckDuckGoSearch::new()?)))
    }
}

impl Default for FallbackSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebSearch for FallbackSearch {
    async fn search(&self, query: &str) -> anyhow::Result<String> {
        for (name, provider) in &self.providers {
            match provider.search(query).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!("{} found {} chars", name, text.chars().count());
                    return Ok(text);
                }
                Ok(_) => debug!("{} found nothing for {:?}", name, query),
                Err(e) => warn!("{} search failed: {}", name, e),
            }
        }
        Ok(String::new())
    }
}

/// Queries issued for one analysis, most specific first
pub fn query_plan(match_name: &str, league: Option<&str>) -> Vec<String> {
    let match_name = match_name.trim();
    if match_name.is_empty() {
        return Vec::new();
    }

    let mut queries = vec![
        format!("{} коэффициенты букмекеров сегодня актуальные", match_name),
        format!("{} ставки коэффициенты 1xbet bet365 fonbet parimatch", match_name),
        format!("{} прогноз статистика форма команд", match_name),
    ];
    match league.map(str::trim).filter(|l| !l.is_empty()) {
        Some(league) => queries.push(format!("{} {} коэффициенты букмекеров", league, match_name)),
        None => queries.push(format!("букмекеры {} коэффициенты на победу тотал", match_name)),
    }
    queries.truncate(MAX_QUERIES);
    queries
}

/// A query and the text it produced
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSnippet {
    pub query: String,
    pub text: String,
}

/// Run every query in order, paced, keeping only the ones that found something
pub async fn gather_context(
    search: &dyn WebSearch,
    pacer: &Pacer,
    queries: &[String],
) -> Vec<SearchSnippet> {
    let mut snippets = Vec::new();
    for query in queries {
        pacer.ready().await;
        match search.search(query).await {
            Ok(text) if !text.trim().is_empty() => snippets.push(SearchSnippet {
                query: query.clone(),
                text: truncate_chars(&text, SNIPPET_LIMIT),
            }),
            Ok(_) => {}
            Err(e) => warn!("Search query {:?} failed: {}", query, e),
        }
    }
    info!("Web search: {}/{} queries returned context", snippets.len(), queries.len());
    snippets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        reply: anyhow::Result<String>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(text.to_string()), calls: AtomicUsize::new(0) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { reply: Err(anyhow!("timeout")), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl WebSearch for Fixed {
        async fn search(&self, _query: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow!("{}", e)),
            }
        }
    }

    #[tokio::test]
    async fn falls_back_to_secondary_provider() {
        let primary = Fixed::failing();
        let secondary = Fixed::ok("Real Madrid won 3 of the last 5");
        let chain = FallbackSearch::new()
            .with("primary", primary.clone())
            .with("secondary", secondary.clone());

        let text = chain.search("Real Madrid - Barcelona").await.unwrap();
        assert_eq!(text, "Real Madrid won 3 of the last 5");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn total_failure_is_empty_context() {
        let chain = FallbackSearch::new()
            .with("a", Fixed::failing())
            .with("b", Fixed::ok("   "));
        assert_eq!(chain.search("q").await.unwrap(), "");

        let snippets = gather_context(&chain, &Pacer::unlimited(), &query_plan("A - B", None)).await;
        assert!(snippets.is_empty());
    }

    #[test]
    fn plan_uses_league_and_caps_queries() {
        let plan = query_plan("Спартак - Зенит", Some("РПЛ"));
        assert_eq!(plan.len(), MAX_QUERIES);
        assert!(plan.iter().all(|q| q.contains("Спартак - Зенит")));
        assert!(plan[3].starts_with("РПЛ "));
        assert!(query_plan("  ", None).is_empty());
    }

    #[test]
    fn duckduckgo_collects_abstract_answer_and_topics() {
        let body = json!({
            "AbstractText": "Derby",
            "Answer": "",
            "RelatedTopics": [
                { "Text": "Topic one" },
                { "FirstURL": "https://example.org/two" },
                {}
            ]
        });
        assert_eq!(duckduckgo_text(&body), "Derby\nTopic one\nhttps://example.org/two");
    }

    #[test]
    fn tavily_snippets_are_capped() {
        let long = "я".repeat(SNIPPET_LIMIT + 100);
        let response = TavilyResponse {
            results: vec![TavilyResult { content: Some(long), snippet: None, title: None }],
        };
        assert_eq!(tavily_text(response).chars().count(), SNIPPET_LIMIT);
    }
}
