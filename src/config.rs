use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub tavily_api_key: Option<String>,
    /// Postgres; stores run in memory when unset
    pub database_url: Option<String>,
    /// Redis; events are not published when unset
    pub redis_url: Option<String>,
    pub http_port: u16,
    /// Bearer token for `PUT /api/sources`; the route is closed when unset
    pub admin_token: Option<String>,
    /// Seeds the source registry when it is empty
    pub source_urls: Vec<String>,
    pub cache_refresh_interval: Duration,
    pub cache_startup_delay: Duration,
    /// Local hours at which the prediction pools are regenerated
    pub pool_refresh_hours: Vec<u32>,
    pub pool_startup_delay: Duration,
    pub scrape_delay: Duration,
    pub model_delay: Duration,
    pub predictions_per_category: usize,
    pub browser: BrowserSettings,
    pub debug_dir: Option<PathBuf>,
    /// If true, refresh + regenerate once and exit
    pub run_once: bool,
}

/// Headless browser timeouts
#[derive(Clone, Debug)]
pub struct BrowserSettings {
    pub navigation_timeout: Duration,
    pub element_wait: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(60),
            element_wait: Duration::from_secs(15),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Secrets:
        // - Docker Compose: read from /run/secrets/*
        // - everything else: env vars
        let openai_api_key = match env::var("OPENAI_API_KEY") {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            Ok(_) => return Err(anyhow!("OPENAI_API_KEY is set but empty")),
            Err(_) => read_secret_file("/run/secrets/openai_api_key", "openai_api_key")?,
        };

        if looks_like_placeholder(&openai_api_key) {
            return Err(anyhow!(
                "OPENAI_API_KEY appears to be a placeholder value; replace with your real key"
            ));
        }

        let pool_refresh_hours = parse_hours(
            &env::var("POOL_REFRESH_HOURS").unwrap_or_else(|_| "12,18".to_string()),
        )?;

        Ok(Self {
            openai_api_key,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            tavily_api_key: non_empty_var("TAVILY_API_KEY"),
            database_url: non_empty_var("DATABASE_URL"),
            redis_url: non_empty_var("REDIS_URL"),
            http_port: parse_var("HTTP_PORT", 8084),
            admin_token: non_empty_var("ADMIN_TOKEN").map(|t| t.trim().to_string()),
            source_urls: env::var("SOURCE_URLS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            cache_refresh_interval: Duration::from_secs(parse_var("CACHE_REFRESH_SECONDS", 7200)),
            cache_startup_delay: Duration::from_secs(parse_var("CACHE_STARTUP_DELAY_SECONDS", 2)),
            pool_refresh_hours,
            pool_startup_delay: Duration::from_secs(parse_var("POOL_STARTUP_DELAY_SECONDS", 120)),
            scrape_delay: Duration::from_millis(parse_var("SCRAPE_DELAY_MS", 2000)),
            model_delay: Duration::from_millis(parse_var("MODEL_DELAY_MS", 2500)),
            predictions_per_category: parse_var("PREDICTIONS_PER_CATEGORY", 5),
            browser: BrowserSettings {
                navigation_timeout: Duration::from_secs(parse_var(
                    "BROWSER_NAVIGATION_TIMEOUT_SECONDS",
                    60,
                )),
                element_wait: Duration::from_secs(parse_var("BROWSER_ELEMENT_WAIT_SECONDS", 15)),
            },
            debug_dir: non_empty_var("DEBUG_DIR").map(PathBuf::from),
            run_once: env::var("RUN_ONCE")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                == "true",
        })
    }
}

/// Read a secret from a Docker secret file
fn read_secret_file(file_path: &str, secret_name: &str) -> Result<String> {
    std::fs::read_to_string(file_path)
        .map(|s| s.trim().to_string())
        .context(format!(
            "Secret not found: set the env var or mount {} ({})",
            file_path, secret_name
        ))
}

fn looks_like_placeholder(key: &str) -> bool {
    let lower = key.trim().to_lowercase();
    lower.contains("change_me") || lower.contains("your_") || lower.starts_with("sample")
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_hours(raw: &str) -> Result<Vec<u32>> {
    let mut hours = Vec::new();
    for part in split_list(raw) {
        let hour: u32 = part
            .parse()
            .with_context(|| format!("POOL_REFRESH_HOURS entry is not a number: {}", part))?;
        if hour > 23 {
            return Err(anyhow!("POOL_REFRESH_HOURS entry out of range: {}", hour));
        }
        hours.push(hour);
    }
    hours.sort_unstable();
    hours.dedup();
    if hours.is_empty() {
        return Err(anyhow!("POOL_REFRESH_HOURS must name at least one hour"));
    }
    Ok(hours)
}
