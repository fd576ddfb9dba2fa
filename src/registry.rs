//! Durable list of sportsbook pages to scrape.

use crate::error::{PipelineError, Result};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;

enum Backend {
    Postgres(PgPool),
    Memory(RwLock<Vec<String>>),
}

pub struct SourceRegistry {
    backend: Backend,
}

impl SourceRegistry {
    pub fn postgres(db: PgPool) -> Self {
        Self {
            backend: Backend::Postgres(db),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(Vec::new())),
        }
    }

    /// Registered URLs in insertion order
    pub async fn list(&self) -> Result<Vec<String>> {
        match &self.backend {
            Backend::Postgres(db) => {
                let urls: Vec<(String,)> =
                    sqlx::query_as("SELECT url FROM source_urls ORDER BY id")
                        .fetch_all(db)
                        .await?;
                Ok(urls.into_iter().map(|(u,)| u).collect())
            }
            Backend::Memory(urls) => Ok(urls.read().await.clone()),
        }
    }

    /// Swap the whole list. Entries are trimmed, blanks dropped, duplicates
    /// collapsed; a malformed URL rejects the whole update.
    pub async fn replace(&self, urls: &[String]) -> Result<Vec<String>> {
        let cleaned = normalize_urls(urls)?;

        match &self.backend {
            Backend::Postgres(db) => {
                let mut tx = db.begin().await?;
                sqlx::query("DELETE FROM source_urls").execute(&mut *tx).await?;
                for url in &cleaned {
                    sqlx::query("INSERT INTO source_urls (url) VALUES ($1)")
                        .bind(url)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
            }
            Backend::Memory(current) => {
                *current.write().await = cleaned.clone();
            }
        }

        info!("Source registry updated: {} URLs", cleaned.len());
        Ok(cleaned)
    }

    /// Fill an empty registry from configuration; never overwrites existing entries
    pub async fn seed_if_empty(&self, urls: &[String]) -> Result<()> {
        if urls.is_empty() || !self.list().await?.is_empty() {
            return Ok(());
        }
        self.replace(urls).await.map(|_| ())
    }
}

fn normalize_urls(urls: &[String]) -> Result<Vec<String>> {
    let mut cleaned: Vec<String> = Vec::new();
    for raw in urls {
        let url = raw.trim();
        if url.is_empty() {
            continue;
        }
        let parsed = reqwest::Url::parse(url)
            .map_err(|_| PipelineError::InvalidRequest(format!("Malformed URL: {}", url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PipelineError::InvalidRequest(format!(
                "Unsupported URL scheme: {}",
                url
            )));
        }
        if !cleaned.iter().any(|u| u == url) {
            cleaned.push(url.to_string());
        }
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replace_cleans_and_swaps() {
        let registry = SourceRegistry::in_memory();
        registry
            .replace(&["https://a.example/x".to_string()])
            .await
            .unwrap();

        let saved = registry
            .replace(&[
                " https://b.example/y ".to_string(),
                "".to_string(),
                "https://b.example/y".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(saved, vec!["https://b.example/y"]);
        assert_eq!(registry.list().await.unwrap(), saved);
    }

    #[tokio::test]
    async fn malformed_url_rejects_update() {
        let registry = SourceRegistry::in_memory();
        registry.replace(&["https://a.example/x".to_string()]).await.unwrap();

        let err = registry
            .replace(&["not a url".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert_eq!(registry.list().await.unwrap(), vec!["https://a.example/x"]);
    }

    #[tokio::test]
    async fn seed_only_fills_empty_registry() {
        let registry = SourceRegistry::in_memory();
        registry.seed_if_empty(&["https://a.example/1".to_string()]).await.unwrap();
        registry.seed_if_empty(&["https://a.example/2".to_string()]).await.unwrap();
        assert_eq!(registry.list().await.unwrap(), vec!["https://a.example/1"]);
    }
}
