use anyhow::{anyhow, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS matches (
        home_team   TEXT NOT NULL,
        away_team   TEXT NOT NULL,
        match_date  DATE NOT NULL,
        match_time  TEXT,
        league      TEXT,
        odds_home   DOUBLE PRECISION NOT NULL CHECK (odds_home > 0),
        odds_draw   DOUBLE PRECISION NOT NULL CHECK (odds_draw > 0),
        odds_away   DOUBLE PRECISION NOT NULL CHECK (odds_away > 0),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (home_team, away_team, match_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS predictions (
        id          UUID PRIMARY KEY,
        category    TEXT NOT NULL,
        data        TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS predictions_category_idx ON predictions (category)",
    r#"
    CREATE TABLE IF NOT EXISTS source_urls (
        id          BIGSERIAL PRIMARY KEY,
        url         TEXT NOT NULL UNIQUE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

/// Connect to Postgres, backing off exponentially between attempts
pub async fn connect_with_retry(url: &str, max_retries: u32) -> Result<PgPool> {
    let mut attempt = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
        {
            Ok(pool) => {
                info!("Connected to PostgreSQL");
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;
                if attempt >= max_retries {
                    return Err(anyhow!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries,
                        e
                    ));
                }
                warn!("Database connection attempt {} failed: {}. Retrying...", attempt, e);
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
        }
    }
}

/// Create tables the pipeline owns if they are missing
pub async fn ensure_schema(db: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db).await?;
    }
    info!("Database schema ready");
    Ok(())
}
