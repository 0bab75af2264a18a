//! Connection pool configuration and bootstrap.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub type DbPool = PgPool;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/tiger_harness".to_string()),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Initializes the connection pool and applies pending migrations.
pub async fn init_db(config: DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    Ok(pool)
}

pub async fn init_db_default() -> Result<DbPool> {
    init_db(DbConfig::default()).await
}

/// Used by the readiness probe; a cheap round trip rather than a full health
/// model.
pub async fn health_check(pool: &DbPool) -> Result<bool> {
    sqlx::query("SELECT 1").execute(pool).await.context("database health check failed")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> Option<DbPool> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let config = DbConfig {
            database_url,
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
        };
        init_db(config).await.ok()
    }

    #[tokio::test]
    async fn health_check_succeeds_against_a_live_pool() {
        let Some(pool) = setup_test_db().await else {
            eprintln!("skipping: TEST_DATABASE_URL not set");
            return;
        };
        assert!(health_check(&pool).await.unwrap());
    }
}
