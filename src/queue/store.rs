use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::HarnessError;
use crate::models::{Event, EventHist};

/// Transactional access to the live `event` table and the terminal
/// `event_hist` table. Every method here opens and commits its own
/// transaction; callers never see partial effects.
#[derive(Debug, Clone)]
pub struct QueueStore {
    pool: PgPool,
}

impl QueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts a new live row with `attempts = 0` and an immediately-visible
    /// lease. `event_ts` is the upstream wall-clock time the event occurred.
    #[tracing::instrument(skip(self, payload))]
    pub async fn insert_event(
        &self,
        event_ts: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Result<i64, HarnessError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO event (event_ts, attempts, vt, claimed, event)
            VALUES ($1, 0, now(), ARRAY[]::timestamptz[], $2)
            RETURNING id
            "#,
        )
        .bind(event_ts)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;
        tracing::debug!(event_id = id, "inserted event");
        Ok(id)
    }

    /// Atomically reserves at most one eligible row: eligibility is
    /// `vt <= now() AND attempts < max_attempts`. Selection is randomized to
    /// spread contention across workers, and non-blocking (`FOR UPDATE SKIP
    /// LOCKED`) so a worker never waits behind another worker's claim.
    #[tracing::instrument(skip(self))]
    pub async fn claim_event(
        &self,
        max_attempts: i32,
        lease: std::time::Duration,
    ) -> Result<Option<Event>, HarnessError> {
        let lease_secs = lease.as_secs() as f64;
        let event = sqlx::query_as::<_, Event>(
            r#"
            WITH eligible AS (
                SELECT id
                FROM event
                WHERE vt <= now() AND attempts < $1
                ORDER BY random()
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE event e
            SET vt = now() + ($2 * interval '1 second'),
                attempts = e.attempts + 1,
                claimed = e.claimed || now()
            FROM eligible
            WHERE e.id = eligible.id
            RETURNING e.id, e.event_ts, e.attempts, e.vt, e.claimed, e.event
            "#,
        )
        .bind(max_attempts)
        .bind(lease_secs)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ref ev) = event {
            tracing::debug!(event_id = ev.id, attempts = ev.attempts, "claimed event");
        }
        Ok(event)
    }

    /// Moves a live row to history in one transaction, tagging it with
    /// whether a handler completed it successfully.
    #[tracing::instrument(skip(self))]
    pub async fn delete_event(&self, id: i64, processed: bool) -> Result<(), HarnessError> {
        sqlx::query(
            r#"
            WITH moved AS (
                DELETE FROM event WHERE id = $1
                RETURNING id, event_ts, attempts, vt, claimed, event
            )
            INSERT INTO event_hist (id, event_ts, attempts, vt, claimed, event, processed)
            SELECT id, event_ts, attempts, vt, claimed, event, $2 FROM moved
            "#,
        )
        .bind(id)
        .bind(processed)
        .execute(&self.pool)
        .await?;
        tracing::debug!(event_id = id, processed, "retired event to history");
        Ok(())
    }

    /// Sweeps every live row whose attempts or age exceed the configured
    /// limits into history with `processed = false`. Returns the count moved.
    #[tracing::instrument(skip(self))]
    pub async fn delete_expired_events(
        &self,
        max_attempts: i32,
        max_age: std::time::Duration,
    ) -> Result<u64, HarnessError> {
        let max_age_secs = max_age.as_secs() as f64;
        let result = sqlx::query(
            r#"
            WITH moved AS (
                DELETE FROM event
                WHERE attempts >= $1 OR event_ts < now() - ($2 * interval '1 second')
                RETURNING id, event_ts, attempts, vt, claimed, event
            )
            INSERT INTO event_hist (id, event_ts, attempts, vt, claimed, event, processed)
            SELECT id, event_ts, attempts, vt, claimed, event, false FROM moved
            "#,
        )
        .bind(max_attempts)
        .bind(max_age_secs)
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::info!(count, "swept expired events into history");
        }
        Ok(count)
    }

    /// Archives a payload directly into history (bypassing the live queue),
    /// used by the proactive-prompt ingress path so a later confirmation can
    /// re-hydrate and dispatch it by id.
    #[tracing::instrument(skip(self, payload))]
    pub async fn insert_event_hist(
        &self,
        event_ts: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Result<i64, HarnessError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO event_hist (event_ts, attempts, vt, claimed, event, processed)
            VALUES ($1, 0, now(), ARRAY[]::timestamptz[], $2, true)
            RETURNING id
            "#,
        )
        .bind(event_ts)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_event_hist(&self, id: i64) -> Result<Option<EventHist>, HarnessError> {
        let row = sqlx::query_as::<_, EventHist>(
            r#"
            SELECT id, event_ts, attempts, vt, claimed, event, processed
            FROM event_hist
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn user_is_admin(&self, user_id: &str) -> Result<bool, HarnessError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM admin_users WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn is_user_ignored(&self, user_id: &str) -> Result<bool, HarnessError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ignored_users WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn add_admin(&self, user_id: &str) -> Result<(), HarnessError> {
        sqlx::query("INSERT INTO admin_users (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_admin(&self, user_id: &str) -> Result<(), HarnessError> {
        sqlx::query("DELETE FROM admin_users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_admins(&self) -> Result<Vec<String>, HarnessError> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT user_id FROM admin_users ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn add_ignored(&self, user_id: &str) -> Result<(), HarnessError> {
        sqlx::query("INSERT INTO ignored_users (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_ignored(&self, user_id: &str) -> Result<(), HarnessError> {
        sqlx::query("DELETE FROM ignored_users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_ignored(&self) -> Result<Vec<String>, HarnessError> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT user_id FROM ignored_users ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .ok()
    }

    #[tokio::test]
    async fn insert_then_claim_then_delete_round_trips() {
        let Some(pool) = test_pool().await else {
            eprintln!("skipping: TEST_DATABASE_URL not set");
            return;
        };
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let store = QueueStore::new(pool);

        let payload = serde_json::json!({"type": "app_mention", "user": "U1", "channel": "C1"});
        let id = store.insert_event(Utc::now(), payload.clone()).await.unwrap();

        let claimed = store
            .claim_event(3, Duration::from_secs(600))
            .await
            .unwrap()
            .expect("row should be claimable");
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.claimed.len(), 1);

        store.delete_event(id, true).await.unwrap();

        let hist = store.get_event_hist(id).await.unwrap().expect("hist row");
        assert!(hist.processed);
        assert_eq!(hist.event, payload);
    }
}
