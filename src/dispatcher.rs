//! Claims one event, invokes the handler, and retires the row.

use std::sync::Arc;
use std::time::Duration;

use crate::error::HarnessError;
use crate::handler::{EventHandler, HarnessContext};
use crate::models::Event;
use crate::queue::QueueStore;

/// Checks that a claimed row's payload has the shape every handler can rely
/// on, before the handler ever sees it. A row that fails this can never
/// succeed no matter how many times it's retried, so it's retired as
/// unprocessed immediately instead of burning its attempts budget.
fn validate_payload(event: &Event) -> Result<(), HarnessError> {
    if event.kind().is_none() {
        return Err(HarnessError::Validation("event missing 'type'".into()));
    }
    if event.user_id().is_none() {
        return Err(HarnessError::Validation("event missing 'user'".into()));
    }
    if event.channel_id().is_none() {
        return Err(HarnessError::Validation("event missing 'channel'".into()));
    }
    if event.event.get("ts").and_then(|v| v.as_str()).is_none() {
        return Err(HarnessError::Validation("event missing 'ts'".into()));
    }
    Ok(())
}

pub struct Dispatcher {
    queue: QueueStore,
    handler: Arc<dyn EventHandler>,
    ctx: HarnessContext,
    max_attempts: i32,
    invisibility: Duration,
}

impl Dispatcher {
    pub fn new(
        queue: QueueStore,
        handler: Arc<dyn EventHandler>,
        ctx: HarnessContext,
        max_attempts: i32,
        invisibility: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            ctx,
            max_attempts,
            invisibility,
        }
    }

    /// Invokes the handler on an already-archived event (the proactive-prompt
    /// confirm path), bypassing claim/delete entirely: the row already lives
    /// in history with `processed = true` from when it was archived, and no
    /// live row is ever created for it.
    #[tracing::instrument(skip(self, event))]
    pub async fn dispatch_directly(
        &self,
        event: crate::models::Event,
    ) -> Result<(), HarnessError> {
        let id = event.id;
        match self.handler.process(&self.ctx, event).await {
            Ok(()) => tracing::info!(event_id = id, "confirmed event processed successfully"),
            Err(err) => {
                tracing::warn!(event_id = id, error = %err, "confirmed event handler failed")
            }
        }
        Ok(())
    }

    /// Claims and processes at most one event. Returns `true` if a row was
    /// claimed (regardless of handler outcome), `false` if the queue was
    /// empty — the caller uses this to decide whether to keep looping.
    #[tracing::instrument(skip(self))]
    pub async fn process_one(&self) -> Result<bool, HarnessError> {
        let Some(event) = self
            .queue
            .claim_event(self.max_attempts, self.invisibility)
            .await?
        else {
            return Ok(false);
        };

        let id = event.id;
        if let Err(err) = validate_payload(&event) {
            tracing::warn!(event_id = id, error = %err, "poison payload, retiring unprocessed");
            self.queue.delete_event(id, false).await?;
            return Ok(true);
        }

        match self.handler.process(&self.ctx, event).await {
            Ok(()) => {
                self.queue.delete_event(id, true).await?;
                tracing::info!(event_id = id, "event processed successfully");
            }
            Err(err) => {
                tracing::warn!(event_id = id, error = %err, "handler failed, leaving event for retry");
            }
        }
        Ok(true)
    }

    /// Runs up to `max_batch` claim/dispatch iterations, stopping early once
    /// the queue is empty. Bounds a single worker cycle's run-time.
    pub async fn process_batch(&self, max_batch: usize) -> Result<usize, HarnessError> {
        let mut processed = 0;
        for _ in 0..max_batch {
            if !self.process_one().await? {
                break;
            }
            processed += 1;
        }
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::FnHandler;
    use crate::models::BotInfo;
    use crate::rest::NullRestClient;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn test_queue() -> Option<QueueStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .ok()?;
        sqlx::migrate!("./migrations").run(&pool).await.ok()?;
        Some(QueueStore::new(pool))
    }

    fn ctx(pool: sqlx::PgPool) -> HarnessContext {
        HarnessContext {
            rest_client: Arc::new(NullRestClient),
            db_pool: pool,
            bot: BotInfo {
                bot_id: "B1".into(),
                user_id: "U1".into(),
                team_id: "T1".into(),
                app_id: "A1".into(),
                url: "https://example.test".into(),
                name: "bot".into(),
                team: "team".into(),
            },
        }
    }

    #[tokio::test]
    async fn successful_handler_retires_the_event() {
        let Some(queue) = test_queue().await else {
            eprintln!("skipping: TEST_DATABASE_URL not set");
            return;
        };
        let pool = queue.pool().clone();
        queue
            .insert_event(
                chrono::Utc::now(),
                serde_json::json!({"type": "app_mention", "user": "U1", "channel": "C1", "ts": "1.0"}),
            )
            .await
            .unwrap();

        let handler = Arc::new(FnHandler(|_ctx, _event| async move { Ok(()) }));
        let dispatcher = Dispatcher::new(
            queue.clone(),
            handler,
            ctx(pool),
            3,
            Duration::from_secs(600),
        );

        assert!(dispatcher.process_one().await.unwrap());
        assert!(!dispatcher.process_one().await.unwrap());
    }

    #[tokio::test]
    async fn failing_handler_leaves_the_row_claimable_after_lease_expiry() {
        let Some(queue) = test_queue().await else {
            eprintln!("skipping: TEST_DATABASE_URL not set");
            return;
        };
        let pool = queue.pool().clone();
        queue
            .insert_event(
                chrono::Utc::now(),
                serde_json::json!({"type": "app_mention", "user": "U1", "channel": "C1", "ts": "1.0"}),
            )
            .await
            .unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let handler = Arc::new(FnHandler(move |_ctx, _event| {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::Failed(anyhow::anyhow!("transient")))
            }
        }));
        // Zero-length lease so the row is immediately reclaimable.
        let dispatcher =
            Dispatcher::new(queue.clone(), handler, ctx(pool), 3, Duration::from_secs(0));

        assert!(dispatcher.process_one().await.unwrap());
        assert!(dispatcher.process_one().await.unwrap());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn poison_payload_is_retired_unprocessed_without_invoking_the_handler() {
        let Some(queue) = test_queue().await else {
            eprintln!("skipping: TEST_DATABASE_URL not set");
            return;
        };
        let pool = queue.pool().clone();
        let id = queue
            .insert_event(chrono::Utc::now(), serde_json::json!({"type": "app_mention"}))
            .await
            .unwrap();

        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = invoked.clone();
        let handler = Arc::new(FnHandler(move |_ctx, _event| {
            let invoked = invoked_clone.clone();
            async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));
        let dispatcher =
            Dispatcher::new(queue.clone(), handler, ctx(pool), 3, Duration::from_secs(600));

        assert!(dispatcher.process_one().await.unwrap());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        let hist = queue.get_event_hist(id).await.unwrap().expect("retired to history");
        assert!(!hist.processed);
    }
}
