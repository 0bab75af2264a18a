//! Minimal runnable example: a handler that echoes the mention text back as
//! a log line, wired through the full queue/worker pool without a real
//! socket or chat API behind it. Run with `TEST_DATABASE_URL` (or
//! `DATABASE_URL`) pointing at a Postgres instance with migrations applied.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tiger_harness::{
    db, Event, EventHandler, HandlerError, HarnessConfig, HarnessContext, QueueStore, WorkerPool,
};
use tiger_harness::rest::NullRestClient;

struct EchoHandler;

#[async_trait]
impl EventHandler for EchoHandler {
    async fn process(&self, _ctx: &HarnessContext, event: Event) -> Result<(), HandlerError> {
        let text = event
            .event
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("<no text>");
        println!("echo: {text}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let db_pool = db::init_db_default().await?;
    let queue = QueueStore::new(db_pool.clone());
    let config = HarnessConfig::default();

    let ctx = HarnessContext {
        rest_client: Arc::new(NullRestClient),
        db_pool: db_pool.clone(),
        bot: tiger_harness::BotInfo {
            bot_id: "B_DEMO".into(),
            user_id: "U_DEMO".into(),
            team_id: "T_DEMO".into(),
            app_id: "A_DEMO".into(),
            url: "https://example.invalid".into(),
            name: "echo-demo".into(),
            team: "demo".into(),
        },
    };

    let handler: Arc<dyn EventHandler> = Arc::new(EchoHandler);
    let (worker_pool, trigger) = WorkerPool::new(config.clone(), queue.clone(), handler, ctx);
    worker_pool.spawn();

    queue
        .insert_event(
            chrono::Utc::now(),
            serde_json::json!({"type": "app_mention", "user": "U1", "text": "hello, harness"}),
        )
        .await?;
    trigger.fire();

    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok(())
}
