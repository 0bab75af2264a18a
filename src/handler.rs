//! The contract a user-supplied application implements against.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::HandlerError;
use crate::models::{BotInfo, Event};
use crate::rest::ChatRestClient;

/// Shared resources handed to every handler invocation. Constructed once at
/// startup; cheap to clone (everything behind it is an `Arc` or a pool
/// handle).
#[derive(Clone)]
pub struct HarnessContext {
    pub rest_client: Arc<dyn ChatRestClient>,
    pub db_pool: PgPool,
    pub bot: BotInfo,
}

/// Implemented by the application. The harness invokes `process` once per
/// successfully claimed event.
///
/// - `Ok(())` marks the event processed and moves it to history.
/// - `Err(_)` leaves the row live; the harness relies entirely on lease
///   expiry and the attempts cap for retry, never on the error's contents.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn process(&self, ctx: &HarnessContext, event: Event) -> Result<(), HandlerError>;
}

/// Adapts a plain async closure into an [`EventHandler`], so embedding
/// applications that don't need a stateful handler can pass a function
/// directly instead of defining a struct.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(HarnessContext, Event) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), HandlerError>> + Send,
{
    async fn process(&self, ctx: &HarnessContext, event: Event) -> Result<(), HandlerError> {
        (self.0)(ctx.clone(), event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::NullRestClient;
    use chrono::Utc;

    fn ctx() -> HarnessContext {
        HarnessContext {
            rest_client: Arc::new(NullRestClient),
            db_pool: sqlx::Pool::connect_lazy("postgres://localhost/nonexistent").unwrap(),
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

    fn event() -> Event {
        Event {
            id: 1,
            event_ts: Utc::now(),
            attempts: 1,
            vt: Utc::now(),
            claimed: vec![Utc::now()],
            event: serde_json::json!({"type": "app_mention"}),
        }
    }

    #[tokio::test]
    async fn fn_handler_adapts_a_closure() {
        let handler = FnHandler(|_ctx: HarnessContext, _event: Event| async move { Ok(()) });
        let result = handler.process(&ctx(), event()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn fn_handler_propagates_failure() {
        let handler = FnHandler(|_ctx: HarnessContext, _event: Event| async move {
            Err(HandlerError::Failed(anyhow::anyhow!("boom")))
        });
        assert!(handler.process(&ctx(), event()).await.is_err());
    }
}
