use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::FromRef, routing::get, Router};
use tiger_harness::ingress::{SocketClient, SocketError};
use tiger_harness::{
    db, health, ingress, CommandRouter, Dispatcher, EventHandler, FnHandler, HarnessConfig,
    HarnessContext, Ingress, QueueStore, SlashCommand, WorkerPool,
};
use tiger_harness::rest::ReqwestChatClient;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, FromRef)]
struct AppState {
    db_pool: sqlx::PgPool,
}

/// Resolves a fresh Socket-Mode-style connection URL via a REST call the
/// embedding deployment configures through `SOCKET_OPEN_URL`.
struct EnvSocketClient {
    client: reqwest::Client,
    open_url: String,
    bot_token: String,
}

#[async_trait::async_trait]
impl SocketClient for EnvSocketClient {
    async fn open_connection_url(&self) -> Result<String, SocketError> {
        let resp: serde_json::Value = self
            .client
            .post(&self.open_url)
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .map_err(|e| SocketError::Handshake(e.to_string()))?
            .json()
            .await
            .map_err(|e| SocketError::Handshake(e.to_string()))?;

        resp["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SocketError::Handshake("response missing 'url' field".into()))
    }
}

struct NullCommandRouter;

#[async_trait::async_trait]
impl CommandRouter for NullCommandRouter {
    async fn route(
        &self,
        command: &SlashCommand,
        _ctx: &HarnessContext,
    ) -> Result<String, ingress::SlashCommandError> {
        Ok(format!("no handler registered for /{}", command.command))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            "debug".to_string()
        }
        #[cfg(not(debug_assertions))]
        {
            "warn".to_string()
        }
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_level))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("starting tiger-harness");

    let config = HarnessConfig::from_env()?;

    // Every worker can hold a connection mid-claim; keep one spare for the
    // health-readiness probe and anything else sharing the pool.
    let default_db_config = db::DbConfig::default();
    let max_connections = (config.num_workers as u32 + 1).max(default_db_config.max_connections);
    let db_config = db::DbConfig {
        max_connections,
        ..default_db_config
    };
    let db_pool = db::init_db(db_config).await?;
    tracing::info!(max_connections, "database initialized");

    let bot_token = std::env::var("BOT_TOKEN").unwrap_or_default();
    let rest_client: Arc<dyn tiger_harness::ChatRestClient> = Arc::new(ReqwestChatClient::new(
        std::env::var("CHAT_API_BASE_URL").unwrap_or_else(|_| "https://slack.com/api".into()),
        bot_token.clone(),
    ));
    let bot = rest_client.auth_test().await?;
    tracing::info!(bot_id = %bot.bot_id, user_id = %bot.user_id, "resolved bot identity");

    let ctx = HarnessContext {
        rest_client: rest_client.clone(),
        db_pool: db_pool.clone(),
        bot,
    };

    let queue = QueueStore::new(db_pool.clone());

    // Default handler: logs and succeeds. Embedding applications replace this
    // by constructing their own `WorkerPool`/`Ingress` with a real
    // `EventHandler` instead of running this binary directly.
    let handler: Arc<dyn EventHandler> = Arc::new(FnHandler(|_ctx, event| async move {
        tracing::info!(event_id = event.id, "no handler configured, acknowledging only");
        Ok(())
    }));

    let (worker_pool, trigger) =
        WorkerPool::new(config.clone(), queue.clone(), handler.clone(), ctx.clone());
    let cancel = worker_pool.cancellation_token();
    let worker_handles = worker_pool.spawn();
    tracing::info!(num_workers = config.num_workers, "worker pool started");

    let dispatcher = Arc::new(Dispatcher::new(
        queue.clone(),
        handler,
        ctx.clone(),
        config.max_attempts,
        config.invisibility,
    ));
    let ingress = Arc::new(Ingress::new(
        queue,
        trigger,
        rest_client,
        Arc::new(NullCommandRouter),
        dispatcher,
        ctx,
        config.proactive_prompt_channels.clone(),
    ));

    if !bot_token.is_empty() {
        let socket_client = EnvSocketClient {
            client: reqwest::Client::new(),
            open_url: std::env::var("SOCKET_OPEN_URL")
                .unwrap_or_else(|_| "https://slack.com/api/apps.connections.open".into()),
            bot_token,
        };
        let socket_cancel = cancel.clone();
        let socket_ingress = ingress.clone();
        tokio::spawn(async move {
            ingress::run_socket_ingress(&socket_client, &socket_ingress, socket_cancel).await;
        });
        tracing::info!("socket ingress started");
    } else {
        tracing::warn!("BOT_TOKEN not set, skipping socket ingress");
    }

    let app_state = AppState { db_pool };
    let app = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            tiger_harness::middleware::logging::log_headers_middleware,
        ))
        .with_state(app_state);

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "health server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    cancel.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }

    Ok(())
}
