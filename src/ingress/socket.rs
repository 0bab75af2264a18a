//! Persistent streaming socket ingress (Socket-Mode-style): the harness
//! subscribes to a long-lived, authenticated websocket and hands every
//! decoded envelope to [`super::Ingress::on_event`]. Reconnection with
//! backoff is handled here so the rest of the harness never observes a
//! disconnect.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::Ingress;

type WsWriter = futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to obtain a connection URL: {0}")]
    Handshake(String),
}

/// Resolves a fresh websocket URL to connect (or reconnect) to. Implemented
/// by the embedding application because obtaining one is platform-specific
/// (e.g. an `apps.connections.open`-style REST call); the harness only
/// consumes the resulting socket.
#[async_trait::async_trait]
pub trait SocketClient: Send + Sync {
    async fn open_connection_url(&self) -> Result<String, SocketError>;
}

/// Runs the connect/listen/reconnect loop forever (until `cancel` fires).
/// Exponential backoff on repeated failures, capped, matching the shape of
/// the teacher's queue-delivery retry backoff.
pub async fn run_socket_ingress(
    client: &dyn SocketClient,
    ingress: &Ingress,
    cancel: tokio_util::sync::CancellationToken,
) {
    let mut backoff = Duration::from_secs(1);
    const MAX_BACKOFF: Duration = Duration::from_secs(60);

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match connect_and_listen(client, ingress, &cancel).await {
            Ok(()) => {
                tracing::info!("socket ingress loop exited cleanly");
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, backoff_secs = backoff.as_secs(), "socket ingress disconnected, reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = cancel.cancelled() => return,
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

async fn connect_and_listen(
    client: &dyn SocketClient,
    ingress: &Ingress,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<(), SocketError> {
    let url = client.open_connection_url().await?;
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await?;
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                let Some(msg) = msg else { return Ok(()) };
                let msg = msg?;
                match msg {
                    WsMessage::Text(text) => {
                        handle_envelope(&text, ingress, &mut write).await;
                    }
                    WsMessage::Ping(payload) => {
                        let _ = write.send(WsMessage::Pong(payload)).await;
                    }
                    WsMessage::Close(_) => return Ok(()),
                    _ => {}
                }
            }
            _ = cancel.cancelled() => return Ok(()),
        }
    }
}

async fn handle_envelope(text: &str, ingress: &Ingress, write: &mut WsWriter) {
    let payload: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed socket envelope");
            return;
        }
    };

    let envelope_id = payload.get("envelope_id").cloned();
    let event_payload = payload.get("payload").cloned().unwrap_or(payload);

    let acked = std::sync::Arc::new(std::sync::Mutex::new(None));
    let acked_clone = acked.clone();
    let ack = move || {
        *acked_clone.lock().unwrap() = Some(());
    };

    if let Err(err) = ingress.on_event(event_payload, ack).await {
        tracing::error!(error = %err, "ingress failed to handle socket event");
    }

    if acked.lock().unwrap().is_some() {
        if let Some(id) = envelope_id {
            let ack_msg = serde_json::json!({"envelope_id": id}).to_string();
            // Best-effort: a dropped ack just means the upstream may
            // redeliver, which the harness tolerates.
            let _ = write.send(WsMessage::Text(ack_msg)).await;
        }
    }
}
