//! The path from the upstream socket into the durable queue: classifies
//! inbound payloads, persists them, acknowledges upstream, and wakes a
//! worker. Also hosts the proactive-prompt opt-in flow and the
//! synchronous slash-command path, neither of which touch the live queue.

mod commands;
mod socket;

pub use commands::{CommandRouter, SlashCommandError};
pub use socket::{run_socket_ingress, SocketClient, SocketError};

use std::collections::HashSet;
use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::error::HarnessError;
use crate::handler::HarnessContext;
use crate::models::SlashCommand;
use crate::queue::QueueStore;
use crate::rest::ChatRestClient;
use crate::trigger::Trigger;

/// The four event kinds the socket ingress distinguishes. Everything else
/// the upstream delivers is out of scope and logged as unrecognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressEventKind {
    Mention,
    DirectMessage,
    Message,
    ButtonAction,
}

pub struct Ingress {
    queue: QueueStore,
    trigger: Trigger,
    rest: Arc<dyn ChatRestClient>,
    router: Arc<dyn CommandRouter>,
    dispatcher: Arc<Dispatcher>,
    ctx: HarnessContext,
    proactive_prompt_channels: HashSet<String>,
    bot_user_id: String,
}

impl Ingress {
    pub fn new(
        queue: QueueStore,
        trigger: Trigger,
        rest: Arc<dyn ChatRestClient>,
        router: Arc<dyn CommandRouter>,
        dispatcher: Arc<Dispatcher>,
        ctx: HarnessContext,
        proactive_prompt_channels: HashSet<String>,
    ) -> Self {
        let bot_user_id = ctx.bot.user_id.clone();
        Self {
            queue,
            trigger,
            rest,
            router,
            dispatcher,
            ctx,
            proactive_prompt_channels,
            bot_user_id,
        }
    }

    /// Classifies a raw socket payload. Mirrors the upstream event taxonomy:
    /// `app_mention` events and direct-message-channel (`im`) messages are
    /// mentions; top-level, non-bot messages in a configured channel are
    /// proactive-prompt candidates; everything else recognized is ignored at
    /// this layer (the caller still acknowledges it).
    fn classify(&self, payload: &serde_json::Value) -> Option<IngressEventKind> {
        let event_type = payload.get("type")?.as_str()?;
        match event_type {
            "app_mention" => Some(IngressEventKind::Mention),
            "block_actions" => Some(IngressEventKind::ButtonAction),
            "message" => {
                let channel_type = payload.get("channel_type").and_then(|v| v.as_str());
                let user = payload.get("user").and_then(|v| v.as_str());
                let is_bot = user.map(|u| u == self.bot_user_id).unwrap_or(false);
                let has_thread = payload.get("thread_ts").is_some();
                if is_bot {
                    None
                } else if channel_type == Some("im") {
                    Some(IngressEventKind::DirectMessage)
                } else if !has_thread {
                    Some(IngressEventKind::Message)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Entry point for every payload the socket client delivers. Always
    /// acknowledges via the supplied callback once persistence (or its
    /// deliberate absence) has been decided, per the resolved ordering:
    /// persist first, then acknowledge, then trigger.
    pub async fn on_event(
        &self,
        payload: serde_json::Value,
        ack: impl FnOnce() + Send,
    ) -> Result<(), HarnessError> {
        let Some(kind) = self.classify(&payload) else {
            tracing::debug!("unrecognized or filtered payload, dropping");
            ack();
            return Ok(());
        };

        match kind {
            IngressEventKind::Mention | IngressEventKind::DirectMessage => {
                self.handle_queueable(payload, ack).await
            }
            IngressEventKind::Message => self.handle_proactive_candidate(payload, ack).await,
            IngressEventKind::ButtonAction => self.handle_button_action(payload, ack).await,
        }
    }

    async fn handle_queueable(
        &self,
        payload: serde_json::Value,
        ack: impl FnOnce() + Send,
    ) -> Result<(), HarnessError> {
        if let Some(user) = payload.get("user").and_then(|v| v.as_str()) {
            if self.queue.is_user_ignored(user).await? {
                tracing::info!(user_id = user, "dropping event from ignored user");
                ack();
                return Ok(());
            }
        }

        let event_ts = extract_event_ts(&payload);
        match self.queue.insert_event(event_ts, payload).await {
            Ok(id) => {
                ack();
                self.trigger.fire();
                tracing::debug!(event_id = id, "queued event");
            }
            Err(err) => {
                // Ack anyway to avoid upstream redelivery amplification; the
                // event is lost unless the upstream independently retries.
                tracing::error!(error = %err, "failed to persist event");
                ack();
            }
        }
        Ok(())
    }

    /// Offers a non-mention message in a configured channel as an optional
    /// event, instead of queuing it outright.
    async fn handle_proactive_candidate(
        &self,
        payload: serde_json::Value,
        ack: impl FnOnce() + Send,
    ) -> Result<(), HarnessError> {
        let channel = payload
            .get("channel")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if !self.proactive_prompt_channels.contains(&channel) {
            ack();
            return Ok(());
        }
        let user = payload
            .get("user")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let event_ts = extract_event_ts(&payload);
        let hist_id = self.queue.insert_event_hist(event_ts, payload).await?;
        ack();

        self.rest
            .post_ephemeral(
                &channel,
                &user,
                "Want me to take a look at this?",
                &[
                    ("Yes", &format!("confirm:{hist_id}")),
                    ("No", &format!("reject:{hist_id}")),
                ],
            )
            .await?;
        tracing::debug!(hist_id, "posted proactive prompt");
        Ok(())
    }

    /// Handles the confirm/reject button on a proactive prompt. Confirm
    /// re-hydrates the archived payload and dispatches it synchronously,
    /// in-process, rather than routing back through the live queue.
    async fn handle_button_action(
        &self,
        payload: serde_json::Value,
        ack: impl FnOnce() + Send,
    ) -> Result<(), HarnessError> {
        ack();

        let action = payload
            .get("actions")
            .and_then(|a| a.get(0))
            .cloned()
            .unwrap_or_default();
        // The button's own label text is a display concern, not a protocol
        // one — what confirm/reject means is encoded in `value` itself
        // (`confirm:<id>` / `reject:<id>`), set when the prompt was posted.
        let value = action.get("value").and_then(|v| v.as_str()).unwrap_or("");
        let Some((verb, id_str)) = value.split_once(':') else {
            tracing::warn!(value, "button action with malformed value, dropping");
            return Ok(());
        };
        let Ok(hist_id) = id_str.parse::<i64>() else {
            tracing::warn!(value, "button action with non-numeric id, dropping");
            return Ok(());
        };

        let message_handle = payload
            .get("message_ts")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if verb == "reject" {
            self.rest.delete_ephemeral(message_handle).await?;
            return Ok(());
        }

        let Some(hist) = self.queue.get_event_hist(hist_id).await? else {
            tracing::warn!(hist_id, "confirmed prompt has no archived payload");
            return Ok(());
        };
        self.rest
            .replace_ephemeral(message_handle, "On it.")
            .await?;

        let event = crate::models::Event {
            id: hist.id,
            event_ts: hist.event_ts,
            attempts: hist.attempts,
            vt: hist.vt,
            claimed: hist.claimed,
            event: hist.event,
        };
        self.dispatcher.dispatch_directly(event).await?;
        Ok(())
    }

    /// Slash commands bypass the live queue entirely: acknowledge, check
    /// admin status, route, reply.
    pub async fn on_slash_command(&self, command: SlashCommand) -> Result<String, HarnessError> {
        if !self.queue.user_is_admin(&command.user_id).await? {
            return Ok("Sorry, you don't have permission to run that command.".to_string());
        }
        match self.router.route(&command, &self.ctx).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                tracing::warn!(error = %err, "slash command routing failed");
                Ok(format!("Command failed: {err}"))
            }
        }
    }
}

fn extract_event_ts(payload: &serde_json::Value) -> chrono::DateTime<chrono::Utc> {
    payload
        .get("ts")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0))
        .unwrap_or_else(chrono::Utc::now)
}
