//! Shared data types flowing through the queue, dispatcher, and handler contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A claimed (or about-to-be-claimed) row from the live event queue.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub event_ts: DateTime<Utc>,
    pub attempts: i32,
    pub vt: DateTime<Utc>,
    pub claimed: Vec<DateTime<Utc>>,
    pub event: serde_json::Value,
}

impl Event {
    /// The upstream user id the payload refers to, if present.
    pub fn user_id(&self) -> Option<&str> {
        self.event.get("user").and_then(|v| v.as_str())
    }

    /// The channel id the payload refers to, if present.
    pub fn channel_id(&self) -> Option<&str> {
        self.event.get("channel").and_then(|v| v.as_str())
    }

    /// The kind tag attached at ingest time (`app_mention`, `message`, ...).
    pub fn kind(&self) -> Option<&str> {
        self.event.get("type").and_then(|v| v.as_str())
    }
}

/// A terminal history row: every event that leaves the live queue appears
/// here exactly once, tagged with whether a handler ever completed it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventHist {
    pub id: i64,
    pub event_ts: DateTime<Utc>,
    pub attempts: i32,
    pub vt: DateTime<Utc>,
    pub claimed: Vec<DateTime<Utc>>,
    pub event: serde_json::Value,
    pub processed: bool,
}

/// Parsed slash-command invocation, handled synchronously outside the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashCommand {
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    pub command: String,
    pub text: String,
}

/// Identity of the bot account, fetched once at startup and cached read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInfo {
    pub bot_id: String,
    pub user_id: String,
    pub team_id: String,
    pub app_id: String,
    pub url: String,
    pub name: String,
    pub team: String,
}

/// An ephemeral, button-bearing message offering to escalate a plain message
/// into a handled event. `hist_id` points at the archived payload so that
/// confirming the prompt can re-hydrate and dispatch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactivePrompt {
    pub hist_id: i64,
    pub channel_id: String,
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event(payload: serde_json::Value) -> Event {
        Event {
            id: 1,
            event_ts: Utc::now(),
            attempts: 0,
            vt: Utc::now(),
            claimed: vec![],
            event: payload,
        }
    }

    #[test]
    fn extracts_user_and_channel_from_payload() {
        let event = sample_event(json!({"type": "app_mention", "user": "U1", "channel": "C1"}));
        assert_eq!(event.user_id(), Some("U1"));
        assert_eq!(event.channel_id(), Some("C1"));
        assert_eq!(event.kind(), Some("app_mention"));
    }

    #[test]
    fn missing_fields_return_none() {
        let event = sample_event(json!({"type": "app_mention"}));
        assert_eq!(event.user_id(), None);
        assert_eq!(event.channel_id(), None);
    }
}
