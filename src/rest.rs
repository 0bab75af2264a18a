//! Chat-platform REST collaborator. Everything beyond identity lookup and
//! ephemeral messaging (reactions, file download, streaming updates) is the
//! embedding application's concern; the harness only needs enough surface to
//! drive the proactive-prompt flow and bot-identity cache.

use async_trait::async_trait;

use crate::error::HarnessError;
use crate::models::BotInfo;

#[async_trait]
pub trait ChatRestClient: Send + Sync {
    /// Resolves the bot's own identity once at startup.
    async fn auth_test(&self) -> Result<BotInfo, HarnessError>;

    /// Posts an ephemeral message visible only to `user_id` in `channel_id`,
    /// optionally with buttons. Returns an opaque message handle the caller
    /// can later pass to `replace_ephemeral`/`delete_ephemeral`.
    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
        buttons: &[(&str, &str)],
    ) -> Result<String, HarnessError>;

    async fn replace_ephemeral(&self, handle: &str, text: &str) -> Result<(), HarnessError>;

    async fn delete_ephemeral(&self, handle: &str) -> Result<(), HarnessError>;
}

/// A minimal, directly-usable REST client. Not load-bearing for the core's
/// correctness — provided so the crate is runnable end to end without an
/// embedding application supplying its own.
pub struct ReqwestChatClient {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl ReqwestChatClient {
    pub fn new(base_url: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bot_token: bot_token.into(),
        }
    }
}

#[async_trait]
impl ChatRestClient for ReqwestChatClient {
    async fn auth_test(&self) -> Result<BotInfo, HarnessError> {
        let resp: serde_json::Value = self
            .client
            .post(format!("{}/auth.test", self.base_url))
            .bearer_auth(&self.bot_token)
            .send()
            .await?
            .json()
            .await?;

        Ok(BotInfo {
            bot_id: resp["bot_id"].as_str().unwrap_or_default().to_string(),
            user_id: resp["user_id"].as_str().unwrap_or_default().to_string(),
            team_id: resp["team_id"].as_str().unwrap_or_default().to_string(),
            app_id: resp["app_id"].as_str().unwrap_or_default().to_string(),
            url: resp["url"].as_str().unwrap_or_default().to_string(),
            name: resp["name"].as_str().unwrap_or_default().to_string(),
            team: resp["team"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
        buttons: &[(&str, &str)],
    ) -> Result<String, HarnessError> {
        let actions: Vec<serde_json::Value> = buttons
            .iter()
            .map(|(label, value)| serde_json::json!({"text": label, "value": value}))
            .collect();

        let resp: serde_json::Value = self
            .client
            .post(format!("{}/chat.postEphemeral", self.base_url))
            .bearer_auth(&self.bot_token)
            .json(&serde_json::json!({
                "channel": channel_id,
                "user": user_id,
                "text": text,
                "actions": actions,
            }))
            .send()
            .await?
            .json()
            .await?;

        Ok(resp["message_ts"].as_str().unwrap_or_default().to_string())
    }

    async fn replace_ephemeral(&self, handle: &str, text: &str) -> Result<(), HarnessError> {
        self.client
            .post(format!("{}/chat.update", self.base_url))
            .bearer_auth(&self.bot_token)
            .json(&serde_json::json!({"ts": handle, "text": text}))
            .send()
            .await?;
        Ok(())
    }

    async fn delete_ephemeral(&self, handle: &str) -> Result<(), HarnessError> {
        self.client
            .post(format!("{}/chat.delete", self.base_url))
            .bearer_auth(&self.bot_token)
            .json(&serde_json::json!({"ts": handle}))
            .send()
            .await?;
        Ok(())
    }
}

/// A no-op client, useful in tests and demos that don't exercise the
/// proactive-prompt path.
pub struct NullRestClient;

#[async_trait]
impl ChatRestClient for NullRestClient {
    async fn auth_test(&self) -> Result<BotInfo, HarnessError> {
        Ok(BotInfo {
            bot_id: "B_NULL".into(),
            user_id: "U_NULL".into(),
            team_id: "T_NULL".into(),
            app_id: "A_NULL".into(),
            url: "https://example.invalid".into(),
            name: "null-bot".into(),
            team: "null-team".into(),
        })
    }

    async fn post_ephemeral(
        &self,
        _channel_id: &str,
        _user_id: &str,
        _text: &str,
        _buttons: &[(&str, &str)],
    ) -> Result<String, HarnessError> {
        Ok("null-handle".into())
    }

    async fn replace_ephemeral(&self, _handle: &str, _text: &str) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn delete_ephemeral(&self, _handle: &str) -> Result<(), HarnessError> {
        Ok(())
    }
}
