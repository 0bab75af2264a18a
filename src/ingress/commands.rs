//! Slash-command routing is an external collaborator: the embedding
//! application owns the command tree (admin checks happen above this trait,
//! in [`super::Ingress::on_slash_command`]).

use async_trait::async_trait;
use thiserror::Error;

use crate::handler::HarnessContext;
use crate::models::SlashCommand;

#[derive(Debug, Error)]
pub enum SlashCommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("command handler error: {0}")]
    Failed(#[from] anyhow::Error),
}

#[async_trait]
pub trait CommandRouter: Send + Sync {
    async fn route(
        &self,
        command: &SlashCommand,
        ctx: &HarnessContext,
    ) -> Result<String, SlashCommandError>;
}
