//! Crate-wide error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed event payload: {0}")]
    Validation(String),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("chat REST API error: {0}")]
    Rest(#[from] reqwest::Error),
}

impl HarnessError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HarnessError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HarnessError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HarnessError::Validation(_) => StatusCode::BAD_REQUEST,
            HarnessError::Transport(_) => StatusCode::BAD_GATEWAY,
            HarnessError::Rest(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_name(&self) -> &'static str {
        match self {
            HarnessError::Database(_) => "database_error",
            HarnessError::Config(_) => "config_error",
            HarnessError::Validation(_) => "validation_error",
            HarnessError::Transport(_) => "transport_error",
            HarnessError::Rest(_) => "rest_error",
        }
    }
}

impl IntoResponse for HarnessError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, kind = self.error_name(), "harness error");
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Error returned by a user-supplied [`crate::handler::EventHandler`].
///
/// Any non-empty variant here causes the dispatcher to leave the event's row
/// in the live queue for lease expiry; the harness never inspects the cause.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}
