pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod health;
pub mod ingress;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod rest;
pub mod trigger;
pub mod worker;

pub use config::HarnessConfig;
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, HandlerError, HarnessError};
pub use handler::{EventHandler, FnHandler, HarnessContext};
pub use ingress::{CommandRouter, Ingress, SocketClient};
pub use models::{BotInfo, Event, EventHist, ProactivePrompt, SlashCommand};
pub use queue::QueueStore;
pub use rest::ChatRestClient;
pub use trigger::Trigger;
pub use worker::WorkerPool;
