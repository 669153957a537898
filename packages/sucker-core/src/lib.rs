pub mod classify;
pub mod config;
pub mod executor;
pub mod messenger;
pub mod provider;
pub mod relayer;
pub mod scanner;
pub mod submitter;
pub mod types;

pub use config::Config;
pub use types::{CrossChainMessage, MessagePriority, SettlementStatus};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Relay {0} is paused")]
    RelayPaused(String),
}
