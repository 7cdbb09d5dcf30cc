//! Error types for the onboarding bot.

use crate::platform::MemberId;

/// Error that ends an onboarding run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Failures raised by the chat-platform collaborator.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{endpoint} returned {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Event source {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Response collector errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Member {member} already has an outstanding question")]
    AlreadyWaiting { member: MemberId },

    #[error("Failed to ask question: {0}")]
    Send(#[from] PlatformError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
