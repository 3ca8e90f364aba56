//! Core error types for ticket-broker

use std::path::PathBuf;

use tb_protocol::FramingError;
use thiserror::Error;

/// Failure reported by the authentication provider
///
/// The message is surfaced to the caller verbatim as an `{error: ...}` frame,
/// so it should be the provider's own wording (bad credentials, rate limit,
/// network failure, invalid guard code).
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ProviderError(pub String);

impl ProviderError {
    /// Create a provider error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A request that is invalid for the session's current stage
///
/// Violations are answered with an error frame while the session remains in
/// its current stage; they are not fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A guard code arrived when no challenge was pending
    #[error("no guard challenge is pending")]
    GuardCodeNotRequested,

    /// A second login request arrived mid-session
    #[error("a login is already in progress")]
    LoginAlreadyInProgress,

    /// A request arrived after the session reached its terminal stage
    #[error("session is finished")]
    SessionFinished,
}

/// Session-fatal errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Framing error on the caller connection
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Provider operation failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Provider event stream ended while a login was still in flight
    #[error("Provider closed unexpectedly")]
    ProviderClosed,

    /// I/O error on the caller connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
