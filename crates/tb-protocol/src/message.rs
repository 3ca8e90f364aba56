//! Message types for the ticket-broker protocol
//!
//! Requests and responses are plain JSON objects distinguished by which
//! fields are present, not by an explicit type tag. A caller sends either a
//! login request (`credentials`) or a guard code (`code`); the broker answers
//! with a guard challenge (`guard`), an error (`error`), or a success
//! response (`token` / `refreshToken`).
//!
//! # Message Flow
//!
//! Typical sequence for one connection:
//!
//! 1. Caller connects and sends `{credentials: {...}}`
//! 2. If the account has two-factor protection, broker sends `{guard: true}`
//!    and the caller answers with `{code: "..."}`
//! 3. Broker sends exactly one terminal frame: `{token, refreshToken}` on
//!    success or `{error}` on failure

use serde::{Deserialize, Serialize};

/// Login credentials supplied by the caller
///
/// Field names are camelCase on the wire, matching what the authentication
/// provider expects to be handed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Account name to log in as
    pub account_name: String,
    /// Account password
    pub password: String,
    /// Whether to request a long-lived session key for future logins
    #[serde(default)]
    pub remember_password: bool,
}

/// Request frame from caller to broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientRequest {
    /// Begin a login with the supplied credentials
    Login {
        /// Credentials handed to the authentication provider
        credentials: Credentials,
    },

    /// Answer a pending two-factor challenge
    GuardCode {
        /// The short-lived second-factor code
        code: String,
    },
}

/// Response frame from broker to caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerResponse {
    /// A second-factor code is required before login can proceed
    GuardChallenge {
        /// Always true; the field's presence is the signal
        guard: bool,
    },

    /// Terminal failure
    Error {
        /// Provider or protocol error message, surfaced verbatim
        error: String,
    },

    /// Terminal success
    #[serde(rename_all = "camelCase")]
    Success {
        /// Uppercase hex encoding of the raw session ticket bytes
        token: String,
        /// Long-lived session key, present only when the login asked to
        /// remember the password and the provider issued one
        refresh_token: Option<String>,
    },
}

impl ServerResponse {
    /// Build a guard challenge frame
    pub fn guard() -> Self {
        Self::GuardChallenge { guard: true }
    }

    /// Build an error frame
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Build a success frame
    pub fn success(token: String, refresh_token: Option<String>) -> Self {
        Self::Success {
            token,
            refresh_token,
        }
    }
}
