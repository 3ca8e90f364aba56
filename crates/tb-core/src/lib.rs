//! tb-core: Core abstractions and configuration for ticket-broker
//!
//! This crate provides the error taxonomy, broker configuration, and the
//! capability interface over the external authentication provider.

pub mod config;
pub mod error;
pub mod provider;

pub use config::BrokerConfig;
pub use error::{ProtocolViolation, ProviderError, SessionError};
pub use provider::{AuthProvider, ProviderEvent, ProviderFactory, ResumeHandle, APP_ID};
