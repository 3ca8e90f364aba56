//! Deterministic development provider
//!
//! Accepts any credentials and fabricates tickets derived from the account
//! name, so callers can be exercised end to end without the real
//! authentication service. Never raises a guard challenge.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use tb_core::error::ProviderError;
use tb_core::provider::{AuthProvider, ProviderEvent};
use tb_protocol::Credentials;

/// Development provider with deterministic, account-derived tickets
pub struct DevProvider {
    events_tx: mpsc::UnboundedSender<ProviderEvent>,
    events_rx: mpsc::UnboundedReceiver<ProviderEvent>,
    /// Account of the active login, if any
    account: Option<String>,
}

impl DevProvider {
    /// Create a provider for one connection
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx,
            account: None,
        }
    }

    fn digest(tag: &str, account: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(tag.as_bytes());
        hasher.update(b":");
        hasher.update(account.as_bytes());
        hasher.finalize().to_vec()
    }
}

impl Default for DevProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for DevProvider {
    fn login(&mut self, credentials: Credentials) -> Result<(), ProviderError> {
        if credentials.account_name.is_empty() {
            return Err(ProviderError::new("account name must not be empty"));
        }

        tracing::debug!(account = %credentials.account_name, "Dev provider login");
        self.account = Some(credentials.account_name.clone());

        // Events are queued up front; the session pulls them in order.
        let _ = self.events_tx.send(ProviderEvent::LoggedOn);
        if credentials.remember_password {
            let key = hex::encode(Self::digest("refresh", &credentials.account_name));
            let _ = self.events_tx.send(ProviderEvent::LongLivedSessionKey(key));
        }

        Ok(())
    }

    async fn next_event(&mut self) -> Option<ProviderEvent> {
        self.events_rx.recv().await
    }

    async fn session_ticket(&mut self, app_id: u32) -> Result<Bytes, ProviderError> {
        let account = self
            .account
            .as_deref()
            .ok_or_else(|| ProviderError::new("not logged on"))?;

        let mut ticket = app_id.to_le_bytes().to_vec();
        ticket.extend(Self::digest("ticket", account));
        Ok(Bytes::from(ticket))
    }

    async fn activate_session_ticket(
        &mut self,
        _app_id: u32,
        _ticket: &[u8],
    ) -> Result<(), ProviderError> {
        if self.account.is_none() {
            return Err(ProviderError::new("not logged on"));
        }
        Ok(())
    }

    fn log_off(&mut self) {
        self.account = None;
    }
}
