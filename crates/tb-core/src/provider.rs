//! Capability interface over the external authentication provider
//!
//! The provider's own wire protocol (handshake, retries, transport) is out
//! of scope; the broker only consumes it through [`AuthProvider`]. A login
//! is started with [`AuthProvider::login`] and then progresses through
//! events pulled from [`AuthProvider::next_event`], one at a time, in the
//! order the provider raises them.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use tb_protocol::Credentials;

use crate::error::ProviderError;

/// Application identifier session tickets are issued for
pub const APP_ID: u32 = 2 * 5 * 13 * 17 * 19 * 47;

/// One-shot handle resuming a login paused for two-factor input
///
/// Consuming `submit` makes double-resume unrepresentable: once the handle
/// has been taken out of the session's pending slot and used, there is
/// nothing left to invoke.
#[derive(Debug)]
pub struct ResumeHandle {
    tx: oneshot::Sender<String>,
}

impl ResumeHandle {
    /// Create a handle plus the receiver the provider waits on
    pub fn new() -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Resume the paused login with the given guard code
    pub fn submit(self, code: String) -> Result<(), ProviderError> {
        self.tx
            .send(code)
            .map_err(|_| ProviderError::new("login is no longer waiting for a guard code"))
    }
}

/// Events raised by the provider during a login attempt
#[derive(Debug)]
pub enum ProviderEvent {
    /// Authentication completed; the session may fetch a ticket
    LoggedOn,

    /// A second-factor code is needed; resume through the handle
    GuardRequired(ResumeHandle),

    /// Persistent key allowing future logins without a password.
    /// Raised at most once per successful login, and only when the
    /// credentials asked to remember the password.
    LongLivedSessionKey(String),

    /// Authentication failed; message is caller-facing
    Error(String),
}

/// Abstraction over the third-party login/ticket service
///
/// One instance is created per connection and exclusively owned by that
/// connection's session for its entire lifetime.
#[async_trait]
pub trait AuthProvider: Send {
    /// Begin authenticating with the supplied credentials.
    ///
    /// Completion is reported through [`next_event`](Self::next_event) as
    /// `LoggedOn`, `GuardRequired`, or `Error`.
    fn login(&mut self, credentials: Credentials) -> Result<(), ProviderError>;

    /// Wait for the next provider event.
    ///
    /// Returns `None` once the provider has shut down and no further events
    /// will be raised.
    async fn next_event(&mut self) -> Option<ProviderEvent>;

    /// Request a raw session ticket for the given application identifier
    async fn session_ticket(&mut self, app_id: u32) -> Result<Bytes, ProviderError>;

    /// Register the ticket as active with the provider
    async fn activate_session_ticket(
        &mut self,
        app_id: u32,
        ticket: &[u8],
    ) -> Result<(), ProviderError>;

    /// End the authenticated session
    fn log_off(&mut self);
}

/// Constructs a fresh provider instance for each accepted connection
pub trait ProviderFactory: Send + Sync + 'static {
    /// The provider type produced
    type Provider: AuthProvider + 'static;

    /// Create a provider for one connection
    fn create(&self) -> Self::Provider;
}

impl<P, F> ProviderFactory for F
where
    P: AuthProvider + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    type Provider = P;

    fn create(&self) -> P {
        self()
    }
}
