//! Per-connection session state machine
//!
//! One `Session` drives one caller connection from credentials to a terminal
//! response. All behavior runs through two transition functions, one per
//! event source ([`Session::on_request`] for caller frames,
//! [`Session::on_provider_event`] for provider events), each handling one
//! event at a time in arrival order.
//!
//! Requests that are invalid for the current stage are answered with an
//! error frame and the session remains where it was; they are not fatal.
//! Provider errors and framing errors end the session.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use tb_core::error::{ProtocolViolation, ProviderError, SessionError};
use tb_core::provider::{AuthProvider, ProviderEvent, ResumeHandle};
use tb_protocol::{BrokerCodec, ClientRequest, ServerResponse};

/// Lifecycle stage of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    /// Waiting for the caller's login request
    AwaitingCredentials,
    /// The provider is attempting authentication
    AwaitingLogin,
    /// The provider asked for a two-factor code
    AwaitingGuardCode,
    /// Terminal response sent (success or error)
    Done,
}

/// State machine for a single caller connection
///
/// Exclusively owns its provider instance; nothing is shared across
/// connections.
pub struct Session<P: AuthProvider> {
    stage: SessionStage,
    provider: P,
    /// Pending guard-code resume slot, cleared exactly once when invoked
    pending_resume: Option<ResumeHandle>,
    remember_password: bool,
    app_id: u32,
}

impl<P: AuthProvider> Session<P> {
    /// Create a session for a freshly accepted connection
    pub fn new(provider: P, app_id: u32) -> Self {
        Self {
            stage: SessionStage::AwaitingCredentials,
            provider,
            pending_resume: None,
            remember_password: false,
            app_id,
        }
    }

    /// Current lifecycle stage
    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    /// Drive the session until it reaches its terminal stage or the caller
    /// hangs up
    pub async fn run<S>(mut self, framed: &mut Framed<S, BrokerCodec>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let awaiting_provider = matches!(
                self.stage,
                SessionStage::AwaitingLogin | SessionStage::AwaitingGuardCode
            );

            let response = tokio::select! {
                frame = framed.next() => {
                    match frame {
                        Some(Ok(request)) => self.on_request(request)?,
                        Some(Err(e)) => return Err(e.into()),
                        // Caller hung up
                        None => return Ok(()),
                    }
                }

                event = self.provider.next_event(), if awaiting_provider => {
                    match event {
                        Some(event) => self.on_provider_event(event).await?,
                        None => return Err(SessionError::ProviderClosed),
                    }
                }
            };

            if let Some(response) = response {
                framed.send(response).await?;
            }

            if self.stage == SessionStage::Done {
                return Ok(());
            }
        }
    }

    /// Process one caller frame
    pub fn on_request(
        &mut self,
        request: ClientRequest,
    ) -> Result<Option<ServerResponse>, SessionError> {
        match (self.stage, request) {
            (SessionStage::AwaitingCredentials, ClientRequest::Login { credentials }) => {
                self.remember_password = credentials.remember_password;
                tracing::info!(account = %credentials.account_name, "Starting login");
                self.provider.login(credentials)?;
                self.stage = SessionStage::AwaitingLogin;
                Ok(None)
            }

            (SessionStage::AwaitingGuardCode, ClientRequest::GuardCode { code }) => {
                match self.pending_resume.take() {
                    Some(resume) => {
                        resume.submit(code)?;
                        self.stage = SessionStage::AwaitingLogin;
                        Ok(None)
                    }
                    None => Ok(Some(self.violation(ProtocolViolation::GuardCodeNotRequested))),
                }
            }

            (SessionStage::Done, _) => Ok(Some(self.violation(ProtocolViolation::SessionFinished))),

            (_, ClientRequest::Login { .. }) => {
                Ok(Some(self.violation(ProtocolViolation::LoginAlreadyInProgress)))
            }

            (_, ClientRequest::GuardCode { .. }) => {
                Ok(Some(self.violation(ProtocolViolation::GuardCodeNotRequested)))
            }
        }
    }

    /// Process one provider event
    pub async fn on_provider_event(
        &mut self,
        event: ProviderEvent,
    ) -> Result<Option<ServerResponse>, SessionError> {
        match event {
            ProviderEvent::GuardRequired(resume) if self.stage == SessionStage::AwaitingLogin => {
                tracing::info!("Guard code required");
                self.pending_resume = Some(resume);
                self.stage = SessionStage::AwaitingGuardCode;
                Ok(Some(ServerResponse::guard()))
            }

            ProviderEvent::LoggedOn if self.stage == SessionStage::AwaitingLogin => {
                let response = self.complete_login().await?;
                self.stage = SessionStage::Done;
                Ok(Some(response))
            }

            ProviderEvent::Error(message) => {
                tracing::warn!(%message, "Provider reported login failure");
                self.stage = SessionStage::Done;
                Ok(Some(ServerResponse::error(message)))
            }

            other => {
                tracing::warn!(event = ?other, stage = ?self.stage, "Ignoring out-of-order provider event");
                Ok(None)
            }
        }
    }

    /// Successful login: fetch, encode, and activate the ticket, then log off
    async fn complete_login(&mut self) -> Result<ServerResponse, SessionError> {
        let ticket = self.provider.session_ticket(self.app_id).await?;
        // Two uppercase hex digits per byte, in buffer order. Consumers
        // expect this exact format.
        let token = hex::encode_upper(&ticket);

        self.provider
            .activate_session_ticket(self.app_id, &ticket)
            .await?;

        let refresh_token = if self.remember_password {
            self.await_session_key().await?
        } else {
            None
        };

        self.provider.log_off();
        tracing::info!("Login complete, ticket issued");

        Ok(ServerResponse::success(token, refresh_token))
    }

    /// Wait for the provider's one-shot long-lived session key
    ///
    /// Only the first key event counts; other events at this point are
    /// ignored. There is no timeout here: a provider that never issues the
    /// key holds the connection open, matching the broker's overall
    /// no-cancellation model.
    async fn await_session_key(&mut self) -> Result<Option<String>, SessionError> {
        while let Some(event) = self.provider.next_event().await {
            match event {
                ProviderEvent::LongLivedSessionKey(key) => return Ok(Some(key)),
                ProviderEvent::Error(message) => {
                    return Err(ProviderError::new(message).into());
                }
                other => {
                    tracing::debug!(event = ?other, "Ignoring event while awaiting session key");
                }
            }
        }
        Err(SessionError::ProviderClosed)
    }

    fn violation(&self, violation: ProtocolViolation) -> ServerResponse {
        tracing::warn!(stage = ?self.stage, %violation, "Protocol violation");
        ServerResponse::error(violation.to_string())
    }
}
