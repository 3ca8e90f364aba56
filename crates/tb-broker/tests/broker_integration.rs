//! Broker integration tests
//!
//! Runs the full server over real Unix sockets with a scripted provider and
//! drives it through the caller-side codec.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use tb_broker::BrokerServer;
use tb_core::config::BrokerConfig;
use tb_core::error::ProviderError;
use tb_core::provider::{AuthProvider, ProviderEvent, ResumeHandle};
use tb_protocol::{CallerCodec, ClientRequest, Credentials, ServerResponse};

/// What the scripted provider should do with a login attempt
#[derive(Default)]
struct Script {
    /// Fail the login outright with this message
    fail: Option<String>,
    /// Require a guard challenge; this is the code that will be accepted
    expect_guard_code: Option<String>,
    /// Long-lived session key issued when the login remembers the password
    session_key: Option<String>,
}

/// Provider whose behavior is fixed up front by a [`Script`]
struct ScriptedProvider {
    script: Arc<Script>,
    events_tx: mpsc::UnboundedSender<ProviderEvent>,
    events_rx: mpsc::UnboundedReceiver<ProviderEvent>,
    account: Option<String>,
}

impl ScriptedProvider {
    fn new(script: Arc<Script>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            script,
            events_tx,
            events_rx,
            account: None,
        }
    }
}

fn send_login_outcome(
    tx: &mpsc::UnboundedSender<ProviderEvent>,
    script: &Script,
    remember: bool,
) {
    let _ = tx.send(ProviderEvent::LoggedOn);
    if remember {
        if let Some(key) = &script.session_key {
            let _ = tx.send(ProviderEvent::LongLivedSessionKey(key.clone()));
        }
    }
}

#[async_trait]
impl AuthProvider for ScriptedProvider {
    fn login(&mut self, credentials: Credentials) -> Result<(), ProviderError> {
        self.account = Some(credentials.account_name.clone());

        if let Some(message) = &self.script.fail {
            let _ = self.events_tx.send(ProviderEvent::Error(message.clone()));
            return Ok(());
        }

        if let Some(expected) = self.script.expect_guard_code.clone() {
            let tx = self.events_tx.clone();
            let script = Arc::clone(&self.script);
            let remember = credentials.remember_password;
            tokio::spawn(async move {
                let (handle, code_rx) = ResumeHandle::new();
                let _ = tx.send(ProviderEvent::GuardRequired(handle));
                match code_rx.await {
                    Ok(code) if code == expected => send_login_outcome(&tx, &script, remember),
                    Ok(_) => {
                        let _ = tx.send(ProviderEvent::Error("InvalidLoginAuthCode".to_string()));
                    }
                    Err(_) => {}
                }
            });
            return Ok(());
        }

        send_login_outcome(&self.events_tx, &self.script, credentials.remember_password);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ProviderEvent> {
        self.events_rx.recv().await
    }

    async fn session_ticket(&mut self, _app_id: u32) -> Result<Bytes, ProviderError> {
        let account = self
            .account
            .as_deref()
            .ok_or_else(|| ProviderError::new("not logged on"))?;
        Ok(Bytes::from(format!("tkt-{}", account)))
    }

    async fn activate_session_ticket(
        &mut self,
        _app_id: u32,
        _ticket: &[u8],
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    fn log_off(&mut self) {
        self.account = None;
    }
}

/// Spawn a broker on a fresh socket path, returning the path and the
/// shutdown token. The tempdir is leaked into the path so it outlives the
/// helper.
fn start_broker(script: Script) -> (PathBuf, CancellationToken) {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("broker.sock");
    // Keep the directory alive for the duration of the test process
    std::mem::forget(dir);

    let config = BrokerConfig {
        socket_path: socket_path.clone(),
        ..BrokerConfig::default()
    };

    let script = Arc::new(script);
    let cancel = CancellationToken::new();
    let server = BrokerServer::new(config, move || ScriptedProvider::new(Arc::clone(&script)))
        .with_shutdown_token(cancel.clone());

    tokio::spawn(async move {
        server.run().await.expect("broker server failed");
    });

    (socket_path, cancel)
}

/// Caller-side connection wrapper
struct TestCaller {
    framed: Framed<UnixStream, CallerCodec>,
}

impl TestCaller {
    async fn connect(path: &Path) -> Self {
        // Retry a few times in case the server isn't listening yet
        for _ in 0..50 {
            match UnixStream::connect(path).await {
                Ok(stream) => {
                    return Self {
                        framed: Framed::new(stream, CallerCodec::new()),
                    };
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        panic!("Failed to connect to broker at {:?}", path);
    }

    async fn send(&mut self, request: ClientRequest) {
        self.framed.send(request).await.expect("send failed");
    }

    async fn login(&mut self, account: &str, remember: bool) {
        self.send(ClientRequest::Login {
            credentials: Credentials {
                account_name: account.to_string(),
                password: "hunter2".to_string(),
                remember_password: remember,
            },
        })
        .await;
    }

    async fn recv(&mut self) -> ServerResponse {
        timeout(Duration::from_secs(5), self.framed.next())
            .await
            .expect("timed out waiting for response")
            .expect("connection closed unexpectedly")
            .expect("framing error")
    }

    /// Expect the broker to close the connection without another frame
    async fn expect_eof(&mut self) {
        let next = timeout(Duration::from_secs(5), self.framed.next())
            .await
            .expect("timed out waiting for close");
        assert!(next.is_none(), "expected EOF, got {:?}", next);
    }
}

fn expected_token(account: &str) -> String {
    hex::encode_upper(format!("tkt-{}", account).as_bytes())
}

#[tokio::test]
async fn test_login_success_over_unix_socket() {
    let (path, _cancel) = start_broker(Script::default());
    let mut caller = TestCaller::connect(&path).await;

    caller.login("alice", false).await;

    match caller.recv().await {
        ServerResponse::Success {
            token,
            refresh_token,
        } => {
            assert_eq!(token, expected_token("alice"));
            assert_eq!(token.len(), "tkt-alice".len() * 2);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
            assert_eq!(refresh_token, None);
        }
        other => panic!("Expected success, got {:?}", other),
    }

    // One connection, one success, then close
    caller.expect_eof().await;
}

#[tokio::test]
async fn test_guard_flow() {
    let (path, _cancel) = start_broker(Script {
        expect_guard_code: Some("91042".to_string()),
        ..Script::default()
    });
    let mut caller = TestCaller::connect(&path).await;

    caller.login("alice", false).await;

    // Exactly one guard frame before any other response
    assert_eq!(caller.recv().await, ServerResponse::guard());

    caller
        .send(ClientRequest::GuardCode {
            code: "91042".to_string(),
        })
        .await;

    match caller.recv().await {
        ServerResponse::Success { token, .. } => assert_eq!(token, expected_token("alice")),
        other => panic!("Expected success, got {:?}", other),
    }
    caller.expect_eof().await;
}

#[tokio::test]
async fn test_wrong_guard_code_fails_login() {
    let (path, _cancel) = start_broker(Script {
        expect_guard_code: Some("91042".to_string()),
        ..Script::default()
    });
    let mut caller = TestCaller::connect(&path).await;

    caller.login("alice", false).await;
    assert_eq!(caller.recv().await, ServerResponse::guard());

    caller
        .send(ClientRequest::GuardCode {
            code: "00000".to_string(),
        })
        .await;

    assert_eq!(
        caller.recv().await,
        ServerResponse::error("InvalidLoginAuthCode")
    );
    caller.expect_eof().await;
}

#[tokio::test]
async fn test_refresh_token_requires_remember_password() {
    let script = || Script {
        session_key: Some("longlived".to_string()),
        ..Script::default()
    };

    // Opted in: key comes back
    let (path, _cancel) = start_broker(script());
    let mut caller = TestCaller::connect(&path).await;
    caller.login("alice", true).await;
    match caller.recv().await {
        ServerResponse::Success { refresh_token, .. } => {
            assert_eq!(refresh_token, Some("longlived".to_string()));
        }
        other => panic!("Expected success, got {:?}", other),
    }

    // Not opted in: exactly null even though the provider could issue one
    let (path, _cancel) = start_broker(script());
    let mut caller = TestCaller::connect(&path).await;
    caller.login("alice", false).await;
    match caller.recv().await {
        ServerResponse::Success { refresh_token, .. } => assert_eq!(refresh_token, None),
        other => panic!("Expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_provider_error_yields_single_error_frame() {
    let (path, _cancel) = start_broker(Script {
        fail: Some("InvalidPassword".to_string()),
        ..Script::default()
    });
    let mut caller = TestCaller::connect(&path).await;

    caller.login("alice", false).await;

    assert_eq!(caller.recv().await, ServerResponse::error("InvalidPassword"));
    // No success frame follows; the connection just closes
    caller.expect_eof().await;
}

#[tokio::test]
async fn test_concurrent_connections_no_crosstalk() {
    let (path, _cancel) = start_broker(Script::default());

    let mut alice = TestCaller::connect(&path).await;
    let mut bob = TestCaller::connect(&path).await;

    // Interleave frame delivery across the two connections
    alice.login("alice", false).await;
    bob.login("bob", false).await;

    let bob_response = bob.recv().await;
    let alice_response = alice.recv().await;

    match bob_response {
        ServerResponse::Success { token, .. } => assert_eq!(token, expected_token("bob")),
        other => panic!("Expected success for bob, got {:?}", other),
    }
    match alice_response {
        ServerResponse::Success { token, .. } => assert_eq!(token, expected_token("alice")),
        other => panic!("Expected success for alice, got {:?}", other),
    }
}

#[tokio::test]
async fn test_guard_code_before_login_is_recoverable() {
    let (path, _cancel) = start_broker(Script::default());
    let mut caller = TestCaller::connect(&path).await;

    caller
        .send(ClientRequest::GuardCode {
            code: "91042".to_string(),
        })
        .await;

    // Answered with an error frame, but the session stays usable
    match caller.recv().await {
        ServerResponse::Error { .. } => {}
        other => panic!("Expected error frame, got {:?}", other),
    }

    caller.login("alice", false).await;
    match caller.recv().await {
        ServerResponse::Success { token, .. } => assert_eq!(token, expected_token("alice")),
        other => panic!("Expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_second_login_rejected_but_first_completes() {
    let (path, _cancel) = start_broker(Script {
        expect_guard_code: Some("91042".to_string()),
        ..Script::default()
    });
    let mut caller = TestCaller::connect(&path).await;

    caller.login("alice", false).await;
    assert_eq!(caller.recv().await, ServerResponse::guard());

    // Duplicate login mid-session is a violation, not a session killer
    caller.login("mallory", false).await;
    match caller.recv().await {
        ServerResponse::Error { .. } => {}
        other => panic!("Expected error frame, got {:?}", other),
    }

    caller
        .send(ClientRequest::GuardCode {
            code: "91042".to_string(),
        })
        .await;
    match caller.recv().await {
        ServerResponse::Success { token, .. } => assert_eq!(token, expected_token("alice")),
        other => panic!("Expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dev_provider_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("broker.sock");
    let config = BrokerConfig {
        socket_path: socket_path.clone(),
        ..BrokerConfig::default()
    };

    let server = BrokerServer::new(config, tb_broker::provider::DevProvider::new);
    tokio::spawn(async move {
        server.run().await.expect("broker server failed");
    });

    let mut caller = TestCaller::connect(&socket_path).await;
    caller.login("alice", true).await;

    match caller.recv().await {
        ServerResponse::Success {
            token,
            refresh_token,
        } => {
            // 4-byte app id plus a sha256 digest, two hex digits per byte
            assert_eq!(token.len(), (4 + 32) * 2);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
            assert!(refresh_token.is_some());
        }
        other => panic!("Expected success, got {:?}", other),
    }
    caller.expect_eof().await;
}

#[tokio::test]
async fn test_stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("broker.sock");
    std::fs::write(&socket_path, b"stale").unwrap();

    let config = BrokerConfig {
        socket_path: socket_path.clone(),
        ..BrokerConfig::default()
    };
    let cancel = CancellationToken::new();
    let server = BrokerServer::new(config, move || ScriptedProvider::new(Arc::new(Script::default())))
        .with_shutdown_token(cancel.clone());
    tokio::spawn(async move {
        server.run().await.expect("broker server failed");
    });

    let mut caller = TestCaller::connect(&socket_path).await;
    caller.login("alice", false).await;
    match caller.recv().await {
        ServerResponse::Success { .. } => {}
        other => panic!("Expected success, got {:?}", other),
    }

    cancel.cancel();
    // The socket file is removed on shutdown
    for _ in 0..50 {
        if !socket_path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("socket file still present after shutdown");
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (path, cancel) = start_broker(Script::default());

    // Make sure the server is up first
    let mut caller = TestCaller::connect(&path).await;
    caller.login("alice", false).await;
    caller.recv().await;

    cancel.cancel();
    for _ in 0..50 {
        if UnixStream::connect(&path).await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("broker still accepting connections after shutdown");
}
