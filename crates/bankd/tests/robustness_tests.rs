//! Robustness tests: hostile or broken input must never take the server down.
//!
//! Raw frames are written straight to the socket so the tests control the
//! exact bytes on the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bank_core::{ContactInfo, ClientProfile, ErrorKind, ResourceId, Role, TellerRecord, Username};
use bank_protocol::{Request, RequestBody, Response};
use bankd::channel::MAX_FRAME_SIZE;
use bankd::{BankServer, BankState, Channel, Ledger, RulesConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const IO_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

async fn spawn_server() -> (SocketAddr, Arc<BankState>, CancellationToken) {
    let ledger = Ledger::new();
    ledger.add_teller(TellerRecord::new(Username::new("tom"), "teller-pw"));
    ledger
        .create_profile(ClientProfile::new(
            Username::new("alice"),
            "pw",
            ContactInfo::default(),
        ))
        .unwrap();

    let state = BankState::new(ledger, RulesConfig::default());
    let cancel = CancellationToken::new();
    let server = BankServer::bind(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        Arc::clone(&state),
        cancel.clone(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, state, cancel)
}

/// Raw socket client speaking length-prefixed frames by hand.
struct RawClient {
    stream: TcpStream,
}

impl RawClient {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
        }
    }

    async fn send_frame(&mut self, payload: &[u8]) {
        let len = u32::try_from(payload.len()).unwrap();
        self.stream.write_all(&len.to_be_bytes()).await.unwrap();
        self.stream.write_all(payload).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    async fn send_request(&mut self, request: &Request) {
        let json = serde_json::to_vec(request).unwrap();
        self.send_frame(&json).await;
    }

    /// Reads one response frame, or `None` if the server closed the socket.
    async fn recv(&mut self) -> Option<Response> {
        let mut len = [0u8; 4];
        let read = timeout(IO_TIMEOUT, self.stream.read_exact(&mut len))
            .await
            .expect("frame in time");
        if read.is_err() {
            return None;
        }

        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        self.stream.read_exact(&mut body).await.ok()?;
        Some(serde_json::from_slice(&body).unwrap())
    }
}

fn failure_kind(response: &Response) -> ErrorKind {
    match response {
        Response::Failure { kind, .. } => *kind,
        other => panic!("expected failure, got {other:?}"),
    }
}

async fn wait_until(state: &BankState, check: impl Fn(&BankState) -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < IO_TIMEOUT {
        if check(state) {
            return true;
        }
        sleep(POLL_INTERVAL).await;
    }
    check(state)
}

// ============================================================================
// Malformed input
// ============================================================================

#[tokio::test]
async fn test_malformed_json_answered_with_failure() {
    let (addr, _state, cancel) = spawn_server().await;
    let mut client = RawClient::connect(addr).await;

    client.send_frame(b"{this is not json").await;
    let response = client.recv().await.unwrap();
    assert_eq!(failure_kind(&response), ErrorKind::Protocol);

    cancel.cancel();
}

#[tokio::test]
async fn test_unknown_message_type_answered_with_failure() {
    let (addr, _state, cancel) = spawn_server().await;
    let mut client = RawClient::connect(addr).await;

    client
        .send_frame(br#"{"protocol_version":{"major":1,"minor":0},"type":"launch_rockets"}"#)
        .await;
    let response = client.recv().await.unwrap();
    assert_eq!(failure_kind(&response), ErrorKind::Protocol);

    cancel.cancel();
}

#[tokio::test]
async fn test_missing_fields_answered_with_failure() {
    let (addr, _state, cancel) = spawn_server().await;
    let mut client = RawClient::connect(addr).await;

    // Known type, but required fields absent
    client.send_frame(br#"{"type":"login_client"}"#).await;
    let response = client.recv().await.unwrap();
    assert_eq!(failure_kind(&response), ErrorKind::Protocol);

    cancel.cancel();
}

#[tokio::test]
async fn test_client_continues_after_errors() {
    let (addr, state, cancel) = spawn_server().await;
    let mut client = RawClient::connect(addr).await;

    for garbage in [&b"nope"[..], b"[]", b"{}", b"\"string\""] {
        client.send_frame(garbage).await;
        assert!(!client.recv().await.unwrap().is_success());
    }

    client
        .send_request(&Request::login(Role::Client, "alice", "pw"))
        .await;
    assert!(client.recv().await.unwrap().is_success());
    assert_eq!(state.sessions.len(), 1);

    cancel.cancel();
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let (addr, state, cancel) = spawn_server().await;
    let mut client = RawClient::connect(addr).await;

    let len = u32::try_from(MAX_FRAME_SIZE + 1).unwrap();
    client.stream.write_all(&len.to_be_bytes()).await.unwrap();
    assert!(client.recv().await.is_none());

    // Server is still accepting
    let mut other = RawClient::connect(addr).await;
    other
        .send_request(&Request::login(Role::Client, "alice", "pw"))
        .await;
    assert!(other.recv().await.unwrap().is_success());
    assert_eq!(state.sessions.len(), 1);

    cancel.cancel();
}

// ============================================================================
// Connection loss
// ============================================================================

#[tokio::test]
async fn test_dropped_socket_releases_session_and_locks() {
    let (addr, state, cancel) = spawn_server().await;
    let mut client = RawClient::connect(addr).await;

    client
        .send_request(&Request::login(Role::Teller, "tom", "teller-pw"))
        .await;
    let token = match client.recv().await.unwrap() {
        Response::Success {
            payload: bank_protocol::SuccessPayload::LoggedIn { token, .. },
        } => token,
        other => panic!("login failed: {other:?}"),
    };
    client
        .send_request(&Request::with_token(
            token.clone(),
            RequestBody::LoadProfile {
                username: Username::new("alice"),
            },
        ))
        .await;
    assert!(client.recv().await.unwrap().is_success());
    assert_eq!(state.locks.held_by(&token).len(), 2);

    drop(client);

    assert!(wait_until(&state, |s| s.sessions.is_empty()).await);
    assert!(state.locks.held_by(&token).is_empty());
    assert!(state
        .locks
        .holder(&ResourceId::Profile(Username::new("alice")))
        .is_none());

    // The teller can log straight back in
    let mut again = RawClient::connect(addr).await;
    again
        .send_request(&Request::login(Role::Teller, "tom", "teller-pw"))
        .await;
    assert!(again.recv().await.unwrap().is_success());

    cancel.cancel();
}

#[tokio::test]
async fn test_rapid_connect_disconnect() {
    let (addr, state, cancel) = spawn_server().await;

    for _ in 0..20 {
        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);
    }

    let mut client = RawClient::connect(addr).await;
    client
        .send_request(&Request::login(Role::Client, "alice", "pw"))
        .await;
    assert!(client.recv().await.unwrap().is_success());
    assert_eq!(state.sessions.len(), 1);

    cancel.cancel();
}

#[tokio::test]
async fn test_many_concurrent_connections() {
    let (addr, _state, cancel) = spawn_server().await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        handles.push(tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut channel: Channel<Response, Request> = Channel::from_tcp(stream);
            channel
                .send(Request::login(Role::Client, "alice", "pw"))
                .unwrap();
            let response = timeout(IO_TIMEOUT, channel.receive()).await.unwrap();
            channel.close().await;
            response.map(|r| r.is_success())
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() == Some(true) {
            successes += 1;
        }
    }
    // Sessions may end before later logins arrive, so at least one wins
    assert!(successes >= 1);

    cancel.cancel();
}
