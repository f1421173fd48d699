//! End-to-end connection-lifecycle scenarios (SPEC_FULL.md §8), driven
//! with scripted mock collaborators against a paused virtual clock so
//! every scenario is deterministic and runs in wall-clock milliseconds
//! regardless of the scripted instants it references.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pskbridge_core::collaborators::{PipeRunner, TokioClock};
use pskbridge_core::connection::{Connection, ConnectionConfig, ConnectionFlags, CreateError, Reason, Role};
use pskbridge_core::testing::{socket_pair, ScriptedConnector, ScriptedHandshaker, ScriptedPipe};

/// Captures the single `on_dead` delivery a test scenario expects.
#[derive(Clone, Default)]
struct DeadSlot(Arc<Mutex<Option<Reason>>>);

impl DeadSlot {
    fn callback(&self) -> impl FnOnce(Reason) + Send + 'static {
        let slot = self.0.clone();
        move |reason| {
            *slot.lock().expect("poisoned mutex") = Some(reason);
        }
    }

    fn get(&self) -> Option<Reason> {
        *self.0.lock().expect("poisoned mutex")
    }
}

/// Installs a `tracing` subscriber so a failing scenario's transition
/// events show up in the test output; harmless to call more than once
/// across the suite.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test(start_paused = true)]
async fn encrypt_happy_path_closes_after_both_pipes_reach_eof() {
    init_tracing();
    let (sock_in, _peer_in) = socket_pair();
    let (connector, connect_tx) = ScriptedConnector::new();
    let (handshaker, handshake_tx) = ScriptedHandshaker::new();
    let (pipe_fwd, fwd_tx) = ScriptedPipe::new();
    let (pipe_rev, rev_tx) = ScriptedPipe::new();

    let dead = DeadSlot::default();
    let config = ConnectionConfig::builder(Role::Encrypt)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let connection = Connection::create(
        sock_in,
        vec![pskbridge_core::address::Address::unix("/tmp/psk-test.sock")],
        config,
        Arc::from(b"shared secret".to_vec()),
        Arc::new(TokioClock),
        Arc::new(connector),
        Arc::new(handshaker),
        Arc::new(DirectionalPipe::new(pipe_fwd, pipe_rev, b"key-fwd".to_vec())),
        dead.callback(),
    )
    .expect("create should not fail");

    let handle = tokio::spawn(connection.run());

    tokio::time::advance(Duration::from_secs(1)).await;
    let (sock_out, _peer_out) = socket_pair();
    connect_tx.send(Ok(sock_out)).unwrap();

    tokio::time::advance(Duration::from_secs(1)).await;
    handshake_tx
        .send(ScriptedHandshaker::accepted(b"key-fwd", b"key-rev"))
        .unwrap();

    tokio::time::advance(Duration::from_secs(8)).await;
    fwd_tx.send(pskbridge_core::collaborators::PipeOutcome::Closed).unwrap();

    tokio::time::advance(Duration::from_secs(1)).await;
    rev_tx.send(pskbridge_core::collaborators::PipeOutcome::Closed).unwrap();

    let reason = handle.await.expect("connection task panicked");
    assert_eq!(reason, Reason::Closed);
    assert_eq!(dead.get(), Some(Reason::Closed));
}

#[tokio::test(start_paused = true)]
async fn create_rejects_empty_targets_and_returns_sock_in() {
    init_tracing();
    let (sock_in, _peer_in) = socket_pair();
    let (connector, _connect_tx) = ScriptedConnector::new();
    let (handshaker, _handshake_tx) = ScriptedHandshaker::new();
    let (pipe_fwd, _fwd_tx) = ScriptedPipe::new();
    let (pipe_rev, _rev_tx) = ScriptedPipe::new();

    let config = ConnectionConfig::builder(Role::Encrypt)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let err = Connection::create(
        sock_in,
        vec![],
        config,
        Arc::from(b"shared secret".to_vec()),
        Arc::new(TokioClock),
        Arc::new(connector),
        Arc::new(handshaker),
        Arc::new(DirectionalPipe::new(pipe_fwd, pipe_rev, b"unused".to_vec())),
        |_reason| panic!("on_dead must never run for a create that never started"),
    )
    .expect_err("an empty target list must be rejected");

    match err {
        CreateError::EmptyTargets { sock_in: _ } => {}
        other => panic!("expected CreateError::EmptyTargets, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_drops_with_error_and_never_starts_handshake() {
    init_tracing();
    let (sock_in, _peer_in) = socket_pair();
    let (connector, _connect_tx) = ScriptedConnector::new();
    let (handshaker, _handshake_tx) = ScriptedHandshaker::new();
    let (pipe_fwd, _fwd_tx) = ScriptedPipe::new();
    let (pipe_rev, _rev_tx) = ScriptedPipe::new();

    let dead = DeadSlot::default();
    let config = ConnectionConfig::builder(Role::Encrypt)
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let connection = Connection::create(
        sock_in,
        vec![pskbridge_core::address::Address::unix("/tmp/psk-test.sock")],
        config,
        Arc::from(b"shared secret".to_vec()),
        Arc::new(TokioClock),
        Arc::new(connector),
        Arc::new(handshaker),
        Arc::new(DirectionalPipe::new(pipe_fwd, pipe_rev, b"unused".to_vec())),
        dead.callback(),
    )
    .expect("create should not fail");

    let handle = tokio::spawn(connection.run());
    tokio::time::advance(Duration::from_secs(2)).await;

    let reason = handle.await.expect("connection task panicked");
    assert_eq!(reason, Reason::Error);
    assert_eq!(dead.get(), Some(Reason::Error));
}

#[tokio::test(start_paused = true)]
async fn handshake_rejection_drops_with_handshake_failed() {
    init_tracing();
    let (sock_in, _peer_in) = socket_pair();
    let (connector, connect_tx) = ScriptedConnector::new();
    let (handshaker, handshake_tx) = ScriptedHandshaker::new();
    let (pipe_fwd, _fwd_tx) = ScriptedPipe::new();
    let (pipe_rev, _rev_tx) = ScriptedPipe::new();

    let dead = DeadSlot::default();
    let config = ConnectionConfig::builder(Role::Encrypt)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let connection = Connection::create(
        sock_in,
        vec![pskbridge_core::address::Address::unix("/tmp/psk-test.sock")],
        config,
        Arc::from(b"shared secret".to_vec()),
        Arc::new(TokioClock),
        Arc::new(connector),
        Arc::new(handshaker),
        Arc::new(DirectionalPipe::new(pipe_fwd, pipe_rev, b"unused".to_vec())),
        dead.callback(),
    )
    .expect("create should not fail");

    let handle = tokio::spawn(connection.run());

    tokio::time::advance(Duration::from_secs(1)).await;
    let (sock_out, _peer_out) = socket_pair();
    connect_tx.send(Ok(sock_out)).unwrap();

    tokio::time::advance(Duration::from_secs(1)).await;
    handshake_tx
        .send(Ok(pskbridge_core::collaborators::HandshakeOutcome::Rejected))
        .unwrap();

    let reason = handle.await.expect("connection task panicked");
    assert_eq!(reason, Reason::HandshakeFailed);
    assert_eq!(dead.get(), Some(Reason::HandshakeFailed));
}

#[tokio::test(start_paused = true)]
async fn connect_exhaustion_drops_with_connect_failed() {
    init_tracing();
    let (sock_in, _peer_in) = socket_pair();
    let (connector, connect_tx) = ScriptedConnector::new();
    let (handshaker, _handshake_tx) = ScriptedHandshaker::new();
    let (pipe_fwd, _fwd_tx) = ScriptedPipe::new();
    let (pipe_rev, _rev_tx) = ScriptedPipe::new();

    let dead = DeadSlot::default();
    let config = ConnectionConfig::builder(Role::Encrypt)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let connection = Connection::create(
        sock_in,
        vec![pskbridge_core::address::Address::unix("/tmp/psk-test.sock")],
        config,
        Arc::from(b"shared secret".to_vec()),
        Arc::new(TokioClock),
        Arc::new(connector),
        Arc::new(handshaker),
        Arc::new(DirectionalPipe::new(pipe_fwd, pipe_rev, b"unused".to_vec())),
        dead.callback(),
    )
    .expect("create should not fail");

    let handle = tokio::spawn(connection.run());

    tokio::time::advance(Duration::from_secs(1)).await;
    connect_tx
        .send(Err(pskbridge_core::collaborators::ConnectError::Exhausted))
        .unwrap();

    let reason = handle.await.expect("connection task panicked");
    assert_eq!(reason, Reason::ConnectFailed);
    assert_eq!(dead.get(), Some(Reason::ConnectFailed));
}

#[tokio::test(start_paused = true)]
async fn decrypt_role_starts_handshake_before_connect_and_survives_either_order() {
    init_tracing();
    let (sock_in, _peer_in) = socket_pair();
    let (connector, connect_tx) = ScriptedConnector::new();
    let (handshaker, handshake_tx) = ScriptedHandshaker::new();
    let (pipe_fwd, fwd_tx) = ScriptedPipe::new();
    let (pipe_rev, rev_tx) = ScriptedPipe::new();

    let dead = DeadSlot::default();
    let config = ConnectionConfig::builder(Role::Decrypt)
        .timeout(Duration::from_secs(5))
        .flags(ConnectionFlags::default())
        .build()
        .unwrap();

    let connection = Connection::create(
        sock_in,
        vec![pskbridge_core::address::Address::unix("/tmp/psk-test.sock")],
        config,
        Arc::from(b"shared secret".to_vec()),
        Arc::new(TokioClock),
        Arc::new(connector),
        Arc::new(handshaker),
        Arc::new(DirectionalPipe::new(pipe_fwd, pipe_rev, b"key-fwd".to_vec())),
        dead.callback(),
    )
    .expect("create should not fail");

    let handle = tokio::spawn(connection.run());

    // Handshake completes first (at t=1), connect completes later (t=3).
    tokio::time::advance(Duration::from_secs(1)).await;
    handshake_tx
        .send(ScriptedHandshaker::accepted(b"key-fwd", b"key-rev"))
        .unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    let (sock_out, _peer_out) = socket_pair();
    connect_tx.send(Ok(sock_out)).unwrap();

    tokio::time::advance(Duration::from_secs(1)).await;
    fwd_tx.send(pskbridge_core::collaborators::PipeOutcome::Error).unwrap();

    let reason = handle.await.expect("connection task panicked");
    assert_eq!(reason, Reason::Error);
    assert_eq!(dead.get(), Some(Reason::Error));

    // rev_tx is simply dropped here: the reverse pipe task was aborted
    // by teardown before it could ever be signalled.
    drop(rev_tx);
}

/// A [`pskbridge_core::collaborators::PipeRunner`] that dispatches to
/// one of two scripted runners by comparing the key it is called with
/// against the known forward-direction key bytes, rather than relying
/// on which of the two spawned pipe tasks the executor happens to poll
/// first (SPEC_FULL.md §4.1 "Pipe launch" only guarantees the forward
/// pipe is *launched* before the reverse one, not that it runs first).
struct DirectionalPipe {
    fwd: ScriptedPipe,
    rev: ScriptedPipe,
    fwd_key: Vec<u8>,
}

impl DirectionalPipe {
    fn new(fwd: ScriptedPipe, rev: ScriptedPipe, fwd_key: Vec<u8>) -> Self {
        DirectionalPipe { fwd, rev, fwd_key }
    }
}

#[async_trait::async_trait]
impl pskbridge_core::collaborators::PipeRunner for DirectionalPipe {
    async fn run(
        &self,
        src: pskbridge_core::socket::SocketReadHalf,
        dst: pskbridge_core::socket::SocketWriteHalf,
        key: pskbridge_core::connection::SessionKey,
        decrypt: bool,
    ) -> pskbridge_core::collaborators::PipeOutcome {
        if key.as_bytes() == self.fwd_key.as_slice() {
            self.fwd.run(src, dst, key, decrypt).await
        } else {
            self.rev.run(src, dst, key, decrypt).await
        }
    }
}
