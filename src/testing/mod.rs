//! Scripted mock collaborators for deterministic connection-scenario
//! tests (SPEC_FULL.md §8). Every mock resolves only when the test
//! explicitly signals it, via a [`tokio::sync::oneshot`] channel or a
//! [`tokio::sync::Notify`] -- never a wall-clock sleep -- so scenarios
//! driven under `#[tokio::test(start_paused = true)]` plus
//! `tokio::time::advance` are reproducible and fast.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::address::Address;
use crate::collaborators::{
    ConnectError, Connector, HandshakeIoError, HandshakeOutcome, Handshaker, PipeOutcome, PipeRunner,
};
use crate::connection::SessionKey;
use crate::socket::{Socket, SocketReadHalf, SocketWriteHalf};

/// Production-shaped clock that just delegates to `tokio::time::sleep`.
///
/// Tests pair this with `#[tokio::test(start_paused = true)]` and
/// `tokio::time::advance`, rather than substituting a different
/// implementation: Tokio's paused virtual clock already gives
/// deterministic control over every `sleep`, including the ones this
/// crate schedules internally, so a second mock `Clock` would be
/// redundant (SPEC_FULL.md §8 test tooling).
pub use crate::collaborators::TokioClock as ScriptedClock;

/// A [`Connector`] whose single outcome is supplied by the test via a
/// one-shot channel.
pub struct ScriptedConnector {
    outcome: Mutex<Option<oneshot::Receiver<Result<Socket, ConnectError>>>>,
}

impl ScriptedConnector {
    /// Returns the mock and a sender the test uses to deliver the
    /// connect outcome at the scripted instant.
    pub fn new() -> (Self, oneshot::Sender<Result<Socket, ConnectError>>) {
        let (tx, rx) = oneshot::channel();
        (
            ScriptedConnector {
                outcome: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _targets: &[Address], _bind_addr: Option<&Address>) -> Result<Socket, ConnectError> {
        let rx = self
            .outcome
            .lock()
            .expect("poisoned mutex")
            .take()
            .expect("ScriptedConnector.connect called more than once");
        rx.await.expect("test dropped the connect outcome sender")
    }
}

/// A [`Handshaker`] whose single outcome is supplied by the test.
pub struct ScriptedHandshaker {
    outcome: Mutex<Option<oneshot::Receiver<Result<HandshakeOutcome, HandshakeIoError>>>>,
}

impl ScriptedHandshaker {
    pub fn new() -> (Self, oneshot::Sender<Result<HandshakeOutcome, HandshakeIoError>>) {
        let (tx, rx) = oneshot::channel();
        (
            ScriptedHandshaker {
                outcome: Mutex::new(Some(rx)),
            },
            tx,
        )
    }

    /// Convenience outcome for a successful handshake with throwaway keys.
    pub fn accepted(key_fwd: &[u8], key_rev: &[u8]) -> Result<HandshakeOutcome, HandshakeIoError> {
        Ok(HandshakeOutcome::Accepted {
            key_fwd: SessionKey::new(key_fwd.to_vec()),
            key_rev: SessionKey::new(key_rev.to_vec()),
        })
    }

    /// Same as [`Self::accepted`], but with randomly generated key
    /// material for scenarios that only care that the keys differ,
    /// not what they are.
    pub fn accepted_with_random_keys() -> Result<HandshakeOutcome, HandshakeIoError> {
        Ok(HandshakeOutcome::Accepted {
            key_fwd: SessionKey::new(random_key(32)),
            key_rev: SessionKey::new(random_key(32)),
        })
    }
}

#[async_trait]
impl Handshaker for ScriptedHandshaker {
    async fn run(
        &self,
        _socket: &mut Socket,
        _decrypt_role: bool,
        _no_pfs: bool,
        _require_pfs: bool,
        _secret: &[u8],
    ) -> Result<HandshakeOutcome, HandshakeIoError> {
        let rx = self
            .outcome
            .lock()
            .expect("poisoned mutex")
            .take()
            .expect("ScriptedHandshaker.run called more than once");
        rx.await.expect("test dropped the handshake outcome sender")
    }
}

/// A [`PipeRunner`] whose single outcome is supplied by the test. Two
/// instances are needed per scenario, one per direction, since each
/// pipe's terminal status is scripted independently.
pub struct ScriptedPipe {
    outcome: Mutex<Option<oneshot::Receiver<PipeOutcome>>>,
}

impl ScriptedPipe {
    pub fn new() -> (Self, oneshot::Sender<PipeOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            ScriptedPipe {
                outcome: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl PipeRunner for ScriptedPipe {
    async fn run(&self, _src: SocketReadHalf, _dst: SocketWriteHalf, _key: SessionKey, _decrypt: bool) -> PipeOutcome {
        let rx = self
            .outcome
            .lock()
            .expect("poisoned mutex")
            .take()
            .expect("ScriptedPipe.run called more than once");
        rx.await.expect("test dropped the pipe outcome sender")
    }
}

/// Builds a connected in-process pair of [`Socket`]s (a `UnixStream`
/// pair) for tests that need a real, owned socket to hand to
/// `Connection::create` without binding an actual TCP listener.
pub fn socket_pair() -> (Socket, Socket) {
    let (a, b) = tokio::net::UnixStream::pair().expect("failed to create a loopback socket pair");
    (Socket::Unix(a), Socket::Unix(b))
}

/// Advances the paused virtual clock by the given number of seconds.
/// Only valid inside `#[tokio::test(start_paused = true)]`.
pub async fn advance_secs(seconds: u64) {
    tokio::time::advance(Duration::from_secs(seconds)).await;
}

/// Generates `len` bytes of throwaway key material for scenarios where
/// the key's value is irrelevant, only its presence and distinctness.
pub fn random_key(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    bytes
}
