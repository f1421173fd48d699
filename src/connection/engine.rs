//! The connection state machine (SPEC_FULL.md §4.1).
//!
//! One instance per accepted socket. `Connection::create` arms the
//! connect timer, starts the outbound connect, and (for the Decrypt
//! role) starts the handshake on the already-open accepted socket, all
//! before returning. `Connection::run` then drives the connection to
//! completion as a single Tokio task: `tokio::select!` over up to six
//! optional task slots plays the role of the source's single-threaded
//! dispatch table (SPEC_FULL.md §9) -- only one branch's handler body
//! ever executes at a time, so fields may be mutated freely without
//! locking, exactly as the source's "callbacks never interleave"
//! scheduling guarantee requires.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn, Span};

use crate::address::Address;
use crate::collaborators::{
    Clock, ConnectError, Connector, HandshakeIoError, HandshakeOutcome, Handshaker, PipeOutcome,
    PipeRunner,
};
use crate::connection::config::{ConnectionConfig, ConnectionFlags, Role};
use crate::connection::reason::{CreateError, Reason};
use crate::connection::session_key::SessionKey;
use crate::socket::Socket;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Per-connection lifecycle engine (SPEC_FULL.md §3 `ConnectionState`).
pub struct Connection {
    id: u64,
    role: Role,
    sock_in: Option<Socket>,
    sock_out: Option<Socket>,
    targets: Option<Vec<Address>>,
    bind_addr: Option<Address>,
    secret: Arc<[u8]>,
    timeout: std::time::Duration,
    flags: ConnectionFlags,

    connect_task: Option<JoinHandle<Result<Socket, ConnectError>>>,
    connect_timer: Option<JoinHandle<()>>,
    handshake_task: Option<JoinHandle<(Socket, Result<HandshakeOutcome, HandshakeIoError>)>>,
    handshake_timer: Option<JoinHandle<()>>,
    pipe_fwd: Option<JoinHandle<PipeOutcome>>,
    pipe_rev: Option<JoinHandle<PipeOutcome>>,

    key_fwd: Option<SessionKey>,
    key_rev: Option<SessionKey>,
    stat_fwd: Option<PipeOutcome>,
    stat_rev: Option<PipeOutcome>,

    on_dead: Option<Box<dyn FnOnce(Reason) + Send>>,
    span: Span,

    clock: Arc<dyn Clock>,
    connector: Arc<dyn Connector>,
    handshaker: Arc<dyn Handshaker>,
    pipe_runner: Arc<dyn PipeRunner>,
}

impl Connection {
    /// Constructs a connection and starts its initial tasks
    /// (SPEC_FULL.md §4.1 `create`). Takes ownership of `sock_in` and
    /// `targets`; `secret` is shared (not borrowed) so it can be moved
    /// into the handshake task, which Rust's `'static`-bound
    /// `tokio::spawn` requires.
    ///
    /// Fails with `CreateError::EmptyTargets` if `targets` is empty,
    /// before any task is spawned. `CreateError::ResourceExhausted` has
    /// no realistic trigger in this runtime (unlike the source,
    /// `tokio::spawn` does not itself report allocation failure) and is
    /// kept only to preserve the source's documented contract that a
    /// failed `create` returns `sock_in` to the caller rather than
    /// dropping it (SPEC_FULL.md §9). Both variants honor that contract.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        sock_in: Socket,
        targets: Vec<Address>,
        config: ConnectionConfig,
        secret: Arc<[u8]>,
        clock: Arc<dyn Clock>,
        connector: Arc<dyn Connector>,
        handshaker: Arc<dyn Handshaker>,
        pipe_runner: Arc<dyn PipeRunner>,
        on_dead: impl FnOnce(Reason) + Send + 'static,
    ) -> Result<Self, CreateError> {
        if targets.is_empty() {
            return Err(CreateError::EmptyTargets { sock_in });
        }

        let id = next_connection_id();
        let span = tracing::info_span!("connection", id, role = ?config.role());

        let mut conn = Connection {
            id,
            role: config.role(),
            sock_in: Some(sock_in),
            sock_out: None,
            targets: Some(targets),
            bind_addr: config.bind_addr().cloned(),
            secret,
            timeout: config.timeout(),
            flags: config.flags(),
            connect_task: None,
            connect_timer: None,
            handshake_task: None,
            handshake_timer: None,
            pipe_fwd: None,
            pipe_rev: None,
            key_fwd: None,
            key_rev: None,
            stat_fwd: None,
            stat_rev: None,
            on_dead: Some(Box::new(on_dead)),
            span,
            clock,
            connector,
            handshaker,
            pipe_runner,
        };

        {
            let _enter = conn.span.enter();
            conn.start_connect();
            if conn.role.is_decrypt() {
                conn.start_handshake();
            }
        }

        Ok(conn)
    }

    /// Drives the connection to completion and returns the terminal
    /// [`Reason`]. Consumes `self`: when this future resolves (or is
    /// dropped early) no task slot survives it, by construction of
    /// [`teardown`](Self::teardown) and the [`Drop`] safety net below.
    pub async fn run(mut self) -> Reason {
        let span = self.span.clone();
        let _enter = span.enter();
        loop {
            let reason = tokio::select! {
                biased;

                result = poll_slot(&mut self.connect_task) => self.on_connect_done(result).await,
                _ = poll_slot(&mut self.connect_timer) => self.on_connect_timeout(),
                result = poll_slot(&mut self.handshake_task) => self.on_handshake_done(result),
                _ = poll_slot(&mut self.handshake_timer) => self.on_handshake_timeout(),
                result = poll_slot(&mut self.pipe_fwd) => self.on_pipe_done(Direction::Forward, result),
                result = poll_slot(&mut self.pipe_rev) => self.on_pipe_done(Direction::Reverse, result),
            };
            if let Some(reason) = reason {
                return self.teardown(reason);
            }
        }
    }

    fn start_connect(&mut self) {
        debug!(event = "create", "arming connect timer and starting connect");
        let timeout = self.timeout;
        let clock = self.clock.clone();
        self.connect_timer = Some(tokio::spawn(async move {
            clock.sleep(timeout).await;
        }));

        let connector = self.connector.clone();
        let targets = self.targets.take().expect("targets present at connect start");
        let bind_addr = self.bind_addr.clone();
        self.connect_task = Some(tokio::spawn(async move {
            connector.connect(&targets, bind_addr.as_ref()).await
        }));
    }

    /// Starts a fresh handshake timer and the handshake task itself, on
    /// the role-dependent socket: Decrypt -> `sock_in`, Encrypt ->
    /// `sock_out` (SPEC_FULL.md §4.1 "Handshake start"). The handshake
    /// task takes ownership of that socket for its duration and hands
    /// it back in its result, since the engine still needs it for
    /// piping afterward.
    fn start_handshake(&mut self) {
        debug!(event = "handshake_start", "arming handshake timer and starting handshake");
        let timeout = self.timeout;
        let clock = self.clock.clone();
        self.handshake_timer = Some(tokio::spawn(async move {
            clock.sleep(timeout).await;
        }));

        let decrypt_role = self.role.is_decrypt();
        let mut socket = if decrypt_role {
            self.sock_in.take().expect("sock_in present when starting handshake on Decrypt role")
        } else {
            self.sock_out.take().expect("sock_out present when starting handshake on Encrypt role")
        };

        let handshaker = self.handshaker.clone();
        let secret = self.secret.clone();
        let no_pfs = self.flags.no_pfs;
        let require_pfs = self.flags.require_pfs;

        self.handshake_task = Some(tokio::spawn(async move {
            let outcome = handshaker
                .run(&mut socket, decrypt_role, no_pfs, require_pfs, &secret)
                .await;
            (socket, outcome)
        }));
    }

    async fn on_connect_done(
        &mut self,
        result: Result<Result<Socket, ConnectError>, JoinError>,
    ) -> Option<Reason> {
        self.connect_task = None;
        self.targets = None;
        if let Some(timer) = self.connect_timer.take() {
            timer.abort();
        }

        match result {
            Ok(Ok(socket)) => {
                debug!(event = "connect_done", outcome = "connected", "outbound connect succeeded");
                self.sock_out = Some(socket);
                if matches!(self.role, Role::Encrypt) {
                    self.start_handshake();
                }
                if self.key_fwd.is_some() && self.key_rev.is_some() {
                    self.launch_pipes()
                } else {
                    None
                }
            }
            Ok(Err(ConnectError::Exhausted)) => {
                debug!(event = "connect_done", outcome = "exhausted", "no candidate target connected");
                Some(Reason::ConnectFailed)
            }
            Ok(Err(ConnectError::Resource(err))) => {
                debug!(event = "connect_done", outcome = "resource_error", %err, "local failure during connect");
                Some(Reason::Error)
            }
            Err(join_err) => {
                debug!(event = "connect_done", outcome = "task_panicked", %join_err, "connect task did not complete normally");
                Some(Reason::Error)
            }
        }
    }

    fn on_connect_timeout(&mut self) -> Option<Reason> {
        self.connect_timer = None;
        debug!(event = "connect_timeout", "connect timer fired");
        Some(Reason::Error)
    }

    fn on_handshake_done(
        &mut self,
        result: Result<(Socket, Result<HandshakeOutcome, HandshakeIoError>), JoinError>,
    ) -> Option<Reason> {
        self.handshake_task = None;
        if let Some(timer) = self.handshake_timer.take() {
            timer.abort();
        }

        match result {
            Ok((socket, Ok(HandshakeOutcome::Accepted { key_fwd, key_rev }))) => {
                debug!(event = "handshake_done", outcome = "accepted", "handshake produced session keys");
                if self.role.is_decrypt() {
                    self.sock_in = Some(socket);
                } else {
                    self.sock_out = Some(socket);
                }
                self.key_fwd = Some(key_fwd);
                self.key_rev = Some(key_rev);
                if self.sock_out.is_some() {
                    self.launch_pipes()
                } else {
                    None
                }
            }
            Ok((_socket, Ok(HandshakeOutcome::Rejected))) => {
                debug!(event = "handshake_done", outcome = "rejected", "peer rejected the handshake");
                Some(Reason::HandshakeFailed)
            }
            Ok((_socket, Err(err))) => {
                debug!(event = "handshake_done", outcome = "io_error", %err, "handshake attempt failed");
                Some(Reason::Error)
            }
            Err(join_err) => {
                debug!(event = "handshake_done", outcome = "task_panicked", %join_err, "handshake task did not complete normally");
                Some(Reason::Error)
            }
        }
    }

    fn on_handshake_timeout(&mut self) -> Option<Reason> {
        self.handshake_timer = None;
        debug!(event = "handshake_timeout", "handshake timer fired");
        Some(Reason::Error)
    }

    fn on_pipe_done(&mut self, direction: Direction, result: Result<PipeOutcome, JoinError>) -> Option<Reason> {
        let outcome = result.unwrap_or(PipeOutcome::Error);
        match direction {
            Direction::Forward => {
                self.pipe_fwd = None;
                self.stat_fwd = Some(outcome);
            }
            Direction::Reverse => {
                self.pipe_rev = None;
                self.stat_rev = Some(outcome);
            }
        }
        debug!(event = "pipe_status_change", ?direction, ?outcome, "a pipe direction reached a terminal state");

        match (self.stat_fwd, self.stat_rev) {
            (Some(PipeOutcome::Error), _) | (_, Some(PipeOutcome::Error)) => Some(Reason::Error),
            (Some(PipeOutcome::Closed), Some(PipeOutcome::Closed)) => Some(Reason::Closed),
            _ => None,
        }
    }

    /// Sets socket options and spawns the two directional pipes
    /// (SPEC_FULL.md §4.1 "Pipe launch"). Takes ownership of both
    /// sockets, splitting each so the forward and reverse tasks each
    /// own exactly the halves they need. `tokio::spawn` does not itself
    /// fail, so unlike the source there is no reachable "pipe failed to
    /// start" path here; the `Option<Reason>` return is kept for
    /// symmetry with the other transition handlers.
    fn launch_pipes(&mut self) -> Option<Reason> {
        let sock_in = self.sock_in.take().expect("sock_in present before pipe launch");
        let sock_out = self.sock_out.take().expect("sock_out present before pipe launch");

        sock_in.set_keepalive(!self.flags.no_keepalive);
        sock_out.set_keepalive(!self.flags.no_keepalive);
        sock_in.set_nodelay(true);
        sock_out.set_nodelay(true);

        let (in_read, in_write) = sock_in.into_split();
        let (out_read, out_write) = sock_out.into_split();

        let key_fwd = self.key_fwd.clone().expect("key_fwd present before pipe launch");
        let key_rev = self.key_rev.clone().expect("key_rev present before pipe launch");
        let decrypt_fwd = self.role.is_decrypt();

        debug!(event = "pipe_launch", "launching forward and reverse pipes");

        let pipe_runner = self.pipe_runner.clone();
        self.pipe_fwd = Some(tokio::spawn(async move {
            pipe_runner.run(in_read, out_write, key_fwd, decrypt_fwd).await
        }));

        let pipe_runner = self.pipe_runner.clone();
        self.pipe_rev = Some(tokio::spawn(async move {
            pipe_runner.run(out_read, in_write, key_rev, !decrypt_fwd).await
        }));

        None
    }

    /// Releases every resource in the fixed order SPEC_FULL.md §4.4
    /// requires, then invokes `on_dead` exactly once. Once piping has
    /// started, the sockets are owned by the pipe tasks, not `self`
    /// directly; "close the socket" is then expressed as aborting the
    /// task that owns it, which drops its socket half -- the guarantee
    /// that no open descriptor survives teardown is preserved even
    /// though the mechanism is no longer a literal `close()` call.
    fn teardown(mut self, reason: Reason) -> Reason {
        self.sock_in = None;
        self.sock_out = None;

        if let Some(h) = self.connect_task.take() {
            h.abort();
        }

        self.targets = None;

        if let Some(h) = self.handshake_task.take() {
            h.abort();
        }
        if let Some(h) = self.pipe_fwd.take() {
            h.abort();
        }
        if let Some(h) = self.pipe_rev.take() {
            h.abort();
        }

        if let Some(h) = self.connect_timer.take() {
            h.abort();
        }
        if let Some(h) = self.handshake_timer.take() {
            h.abort();
        }

        self.key_fwd = None;
        self.key_rev = None;

        match reason {
            Reason::Error => warn!(event = "drop", %reason, "connection terminated"),
            Reason::ConnectFailed | Reason::HandshakeFailed | Reason::Closed => {
                info!(event = "drop", %reason, "connection terminated")
            }
        }

        if let Some(on_dead) = self.on_dead.take() {
            on_dead(reason);
        }

        reason
    }
}

impl Drop for Connection {
    /// Safety net for `on_dead` exactly-once delivery (SPEC_FULL.md §3,
    /// §8) when the connection is dropped without `teardown` having
    /// run -- e.g. the task driving `run` is itself aborted by a
    /// supervisor. `teardown` always clears `on_dead` before returning,
    /// so this is a no-op on every path that went through it.
    fn drop(&mut self) {
        if let Some(h) = self.connect_task.take() {
            h.abort();
        }
        if let Some(h) = self.handshake_task.take() {
            h.abort();
        }
        if let Some(h) = self.pipe_fwd.take() {
            h.abort();
        }
        if let Some(h) = self.pipe_rev.take() {
            h.abort();
        }
        if let Some(h) = self.connect_timer.take() {
            h.abort();
        }
        if let Some(h) = self.handshake_timer.take() {
            h.abort();
        }

        if let Some(on_dead) = self.on_dead.take() {
            warn!(id = self.id, event = "drop", reason = %Reason::Error, "connection dropped without running teardown");
            on_dead(Reason::Error);
        }
    }
}

/// Polls an `Option<JoinHandle<T>>`, pending forever while it is `None`.
///
/// Lets `tokio::select!` treat each of the six task slots uniformly:
/// a slot with no outstanding task simply never becomes ready, instead
/// of requiring a conditional branch per field (SPEC_FULL.md §9, the
/// `Option<JoinHandle<_>>` fields "exactly mirroring the present or
/// absent language of §3").
fn poll_slot<T>(slot: &mut Option<JoinHandle<T>>) -> PollSlot<'_, T> {
    PollSlot(slot)
}

struct PollSlot<'a, T>(&'a mut Option<JoinHandle<T>>);

impl<'a, T> Future for PollSlot<'a, T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.0 {
            Some(handle) => Pin::new(handle).poll(cx),
            None => Poll::Pending,
        }
    }
}
