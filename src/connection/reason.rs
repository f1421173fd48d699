//! Terminal reason taxonomy (SPEC_FULL.md §7).

use thiserror::Error;

/// Why a connection died. Reported to `on_dead` exactly once per
/// connection (SPEC_FULL.md §3, §8).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Every candidate target was unreachable or refused.
    #[error("every candidate target was unreachable or refused")]
    ConnectFailed,
    /// Key-agreement protocol rejected the peer.
    #[error("the handshake protocol rejected the peer")]
    HandshakeFailed,
    /// Both pipe directions reached clean EOF.
    #[error("connection closed cleanly")]
    Closed,
    /// A timeout, local resource failure, or pipe I/O failure. The
    /// core deliberately does not distinguish sub-reasons above the
    /// pipes (SPEC_FULL.md §7); `tracing` events carry the finer
    /// distinction at the log level instead (SPEC_FULL.md §9).
    #[error("connection failed")]
    Error,
}

/// Failure of `Connection::create` itself. Distinct from [`Reason`]
/// because `on_dead` is never invoked for these: by definition the
/// connection never started running (SPEC_FULL.md §7).
#[derive(Debug, Error)]
pub enum CreateError {
    /// No resources could be allocated to start the connection (e.g.
    /// the connect timer could not be armed). Returns `sock_in` to the
    /// caller rather than dropping it, preserving the source contract
    /// that a failed `create` leaves ownership of the accepted socket
    /// with the caller (SPEC_FULL.md §4.1, §9).
    #[error("could not allocate resources to start the connection")]
    ResourceExhausted { sock_in: crate::socket::Socket },
    /// `targets` was empty: there is nothing for the connector to ever
    /// try, so rejecting here rather than starting a connect task that
    /// can only ever exhaust (SPEC_FULL.md §4.7). Returns `sock_in` for
    /// the same reason `ResourceExhausted` does.
    #[error("targets must not be empty")]
    EmptyTargets { sock_in: crate::socket::Socket },
}
