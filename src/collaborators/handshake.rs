//! Handshake collaborator (SPEC_FULL.md §6).
//!
//! The cryptographic handshake protocol itself -- key agreement, HMAC
//! construction, PFS negotiation -- is explicitly out of scope
//! (SPEC_FULL.md §1); the engine consumes it as an opaque task.

use async_trait::async_trait;
use thiserror::Error;

use crate::connection::SessionKey;
use crate::socket::Socket;

/// A local failure while attempting the handshake (as opposed to the
/// peer's protocol rejecting us, which is [`HandshakeOutcome::Rejected`]).
#[derive(Debug, Error)]
pub enum HandshakeIoError {
    #[error("handshake I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a completed handshake attempt.
///
/// The source's callback delivers two non-null keys on success or two
/// null keys on protocol failure; `(non-null, null)` is declared
/// impossible (SPEC_FULL.md §9). This type makes that partial-success
/// shape unrepresentable instead of merely documenting it as forbidden.
#[derive(Debug)]
pub enum HandshakeOutcome {
    Accepted {
        key_fwd: SessionKey,
        key_rev: SessionKey,
    },
    Rejected,
}

/// Completes key agreement on `socket` and yields two directional keys,
/// or reports that the peer's protocol rejected the attempt
/// (SPEC_FULL.md §6 `handshake`).
#[async_trait]
pub trait Handshaker: Send + Sync + 'static {
    async fn run(
        &self,
        socket: &mut Socket,
        decrypt_role: bool,
        no_pfs: bool,
        require_pfs: bool,
        secret: &[u8],
    ) -> Result<HandshakeOutcome, HandshakeIoError>;
}
