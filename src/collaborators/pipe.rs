//! Pipe collaborator (SPEC_FULL.md §6).
//!
//! The byte-shuffling pipe -- framing, encryption, MAC verification --
//! is explicitly out of scope (SPEC_FULL.md §1); the engine launches
//! two of these and observes their terminal status.

use async_trait::async_trait;

use crate::connection::SessionKey;
use crate::socket::{SocketReadHalf, SocketWriteHalf};

/// Terminal status of a pipe (SPEC_FULL.md §4.3).
///
/// The source writes a tri-valued status cell (`1` running, `0` clean
/// EOF, `-1` error) and invokes a callback on each transition. This
/// translation only needs the terminal value: a pipe task's single
/// `JoinHandle` output *is* the "clean EOF or error" notification,
/// delivered as a message rather than observed by polling a shared
/// cell (SPEC_FULL.md §4.3, §9). There is no `Running` variant because
/// nothing downstream of the pipe launch ever needs to observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeOutcome {
    Closed,
    Error,
}

/// Relays bytes from `src` to `dst` under `key`, applying encryption in
/// the direction `decrypt` indicates, until clean EOF or an error
/// (SPEC_FULL.md §6 `pipe`). Does not close the underlying socket
/// halves on its own account; ownership of the sockets remains the
/// engine's (SPEC_FULL.md §4.3).
#[async_trait]
pub trait PipeRunner: Send + Sync + 'static {
    async fn run(
        &self,
        src: SocketReadHalf,
        dst: SocketWriteHalf,
        key: SessionKey,
        decrypt: bool,
    ) -> PipeOutcome;
}
