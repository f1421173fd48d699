//! The four external collaborators the connection engine orchestrates
//! but does not implement (SPEC_FULL.md §6): a one-shot timer, an
//! outbound connector, a handshake, and a byte-relaying pipe. Each is a
//! trait so tests can substitute deterministic, scripted mocks (see
//! [`crate::testing`]) for the production implementations in this module.

mod clock;
mod connect;
mod handshake;
mod pipe;

pub use clock::{Clock, TokioClock};
pub use connect::{ConnectError, Connector, TokioConnector};
pub use handshake::{HandshakeIoError, HandshakeOutcome, Handshaker};
pub use pipe::{PipeOutcome, PipeRunner};
