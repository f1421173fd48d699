//! Per-connection lifecycle engine for a symmetric, pre-shared-key
//! encrypted TCP tunnel.
//!
//! An instance of [`connection::Connection`] owns one accepted socket
//! and drives it through connecting outbound, completing a key-agreement
//! handshake, and relaying bytes in both directions until either side
//! closes cleanly or any step errs or times out. The cryptographic
//! handshake, the byte-relaying pipe, and the event loop primitive
//! itself are external collaborators (see [`collaborators`]): this
//! crate orchestrates them, it does not implement them.

pub mod address;
pub mod collaborators;
pub mod connection;
pub mod socket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
