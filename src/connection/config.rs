//! Connection configuration (SPEC_FULL.md §4.7, ambient).
//!
//! Bundles the validated, caller-supplied tunables for one connection
//! separately from its transient task-handle state, so malformed
//! configuration (a non-positive timeout, conflicting PFS flags) is
//! rejected before a socket or task is ever touched.

use std::time::Duration;

use thiserror::Error;

use crate::address::Address;

/// Which side of the tunnel this connection is (SPEC_FULL.md glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Inbound side is plaintext, outbound side is ciphertext.
    Encrypt,
    /// Inbound side is ciphertext, outbound side is plaintext.
    Decrypt,
}

impl Role {
    /// `true` for the role whose accepted socket carries ciphertext.
    pub fn is_decrypt(self) -> bool {
        matches!(self, Role::Decrypt)
    }
}

/// The three independent behavioral flags from SPEC_FULL.md §3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ConnectionFlags {
    pub no_pfs: bool,
    pub require_pfs: bool,
    pub no_keepalive: bool,
}

/// Default connect/handshake timeout when a builder does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("timeout must be greater than zero")]
    InvalidTimeout,
    #[error("no_pfs and require_pfs cannot both be set")]
    ConflictingPfsFlags,
}

/// A validated, immutable bundle of per-connection tunables.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    role: Role,
    timeout: Duration,
    flags: ConnectionFlags,
    bind_addr: Option<Address>,
}

impl ConnectionConfig {
    pub fn builder(role: Role) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(role)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn flags(&self) -> ConnectionFlags {
        self.flags
    }

    pub fn bind_addr(&self) -> Option<&Address> {
        self.bind_addr.as_ref()
    }
}

/// Builder for [`ConnectionConfig`], validating at `build()` rather than
/// on each setter call, surfacing configuration mistakes as a typed
/// error instead of a panic.
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    role: Role,
    timeout: Duration,
    flags: ConnectionFlags,
    bind_addr: Option<Address>,
}

impl ConnectionConfigBuilder {
    pub fn new(role: Role) -> Self {
        ConnectionConfigBuilder {
            role,
            timeout: DEFAULT_TIMEOUT,
            flags: ConnectionFlags::default(),
            bind_addr: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn flags(mut self, flags: ConnectionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn bind_addr(mut self, addr: Address) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    pub fn build(self) -> Result<ConnectionConfig, ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.flags.no_pfs && self.flags.require_pfs {
            return Err(ConfigError::ConflictingPfsFlags);
        }
        Ok(ConnectionConfig {
            role: self.role,
            timeout: self.timeout,
            flags: self.flags,
            bind_addr: self.bind_addr,
        })
    }
}
