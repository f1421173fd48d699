//! Directional session key (SPEC_FULL.md §3, §4.8).

use std::sync::Arc;

/// One direction's derived session key.
///
/// Cheaply cloneable (`Arc<[u8]>`) because both the forward and reverse
/// pipe tasks need their own owned copy to move into their spawned
/// futures; `Debug` is hand-written to redact the contents, since
/// SPEC_FULL.md §4.8 requires that no event -- and by extension no
/// incidental `{:?}` in a log line -- ever carries key material.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Arc<[u8]>);

impl SessionKey {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        SessionKey(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionKey").field(&"<redacted>").finish()
    }
}
