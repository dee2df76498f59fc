//! Session labels.
//!
//! The label is bound into both the handshake signature and the key
//! expansion seed, so two sessions between the same nodes with different
//! labels never share keys.

use std::fmt;

/// Opaque channel-binding label.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct SessionLabel(Vec<u8>);

impl SessionLabel {
    /// Label for a meta connection. `outgoing` is the node that opened the
    /// connection. The bytes include a terminating NUL.
    pub fn meta(outgoing: &str, incoming: &str) -> Self {
        Self::with_names("tinc TCP key expansion", outgoing, incoming)
    }

    /// Label for the datagram session from `from` to `to`. The bytes
    /// include a terminating NUL.
    pub fn datagram(from: &str, to: &str) -> Self {
        Self::with_names("tinc UDP key expansion", from, to)
    }

    /// Label used while redeeming an invitation.
    pub fn invitation() -> Self {
        Self(b"tinc invitation".to_vec())
    }

    fn with_names(prefix: &str, first: &str, second: &str) -> Self {
        let mut bytes = format!("{prefix} {first} {second}").into_bytes();
        bytes.push(0);
        Self(bytes)
    }

    /// Raw label bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn wipe(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.0);
    }
}

impl From<&[u8]> for SessionLabel {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for SessionLabel {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for SessionLabel {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for SessionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionLabel({:?})", String::from_utf8_lossy(&self.0))
    }
}
