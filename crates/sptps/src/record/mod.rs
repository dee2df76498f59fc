//! Record framing for stream and datagram transports.
//!
//! A record is a one-byte type plus payload. Types below [`HANDSHAKE`]
//! belong to the application; [`HANDSHAKE`] carries KEX, SIG and ACK
//! messages; anything above is invalid.

pub mod datagram;
pub mod stream;

use crate::error::{Result, SptpsError};

/// Record type reserved for handshake messages.
pub const HANDSHAKE: u8 = 127;

/// Largest payload a single record can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Decoded meaning of a record type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Application(u8),
    Handshake,
}

impl RecordKind {
    pub fn classify(record_type: u8) -> Result<Self> {
        match record_type {
            t if t < HANDSHAKE => Ok(Self::Application(t)),
            HANDSHAKE => Ok(Self::Handshake),
            t => Err(SptpsError::InvalidRecordType(t)),
        }
    }
}

/// Plaintext body of a record: type byte followed by payload.
pub(crate) fn record_body(record_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + payload.len());
    body.push(record_type);
    body.extend_from_slice(payload);
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(RecordKind::classify(0).unwrap(), RecordKind::Application(0));
        assert_eq!(RecordKind::classify(126).unwrap(), RecordKind::Application(126));
        assert_eq!(RecordKind::classify(HANDSHAKE).unwrap(), RecordKind::Handshake);
        assert!(matches!(
            RecordKind::classify(128),
            Err(SptpsError::InvalidRecordType(128))
        ));
        assert!(RecordKind::classify(255).is_err());
    }
}
