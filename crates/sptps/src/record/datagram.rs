//! Self-contained records over an unreliable datagram transport.
//!
//! # Wire Format
//!
//! Before the first handshake completes:
//! ```text
//! [4 bytes: seqno (BE)] [1 byte: type] [payload]
//! ```
//!
//! After:
//! ```text
//! [4 bytes: seqno (BE)] [sealed(type || payload)] [16 bytes: tag]
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::record_body;
use crate::cipher::{RecordCipher, TAG_LEN};
use crate::error::{Result, SptpsError};

/// Sequence number prefix size.
pub const HEADER_LEN: usize = 4;

/// Smallest valid datagram before the handshake completes.
pub const MIN_PLAINTEXT_LEN: usize = HEADER_LEN + 1;

/// Smallest valid datagram once records are sealed.
pub const MIN_SEALED_LEN: usize = HEADER_LEN + 1 + TAG_LEN;

/// Encode one datagram.
pub fn encode(
    record_type: u8,
    payload: &[u8],
    seqno: u32,
    cipher: Option<&RecordCipher>,
) -> Result<Bytes> {
    let overhead = if cipher.is_some() { 1 + TAG_LEN } else { 1 };
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len() + overhead);
    buf.put_u32(seqno);

    match cipher {
        Some(cipher) => buf.put_slice(&cipher.seal(seqno, &record_body(record_type, payload))?),
        None => {
            buf.put_u8(record_type);
            buf.put_slice(payload);
        }
    }

    Ok(buf.freeze())
}

/// Split a datagram into its sequence number and body, checking the
/// minimum length for the current phase.
pub fn split(data: &[u8], authenticated: bool) -> Result<(u32, &[u8])> {
    let min = if authenticated {
        MIN_SEALED_LEN
    } else {
        MIN_PLAINTEXT_LEN
    };
    if data.len() < min {
        return Err(SptpsError::ShortPacket(data.len()));
    }

    let seqno = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    Ok((seqno, &data[HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::KEY_LEN;

    #[test]
    fn test_plaintext_layout() {
        let datagram = encode(127, b"kex", 0x01020304, None).unwrap();
        assert_eq!(&datagram[..], &[1, 2, 3, 4, 127, b'k', b'e', b'x']);

        let (seqno, body) = split(&datagram, false).unwrap();
        assert_eq!(seqno, 0x01020304);
        assert_eq!(body, b"\x7fkex");
    }

    #[test]
    fn test_sealed_roundtrip() {
        let cipher = RecordCipher::new(&[5u8; KEY_LEN]);
        let datagram = encode(1, b"ping", 42, Some(&cipher)).unwrap();
        assert_eq!(datagram.len(), HEADER_LEN + 1 + 4 + TAG_LEN);

        let (seqno, body) = split(&datagram, true).unwrap();
        assert_eq!(seqno, 42);
        assert_eq!(cipher.open(seqno, body).unwrap(), b"\x01ping");
    }

    #[test]
    fn test_short_datagrams() {
        assert!(matches!(split(&[0, 0, 0, 0], false), Err(SptpsError::ShortPacket(4))));
        assert!(split(&[0, 0, 0, 0, 1], false).is_ok());
        assert!(matches!(split(&[0u8; 20], true), Err(SptpsError::ShortPacket(20))));
        assert!(split(&[0u8; 21], true).is_ok());
    }
}
