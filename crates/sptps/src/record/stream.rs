//! Length-prefixed records over a reliable byte stream.
//!
//! # Wire Format
//!
//! Before the first handshake completes:
//! ```text
//! [2 bytes: payload length (BE)] [1 byte: type] [payload]
//! ```
//!
//! After:
//! ```text
//! [2 bytes: payload length (BE)] [sealed(type || payload)] [16 bytes: tag]
//! ```
//!
//! The sequence number used as nonce is implicit: both ends count records.

use bytes::{BufMut, Bytes, BytesMut};

use super::record_body;
use crate::cipher::{RecordCipher, TAG_LEN};
use crate::error::Result;

/// Length prefix size.
pub const HEADER_LEN: usize = 2;

/// Encode one record.
pub fn encode(
    record_type: u8,
    payload: &[u8],
    seqno: u32,
    cipher: Option<&RecordCipher>,
) -> Result<Bytes> {
    let overhead = if cipher.is_some() { 1 + TAG_LEN } else { 1 };
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len() + overhead);
    buf.put_u16(payload.len() as u16);

    match cipher {
        Some(cipher) => buf.put_slice(&cipher.seal(seqno, &record_body(record_type, payload))?),
        None => {
            buf.put_u8(record_type);
            buf.put_slice(payload);
        }
    }

    Ok(buf.freeze())
}

/// Reassembles records from arbitrarily chunked input.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Length prefix plus body bytes received so far
    buf: Vec<u8>,
    /// Declared payload length, valid once the prefix is complete
    reclen: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(HEADER_LEN),
            reclen: 0,
        }
    }

    /// Bytes held for the record in progress.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Declared payload length, once known.
    pub fn declared_len(&self) -> Option<usize> {
        (self.buf.len() >= HEADER_LEN).then_some(self.reclen)
    }

    /// Consume bytes from `data` towards the next record.
    ///
    /// Returns the number of bytes consumed and whether a whole record is
    /// now buffered. Stops at the record boundary; the caller must
    /// [`take_body`](Self::take_body) before feeding more.
    pub fn feed(&mut self, mut data: &[u8], authenticated: bool) -> (usize, bool) {
        let mut consumed = 0;

        if self.buf.len() < HEADER_LEN {
            let take = (HEADER_LEN - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            consumed += take;
            data = &data[take..];

            if self.buf.len() < HEADER_LEN {
                return (consumed, false);
            }

            self.reclen = usize::from(u16::from_be_bytes([self.buf[0], self.buf[1]]));
            self.buf.reserve(self.reclen + 1 + TAG_LEN);
        }

        let total = self.record_len(authenticated);
        let take = (total - self.buf.len()).min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        consumed += take;

        (consumed, self.buf.len() == total)
    }

    /// Remove the completed record body (everything after the length
    /// prefix) and reset for the next record.
    pub fn take_body(&mut self) -> Vec<u8> {
        let body = self.buf.split_off(HEADER_LEN.min(self.buf.len()));
        self.buf.clear();
        self.reclen = 0;
        body
    }

    /// Zero and drop any buffered bytes.
    pub fn wipe(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.buf);
        self.reclen = 0;
    }

    fn record_len(&self, authenticated: bool) -> usize {
        HEADER_LEN + self.reclen + if authenticated { 1 + TAG_LEN } else { 1 }
    }
}
