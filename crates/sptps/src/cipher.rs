//! Per-direction record protection.
//!
//! ChaCha20-Poly1305 with the 32-bit record sequence number as explicit
//! nonce. Each direction has its own key, so a (key, nonce) pair is never
//! reused as long as the sequence counter is not reset under a key.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, SptpsError};

/// AEAD key length.
pub const KEY_LEN: usize = 32;

/// Authentication tag length appended to every sealed record.
pub const TAG_LEN: usize = 16;

/// One direction's record key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RecordCipher {
    key: [u8; KEY_LEN],
}

impl RecordCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self { key: *key }
    }

    /// Raw key bytes.
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Encrypt `plaintext` under sequence number `seqno`.
    ///
    /// Returns ciphertext followed by the 16-byte tag.
    pub fn seal(&self, seqno: u32, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.aead()
            .encrypt(&seqno_to_nonce(seqno), plaintext)
            .map_err(|_| SptpsError::Encryption)
    }

    /// Authenticate and decrypt `ciphertext` (including tag).
    pub fn open(&self, seqno: u32, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_LEN {
            return Err(SptpsError::ShortPacket(ciphertext.len()));
        }

        self.aead()
            .decrypt(&seqno_to_nonce(seqno), ciphertext)
            .map_err(|_| SptpsError::Decryption)
    }

    /// Zero the key in place.
    pub fn wipe(&mut self) {
        self.key.zeroize();
    }

    fn aead(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new((&self.key).into())
    }
}

/// Convert a sequence number to a 12-byte ChaCha20-Poly1305 nonce.
fn seqno_to_nonce(seqno: u32) -> Nonce {
    let mut nonce_bytes = [0u8; 12];
    nonce_bytes[4..12].copy_from_slice(&u64::from(seqno).to_le_bytes());
    Nonce::from(nonce_bytes)
}
