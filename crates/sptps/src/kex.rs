//! Key exchange messages and ephemeral X25519 keys.
//!
//! # Wire Format
//!
//! ```text
//! [1 byte: version] [32 bytes: nonce] [32 bytes: X25519 public key]
//! ```

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, SptpsError};

/// The only protocol version spoken.
pub const VERSION: u8 = 0;

/// Nonce length in a KEX message.
pub const NONCE_LEN: usize = 32;

/// X25519 public key length.
pub const ECDH_LEN: usize = 32;

/// Serialized KEX message length.
pub const KEX_LEN: usize = 1 + NONCE_LEN + ECDH_LEN;

/// A KEX message: version, random nonce and ephemeral public key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KexMessage {
    bytes: [u8; KEX_LEN],
}

impl KexMessage {
    /// Parse and validate a received KEX record.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let bytes: [u8; KEX_LEN] = data.try_into().map_err(|_| SptpsError::InvalidLength {
            record: "KEX",
            len: data.len(),
        })?;

        if bytes[0] != VERSION {
            return Err(SptpsError::UnsupportedVersion(bytes[0]));
        }

        Ok(Self { bytes })
    }

    pub fn version(&self) -> u8 {
        self.bytes[0]
    }

    pub fn nonce(&self) -> &[u8] {
        &self.bytes[1..1 + NONCE_LEN]
    }

    pub fn public_key(&self) -> PublicKey {
        let mut key = [0u8; ECDH_LEN];
        key.copy_from_slice(&self.bytes[1 + NONCE_LEN..]);
        PublicKey::from(key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for KexMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KexMessage")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Ephemeral X25519 secret, consumed by the key agreement.
pub struct EphemeralKeypair {
    secret: EphemeralSecret,
}

impl EphemeralKeypair {
    /// Generate a fresh ephemeral keypair and the KEX message announcing it.
    pub fn generate() -> (Self, KexMessage) {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);

        let mut bytes = [0u8; KEX_LEN];
        bytes[0] = VERSION;
        OsRng.fill_bytes(&mut bytes[1..1 + NONCE_LEN]);
        bytes[1 + NONCE_LEN..].copy_from_slice(public.as_bytes());

        (Self { secret }, KexMessage { bytes })
    }

    /// Compute the shared secret with the peer's ephemeral public key.
    ///
    /// Rejects low-order peer keys that would force an all-zero secret.
    pub fn agree(self, peer: &KexMessage) -> Result<SharedSecret> {
        let shared = self.secret.diffie_hellman(&peer.public_key());
        if !shared.was_contributory() {
            return Err(SptpsError::KeyExchange("non-contributory ECDH shared secret"));
        }
        Ok(shared)
    }
}
