//! Ed25519 static keys.
//!
//! Each node has one long-term [`StaticKeypair`] and knows the
//! [`PeerPublicKey`] of every node it talks to. Public keys travel in
//! configuration as base64url (32 bytes → 43 characters, no padding).
//!
//! # Example
//!
//! ```
//! use sptps::identity::StaticKeypair;
//!
//! let keypair = StaticKeypair::generate();
//! let public = keypair.public_key();
//!
//! let signature = keypair.sign(b"both kex messages");
//! assert!(public.verify(b"both kex messages", &signature));
//! ```

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use std::fs;
use std::path::Path;
use zeroize::Zeroize;

/// Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;

/// Ed25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Long-term Ed25519 signing keypair.
///
/// The signing key is zeroized on drop.
pub struct StaticKeypair {
    signing_key: SigningKey,
}

impl StaticKeypair {
    /// Generate a new random keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from raw signing key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        Self { signing_key }
    }

    /// Public half of this keypair.
    pub fn public_key(&self) -> PeerPublicKey {
        PeerPublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Sign a message with this key.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Save keypair to files.
    ///
    /// Private key is saved with restricted permissions (0600 on Unix).
    pub fn save(&self, private_path: impl AsRef<Path>, public_path: impl AsRef<Path>) -> Result<()> {
        let private_path = private_path.as_ref();
        let mut private_bytes = self.signing_key.to_bytes();
        let written = fs::write(private_path, private_bytes);
        private_bytes.zeroize();
        written.with_context(|| format!("failed to write {}", private_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(private_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(private_path, perms)?;
        }

        fs::write(public_path.as_ref(), self.public_key().to_bytes())
            .context("failed to write public key")?;

        Ok(())
    }

    /// Load keypair from a private key file.
    pub fn load(private_path: impl AsRef<Path>) -> Result<Self> {
        let mut bytes = fs::read(private_path.as_ref()).context("failed to read private key")?;

        if bytes.len() != 32 {
            bytes.zeroize();
            anyhow::bail!("invalid private key length: expected 32 bytes");
        }

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&bytes);
        bytes.zeroize();

        let keypair = Self::from_bytes(&key_bytes);
        key_bytes.zeroize();

        Ok(keypair)
    }
}

impl fmt::Debug for StaticKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StaticKeypair({})", self.public_key())
    }
}

/// A peer's Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PeerPublicKey {
    verifying_key: VerifyingKey,
}

impl PeerPublicKey {
    /// Create from raw public key bytes.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LEN]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes).context("invalid public key")?;
        Ok(Self { verifying_key })
    }

    /// Parse the base64url form used in host configuration.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .context("invalid base64url encoding")?;

        let bytes: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            anyhow::anyhow!(
                "invalid public key length: expected {} bytes, got {}",
                PUBLIC_KEY_LEN,
                v.len()
            )
        })?;

        Self::from_bytes(&bytes)
    }

    /// Load a raw 32-byte public key file.
    pub fn load(public_path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(public_path.as_ref()).context("failed to read public key")?;

        let bytes: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("invalid public key length: expected 32 bytes"))?;

        Self::from_bytes(&bytes)
    }

    /// Raw public key bytes.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        *self.verifying_key.as_bytes()
    }

    /// Base64url representation.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.verifying_key.as_bytes())
    }

    /// Verify a signature made by this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let sig = match Signature::from_slice(signature) {
            Ok(s) => s,
            Err(_) => return false,
        };
        self.verifying_key.verify(message, &sig).is_ok()
    }
}

impl fmt::Display for PeerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl fmt::Debug for PeerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerPublicKey({})", self.to_base64())
    }
}
