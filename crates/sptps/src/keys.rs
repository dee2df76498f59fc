//! Key expansion and directional key assignment.
//!
//! ```text
//! seed     = "key expansion" || initiator nonce || responder nonce || label
//! material = PRF(shared secret, seed)[0..64] = key_a || key_b
//!
//! initiator: out = key_b, in = key_a
//! responder: out = key_a, in = key_b
//! ```
//!
//! The PRF is HMAC-SHA512 chained as
//! `A(i) = HMAC(secret, A(i-1) || seed)` with `A(0)` all zeroes, emitting
//! `HMAC(secret, A(i) || seed)` per block.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::KEY_LEN;
use crate::error::{Result, SptpsError};
use crate::session::Role;

type HmacSha512 = Hmac<Sha512>;

const DIGEST_LEN: usize = 64;

const KEY_EXPANSION: &[u8] = b"key expansion";

/// Expand `secret` and `seed` into `out`.
pub fn prf(secret: &[u8], seed: &[u8], out: &mut [u8]) -> Result<()> {
    let mut chain = [0u8; DIGEST_LEN];
    let mut block = [0u8; DIGEST_LEN];

    let result = out.chunks_mut(DIGEST_LEN).try_for_each(|chunk| -> Result<()> {
        hmac_sha512(secret, &chain, seed, &mut block)?;
        chain.copy_from_slice(&block);
        hmac_sha512(secret, &chain, seed, &mut block)?;
        chunk.copy_from_slice(&block[..chunk.len()]);
        Ok(())
    });

    chain.zeroize();
    block.zeroize();
    result
}

fn hmac_sha512(
    secret: &[u8],
    chain: &[u8; DIGEST_LEN],
    seed: &[u8],
    out: &mut [u8; DIGEST_LEN],
) -> Result<()> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(secret)
        .map_err(|_| SptpsError::KeyExchange("invalid HMAC key"))?;
    mac.update(chain);
    mac.update(seed);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(())
}

/// Both directional keys derived from one handshake round.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    key_a: [u8; KEY_LEN],
    key_b: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Derive key material.
    ///
    /// Nonces are always ordered initiator first, so both sides build the
    /// same seed.
    pub fn derive(
        shared_secret: &[u8],
        initiator_nonce: &[u8],
        responder_nonce: &[u8],
        label: &[u8],
    ) -> Result<Self> {
        let mut seed = Vec::with_capacity(
            KEY_EXPANSION.len() + initiator_nonce.len() + responder_nonce.len() + label.len(),
        );
        seed.extend_from_slice(KEY_EXPANSION);
        seed.extend_from_slice(initiator_nonce);
        seed.extend_from_slice(responder_nonce);
        seed.extend_from_slice(label);

        let mut both = [0u8; 2 * KEY_LEN];
        let expanded = prf(shared_secret, &seed, &mut both);
        seed.zeroize();
        if let Err(e) = expanded {
            both.zeroize();
            return Err(e);
        }

        let mut material = Self {
            key_a: [0u8; KEY_LEN],
            key_b: [0u8; KEY_LEN],
        };
        material.key_a.copy_from_slice(&both[..KEY_LEN]);
        material.key_b.copy_from_slice(&both[KEY_LEN..]);
        both.zeroize();

        Ok(material)
    }

    /// Key used by `role` to protect what it sends.
    pub fn outbound(&self, role: Role) -> &[u8; KEY_LEN] {
        match role {
            Role::Initiator => &self.key_b,
            Role::Responder => &self.key_a,
        }
    }

    /// Key used by `role` to open what it receives.
    pub fn inbound(&self, role: Role) -> &[u8; KEY_LEN] {
        match role {
            Role::Initiator => &self.key_a,
            Role::Responder => &self.key_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prf_is_deterministic() {
        let mut a = [0u8; 100];
        let mut b = [0u8; 100];
        prf(b"secret", b"seed", &mut a).unwrap();
        prf(b"secret", b"seed", &mut b).unwrap();
        assert_eq!(a, b);

        let mut c = [0u8; 100];
        prf(b"secret", b"other seed", &mut c).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_prf_accepts_any_secret_length() {
        let mut out = [0u8; 64];
        assert!(prf(b"", b"seed", &mut out).is_ok());
        assert!(prf(&[0x42u8; 300], b"seed", &mut out).is_ok());
        assert!(prf(b"k", b"seed", &mut []).is_ok());
    }

    #[test]
    fn test_prf_prefix_stable() {
        // Shorter outputs are prefixes of longer ones
        let mut short = [0u8; 40];
        let mut long = [0u8; 130];
        prf(b"k", b"s", &mut short).unwrap();
        prf(b"k", b"s", &mut long).unwrap();
        assert_eq!(short[..], long[..40]);
        assert_ne!(long[..64], long[64..128]);
    }

    #[test]
    fn test_prf_first_block() {
        let seed = b"seed";
        let mut out = [0u8; DIGEST_LEN];
        prf(b"secret", seed, &mut out).unwrap();

        let mut mac = HmacSha512::new_from_slice(b"secret").unwrap();
        mac.update(&[0u8; DIGEST_LEN]);
        mac.update(seed);
        let a1 = mac.finalize().into_bytes();

        let mut mac = HmacSha512::new_from_slice(b"secret").unwrap();
        mac.update(&a1);
        mac.update(seed);
        assert_eq!(out[..], mac.finalize().into_bytes()[..]);
    }

    #[test]
    fn test_derive_known_answer() {
        let material = KeyMaterial::derive(&[7u8; 32], &[1u8; 32], &[2u8; 32], b"label").unwrap();
        assert_eq!(
            hex::encode(material.inbound(Role::Initiator)),
            "2b6460f5a218c01c58a16c92d8e614725f8fa9eb5414ace3ad46fe3acd1f0e93"
        );
        assert_eq!(
            hex::encode(material.outbound(Role::Initiator)),
            "524b234ce81e4755865e187cc68bec815b7fccb053a6c28c0c8d4e9d734bdb68"
        );
    }

    #[test]
    fn test_roles_use_opposite_halves() {
        let material = KeyMaterial::derive(&[7u8; 32], &[1u8; 32], &[2u8; 32], b"label").unwrap();

        assert_eq!(
            material.outbound(Role::Initiator),
            material.inbound(Role::Responder)
        );
        assert_eq!(
            material.outbound(Role::Responder),
            material.inbound(Role::Initiator)
        );
        assert_ne!(
            material.outbound(Role::Initiator),
            material.outbound(Role::Responder)
        );
    }

    #[test]
    fn test_label_and_nonce_order_matter() {
        let base = KeyMaterial::derive(&[7u8; 32], &[1u8; 32], &[2u8; 32], b"label").unwrap();
        let swapped = KeyMaterial::derive(&[7u8; 32], &[2u8; 32], &[1u8; 32], b"label").unwrap();
        let relabeled = KeyMaterial::derive(&[7u8; 32], &[1u8; 32], &[2u8; 32], b"other").unwrap();

        assert_ne!(base.inbound(Role::Initiator), swapped.inbound(Role::Initiator));
        assert_ne!(base.inbound(Role::Initiator), relabeled.inbound(Role::Initiator));
    }
}
