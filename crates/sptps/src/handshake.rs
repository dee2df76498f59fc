//! Handshake state machine.
//!
//! # Handshake Flow
//!
//! ```text
//! Initiator                                   Responder
//!     |  KEX (version, nonce, ephemeral key)      |
//!     |<----------------------------------------->|  both send at start
//!     |                                           |
//!     |  SIG (over tag, both KEX, label)          |
//!     |------------------------------------------>|
//!     |                                           |
//!     |  SIG                                      |
//!     |<------------------------------------------|
//!     [        records sealed from here on        ]
//! ```
//!
//! A rekey repeats KEX and SIG under the current keys, then each side
//! sends an empty ACK and switches its outbound key. The inbound key is
//! switched when the peer's ACK arrives.
//!
//! ```text
//! KEX --peer KEX--> SIG --peer SIG--> SECONDARY_KEX          (first round)
//!                       \--peer SIG--> ACK --peer ACK--> SECONDARY_KEX
//! SECONDARY_KEX --force_rekey--> KEX
//! SECONDARY_KEX --peer KEX--> send own KEX, then as KEX
//! ```

use tracing::debug;
use zeroize::Zeroizing;

use crate::cipher::RecordCipher;
use crate::error::{Result, SptpsError};
use crate::identity::SIGNATURE_LEN;
use crate::kex::{EphemeralKeypair, KexMessage};
use crate::keys::KeyMaterial;
use crate::label::SessionLabel;
use crate::record::HANDSHAKE;
use crate::session::{Delivery, Role, Session, Transport};

/// Position in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Own KEX sent, waiting for the peer's.
    Kex,
    /// Both KEX known, waiting for the peer's signature.
    Sig,
    /// Rekey signatures exchanged, waiting for the peer's ACK.
    Ack,
    /// Handshake complete; application records flow and rekeys may start.
    SecondaryKex,
}

/// Bytes covered by a handshake signature.
///
/// `initiator_signed` is true when the signer is the initiator; `first` is
/// the signer's KEX and `second` the other side's. Wiped on drop.
pub(crate) fn signature_message(
    initiator_signed: bool,
    first: &KexMessage,
    second: &KexMessage,
    label: &SessionLabel,
) -> Zeroizing<Vec<u8>> {
    let mut msg = Zeroizing::new(Vec::with_capacity(
        1 + first.as_bytes().len() + second.as_bytes().len() + label.len(),
    ));
    msg.push(u8::from(initiator_signed));
    msg.extend_from_slice(first.as_bytes());
    msg.extend_from_slice(second.as_bytes());
    msg.extend_from_slice(label.as_bytes());
    msg
}

impl<T: Transport, D: Delivery> Session<T, D> {
    /// Dispatch one handshake record according to the current state.
    pub(crate) fn receive_handshake(&mut self, data: &[u8]) -> Result<()> {
        let state = self.state.ok_or(SptpsError::Stopped)?;
        debug!(?state, len = data.len(), "handshake record");

        match state {
            HandshakeState::SecondaryKex => {
                // Peer started a rekey: answer with our own KEX first
                self.send_kex()?;
                self.receive_kex(data)?;
                self.state = Some(HandshakeState::Sig);
            }
            HandshakeState::Kex => {
                self.receive_kex(data)?;
                self.state = Some(HandshakeState::Sig);
            }
            HandshakeState::Sig => {
                if self.receive_sig(data)? {
                    self.state = Some(HandshakeState::Ack);
                } else {
                    self.receive_ack(&[])?;
                    self.complete_round()?;
                }
            }
            HandshakeState::Ack => {
                self.receive_ack(data)?;
                self.complete_round()?;
            }
        }

        Ok(())
    }

    /// Generate a fresh ephemeral key and nonce and send them.
    pub(crate) fn send_kex(&mut self) -> Result<()> {
        if self.own_kex.is_some() {
            return Err(SptpsError::KexInProgress);
        }

        let (ecdh, kex) = EphemeralKeypair::generate();
        self.send_record(HANDSHAKE, kex.as_bytes())?;
        self.ecdh = Some(ecdh);
        self.own_kex = Some(kex);
        Ok(())
    }

    fn receive_kex(&mut self, data: &[u8]) -> Result<()> {
        let kex = KexMessage::parse(data)?;

        if self.peer_kex.is_some() {
            return Err(SptpsError::DuplicateKex);
        }
        self.peer_kex = Some(kex);

        if self.role == Role::Initiator {
            self.send_sig()
        } else {
            Ok(())
        }
    }

    fn send_sig(&mut self) -> Result<()> {
        let (Some(own), Some(peer)) = (&self.own_kex, &self.peer_kex) else {
            return Err(SptpsError::UnexpectedHandshake("SIG before both KEX"));
        };

        let msg = signature_message(self.role == Role::Initiator, own, peer, &self.label);
        let sig = self.own_key.sign(&msg);
        self.send_record(HANDSHAKE, &sig)
    }

    /// Verify the peer's signature and derive the next keys.
    ///
    /// Returns whether this round is a rekey (an outbound key was already
    /// active when it started).
    fn receive_sig(&mut self, data: &[u8]) -> Result<bool> {
        let rekeying = self.out_cipher.is_some();

        if data.len() != SIGNATURE_LEN {
            return Err(SptpsError::InvalidLength {
                record: "SIG",
                len: data.len(),
            });
        }

        let (Some(own), Some(peer)) = (&self.own_kex, &self.peer_kex) else {
            return Err(SptpsError::UnexpectedHandshake("SIG before both KEX"));
        };

        let msg = signature_message(self.role != Role::Initiator, peer, own, &self.label);
        if !self.peer_key.verify(&msg, data) {
            return Err(SptpsError::BadSignature);
        }

        let ecdh = self
            .ecdh
            .take()
            .ok_or(SptpsError::KeyExchange("no ephemeral key for this round"))?;
        let shared = ecdh.agree(peer)?;

        let (initiator_nonce, responder_nonce) = match self.role {
            Role::Initiator => (own.nonce(), peer.nonce()),
            Role::Responder => (peer.nonce(), own.nonce()),
        };
        let keys = KeyMaterial::derive(
            shared.as_bytes(),
            initiator_nonce,
            responder_nonce,
            self.label.as_bytes(),
        );
        drop(shared);
        let keys = keys?;

        if self.role == Role::Responder {
            self.send_sig()?;
        }

        self.own_kex = None;
        self.peer_kex = None;

        if rekeying {
            self.send_record(HANDSHAKE, &[])?;
        }

        // TODO: defer this switch until the peer's ACK arrives; needs both
        // ends to accept records under either key while the switch is in flight.
        self.out_cipher = Some(RecordCipher::new(keys.outbound(self.role)));
        self.pending_keys = Some(keys);

        Ok(rekeying)
    }

    fn receive_ack(&mut self, data: &[u8]) -> Result<()> {
        if !data.is_empty() {
            return Err(SptpsError::InvalidLength {
                record: "ACK",
                len: data.len(),
            });
        }

        let keys = self
            .pending_keys
            .take()
            .ok_or(SptpsError::UnexpectedHandshake("ACK without pending keys"))?;
        self.in_cipher = Some(RecordCipher::new(keys.inbound(self.role)));

        Ok(())
    }

    fn complete_round(&mut self) -> Result<()> {
        debug!("handshake complete");
        self.delivery
            .deliver(HANDSHAKE, &[])
            .map_err(SptpsError::Delivery)?;
        self.state = Some(HandshakeState::SecondaryKex);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kex::KEX_LEN;

    #[test]
    fn test_signature_message_layout() {
        let (_, a) = EphemeralKeypair::generate();
        let (_, b) = EphemeralKeypair::generate();
        let label = SessionLabel::from("label");

        let msg = signature_message(true, &a, &b, &label);
        assert_eq!(msg.len(), 1 + 2 * KEX_LEN + 5);
        assert_eq!(msg[0], 1);
        assert_eq!(&msg[1..1 + KEX_LEN], a.as_bytes());
        assert_eq!(&msg[1 + KEX_LEN..1 + 2 * KEX_LEN], b.as_bytes());
        assert_eq!(&msg[1 + 2 * KEX_LEN..], b"label");

        // Holds both nonces; wiped when dropped
        let _: &Zeroizing<Vec<u8>> = &msg;

        // The responder verifying the initiator's SIG rebuilds the same bytes
        let verifier_view = signature_message(Role::Responder != Role::Initiator, &a, &b, &label);
        assert_eq!(msg[..], verifier_view[..]);
        assert_ne!(msg[..], signature_message(false, &a, &b, &label)[..]);
    }
}
