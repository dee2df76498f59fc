//! SPTPS session: the caller-facing API.
//!
//! A [`Session`] is started with both static keys, a label and two
//! collaborators: a [`Transport`] that puts encoded records on the wire and
//! a [`Delivery`] that receives decoded application records. Every
//! operation runs to completion on the calling thread.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sptps::{Mode, Role, Session, StaticKeypair};
//!
//! let ours = Arc::new(StaticKeypair::generate());
//! let theirs = StaticKeypair::generate().public_key();
//!
//! let mut wire = Vec::new();
//! let session = Session::start(
//!     Role::Initiator,
//!     Mode::Stream,
//!     ours,
//!     theirs,
//!     "example",
//!     |_ty: u8, bytes: &[u8]| -> anyhow::Result<()> {
//!         wire.push(bytes.to_vec());
//!         Ok(())
//!     },
//!     |_ty: u8, _payload: &[u8]| -> anyhow::Result<()> { Ok(()) },
//! )
//! .unwrap();
//!
//! assert!(!session.is_outbound_ready());
//! drop(session);
//! assert_eq!(wire.len(), 1); // our KEX
//! ```

use std::sync::Arc;

use tracing::{debug, info_span, warn, Span};
use zeroize::Zeroize;

use crate::cipher::{RecordCipher, KEY_LEN};
use crate::config::SessionConfig;
use crate::error::{ErrorKind, Result, SptpsError};
use crate::handshake::HandshakeState;
use crate::identity::{PeerPublicKey, StaticKeypair};
use crate::kex::{EphemeralKeypair, KexMessage};
use crate::keys::KeyMaterial;
use crate::label::SessionLabel;
use crate::record::stream::StreamDecoder;
use crate::record::{datagram, stream, RecordKind, HANDSHAKE, MAX_PAYLOAD};
use crate::replay::{ReplayError, ReplayWindow};

/// Which side opened the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

/// Underlying transport type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Reliable, ordered byte stream (length-prefixed records).
    Stream,
    /// Unreliable datagrams (sequence-numbered, replay-checked records).
    Datagram,
}

/// Outbound collaborator: called once per encoded record.
pub trait Transport {
    fn send(&mut self, record_type: u8, data: &[u8]) -> anyhow::Result<()>;
}

impl<F> Transport for F
where
    F: FnMut(u8, &[u8]) -> anyhow::Result<()>,
{
    fn send(&mut self, record_type: u8, data: &[u8]) -> anyhow::Result<()> {
        self(record_type, data)
    }
}

/// Inbound collaborator: called once per decoded application record, and
/// with `(HANDSHAKE, [])` each time a handshake round completes.
pub trait Delivery {
    fn deliver(&mut self, record_type: u8, payload: &[u8]) -> anyhow::Result<()>;
}

impl<F> Delivery for F
where
    F: FnMut(u8, &[u8]) -> anyhow::Result<()>,
{
    fn deliver(&mut self, record_type: u8, payload: &[u8]) -> anyhow::Result<()> {
        self(record_type, payload)
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    role: Role,
    mode: Mode,
    own_key: Arc<StaticKeypair>,
    peer_key: PeerPublicKey,
    label: SessionLabel,
    config: SessionConfig,
    span: Option<Span>,
}

impl SessionBuilder {
    pub fn new(
        role: Role,
        mode: Mode,
        own_key: Arc<StaticKeypair>,
        peer_key: PeerPublicKey,
        label: impl Into<SessionLabel>,
    ) -> Self {
        Self {
            role,
            mode,
            own_key,
            peer_key,
            label: label.into(),
            config: SessionConfig::default(),
            span: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replay window size in bytes (datagram mode).
    pub fn replay_window(mut self, bytes: usize) -> Self {
        self.config.replay_window = bytes;
        self
    }

    /// Span that all of the session's log output is attached to.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Create the session and send the first KEX.
    pub fn start<T: Transport, D: Delivery>(self, transport: T, delivery: D) -> Result<Session<T, D>> {
        let span = self
            .span
            .unwrap_or_else(|| info_span!("sptps", role = ?self.role, mode = ?self.mode));
        let replay_window = match self.mode {
            Mode::Datagram => self.config.replay_window,
            Mode::Stream => 0,
        };

        let mut session = Session {
            role: self.role,
            mode: self.mode,
            state: Some(HandshakeState::Kex),
            own_key: self.own_key,
            peer_key: self.peer_key,
            label: self.label,
            ecdh: None,
            own_kex: None,
            peer_kex: None,
            pending_keys: None,
            in_cipher: None,
            out_cipher: None,
            out_seq: 0,
            inbound: ReplayWindow::new(replay_window),
            decoder: StreamDecoder::new(),
            transport,
            delivery,
            span,
        };

        let span = session.span.clone();
        let _enter = span.enter();
        debug!(label = ?session.label, "starting session");
        session.send_kex()?;

        Ok(session)
    }
}

/// An SPTPS session.
///
/// Not internally synchronized; wrap in a `Mutex` to share between threads.
pub struct Session<T, D> {
    pub(crate) role: Role,
    pub(crate) mode: Mode,
    /// `None` once stopped
    pub(crate) state: Option<HandshakeState>,

    pub(crate) own_key: Arc<StaticKeypair>,
    pub(crate) peer_key: PeerPublicKey,
    pub(crate) label: SessionLabel,

    /// Ephemeral secret for the round in progress
    pub(crate) ecdh: Option<EphemeralKeypair>,
    pub(crate) own_kex: Option<KexMessage>,
    pub(crate) peer_kex: Option<KexMessage>,
    /// Keys derived but not yet fully activated
    pub(crate) pending_keys: Option<KeyMaterial>,

    pub(crate) in_cipher: Option<RecordCipher>,
    pub(crate) out_cipher: Option<RecordCipher>,
    pub(crate) out_seq: u32,
    /// Inbound sequence counter and replay bitmap
    pub(crate) inbound: ReplayWindow,
    pub(crate) decoder: StreamDecoder,

    pub(crate) transport: T,
    pub(crate) delivery: D,
    pub(crate) span: Span,
}

impl<T: Transport, D: Delivery> Session<T, D> {
    /// Start a session with default configuration.
    pub fn start(
        role: Role,
        mode: Mode,
        own_key: Arc<StaticKeypair>,
        peer_key: PeerPublicKey,
        label: impl Into<SessionLabel>,
        transport: T,
        delivery: D,
    ) -> Result<Self> {
        SessionBuilder::new(role, mode, own_key, peer_key, label).start(transport, delivery)
    }

    /// Send an application record.
    ///
    /// Fails until the outbound side of the first handshake is done, and
    /// for types at or above [`HANDSHAKE`].
    pub fn send(&mut self, record_type: u8, payload: &[u8]) -> Result<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        self.running()?;
        if self.out_cipher.is_none() {
            return Err(SptpsError::HandshakeNotFinished);
        }
        if record_type >= HANDSHAKE {
            return Err(SptpsError::ReservedRecordType(record_type));
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(SptpsError::RecordTooLarge(payload.len()));
        }

        self.send_record(record_type, payload)
    }

    /// Feed received bytes.
    ///
    /// In stream mode, consumes at most one record and returns how many
    /// bytes were used; call again with the rest. In datagram mode `data`
    /// must be exactly one datagram and is always consumed whole.
    pub fn receive(&mut self, data: &[u8]) -> Result<usize> {
        let span = self.span.clone();
        let _enter = span.enter();

        self.running()?;
        let result = match self.mode {
            Mode::Stream => self.receive_stream(data),
            Mode::Datagram => self.receive_datagram(data).map(|()| data.len()),
        };

        if let Err(e) = &result {
            match e.kind() {
                ErrorKind::Replay => debug!(error = %e, "dropped packet"),
                ErrorKind::Usage => {}
                ErrorKind::Protocol | ErrorKind::Collaborator => warn!(error = %e, "receive failed"),
            }
        }

        result
    }

    /// Feed received bytes until all of `data` has been consumed.
    pub fn receive_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let consumed = self.receive(data)?;
            if consumed == 0 {
                return Err(SptpsError::NoProgress);
            }
            data = &data[consumed..];
        }
        Ok(())
    }

    /// Check a datagram's authenticity without changing any state.
    ///
    /// Returns false in stream mode and before the inbound key is active.
    pub fn verify_datagram(&self, data: &[u8]) -> bool {
        if self.state.is_none() || self.mode != Mode::Datagram {
            return false;
        }
        let Some(cipher) = &self.in_cipher else {
            return false;
        };
        let Ok((seqno, body)) = datagram::split(data, true) else {
            return false;
        };
        if seqno == u32::MAX {
            return false;
        }

        self.inbound.check(seqno).is_ok() && cipher.open(seqno, body).is_ok()
    }

    /// Start a new key exchange. Only allowed once a handshake has
    /// completed and none is in progress.
    pub fn force_rekey(&mut self) -> Result<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        let state = self.running()?;
        if self.out_cipher.is_none() || state != HandshakeState::SecondaryKex {
            return Err(SptpsError::RekeyNotAllowed(state));
        }

        debug!("forcing key exchange");
        self.state = Some(HandshakeState::Kex);
        self.send_kex()
    }

    /// Encode and transmit one record under the current outbound key.
    pub(crate) fn send_record(&mut self, record_type: u8, payload: &[u8]) -> Result<()> {
        let seqno = self.out_seq;
        if seqno == u32::MAX {
            return Err(SptpsError::SequenceExhausted);
        }
        self.out_seq = seqno + 1;

        let frame = match self.mode {
            Mode::Stream => stream::encode(record_type, payload, seqno, self.out_cipher.as_ref())?,
            Mode::Datagram => {
                datagram::encode(record_type, payload, seqno, self.out_cipher.as_ref())?
            }
        };

        self.transport
            .send(record_type, &frame)
            .map_err(SptpsError::Transport)
    }

    fn receive_stream(&mut self, data: &[u8]) -> Result<usize> {
        let (consumed, complete) = self.decoder.feed(data, self.in_cipher.is_some());
        if !complete {
            return Ok(consumed);
        }

        let body = self.decoder.take_body();
        let seqno = self
            .inbound
            .advance()
            .ok_or(SptpsError::SequenceExhausted)?;
        let body = match &self.in_cipher {
            Some(cipher) => cipher.open(seqno, &body)?,
            None => body,
        };

        let (&record_type, payload) = body
            .split_first()
            .ok_or(SptpsError::ShortPacket(body.len()))?;
        self.dispatch(record_type, payload)?;

        Ok(consumed)
    }

    fn receive_datagram(&mut self, data: &[u8]) -> Result<()> {
        let (seqno, body) = datagram::split(data, self.in_cipher.is_some())?;
        if seqno == u32::MAX {
            return Err(SptpsError::SequenceExhausted);
        }

        let Some(cipher) = &self.in_cipher else {
            if !self.inbound.accept_in_order(seqno) {
                return Err(SptpsError::UnexpectedSequence {
                    got: seqno,
                    expected: self.inbound.expected(),
                });
            }

            let (&record_type, payload) = body
                .split_first()
                .ok_or(SptpsError::ShortPacket(data.len()))?;
            if record_type != HANDSHAKE {
                return Err(SptpsError::ApplicationBeforeHandshake);
            }
            return self.receive_handshake(payload);
        };

        // Drop duplicates and stale packets before touching the cipher
        if let Err(e @ (ReplayError::Duplicate { .. } | ReplayError::TooOld { .. })) =
            self.inbound.check(seqno)
        {
            return Err(e.into());
        }

        let plaintext = cipher.open(seqno, body)?;
        self.inbound.update(seqno)?;

        let (&record_type, payload) = plaintext
            .split_first()
            .ok_or(SptpsError::ShortPacket(data.len()))?;
        self.dispatch(record_type, payload)
    }

    fn dispatch(&mut self, record_type: u8, payload: &[u8]) -> Result<()> {
        match RecordKind::classify(record_type)? {
            RecordKind::Application(record_type) => {
                if self.in_cipher.is_none() {
                    return Err(SptpsError::ApplicationBeforeHandshake);
                }
                self.delivery
                    .deliver(record_type, payload)
                    .map_err(SptpsError::Delivery)
            }
            RecordKind::Handshake => self.receive_handshake(payload),
        }
    }
}

impl<T, D> Session<T, D> {
    /// Wipe all key material, nonces and buffers. Every later operation
    /// fails with [`SptpsError::Stopped`].
    pub fn stop(&mut self) {
        if self.state.take().is_some() {
            let _enter = self.span.enter();
            debug!("stopping session");
        }
        self.wipe();
    }

    fn wipe(&mut self) {
        if let Some(cipher) = &mut self.in_cipher {
            cipher.wipe();
        }
        if let Some(cipher) = &mut self.out_cipher {
            cipher.wipe();
        }
        if let Some(keys) = &mut self.pending_keys {
            keys.zeroize();
        }
        self.pending_keys = None;
        self.ecdh = None;
        self.own_kex = None;
        self.peer_kex = None;
        self.out_seq.zeroize();
        self.inbound.wipe();
        self.decoder.wipe();
        self.label.wipe();
    }

    fn running(&self) -> Result<HandshakeState> {
        self.state.ok_or(SptpsError::Stopped)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current handshake state, `None` once stopped.
    pub fn state(&self) -> Option<HandshakeState> {
        self.state
    }

    pub fn label(&self) -> &SessionLabel {
        &self.label
    }

    pub fn peer_key(&self) -> &PeerPublicKey {
        &self.peer_key
    }

    /// Next expected inbound sequence number.
    pub fn in_seq(&self) -> u32 {
        self.inbound.expected()
    }

    /// Next outbound sequence number.
    pub fn out_seq(&self) -> u32 {
        self.out_seq
    }

    /// Datagrams accepted so far.
    pub fn received(&self) -> u32 {
        self.inbound.received()
    }

    /// Whether application records may be sent.
    pub fn is_outbound_ready(&self) -> bool {
        self.state.is_some() && self.out_cipher.is_some()
    }

    /// Whether application records are accepted.
    pub fn is_inbound_ready(&self) -> bool {
        self.state.is_some() && self.in_cipher.is_some()
    }

    /// Active outbound key.
    pub fn outbound_key(&self) -> Option<&[u8; KEY_LEN]> {
        self.state?;
        self.out_cipher.as_ref().map(RecordCipher::key)
    }

    /// Active inbound key.
    pub fn inbound_key(&self) -> Option<&[u8; KEY_LEN]> {
        self.state?;
        self.in_cipher.as_ref().map(RecordCipher::key)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn delivery(&self) -> &D {
        &self.delivery
    }
}

impl<T, D> Drop for Session<T, D> {
    fn drop(&mut self) {
        self.wipe();
    }
}
