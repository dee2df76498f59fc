//! Error types for SPTPS sessions.
//!
//! Every error carries a stable [`ErrorKind`] that callers branch on. The
//! `Display` text is a diagnostic only.

use thiserror::Error;

use crate::handshake::HandshakeState;
use crate::replay::ReplayError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SptpsError>;

/// Machine-checkable category of an [`SptpsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller used the API incorrectly. The session is still usable.
    Usage,
    /// The peer sent something malformed or unexpected. The session must
    /// be torn down.
    Protocol,
    /// A datagram was dropped by the replay window. The session is still
    /// usable.
    Replay,
    /// The transport or delivery callback failed. Propagated as-is.
    Collaborator,
}

/// Session errors.
#[derive(Debug, Error)]
pub enum SptpsError {
    #[error("handshake phase not finished yet")]
    HandshakeNotFinished,

    #[error("invalid application record type {0}")]
    ReservedRecordType(u8),

    #[error("record payload too large: {0} bytes")]
    RecordTooLarge(usize),

    #[error("cannot force KEX in state {0:?}")]
    RekeyNotAllowed(HandshakeState),

    #[error("session has been stopped")]
    Stopped,

    #[error("received incorrect version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid {record} record length {len}")]
    InvalidLength { record: &'static str, len: usize },

    #[error("received a second KEX message before first has been processed")]
    DuplicateKex,

    #[error("KEX already in progress")]
    KexInProgress,

    #[error("unexpected handshake record: {0}")]
    UnexpectedHandshake(&'static str),

    #[error("failed to verify SIG record")]
    BadSignature,

    #[error("key exchange failed: {0}")]
    KeyExchange(&'static str),

    #[error("failed to encrypt record")]
    Encryption,

    #[error("failed to decrypt and verify record")]
    Decryption,

    #[error("received short packet ({0} bytes)")]
    ShortPacket(usize),

    #[error("invalid packet seqno: {got} != {expected}")]
    UnexpectedSequence { got: u32, expected: u32 },

    #[error("application record received before handshake finished")]
    ApplicationBeforeHandshake,

    #[error("invalid record type {0}")]
    InvalidRecordType(u8),

    #[error("receive made no progress")]
    NoProgress,

    #[error("sequence numbers exhausted")]
    SequenceExhausted,

    #[error("{0}")]
    Replay(#[from] ReplayError),

    #[error("transport send failed: {0}")]
    Transport(#[source] anyhow::Error),

    #[error("record delivery failed: {0}")]
    Delivery(#[source] anyhow::Error),
}

impl SptpsError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HandshakeNotFinished
            | Self::ReservedRecordType(_)
            | Self::RecordTooLarge(_)
            | Self::RekeyNotAllowed(_)
            | Self::Stopped => ErrorKind::Usage,
            Self::Replay(_) => ErrorKind::Replay,
            Self::Transport(_) | Self::Delivery(_) => ErrorKind::Collaborator,
            _ => ErrorKind::Protocol,
        }
    }

    /// Whether the session must be discarded after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Protocol | ErrorKind::Collaborator)
    }
}
