//! Simple Peer-to-Peer Security (SPTPS).
//!
//! An authenticated key exchange plus record layer between two peers that
//! already know each other's Ed25519 public keys. This crate provides:
//! - X25519 ephemeral key exchange with signed transcripts
//! - ChaCha20-Poly1305 records over streams or datagrams
//! - In-band rekeying and a replay window for datagrams
//!
//! # Design
//!
//! A [`Session`] never performs I/O itself. Outbound records go to a
//! [`Transport`], inbound application records go to a [`Delivery`]; both
//! are plain callbacks. This keeps the state machine synchronous and lets
//! the same session run over TCP, UDP, or an in-memory pipe.
//!
//! Handshake records use type [`HANDSHAKE`] (127). Application record
//! types are 0..=126.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod config;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod kex;
pub mod keys;
pub mod label;
pub mod record;
pub mod replay;
pub mod session;

pub use config::SessionConfig;
pub use error::{ErrorKind, Result, SptpsError};
pub use handshake::HandshakeState;
pub use identity::{PeerPublicKey, StaticKeypair};
pub use label::SessionLabel;
pub use record::HANDSHAKE;
pub use replay::{ReplayError, ReplayWindow};
pub use session::{Delivery, Mode, Role, Session, SessionBuilder, Transport};
