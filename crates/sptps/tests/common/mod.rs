//! In-memory session pair used by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use sptps::{Mode, Role, Session, SessionBuilder, StaticKeypair, HANDSHAKE};

pub type Callback = Box<dyn FnMut(u8, &[u8]) -> anyhow::Result<()>>;
pub type TestSession = Session<Callback, Callback>;

pub const LABEL: &str = "sptps test label";

/// Install a fmt subscriber honoring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// One end of a pair: the session plus everything it sent and delivered.
pub struct Peer {
    pub session: TestSession,
    pub outbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
    pub delivered: Rc<RefCell<Vec<(u8, Vec<u8>)>>>,
}

impl Peer {
    pub fn start(
        role: Role,
        mode: Mode,
        own: Arc<StaticKeypair>,
        peer: &StaticKeypair,
        label: &str,
        replay_window: usize,
    ) -> Self {
        Self::start_rejecting(role, mode, own, peer, label, replay_window, |_| false)
    }

    /// Like [`Peer::start`], but delivery fails for record types `reject`
    /// selects.
    pub fn start_rejecting(
        role: Role,
        mode: Mode,
        own: Arc<StaticKeypair>,
        peer: &StaticKeypair,
        label: &str,
        replay_window: usize,
        reject: fn(u8) -> bool,
    ) -> Self {
        let outbox = Rc::new(RefCell::new(VecDeque::new()));
        let delivered = Rc::new(RefCell::new(Vec::new()));

        let sink = outbox.clone();
        let transport: Callback = Box::new(move |_ty: u8, bytes: &[u8]| {
            sink.borrow_mut().push_back(bytes.to_vec());
            Ok(())
        });
        let inbox = delivered.clone();
        let delivery: Callback = Box::new(move |ty: u8, payload: &[u8]| {
            if reject(ty) {
                anyhow::bail!("delivery queue full");
            }
            inbox.borrow_mut().push((ty, payload.to_vec()));
            Ok(())
        });

        let session = SessionBuilder::new(role, mode, own, peer.public_key(), label)
            .replay_window(replay_window)
            .start(transport, delivery)
            .unwrap();

        Self {
            session,
            outbox,
            delivered,
        }
    }

    /// Take the next record this side sent.
    pub fn pop(&self) -> Option<Vec<u8>> {
        self.outbox.borrow_mut().pop_front()
    }

    /// Drop everything sent so far, returning it.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    /// Application records delivered so far, excluding handshake signals.
    pub fn app_records(&self) -> Vec<(u8, Vec<u8>)> {
        self.delivered
            .borrow()
            .iter()
            .filter(|(ty, _)| *ty != HANDSHAKE)
            .cloned()
            .collect()
    }

    /// Number of completed handshake rounds.
    pub fn rounds(&self) -> usize {
        self.delivered
            .borrow()
            .iter()
            .filter(|(ty, payload)| *ty == HANDSHAKE && payload.is_empty())
            .count()
    }

    /// Feed one transmitted unit.
    pub fn feed(&mut self, bytes: &[u8]) -> sptps::Result<()> {
        match self.session.mode() {
            Mode::Stream => self.session.receive_all(bytes),
            Mode::Datagram => self.session.receive(bytes).map(|_| ()),
        }
    }
}

/// Start an initiator/responder pair with fresh keys.
pub fn pair(mode: Mode) -> (Peer, Peer) {
    pair_with_window(mode, 16)
}

pub fn pair_with_window(mode: Mode, replay_window: usize) -> (Peer, Peer) {
    init_tracing();

    let a = Arc::new(StaticKeypair::generate());
    let b = Arc::new(StaticKeypair::generate());
    let initiator = Peer::start(Role::Initiator, mode, a.clone(), &b, LABEL, replay_window);
    let responder = Peer::start(Role::Responder, mode, b, &a, LABEL, replay_window);
    (initiator, responder)
}

/// Deliver everything `from` sent to `to`. Returns how many units moved.
pub fn flush(from: &Peer, to: &mut Peer) -> sptps::Result<usize> {
    let mut moved = 0;
    while let Some(bytes) = from.pop() {
        to.feed(&bytes)?;
        moved += 1;
    }
    Ok(moved)
}

/// Shuttle records both ways until neither side has anything left to send.
pub fn settle(a: &mut Peer, b: &mut Peer) -> sptps::Result<()> {
    loop {
        let moved = flush(a, b)? + flush(b, a)?;
        if moved == 0 {
            return Ok(());
        }
    }
}

/// Start a pair and complete the first handshake.
pub fn established(mode: Mode) -> (Peer, Peer) {
    let (mut a, mut b) = pair(mode);
    settle(&mut a, &mut b).unwrap();
    assert!(a.session.is_outbound_ready() && b.session.is_outbound_ready());
    (a, b)
}
