//! Replay window for datagram sessions.
//!
//! Tracks the next expected inbound sequence number and, for the
//! `8 * W` sequence numbers just below it, whether each one is still
//! outstanding ("late"). Each sequence number maps onto the ring slot
//! `seqno % (8 * W)`.
//!
//! # Rules
//!
//! - `seqno == expected`: accepted.
//! - `expected < seqno < expected + 8W`: accepted, everything skipped is
//!   marked late.
//! - `seqno >= expected + 8W`: rejected until `8W / 4` such packets have
//!   been seen in a row, then accepted as a loss event with the whole
//!   ring marked late.
//! - `seqno < expected`: accepted only if inside the window and still
//!   marked late.
//!
//! # Thread Safety
//!
//! Not thread-safe; owned by a single session.

use thiserror::Error;
use tracing::warn;
use zeroize::Zeroize;

/// Why a sequence number was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("received replayed packet, seqno {seqno}, expected {expected}")]
    Duplicate { seqno: u32, expected: u32 },

    #[error("received late packet, seqno {seqno}, expected {expected}")]
    TooOld { seqno: u32, expected: u32 },

    #[error("packet seqno {seqno} is too far in the future of {expected}, dropped ({count})")]
    FarFuture { seqno: u32, expected: u32, count: u32 },
}

/// Sliding replay window over 32-bit sequence numbers.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    /// Next expected sequence number
    expected: u32,
    /// One slot per tracked sequence number; `true` = not yet received
    late: Box<[bool]>,
    /// Consecutive far-future packets seen
    far_future: u32,
    /// Packets accepted
    received: u32,
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BYTES)
    }
}

impl ReplayWindow {
    /// Default window size in bytes (128 sequence numbers).
    pub const DEFAULT_BYTES: usize = 16;

    /// Create a window of `bytes * 8` sequence numbers. Zero disables
    /// replay protection.
    pub fn new(bytes: usize) -> Self {
        Self {
            expected: 0,
            late: vec![false; bytes * 8].into_boxed_slice(),
            far_future: 0,
            received: 0,
        }
    }

    /// Number of sequence numbers tracked below `expected`.
    pub fn capacity(&self) -> usize {
        self.late.len()
    }

    /// Next expected sequence number.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Packets accepted so far.
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Current far-future counter.
    pub fn far_future(&self) -> u32 {
        self.far_future
    }

    /// Far-future packets rejected before a jump is taken as real loss.
    pub fn far_future_threshold(&self) -> u32 {
        (self.capacity() / 4) as u32
    }

    /// Whether `seqno` is still marked outstanding.
    pub fn is_late(&self, seqno: u32) -> bool {
        self.capacity() > 0 && self.late[self.slot(seqno)]
    }

    /// Classify `seqno` without touching any state.
    pub fn check(&self, seqno: u32) -> Result<(), ReplayError> {
        if self.capacity() == 0 || seqno == self.expected {
            return Ok(());
        }

        let bits = self.capacity() as u64;
        let expected = self.expected;

        if u64::from(seqno) >= u64::from(expected) + bits {
            if self.far_future < self.far_future_threshold() {
                return Err(ReplayError::FarFuture {
                    seqno,
                    expected,
                    count: self.far_future,
                });
            }
            return Ok(());
        }

        if seqno < expected {
            if u64::from(seqno) + bits < u64::from(expected) {
                return Err(ReplayError::TooOld { seqno, expected });
            }
            if !self.late[self.slot(seqno)] {
                return Err(ReplayError::Duplicate { seqno, expected });
            }
        }

        Ok(())
    }

    /// Classify `seqno` and, if accepted, record it.
    ///
    /// A rejected far-future packet still counts towards the threshold.
    pub fn update(&mut self, seqno: u32) -> Result<(), ReplayError> {
        if self.capacity() > 0 && seqno != self.expected {
            let bits = self.capacity() as u64;
            let expected = self.expected;

            if u64::from(seqno) >= u64::from(expected) + bits {
                let suspicious = self.far_future < self.far_future_threshold();
                self.far_future = self.far_future.saturating_add(1);

                if suspicious {
                    return Err(ReplayError::FarFuture {
                        seqno,
                        expected,
                        count: self.far_future,
                    });
                }

                warn!("Lost {} packets", seqno.wrapping_sub(expected));
                self.late.fill(true);
            } else if seqno < expected {
                self.check(seqno)?;
            } else {
                for skipped in expected..seqno {
                    let slot = self.slot(skipped);
                    self.late[slot] = true;
                }
            }
        }

        if self.capacity() > 0 {
            let slot = self.slot(seqno);
            self.late[slot] = false;
            self.far_future = 0;
        }

        if seqno >= self.expected {
            self.expected = seqno.saturating_add(1);
        }
        self.received = self.received.saturating_add(1);

        Ok(())
    }

    /// Accept only the exact next sequence number (no reordering).
    ///
    /// `u32::MAX` is never accepted; the counter does not wrap.
    pub fn accept_in_order(&mut self, seqno: u32) -> bool {
        if seqno != self.expected || seqno == u32::MAX {
            return false;
        }
        self.expected = seqno + 1;
        true
    }

    /// Take the next sequence number on an ordered transport, or `None`
    /// once the counter is exhausted.
    pub fn advance(&mut self) -> Option<u32> {
        let seqno = self.expected;
        self.expected = seqno.checked_add(1)?;
        Some(seqno)
    }

    /// Erase all state.
    pub fn wipe(&mut self) {
        self.expected.zeroize();
        self.late.fill(false);
        self.far_future = 0;
        self.received = 0;
    }

    fn slot(&self, seqno: u32) -> usize {
        seqno as usize % self.late.len()
    }

    #[cfg(test)]
    pub(crate) fn set_expected(&mut self, expected: u32) {
        self.expected = expected;
    }
}
