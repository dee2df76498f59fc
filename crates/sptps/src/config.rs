//! Session tunables.

use serde::{Deserialize, Serialize};

use crate::replay::ReplayWindow;

/// Configuration for an SPTPS session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Replay window size in bytes; each byte covers 8 sequence numbers.
    /// Only used in datagram mode. `0` disables replay protection.
    /// Default 16.
    pub replay_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            replay_window: ReplayWindow::DEFAULT_BYTES,
        }
    }
}
