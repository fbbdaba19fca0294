//! Wall-clock milliseconds driven by the tokio timer.
//!
//! Session expiry and membership age are both computed in Unix milliseconds.
//! `Clock` anchors to `SystemTime` once and advances with
//! `tokio::time::Instant`, so a paused test runtime controls it through
//! `tokio::time::advance` exactly like it controls the scheduler's sleeps.

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Millisecond clock shared by the session store and the enforcement workflow.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    anchor_ms: u64,
    anchor: Instant,
}

impl Clock {
    /// Anchor to the current system time.
    pub fn system() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::starting_at(anchor_ms)
    }

    /// Anchor to a fixed Unix millisecond value.
    pub fn starting_at(anchor_ms: u64) -> Self {
        Self {
            anchor_ms,
            anchor: Instant::now(),
        }
    }

    /// Current Unix time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.anchor_ms + self.anchor.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}
