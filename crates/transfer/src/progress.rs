//! Progress events emitted by active transfer sessions.
//!
//! Sessions push events with `try_send`; a slow or absent consumer drops
//! events rather than stalling the transfer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which side of a transfer the event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Recv => write!(f, "recv"),
        }
    }
}

/// A snapshot of one session's progress after a chunk moved.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub session_id: u64,
    pub direction: Direction,
    pub bytes: u64,
    pub total: u64,
}

impl ProgressEvent {
    /// Progress as a percentage (100 for empty files, which complete
    /// immediately).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.bytes as f64 / self.total as f64 * 100.0
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique session id.
pub fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}
