//! File transfer plane: sender and receiver state machines over TCP,
//! receiver-side confirmation, progress events, and MD5 verification.
//!
//! One TCP connection carries exactly one transfer. The conversation is a
//! strict sequence (offer → accept/reject → metadata → chunks → digest →
//! verdict); any message outside its slot fails the session.

pub mod confirm;
pub mod digest;
mod io;
pub mod paths;
pub mod progress;
pub mod recv;
pub mod send;

pub use confirm::{ConfirmBridge, FileOffer, PendingOffer, Verdict};
pub use progress::{next_session_id, Direction, ProgressEvent};
pub use recv::{receive_session, RecvOutcome, TransferAcceptor};
pub use send::{send_file, SendOutcome};

use std::time::Duration;

/// Timeout for the TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for any single message read or write.
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the offer-to-accept wait and the final verify verdict.
///
/// Longer than [`MESSAGE_TIMEOUT`] because a human sits on the other end
/// of the accept decision.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a pending offer waits for the user before auto-rejecting.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors produced by the transfer plane.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Frame(#[from] landrop_protocol::ProtocolError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("cancelled")]
    Cancelled,
}
