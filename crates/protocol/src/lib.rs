//! Wire protocol shared by the discovery and transfer planes.
//!
//! Every message, whether a UDP heartbeat datagram or TCP transfer traffic,
//! is a 32-bit big-endian length prefix followed by a JSON object with a
//! `type` discriminator. See [`messages`] for the taxonomy and [`wire`] for
//! the framing.

pub mod messages;
pub mod wire;

pub use messages::Message;
pub use wire::{decode_frame, encode_frame, read_frame, write_frame};

/// File body slice size before base64 encoding (64 KiB).
pub const CHUNK_BYTES: usize = 64 * 1024;

/// Upper bound for a single frame's JSON payload (1 MiB).
///
/// A full chunk expands to ~87 KiB of base64 inside JSON; anything near the
/// cap is a corrupt or hostile length prefix.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Errors produced while encoding or decoding wire frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    FrameTooLarge(usize),

    #[error("incomplete frame")]
    NeedMore,
}
