//! Message taxonomy for discovery and transfer.
//!
//! Messages are discriminated by a string `type` field so that a captured
//! datagram or stream is readable with any JSON tool. Chunk payloads are
//! base64-encoded to stay representable inside JSON.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// A single wire message.
///
/// `HEARTBEAT` travels over UDP broadcast; everything else belongs to the
/// TCP transfer conversation. The state machines on both sides match this
/// enum exhaustively, so an unexpected variant in a given state is a
/// protocol violation, not a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Periodic presence announcement. `ip`/`port` identify the node's TCP
    /// transfer endpoint and are authoritative over the datagram source.
    #[serde(rename = "HEARTBEAT")]
    Heartbeat {
        name: String,
        ip: Ipv4Addr,
        port: u16,
        os: String,
    },

    /// Opens a transfer: the sender proposes one file.
    #[serde(rename = "FILE_OFFER")]
    FileOffer {
        filename: String,
        size: u64,
        md5: String,
    },

    /// Receiver accepted the offer; metadata and chunks may follow.
    #[serde(rename = "FILE_ACCEPT")]
    FileAccept,

    /// Receiver declined the offer (or timed out deciding).
    #[serde(rename = "FILE_REJECT")]
    FileReject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Chunking parameters for the accepted file.
    #[serde(rename = "FILE_META")]
    FileMeta { chunks: u64, chunk_size: u32 },

    /// One slice of the file body. `seq` is 0-based and strictly increasing.
    #[serde(rename = "FILE_CHUNK")]
    FileChunk {
        seq: u64,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    /// All chunks sent; echoes the offer digest.
    #[serde(rename = "FILE_DONE")]
    FileDone { md5: String },

    /// Receiver's digest matched the sender's.
    #[serde(rename = "FILE_VERIFY_OK")]
    FileVerifyOk,

    /// Receiver's digest did not match; the partial file was discarded.
    #[serde(rename = "FILE_VERIFY_FAIL")]
    FileVerifyFail { expected: String, got: String },
}

impl Message {
    /// The wire `type` tag, for logs and protocol-violation errors.
    ///
    /// (Chunk payloads make `Debug` output unusable for this.)
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Heartbeat { .. } => "HEARTBEAT",
            Message::FileOffer { .. } => "FILE_OFFER",
            Message::FileAccept => "FILE_ACCEPT",
            Message::FileReject { .. } => "FILE_REJECT",
            Message::FileMeta { .. } => "FILE_META",
            Message::FileChunk { .. } => "FILE_CHUNK",
            Message::FileDone { .. } => "FILE_DONE",
            Message::FileVerifyOk => "FILE_VERIFY_OK",
            Message::FileVerifyFail { .. } => "FILE_VERIFY_FAIL",
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
