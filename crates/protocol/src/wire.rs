//! Framing: 4-byte big-endian length prefix + JSON payload.
//!
//! The same framing applies to TCP streams (one frame per message, read
//! with [`read_frame`]) and UDP datagrams (one frame per datagram, decoded
//! in place with [`decode_frame`]).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::messages::Message;
use crate::{ProtocolError, MAX_FRAME_LEN};

const LEN_SIZE: usize = 4;

/// Encodes a message into a single frame: 4 bytes BE length + JSON.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(msg)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decodes one frame from the front of `bytes`.
///
/// Returns the message and the number of bytes consumed. A buffer shorter
/// than one whole frame yields [`ProtocolError::NeedMore`].
pub fn decode_frame(bytes: &[u8]) -> Result<(Message, usize), ProtocolError> {
    if bytes.len() < LEN_SIZE {
        return Err(ProtocolError::NeedMore);
    }
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(ProtocolError::NeedMore);
    }
    let msg: Message = serde_json::from_slice(&bytes[LEN_SIZE..LEN_SIZE + len])?;
    Ok((msg, LEN_SIZE + len))
}

/// Reads exactly one frame from a stream.
///
/// EOF before a complete frame surfaces as an `UnexpectedEof` I/O error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message, ProtocolError> {
    let mut len_buf = [0u8; LEN_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Writes one frame to a stream and flushes it.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
