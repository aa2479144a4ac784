//! Framed message I/O with deadlines and cancellation.

use landrop_protocol::{read_frame, write_frame, Message};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::{TransferError, MESSAGE_TIMEOUT};

/// Reads one message, failing with `Timeout(what)` after `deadline`.
pub(crate) async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    deadline: Duration,
    what: &'static str,
    cancel: &CancellationToken,
) -> Result<Message, TransferError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        result = tokio::time::timeout(deadline, read_frame(reader)) => match result {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TransferError::Timeout(what)),
        },
    }
}

/// Writes one message within [`MESSAGE_TIMEOUT`].
pub(crate) async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        result = tokio::time::timeout(MESSAGE_TIMEOUT, write_frame(writer, msg)) => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TransferError::Timeout("message write")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_through_duplex() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let cancel = CancellationToken::new();

        write_message(&mut a, &Message::FileAccept, &cancel)
            .await
            .unwrap();
        let msg = read_message(&mut b, Duration::from_secs(1), "test", &cancel)
            .await
            .unwrap();
        assert_eq!(msg, Message::FileAccept);
    }

    #[tokio::test]
    async fn read_times_out_with_label() {
        let (_a, mut b) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();

        let result = read_message(&mut b, Duration::from_millis(50), "file offer", &cancel).await;
        assert!(matches!(result, Err(TransferError::Timeout("file offer"))));
    }

    #[tokio::test]
    async fn cancel_preempts_read() {
        let (_a, mut b) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = read_message(&mut b, Duration::from_secs(5), "test", &cancel).await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
    }
}
