//! Receive side: TCP accept loop and the per-connection state machine.
//!
//! Each accepted connection walks offer → confirmation → metadata →
//! chunk stream → digest verification. A partial output file never
//! survives a failed or unverified session.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use landrop_protocol::Message;
use md5::{Digest, Md5};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::confirm::{ConfirmBridge, FileOffer, Verdict};
use crate::io::{read_message, write_message};
use crate::paths::create_unique;
use crate::progress::{next_session_id, Direction, ProgressEvent};
use crate::{TransferError, MESSAGE_TIMEOUT};

/// Terminal state of one receive session.
#[derive(Debug)]
pub enum RecvOutcome {
    /// File written and verified.
    Completed { path: PathBuf },
    /// Offer declined (by the user or by confirmation timeout).
    Rejected,
    /// Digest mismatch; the partial file was deleted.
    VerifyFailed,
}

/// Accepts transfer connections and runs one receive session per
/// connection.
pub struct TransferAcceptor {
    listener: TcpListener,
    bridge: Arc<ConfirmBridge>,
    download_dir: PathBuf,
    progress: mpsc::Sender<ProgressEvent>,
}

impl TransferAcceptor {
    pub fn new(
        listener: TcpListener,
        bridge: Arc<ConfirmBridge>,
        download_dir: PathBuf,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Self {
        Self {
            listener,
            bridge,
            download_dir,
            progress,
        }
    }

    /// Runs the accept loop until cancelled. Sessions run on their own
    /// tasks, so a slow transfer never blocks new connections.
    pub async fn run(self, cancel: CancellationToken) {
        info!(addr = ?self.listener.local_addr().ok(), "transfer acceptor started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = self.listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return,
                                _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => continue,
                            }
                        }
                    };

                    let bridge = Arc::clone(&self.bridge);
                    let download_dir = self.download_dir.clone();
                    let progress = self.progress.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        match receive_session(stream, peer, bridge, &download_dir, progress, cancel)
                            .await
                        {
                            Ok(RecvOutcome::Completed { path }) => {
                                info!(%peer, path = %path.display(), "file received and verified");
                            }
                            Ok(RecvOutcome::Rejected) => {
                                info!(%peer, "offer rejected");
                            }
                            Ok(RecvOutcome::VerifyFailed) => {
                                warn!(%peer, "digest mismatch, partial file deleted");
                            }
                            Err(e) => {
                                warn!(%peer, error = %e, "receive session failed");
                            }
                        }
                    });
                }
            }
        }
    }
}

/// Runs the receive state machine on one established connection.
pub async fn receive_session(
    stream: TcpStream,
    peer: SocketAddr,
    bridge: Arc<ConfirmBridge>,
    download_dir: &Path,
    progress: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
) -> Result<RecvOutcome, TransferError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = write_half;

    // WAIT_OFFER
    let offer = match read_message(&mut reader, MESSAGE_TIMEOUT, "file offer", &cancel).await? {
        Message::FileOffer {
            filename,
            size,
            md5,
        } => FileOffer {
            peer,
            filename,
            size,
            md5,
        },
        other => {
            return Err(TransferError::Protocol(format!(
                "expected FILE_OFFER, got {}",
                other.kind()
            )))
        }
    };
    info!(%peer, filename = %offer.filename, size = offer.size, "incoming file offer");

    // CONFIRMING. The bridge owns the decision timeout.
    match bridge.request(offer.clone()).await {
        Verdict::Reject => {
            write_message(&mut writer, &Message::FileReject { reason: None }, &cancel).await?;
            return Ok(RecvOutcome::Rejected);
        }
        Verdict::Accept => {
            write_message(&mut writer, &Message::FileAccept, &cancel).await?;
        }
    }

    // META
    let (chunks, chunk_size) =
        match read_message(&mut reader, MESSAGE_TIMEOUT, "file metadata", &cancel).await? {
            Message::FileMeta { chunks, chunk_size } => (chunks, chunk_size),
            other => {
                return Err(TransferError::Protocol(format!(
                    "expected FILE_META, got {}",
                    other.kind()
                )))
            }
        };
    let expected_chunks = if chunk_size == 0 {
        0
    } else {
        offer.size.div_ceil(chunk_size as u64)
    };
    if expected_chunks != chunks || (chunk_size == 0 && offer.size > 0) {
        return Err(TransferError::Protocol(format!(
            "metadata declares {chunks} chunks of {chunk_size} bytes for a {}-byte file",
            offer.size
        )));
    }

    // The file exists from here on; never leave it behind unverified.
    let (path, file) = create_unique(download_dir, &offer.filename).await?;
    match stream_to_file(&mut reader, &mut writer, file, &offer, chunks, &progress, &cancel).await {
        Ok(StreamResult::Verified) => Ok(RecvOutcome::Completed { path }),
        Ok(StreamResult::Mismatch) => {
            let _ = tokio::fs::remove_file(&path).await;
            Ok(RecvOutcome::VerifyFailed)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            Err(e)
        }
    }
}

enum StreamResult {
    Verified,
    Mismatch,
}

/// STREAMING + VERIFY: writes every chunk, then settles the digest.
async fn stream_to_file<R, W>(
    reader: &mut R,
    writer: &mut W,
    file: tokio::fs::File,
    offer: &FileOffer,
    chunks: u64,
    progress: &mpsc::Sender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<StreamResult, TransferError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let session_id = next_session_id();
    let mut file = BufWriter::new(file);
    let mut hasher = Md5::new();
    let mut received: u64 = 0;

    for seq in 0..chunks {
        let data = match read_message(reader, MESSAGE_TIMEOUT, "file chunk", cancel).await? {
            Message::FileChunk { seq: got, data } if got == seq => data,
            Message::FileChunk { seq: got, .. } => {
                return Err(TransferError::Protocol(format!(
                    "chunk {got} out of order, expected {seq}"
                )))
            }
            other => {
                return Err(TransferError::Protocol(format!(
                    "expected FILE_CHUNK, got {}",
                    other.kind()
                )))
            }
        };

        received += data.len() as u64;
        if received > offer.size {
            return Err(TransferError::Protocol(format!(
                "received {received} bytes, offer declared {}",
                offer.size
            )));
        }

        hasher.update(&data);
        file.write_all(&data).await?;

        let _ = progress.try_send(ProgressEvent {
            session_id,
            direction: Direction::Recv,
            bytes: received,
            total: offer.size,
        });
    }

    if received != offer.size {
        return Err(TransferError::Protocol(format!(
            "chunk stream ended at {received} bytes, offer declared {}",
            offer.size
        )));
    }
    file.flush().await?;

    // VERIFY
    let sent_md5 = match read_message(reader, MESSAGE_TIMEOUT, "transfer digest", cancel).await? {
        Message::FileDone { md5 } => md5,
        other => {
            return Err(TransferError::Protocol(format!(
                "expected FILE_DONE, got {}",
                other.kind()
            )))
        }
    };

    let local_md5 = hex::encode(hasher.finalize());
    if local_md5 == sent_md5 {
        write_message(writer, &Message::FileVerifyOk, cancel).await?;
        Ok(StreamResult::Verified)
    } else {
        write_message(
            writer,
            &Message::FileVerifyFail {
                expected: sent_md5,
                got: local_md5,
            },
            cancel,
        )
        .await?;
        Ok(StreamResult::Mismatch)
    }
}
