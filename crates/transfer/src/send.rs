//! Send side: push one local file to a peer's transfer endpoint.

use std::net::SocketAddr;
use std::path::Path;

use landrop_protocol::{Message, CHUNK_BYTES};
use tokio::io::{AsyncReadExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::digest::file_md5;
use crate::io::{read_message, write_message};
use crate::progress::{next_session_id, Direction, ProgressEvent};
use crate::{TransferError, CONNECT_TIMEOUT, RESPONSE_TIMEOUT};

/// Terminal state of one send session.
#[derive(Debug)]
pub enum SendOutcome {
    /// Receiver verified the digest.
    Delivered,
    /// Receiver declined the offer.
    Rejected { reason: Option<String> },
    /// Receiver's digest did not match what we sent.
    VerifyFailed { expected: String, got: String },
}

/// Sends `path` to the peer at `target`, running the full offer /
/// stream / verify conversation.
///
/// The local file is only ever read. Rejection and digest mismatch are
/// outcomes, not errors; errors mean the session could not run to a
/// verdict.
pub async fn send_file(
    target: SocketAddr,
    path: &Path,
    progress: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
) -> Result<SendOutcome, TransferError> {
    // PREP: fail before touching the network.
    let meta = tokio::fs::metadata(path).await.map_err(|e| {
        TransferError::InvalidFile(format!("cannot stat {}: {e}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(TransferError::InvalidFile(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    let size = meta.len();
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            TransferError::InvalidFile(format!("{} has no usable file name", path.display()))
        })?
        .to_string();
    let md5 = file_md5(path).await?;
    debug!(%filename, size, %md5, "file prepared for sending");

    // CONNECT
    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        result = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(target)) => {
            match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(TransferError::Timeout("connection")),
            }
        }
    };
    info!(%target, %filename, "connected, offering file");

    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    // OFFER. The receiver's answer includes human decision time.
    write_message(
        &mut writer,
        &Message::FileOffer {
            filename: filename.clone(),
            size,
            md5: md5.clone(),
        },
        &cancel,
    )
    .await?;
    match read_message(&mut reader, RESPONSE_TIMEOUT, "offer response", &cancel).await? {
        Message::FileAccept => {}
        Message::FileReject { reason } => {
            info!(%target, ?reason, "offer rejected by peer");
            return Ok(SendOutcome::Rejected { reason });
        }
        other => {
            return Err(TransferError::Protocol(format!(
                "expected FILE_ACCEPT or FILE_REJECT, got {}",
                other.kind()
            )))
        }
    }

    // META
    let chunks = size.div_ceil(CHUNK_BYTES as u64);
    write_message(
        &mut writer,
        &Message::FileMeta {
            chunks,
            chunk_size: CHUNK_BYTES as u32,
        },
        &cancel,
    )
    .await?;

    // STREAM
    let session_id = next_session_id();
    let mut file = tokio::fs::File::open(path).await?;
    let mut sent: u64 = 0;
    for seq in 0..chunks {
        let want = (size - sent).min(CHUNK_BYTES as u64) as usize;
        let mut data = vec![0u8; want];
        file.read_exact(&mut data).await?;
        sent += want as u64;

        write_message(&mut writer, &Message::FileChunk { seq, data }, &cancel).await?;
        let _ = progress.try_send(ProgressEvent {
            session_id,
            direction: Direction::Send,
            bytes: sent,
            total: size,
        });
    }

    // DONE + VERIFY
    write_message(&mut writer, &Message::FileDone { md5: md5.clone() }, &cancel).await?;
    match read_message(&mut reader, RESPONSE_TIMEOUT, "verification verdict", &cancel).await? {
        Message::FileVerifyOk => {
            info!(%target, %filename, bytes = size, "file delivered and verified");
            Ok(SendOutcome::Delivered)
        }
        Message::FileVerifyFail { expected, got } => {
            info!(%target, %filename, "peer reported digest mismatch");
            Ok(SendOutcome::VerifyFailed { expected, got })
        }
        other => Err(TransferError::Protocol(format!(
            "expected a verify verdict, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{ConfirmBridge, Verdict};
    use crate::recv::{receive_session, RecvOutcome};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn_receiver(
        bridge: Arc<ConfirmBridge>,
        download_dir: PathBuf,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> (
        SocketAddr,
        tokio::task::JoinHandle<Result<RecvOutcome, crate::TransferError>>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            receive_session(
                stream,
                peer,
                bridge,
                &download_dir,
                progress,
                CancellationToken::new(),
            )
            .await
        });
        (addr, handle)
    }

    fn auto_resolve(bridge: &Arc<ConfirmBridge>, verdict: Verdict) {
        let b = Arc::clone(bridge);
        tokio::spawn(async move {
            b.next().await.resolve(verdict);
        });
    }

    fn null_progress() -> mpsc::Sender<ProgressEvent> {
        mpsc::channel(64).0
    }

    #[tokio::test]
    async fn end_to_end_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let src = dir.path().join("hello.txt");
        std::fs::write(&src, b"hello, world!").unwrap();

        let bridge = Arc::new(ConfirmBridge::new());
        auto_resolve(&bridge, Verdict::Accept);
        let (addr, receiver) = spawn_receiver(bridge, downloads.clone(), null_progress()).await;

        let outcome = send_file(addr, &src, null_progress(), CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Delivered));

        match receiver.await.unwrap().unwrap() {
            RecvOutcome::Completed { path } => {
                assert_eq!(path, downloads.join("hello.txt"));
                assert_eq!(std::fs::read(&path).unwrap(), b"hello, world!");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn multi_chunk_file_arrives_identical() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let src = dir.path().join("blob.bin");
        // 200 KiB: four chunks at 64 KiB, the last one short.
        let data: Vec<u8> = (0..200 * 1024u32).map(|i| (i * 31 % 256) as u8).collect();
        std::fs::write(&src, &data).unwrap();

        let bridge = Arc::new(ConfirmBridge::new());
        auto_resolve(&bridge, Verdict::Accept);
        let (addr, receiver) = spawn_receiver(bridge, downloads.clone(), null_progress()).await;

        let (progress_tx, mut progress_rx) = mpsc::channel(64);
        let outcome = send_file(addr, &src, progress_tx, CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Delivered));

        match receiver.await.unwrap().unwrap() {
            RecvOutcome::Completed { path } => {
                assert_eq!(std::fs::read(&path).unwrap(), data);
            }
            other => panic!("expected Completed, got {other:?}"),
        }

        // One event per chunk, cumulative, ending at the full size.
        let mut events = Vec::new();
        while let Ok(event) = progress_rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 4);
        assert!(events.windows(2).all(|w| w[0].bytes < w[1].bytes));
        let last = events.last().unwrap();
        assert_eq!(last.bytes, data.len() as u64);
        assert_eq!(last.total, data.len() as u64);
        assert_eq!(last.direction, Direction::Send);
    }

    #[tokio::test]
    async fn empty_file_transfers_with_zero_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let src = dir.path().join("empty.txt");
        std::fs::write(&src, b"").unwrap();

        let bridge = Arc::new(ConfirmBridge::new());
        auto_resolve(&bridge, Verdict::Accept);
        let (addr, receiver) = spawn_receiver(bridge, downloads.clone(), null_progress()).await;

        let outcome = send_file(addr, &src, null_progress(), CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Delivered));

        match receiver.await.unwrap().unwrap() {
            RecvOutcome::Completed { path } => {
                assert!(std::fs::read(&path).unwrap().is_empty());
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejection_reported_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let src = dir.path().join("unwanted.txt");
        std::fs::write(&src, b"no thanks").unwrap();

        let bridge = Arc::new(ConfirmBridge::new());
        auto_resolve(&bridge, Verdict::Reject);
        let (addr, receiver) = spawn_receiver(bridge, downloads.clone(), null_progress()).await;

        let outcome = send_file(addr, &src, null_progress(), CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Rejected { .. }));
        assert!(matches!(
            receiver.await.unwrap().unwrap(),
            RecvOutcome::Rejected
        ));
        // Rejection must not leave anything in the download directory.
        assert!(!downloads.exists() || std::fs::read_dir(&downloads).unwrap().count() == 0);
    }

    #[tokio::test]
    async fn missing_file_fails_before_connecting() {
        // Port 1 is never listening; PREP must fail first.
        let target: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let result = send_file(
            target,
            Path::new("/nonexistent/ghost.bin"),
            null_progress(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(TransferError::InvalidFile(_))));
    }

    #[tokio::test]
    async fn directory_is_not_a_sendable_file() {
        let dir = tempfile::tempdir().unwrap();
        let target: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let result = send_file(
            target,
            dir.path(),
            null_progress(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(TransferError::InvalidFile(_))));
    }

    #[tokio::test]
    async fn connection_refused_surfaces_as_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"x").unwrap();

        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let target: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

        let result = send_file(target, &src, null_progress(), CancellationToken::new()).await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[tokio::test]
    async fn receiver_vanishing_mid_stream_fails_the_send() {
        use landrop_protocol::{read_frame, write_frame};

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.bin");
        std::fs::write(&src, vec![0xABu8; CHUNK_BYTES * 3]).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // A peer that accepts, reads one chunk, then drops the connection.
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let offer = read_frame(&mut stream).await.unwrap();
            assert!(matches!(offer, Message::FileOffer { .. }));
            write_frame(&mut stream, &Message::FileAccept).await.unwrap();
            let _meta = read_frame(&mut stream).await.unwrap();
            let _first_chunk = read_frame(&mut stream).await.unwrap();
            // Connection dropped here.
        });

        let result = send_file(addr, &src, null_progress(), CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelled_send_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"x").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = send_file(addr, &src, null_progress(), cancel).await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
    }
}
