//! Node lifecycle: wires the discovery and transfer planes together.
//!
//! A [`Node`] owns every long-lived resource (identity, peer table,
//! confirmation bridge, sockets) and hands the UI a small hook surface:
//! peer snapshots, send submission, confirmation pulls, and a progress
//! stream. All background tasks hang off one cancellation token, so
//! shutdown is a single signal plus a bounded join.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use landrop_discovery::{
    run_sweeper, Broadcaster, DiscoveryError, DiscoveryListener, NameLookup, NodeIdentity,
    PeerRecord, PeerTable, DEFAULT_BROADCAST_PORT, DEFAULT_TRANSFER_PORT_START,
};
use landrop_transfer::{
    send_file, ConfirmBridge, FileOffer, PendingOffer, ProgressEvent, SendOutcome,
    TransferAcceptor, TransferError,
};

/// Every task must observe shutdown within this deadline.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// How many ports past the scan start to probe for a free transfer port.
const TRANSFER_PORT_SCAN: u16 = 100;

/// Size of the progress event buffer; sessions drop events when full.
const PROGRESS_BUFFER: usize = 256;

/// Startup parameters for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Heartbeat name; `None` derives `node_<last-octet>_<port>`.
    pub name: Option<String>,
    /// UDP discovery port shared by all nodes on the LAN.
    pub broadcast_port: u16,
    /// TCP transfer port; `None` scans from 12000.
    pub transfer_port: Option<u16>,
    /// Where accepted files land.
    pub download_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: None,
            broadcast_port: DEFAULT_BROADCAST_PORT,
            transfer_port: None,
            download_dir: PathBuf::from("./downloads"),
        }
    }
}

/// Errors surfaced by the node lifecycle and command hooks.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("no peer named or addressed '{0}'")]
    UnknownTarget(String),

    #[error("'{0}' names more than one peer, use ip:port")]
    AmbiguousTarget(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// A running node: discovery plus transfer, one cancellation token.
pub struct Node {
    identity: NodeIdentity,
    peers: Arc<PeerTable>,
    bridge: Arc<ConfirmBridge>,
    progress_tx: mpsc::Sender<ProgressEvent>,
    progress_rx: Mutex<Option<mpsc::Receiver<ProgressEvent>>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Binds all sockets (fail fast) and spawns the background tasks:
    /// broadcaster, discovery listener, sweeper, transfer acceptor.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let listener = bind_transfer_listener(config.transfer_port).await?;
        let port = listener.local_addr()?.port();

        let identity = NodeIdentity::resolve(config.name, port);
        let peers = Arc::new(PeerTable::new());
        let bridge = Arc::new(ConfirmBridge::new());
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_BUFFER);

        // Both discovery sockets bind before anything is spawned, so a
        // taken port aborts startup instead of limping along.
        let discovery = DiscoveryListener::bind(config.broadcast_port, &identity, Arc::clone(&peers))?;
        let broadcaster = Broadcaster::bind(&identity, config.broadcast_port).await?;
        let acceptor = TransferAcceptor::new(
            listener,
            Arc::clone(&bridge),
            config.download_dir,
            progress_tx.clone(),
        );

        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(broadcaster.run(cancel.clone())),
            tokio::spawn(discovery.run(cancel.clone())),
            tokio::spawn(run_sweeper(Arc::clone(&peers), cancel.clone())),
            tokio::spawn(acceptor.run(cancel.clone())),
        ];

        info!(
            name = %identity.name,
            ip = %identity.ip,
            port = identity.port,
            broadcast_port = config.broadcast_port,
            "node started"
        );

        Ok(Self {
            identity,
            peers,
            bridge,
            progress_tx,
            progress_rx: Mutex::new(Some(progress_rx)),
            cancel,
            tasks,
        })
    }

    /// This node's published identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// The live peer table (synchronized; see [`PeerTable`]).
    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Owned snapshot of the peer table for rendering.
    pub fn peers_snapshot(&self) -> Vec<PeerRecord> {
        self.peers.snapshot()
    }

    /// Offers awaiting a verdict that the UI has not pulled yet.
    pub fn pending_offers(&self) -> Vec<FileOffer> {
        self.bridge.pending()
    }

    /// Waits for the next offer needing a user verdict.
    pub async fn next_confirmation(&self) -> PendingOffer {
        self.bridge.next().await
    }

    /// Resolves a `send` target: an `ip:port` literal, else an exact peer
    /// name. Duplicate names are refused rather than guessed at.
    pub fn resolve_target(&self, target: &str) -> Result<SocketAddr, NodeError> {
        if let Ok(addr) = target.parse::<SocketAddr>() {
            return Ok(addr);
        }
        match self.peers.lookup_by_name(target) {
            NameLookup::Found(identity) => Ok(identity.endpoint()),
            NameLookup::NotFound => Err(NodeError::UnknownTarget(target.to_string())),
            NameLookup::Ambiguous => Err(NodeError::AmbiguousTarget(target.to_string())),
        }
    }

    /// Starts sending `path` to `target` on its own task.
    ///
    /// Target resolution errors are reported synchronously; everything
    /// after that arrives through the returned handle and the progress
    /// stream.
    pub fn submit_send(
        &self,
        target: &str,
        path: PathBuf,
    ) -> Result<JoinHandle<Result<SendOutcome, TransferError>>, NodeError> {
        let addr = self.resolve_target(target)?;
        let progress = self.progress_tx.clone();
        let cancel = self.cancel.clone();
        Ok(tokio::spawn(async move {
            send_file(addr, &path, progress, cancel).await
        }))
    }

    /// Takes the progress event receiver. Yields `None` after the first
    /// call.
    pub fn take_progress(&self) -> Option<mpsc::Receiver<ProgressEvent>> {
        self.progress_rx.lock().unwrap().take()
    }

    /// Signals every task and joins them within [`SHUTDOWN_TIMEOUT`].
    /// Stragglers (including in-flight transfers) are aborted.
    pub async fn shutdown(self) {
        info!("node shutting down");
        self.cancel.cancel();
        for mut task in self.tasks {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                warn!("task missed the shutdown deadline, aborting");
                task.abort();
            }
        }
    }
}

/// Binds the TCP transfer listener: an explicit port fails fast, no port
/// scans from [`DEFAULT_TRANSFER_PORT_START`].
async fn bind_transfer_listener(port: Option<u16>) -> Result<TcpListener, NodeError> {
    match port {
        Some(port) => Ok(TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?),
        None => {
            let start = DEFAULT_TRANSFER_PORT_START;
            for candidate in start..start + TRANSFER_PORT_SCAN {
                match TcpListener::bind((Ipv4Addr::UNSPECIFIED, candidate)).await {
                    Ok(listener) => return Ok(listener),
                    Err(_) => continue,
                }
            }
            Err(NodeError::Config(format!(
                "no free transfer port in {start}..{}",
                start + TRANSFER_PORT_SCAN
            )))
        }
    }
}
