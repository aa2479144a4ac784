//! Peer discovery over UDP broadcast.
//!
//! Every node broadcasts a framed `HEARTBEAT` datagram on a well-known port
//! and listens on the same port to build a liveness table of its peers.
//! Entries expire when heartbeats stop arriving.

pub mod broadcast;
pub mod identity;
pub mod listener;
pub mod peers;

pub use broadcast::Broadcaster;
pub use identity::{detect_os, local_ipv4, NodeIdentity};
pub use listener::{run_sweeper, DiscoveryListener};
pub use peers::{NameLookup, PeerRecord, PeerTable};

use std::time::Duration;

/// Well-known UDP port heartbeats are broadcast on.
pub const DEFAULT_BROADCAST_PORT: u16 = 23333;

/// First candidate when scanning for a free TCP transfer port.
pub const DEFAULT_TRANSFER_PORT_START: u16 = 12000;

/// Cadence of heartbeat broadcasts.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// A peer is evicted when no heartbeat arrived for this long.
pub const PEER_TTL: Duration = Duration::from_secs(60);

/// Cadence of the eviction sweep (must stay below `PEER_TTL / 2`).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// Rapid heartbeats fired at startup so new nodes appear quickly.
pub const STARTUP_BURST: usize = 3;

/// Gap between the startup burst heartbeats.
pub const STARTUP_BURST_GAP: Duration = Duration::from_millis(200);

/// Warn once if the listener saw no datagram at all for this long after
/// start; usually a firewalled broadcast port.
pub const NO_TRAFFIC_WARN_AFTER: Duration = Duration::from_secs(30);

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
