//! Heartbeat broadcaster.

use std::net::{Ipv4Addr, SocketAddrV4};

use landrop_protocol::wire::encode_frame;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::identity::NodeIdentity;
use crate::{DiscoveryError, HEARTBEAT_INTERVAL, STARTUP_BURST, STARTUP_BURST_GAP};

/// Periodically announces this node's identity via UDP broadcast.
pub struct Broadcaster {
    socket: UdpSocket,
    frame: Vec<u8>,
    dest: SocketAddrV4,
}

impl Broadcaster {
    /// Binds an ephemeral UDP socket with broadcast enabled.
    ///
    /// The heartbeat frame is encoded once; identity is immutable.
    pub async fn bind(identity: &NodeIdentity, broadcast_port: u16) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;

        let frame = encode_frame(&identity.heartbeat())
            .map_err(|e| DiscoveryError::Config(format!("heartbeat does not encode: {e}")))?;

        Ok(Self {
            socket,
            frame,
            dest: SocketAddrV4::new(Ipv4Addr::BROADCAST, broadcast_port),
        })
    }

    /// Runs the broadcast loop until cancelled.
    ///
    /// Fires [`STARTUP_BURST`] rapid heartbeats first so new nodes appear
    /// quickly, then settles into [`HEARTBEAT_INTERVAL`]. A failed send is
    /// logged and swallowed.
    pub async fn run(self, cancel: CancellationToken) {
        info!(dest = %self.dest, "broadcaster started");

        for i in 0..STARTUP_BURST {
            if cancel.is_cancelled() {
                return;
            }
            self.send_once().await;
            if i + 1 < STARTUP_BURST {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(STARTUP_BURST_GAP) => {}
                }
            }
        }

        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await; // first tick fires immediately; burst covered it

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("broadcaster stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.send_once().await;
                }
            }
        }
    }

    async fn send_once(&self) {
        match self.socket.send_to(&self.frame, self.dest).await {
            Ok(n) => trace!(bytes = n, "heartbeat sent"),
            Err(e) => warn!(error = %e, "heartbeat send failed"),
        }
    }
}
