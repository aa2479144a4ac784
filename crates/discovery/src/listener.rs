//! Discovery listener: receives heartbeat datagrams and feeds the peer table.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use landrop_protocol::wire::decode_frame;
use landrop_protocol::Message;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::identity::NodeIdentity;
use crate::peers::PeerTable;
use crate::{DiscoveryError, NO_TRAFFIC_WARN_AFTER, SWEEP_INTERVAL};

/// Heartbeats are small; anything larger than this is not ours.
const MAX_DATAGRAM: usize = 2048;

/// Binds the shared discovery port with address and port reuse enabled,
/// so several nodes can coexist on one host.
///
/// Platforms without `SO_REUSEPORT` or an equivalent would silently steal
/// datagrams from each other, so the bind fails instead.
pub fn bind_reuse_udp(port: u16) -> Result<std::net::UdpSocket, DiscoveryError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    // On Windows SO_REUSEADDR already permits the shared bind.
    #[cfg(not(any(unix, windows)))]
    return Err(DiscoveryError::Config(
        "this platform has no UDP port-reuse; cannot share the discovery port".into(),
    ));

    socket.set_nonblocking(true)?;
    let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Receives broadcast heartbeats and upserts peers.
pub struct DiscoveryListener {
    socket: UdpSocket,
    table: Arc<PeerTable>,
    own_endpoint: (Ipv4Addr, u16),
}

impl DiscoveryListener {
    /// Binds the broadcast port. Fails fast when the port cannot be shared.
    ///
    /// `own` is this node's identity, used to drop echoes of our own
    /// broadcasts.
    pub fn bind(
        broadcast_port: u16,
        own: &NodeIdentity,
        table: Arc<PeerTable>,
    ) -> Result<Self, DiscoveryError> {
        let std_socket = bind_reuse_udp(broadcast_port)?;
        let socket = UdpSocket::from_std(std_socket)?;
        Ok(Self {
            socket,
            table,
            own_endpoint: (own.ip, own.port),
        })
    }

    /// Local address of the bound socket (useful when bound to port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the receive loop until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(addr = ?self.socket.local_addr().ok(), "discovery listener started");

        let quiet_deadline = tokio::time::sleep(NO_TRAFFIC_WARN_AFTER);
        tokio::pin!(quiet_deadline);
        let mut seen_any = false;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("discovery listener stopped");
                    return;
                }
                _ = &mut quiet_deadline, if !seen_any => {
                    warn!(
                        secs = NO_TRAFFIC_WARN_AFTER.as_secs(),
                        "no discovery traffic at all, not even our own echo; \
                         is the broadcast port firewalled?"
                    );
                    seen_any = true;
                }
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, src)) => {
                            seen_any = true;
                            self.handle_datagram(&buf[..n], src);
                        }
                        Err(e) => {
                            warn!(error = %e, "discovery recv failed");
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return,
                                _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
                            }
                        }
                    }
                }
            }
        }
    }

    /// Parses one datagram. Malformed data and non-heartbeats are dropped
    /// silently; the `(ip, port)` inside the message is authoritative, not
    /// the datagram source.
    fn handle_datagram(&self, data: &[u8], src: SocketAddr) {
        let (name, ip, port, os) = match decode_frame(data) {
            Ok((Message::Heartbeat { name, ip, port, os }, _)) => (name, ip, port, os),
            Ok((other, _)) => {
                debug!(%src, msg = ?other, "non-heartbeat datagram on discovery port");
                return;
            }
            Err(e) => {
                debug!(%src, error = %e, "malformed discovery datagram");
                return;
            }
        };

        if (ip, port) == self.own_endpoint {
            trace!("own heartbeat echo dropped");
            return;
        }

        trace!(%name, %ip, port, "heartbeat received");
        self.table
            .upsert(NodeIdentity { name, ip, port, os }, Instant::now());
    }
}

/// Evicts expired peers every [`SWEEP_INTERVAL`] until cancelled.
pub async fn run_sweeper(table: Arc<PeerTable>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let evicted = table.sweep(Instant::now());
                if evicted > 0 {
                    debug!(evicted, "expired peers evicted");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landrop_protocol::wire::encode_frame;
    use std::time::Duration;

    fn own_identity() -> NodeIdentity {
        NodeIdentity {
            name: "self".into(),
            ip: "127.0.0.1".parse().unwrap(),
            port: 12000,
            os: "linux".into(),
        }
    }

    fn peer_identity(port: u16) -> NodeIdentity {
        NodeIdentity {
            name: format!("peer_{port}"),
            ip: "127.0.0.1".parse().unwrap(),
            port,
            os: "linux".into(),
        }
    }

    async fn send_to(addr: SocketAddr, data: &[u8]) {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sock.send_to(data, addr).await.unwrap();
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        for _ in 0..100 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn same_port_binds_twice_with_reuse() {
        let a = bind_reuse_udp(0).unwrap();
        let port = a.local_addr().unwrap().port();
        let b = bind_reuse_udp(port).unwrap();
        drop((a, b));
    }

    #[tokio::test]
    async fn heartbeat_populates_table() {
        let table = Arc::new(PeerTable::new());
        let listener = DiscoveryListener::bind(0, &own_identity(), Arc::clone(&table)).unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(cancel.clone()));

        let frame = encode_frame(&peer_identity(12001).heartbeat()).unwrap();
        send_to(addr, &frame).await;

        assert!(wait_for(|| table.len() == 1).await, "peer never appeared");
        let record = &table.snapshot()[0];
        assert_eq!(record.identity.port, 12001);
        assert_eq!(record.identity.name, "peer_12001");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn own_echo_is_filtered() {
        let table = Arc::new(PeerTable::new());
        let own = own_identity();
        let listener = DiscoveryListener::bind(0, &own, Arc::clone(&table)).unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(cancel.clone()));

        // Our own heartbeat, then a real peer's: only the peer shows up.
        send_to(addr, &encode_frame(&own.heartbeat()).unwrap()).await;
        send_to(addr, &encode_frame(&peer_identity(12002).heartbeat()).unwrap()).await;

        assert!(wait_for(|| table.len() == 1).await);
        assert_eq!(table.snapshot()[0].identity.port, 12002);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_datagrams_are_dropped() {
        let table = Arc::new(PeerTable::new());
        let listener = DiscoveryListener::bind(0, &own_identity(), Arc::clone(&table)).unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(cancel.clone()));

        send_to(addr, b"not a frame").await;
        send_to(addr, &[0, 0, 0, 2, b'{', b'}']).await;
        // A valid frame that is not a heartbeat.
        send_to(addr, &encode_frame(&Message::FileAccept).unwrap()).await;
        // Then a valid heartbeat to prove the loop survived.
        send_to(addr, &encode_frame(&peer_identity(12003).heartbeat()).unwrap()).await;

        assert!(wait_for(|| table.len() == 1).await);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn sweeper_exits_on_cancel() {
        let table = Arc::new(PeerTable::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweeper(table, cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper must observe cancel quickly")
            .unwrap();
    }
}
