//! Local node identity: name, IPv4 address, transfer port, OS tag.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use landrop_protocol::Message;
use tracing::warn;

/// The identity a node publishes in its heartbeats.
///
/// Computed once at startup and never mutated. `port` is the TCP transfer
/// port, not the UDP broadcast port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub name: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub os: String,
}

impl NodeIdentity {
    /// Resolves the identity for this node.
    ///
    /// `name` overrides the default `node_<last-octet>_<port>` naming.
    pub fn resolve(name: Option<String>, port: u16) -> Self {
        let ip = local_ipv4();
        let name = name.unwrap_or_else(|| format!("node_{}_{}", ip.octets()[3], port));
        Self {
            name,
            ip,
            port,
            os: detect_os().to_string(),
        }
    }

    /// The TCP endpoint peers connect to for transfers.
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Builds the heartbeat message announcing this identity.
    pub fn heartbeat(&self) -> Message {
        Message::Heartbeat {
            name: self.name.clone(),
            ip: self.ip,
            port: self.port,
            os: self.os.clone(),
        }
    }
}

/// Determines the local LAN IPv4 address.
///
/// Connects an ephemeral UDP socket to an external address and reads the
/// source address the kernel picked; no packet is sent. Falls back to
/// loopback when the host has no route.
pub fn local_ipv4() -> Ipv4Addr {
    fn probe() -> std::io::Result<Ipv4Addr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        match socket.local_addr()? {
            SocketAddr::V4(addr) => Ok(*addr.ip()),
            SocketAddr::V6(_) => Err(std::io::Error::other("expected an IPv4 source address")),
        }
    }

    match probe() {
        Ok(ip) => ip,
        Err(e) => {
            warn!(error = %e, "could not determine LAN address, using loopback");
            Ipv4Addr::LOCALHOST
        }
    }
}

/// Returns the OS family tag published in heartbeats.
pub fn detect_os() -> &'static str {
    std::env::consts::OS
}
