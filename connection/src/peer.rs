//! Monero peer information structures.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Represents a monero peer on the network.
///
/// Identity is the `ip:port` [`address`](Peer::address). The optional fields are
/// metadata learned either from the peer list entry which advertised this
/// peer, or from a handshake with the peer itself. Equality and hashing only
/// look at `ip` and `port`, so a peer enriched by a handshake is still the same
/// peer.
#[derive(Debug, Clone)]
pub struct Peer {
    /// IPv4 address of the peer.
    pub ip: Ipv4Addr,
    /// P2P port the peer is listening on.
    pub port: u16,
    /// Peer id the node advertises.
    pub id: Option<u64>,
    /// Restricted RPC port, if the node advertises one.
    pub rpc_port: Option<u16>,
    /// Chain height reported in a handshake.
    pub current_height: Option<u64>,
    /// Hard fork version reported in a handshake.
    pub top_version: Option<u8>,
}

impl Peer {
    /// Create a new peer with no metadata.
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Peer {
            ip,
            port,
            id: None,
            rpc_port: None,
            current_height: None,
            top_version: None,
        }
    }

    /// The `ip:port` key which identifies this peer.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Returns a new peer with the metadata a handshake revealed.
    ///
    /// Fields the handshake did not carry keep their current value.
    pub fn with_node_info(&self, node: &NodeMeta, chain: &ChainMeta) -> Self {
        Peer {
            ip: self.ip,
            port: self.port,
            id: node.peer_id.or(self.id),
            rpc_port: node.rpc_port.or(self.rpc_port),
            current_height: chain.current_height.or(self.current_height),
            top_version: chain.top_version.or(self.top_version),
        }
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip && self.port == other.port
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ip.hash(state);
        self.port.hash(state);
    }
}

impl From<SocketAddrV4> for Peer {
    fn from(addr: SocketAddrV4) -> Self {
        Peer::new(*addr.ip(), addr.port())
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)?;
        if let Some(height) = self.current_height {
            write!(f, " (height: {height}")?;
            if let Some(version) = self.top_version {
                write!(f, ", version: {version}")?;
            }
            if let Some(rpc_port) = self.rpc_port {
                write!(f, ", rpc: {rpc_port}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// What a node says about itself in `node_data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeMeta {
    pub rpc_port: Option<u16>,
    pub peer_id: Option<u64>,
}

/// What a node says about its chain in `payload_data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainMeta {
    pub current_height: Option<u64>,
    pub top_version: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_key() {
        let peer = Peer::new(Ipv4Addr::new(1, 2, 3, 4), 18080);
        assert_eq!(peer.address(), "1.2.3.4:18080");
        assert_eq!(peer.to_string(), "1.2.3.4:18080");
        assert_eq!(peer.socket_addr().to_string(), "1.2.3.4:18080");
    }

    #[test]
    fn test_with_node_info_keeps_known_fields() {
        let mut peer = Peer::new(Ipv4Addr::new(10, 0, 0, 1), 18080);
        peer.id = Some(9);
        peer.rpc_port = Some(18089);

        let updated = peer.with_node_info(
            &NodeMeta {
                rpc_port: None,
                peer_id: Some(10),
            },
            &ChainMeta {
                current_height: Some(3_000_000),
                top_version: Some(16),
            },
        );

        assert_eq!(updated.id, Some(10));
        assert_eq!(updated.rpc_port, Some(18089));
        assert_eq!(updated.current_height, Some(3_000_000));
        assert_eq!(updated.top_version, Some(16));
        assert_eq!(updated.address(), peer.address());
        assert_eq!(
            updated.to_string(),
            "10.0.0.1:18080 (height: 3000000, version: 16, rpc: 18089)"
        );
    }

    #[test]
    fn test_identity_ignores_metadata() {
        use std::collections::HashSet;

        let peer = Peer::new(Ipv4Addr::new(10, 0, 0, 1), 18080);
        let enriched = peer.with_node_info(
            &NodeMeta {
                rpc_port: Some(18089),
                peer_id: Some(7),
            },
            &ChainMeta {
                current_height: Some(3_000_000),
                top_version: Some(16),
            },
        );
        assert_eq!(peer, enriched);

        let mut seen = HashSet::new();
        seen.insert(peer);
        assert!(!seen.insert(enriched));
        assert!(seen.insert(Peer::new(Ipv4Addr::new(10, 0, 0, 1), 18081)));
        assert_eq!(seen.len(), 2);
    }
}
