//! Peer directory decoded from a handshake or timed sync payload.
//!
//! A response carries three sections of interest at its root.
//!
//! * `node_data` - the responder's `peer_id` and `rpc_port`.
//! * `payload_data` - the responder's `current_height` and `top_version`.
//! * `local_peerlist_new` - an array of peer entries.
//!
//! Each peer entry locates its address under `adr.addr`, which comes in two
//! shapes on the live network.
//!
//! ```text
//! adr: { type, addr: { m_ip: u32, m_port: u16 } }
//! adr: { type, addr: { addr: <4 raw ip bytes>, m_port: u16 } }
//! ```
//!
//! Entries with the raw bytes one level up, `adr: { addr: <4 bytes>, m_port }`,
//! are accepted as well.

use crate::peer::{ChainMeta, NodeMeta, Peer};
use crate::storage::{Section, Value};
use log::debug;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Peers and node metadata decoded from a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDirectory {
    /// Advertised peers keyed by `ip:port`.
    pub peers: HashMap<String, Peer>,
    pub node: NodeMeta,
    pub chain: ChainMeta,
    /// Peer entries skipped because their IP or port could not be resolved.
    pub dropped: usize,
}

impl PeerDirectory {
    /// Scan the root entries of a response for the node, chain and peer list sections.
    ///
    /// Missing sections leave the matching fields empty. Peer entries without
    /// both an IP and a non-zero port are dropped rather than defaulted.
    pub fn from_section(root: &Section) -> Self {
        let mut directory = PeerDirectory::default();

        if let Some(node_data) = root.section("node_data") {
            directory.node = NodeMeta {
                rpc_port: node_data.get("rpc_port").and_then(to_u16),
                peer_id: node_data.get("peer_id").and_then(Value::to_u64),
            };
        }

        if let Some(payload_data) = root.section("payload_data") {
            directory.chain = ChainMeta {
                current_height: payload_data.get("current_height").and_then(Value::to_u64),
                top_version: payload_data
                    .get("top_version")
                    .and_then(Value::to_u64)
                    .and_then(|v| u8::try_from(v).ok()),
            };
        }

        if let Some(list) = root.get("local_peerlist_new").and_then(Value::as_array) {
            for entry in list {
                match entry.as_section().and_then(parse_peer_entry) {
                    Some(peer) => {
                        directory.peers.insert(peer.address(), peer);
                    }
                    None => directory.dropped += 1,
                }
            }
        }

        if directory.dropped > 0 {
            debug!(
                "Dropped {} incomplete peer entries, kept {}",
                directory.dropped,
                directory.peers.len()
            );
        }

        directory
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

fn to_u16(value: &Value) -> Option<u16> {
    value.to_u64().and_then(|v| u16::try_from(v).ok())
}

/// Reassemble the raw `m_ip` value into an address.
///
/// The first octet is the least significant byte.
pub fn ip_from_raw(raw: u32) -> Ipv4Addr {
    Ipv4Addr::from(raw.to_le_bytes())
}

/// Exactly four raw address bytes, first octet first.
fn raw_ipv4(value: &Value) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = value.as_bytes()?.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

fn parse_peer_entry(entry: &Section) -> Option<Peer> {
    let adr = entry.section("adr")?;

    let (ip, port) = match adr.get("addr")? {
        Value::Object(addr) => {
            let ip = match addr.get("m_ip") {
                Some(raw) => ip_from_raw(u32::try_from(raw.to_u64()?).ok()?),
                None => raw_ipv4(addr.get("addr")?)?,
            };
            (ip, addr.get("m_port").and_then(to_u16)?)
        }
        // Raw bytes directly under `adr`, with the port beside them.
        raw @ Value::String(_) => (raw_ipv4(raw)?, adr.get("m_port").and_then(to_u16)?),
        _ => return None,
    };
    if port == 0 {
        return None;
    }

    let mut peer = Peer::new(ip, port);
    peer.id = entry.get("id").and_then(Value::to_u64);
    peer.rpc_port = entry
        .get("rpc_port")
        .and_then(to_u16)
        .filter(|&port| port != 0);
    Some(peer)
}
