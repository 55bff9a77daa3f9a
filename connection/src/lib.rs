//! Monero p2p connections.
//!
//! Layered bottom up: [`varint`] and [`storage`] implement the portable storage
//! encoding, [`levin`] the message framing, [`transport`] async frame I/O, and
//! [`Connection`] the session a crawler drives.

mod connection;
pub mod levin;
mod peer;
mod peer_list;
pub mod storage;
pub mod transport;
pub mod varint;

pub use connection::{
    check_proxy, AsyncConnection, ChainState, Connection, ConnectionConfiguration,
    ConnectionError, Network, TcpConnection, DEFAULT_CONNECTION_TIMEOUT, NON_LISTENING_PORT,
    SUPPORT_FLAG_FLUFFY_BLOCKS,
};
pub use peer::{ChainMeta, NodeMeta, Peer};
pub use peer_list::{ip_from_raw, PeerDirectory};
pub use storage::{PortableStorage, StorageError};
pub use transport::TransportError;
