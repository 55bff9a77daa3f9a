//! Monero p2p session.
//!
//! This module opens connections to monero nodes and runs the levin exchanges a
//! crawler needs over them: the handshake which returns the node's peer list,
//! and a liveness ping.
//!
//! The [`Connection`] type is the recommended high-level API for most applications.
//!
//! # Examples
//!
//! Asking a monero node for its peers.
//!
//! ```no_run
//! use monero_peers_connection::{Connection, ConnectionConfiguration, Network, Peer};
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let peer = Peer::new(Ipv4Addr::new(127, 0, 0, 1), 18080);
//!
//! // Configure the connection as non-listening (appropriate for crawlers).
//! let config = ConnectionConfiguration::non_listening(Network::Mainnet);
//!
//! let mut connection = Connection::tcp(peer, config).await?;
//! let directory = connection.handshake(Duration::from_secs(10)).await?;
//! for peer in directory.peers.values() {
//!     println!("Learned about {peer}");
//! }
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

mod configuration;
mod error;
mod handshake;
mod io;
mod tcp;

pub use configuration::{
    ChainState, ConnectionConfiguration, Network, DEFAULT_CONNECTION_TIMEOUT, NON_LISTENING_PORT,
    SUPPORT_FLAG_FLUFFY_BLOCKS,
};
pub use error::ConnectionError;
pub use io::AsyncConnection;
pub use tcp::{check_proxy, TcpConnection};

use crate::levin::Message;
use crate::peer::Peer;
use crate::peer_list::PeerDirectory;
use std::time::Duration;

/// Provides a unified interface to different types of monero peer connections.
///
/// Sessions follow a simple lifecycle. [`Connection::tcp`] opens the transport,
/// [`handshake`](Connection::handshake) and [`ping`](Connection::ping) run
/// exchanges over it, and [`close`](Connection::close) releases it.
///
/// Note that `Connection` does *not* implement `Copy` or `Clone` as it owns I/O resources
/// that cannot be duplicated.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpConnection),
}

impl Connection {
    /// Open a TCP connection to a monero peer, directly or through the configured proxy.
    ///
    /// # Returns
    ///
    /// * `Ok(`[`Self`]`)` - An open connection, no handshake performed yet.
    /// * `Err(`[`ConnectionError`]`)` - `DialFailed`, `ProxyFailed` or `Timeout`.
    pub async fn tcp(
        peer: Peer,
        configuration: ConnectionConfiguration,
    ) -> Result<Self, ConnectionError> {
        Ok(Connection::Tcp(tcp::connect(peer, configuration).await?))
    }

    /// The peer this connection is established with.
    pub fn peer(&self) -> &Peer {
        match self {
            Connection::Tcp(conn) => conn.peer(),
        }
    }

    /// Perform the handshake and return the peer directory from the response.
    pub async fn handshake(&mut self, max_wait: Duration) -> Result<PeerDirectory, ConnectionError> {
        match self {
            Connection::Tcp(conn) => conn.handshake(max_wait).await,
        }
    }

    /// Check the peer is alive.
    pub async fn ping(&mut self, max_wait: Duration) -> Result<(), ConnectionError> {
        match self {
            Connection::Tcp(conn) => conn.ping(max_wait).await,
        }
    }

    /// Send a raw levin frame.
    pub async fn send(&mut self, message: &Message) -> Result<(), ConnectionError> {
        match self {
            Connection::Tcp(conn) => conn.send(message).await,
        }
    }

    /// Receive a raw levin frame.
    pub async fn receive(&mut self) -> Result<Message, ConnectionError> {
        match self {
            Connection::Tcp(conn) => conn.receive().await,
        }
    }

    /// Release the connection. Idempotent.
    pub async fn close(&mut self) {
        match self {
            Connection::Tcp(conn) => conn.close().await,
        }
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connection::Tcp(tcp) => tcp.fmt(f),
        }
    }
}
