//! Internal peer connection abstractions for testing and mocking.
//!
//! This module provides the [`PeerConnection`] trait that abstracts monero peer
//! connections, enabling dependency injection for testing without modifying
//! the core crawler logic.

use monero_peers_connection::{
    Connection, ConnectionConfiguration, ConnectionError, Peer, PeerDirectory,
};
use std::time::Duration;

/// Internal trait for monero peer connections that can run a handshake.
///
/// This trait abstracts the core operations needed for crawling, allowing
/// for easy testing with mock implementations.
pub trait PeerConnection: Send {
    /// Handshake with the peer and return the peers it advertises.
    fn handshake(
        &mut self,
        peer_timeout: Duration,
    ) -> impl std::future::Future<Output = Result<PeerDirectory, ConnectionError>> + Send;

    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send;
}

/// Implementation of PeerConnection for the Connection type from monero-peers-connection.
impl PeerConnection for Connection {
    fn handshake(
        &mut self,
        peer_timeout: Duration,
    ) -> impl std::future::Future<Output = Result<PeerDirectory, ConnectionError>> + Send {
        Connection::handshake(self, peer_timeout)
    }

    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send {
        Connection::close(self)
    }
}

/// Factory trait for creating peer connections.
///
/// This trait enables dependency injection for connection creation,
/// allowing different implementations for production and testing.
pub trait Connector: Clone + Send + Sync + 'static {
    type Connection: PeerConnection + Send;

    /// Create a connection to the specified peer.
    fn connect(
        &self,
        peer: &Peer,
    ) -> impl std::future::Future<Output = Result<Self::Connection, ConnectionError>> + Send;
}

/// Standard connector that creates real TCP connections.
#[derive(Debug, Clone)]
pub struct PeerConnector {
    config: ConnectionConfiguration,
}

impl PeerConnector {
    /// Create a new connector with the given configuration.
    pub fn new(config: ConnectionConfiguration) -> Self {
        Self { config }
    }
}

impl Connector for PeerConnector {
    type Connection = Connection;

    fn connect(
        &self,
        peer: &Peer,
    ) -> impl std::future::Future<Output = Result<Self::Connection, ConnectionError>> + Send {
        let peer = peer.clone();
        let config = self.config.clone();
        async move { Connection::tcp(peer, config).await }
    }
}

#[cfg(test)]
pub mod test_utils {
    //! A fake peer graph behind the [`Connector`] seam.

    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// How a mock node behaves when visited.
    #[derive(Debug, Clone)]
    pub enum MockNode {
        /// Completes the handshake, advertising these peers.
        Advertises(Vec<Peer>),
        /// Refuses the TCP connection.
        Refuses,
        /// Accepts the connection but never answers the handshake.
        Silent,
    }

    /// Shorthand for a test peer at `10.0.0.<last>:18080`.
    pub fn node(last: u8) -> Peer {
        Peer::new(Ipv4Addr::new(10, 0, 0, last), 18080)
    }

    /// Mock implementation of PeerConnection for testing.
    #[derive(Debug)]
    pub struct MockPeerConnection {
        behavior: MockNode,
        open: Arc<AtomicUsize>,
    }

    impl Drop for MockPeerConnection {
        fn drop(&mut self) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl PeerConnection for MockPeerConnection {
        async fn handshake(
            &mut self,
            peer_timeout: Duration,
        ) -> Result<PeerDirectory, ConnectionError> {
            match &self.behavior {
                MockNode::Advertises(peers) => {
                    let mut directory = PeerDirectory::default();
                    directory.chain.current_height = Some(3_000_000);
                    for peer in peers {
                        directory.peers.insert(peer.address(), peer.clone());
                    }
                    Ok(directory)
                }
                MockNode::Silent => {
                    tokio::time::sleep(peer_timeout).await;
                    Err(ConnectionError::Timeout)
                }
                MockNode::Refuses => Err(ConnectionError::Closed),
            }
        }

        async fn close(&mut self) {}
    }

    /// Mock connector serving a fixed peer graph.
    ///
    /// Addresses missing from the graph refuse connections.
    #[derive(Debug, Clone)]
    pub struct MockConnector {
        graph: Arc<HashMap<String, MockNode>>,
        /// Every connect attempt, by address.
        attempts: Arc<Mutex<Vec<String>>>,
        /// Connections currently alive.
        open: Arc<AtomicUsize>,
    }

    impl MockConnector {
        pub fn new(nodes: Vec<(Peer, MockNode)>) -> Self {
            Self {
                graph: Arc::new(
                    nodes
                        .into_iter()
                        .map(|(peer, node)| (peer.address(), node))
                        .collect(),
                ),
                attempts: Arc::new(Mutex::new(Vec::new())),
                open: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }

        pub fn open_connections(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }

        /// Number of live clones, one per worker still holding the connector.
        pub fn holders(&self) -> usize {
            Arc::strong_count(&self.graph)
        }
    }

    impl Connector for MockConnector {
        type Connection = MockPeerConnection;

        fn connect(
            &self,
            peer: &Peer,
        ) -> impl std::future::Future<Output = Result<Self::Connection, ConnectionError>> + Send
        {
            let address = peer.address();
            self.attempts.lock().unwrap().push(address.clone());
            let behavior = self.graph.get(&address).cloned();
            let open = self.open.clone();
            async move {
                match behavior {
                    Some(MockNode::Refuses) | None => Err(ConnectionError::DialFailed(
                        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                    )),
                    Some(behavior) => {
                        open.fetch_add(1, Ordering::SeqCst);
                        Ok(MockPeerConnection { behavior, open })
                    }
                }
            }
        }
    }
}
