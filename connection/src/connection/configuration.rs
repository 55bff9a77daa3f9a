//! Connection configuration types and constants.

use crate::levin::MAX_HANDSHAKE_PAYLOAD_SIZE;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Port advertised by a node which does not accept incoming connections.
///
/// Peers do not add a node advertising port 0 to their peer lists.
pub const NON_LISTENING_PORT: u32 = 0;

/// Default timeout for connection establishment.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Support flag for fluffy (compact) block relay.
pub const SUPPORT_FLAG_FLUFFY_BLOCKS: u32 = 0x01;

/// The monero network a connection joins.
///
/// Nodes drop handshakes advertising a different network id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Stagenet,
}

impl Network {
    /// 16 byte network id sent in `node_data`.
    pub fn network_id(self) -> [u8; 16] {
        let last = match self {
            Network::Mainnet => 0x10,
            Network::Testnet => 0x11,
            Network::Stagenet => 0x12,
        };
        [
            0x12, 0x30, 0xf1, 0x71, 0x61, 0x04, 0x41, 0x61, 0x17, 0x31, 0x00, 0x82, 0x16, 0xa1,
            0xa1, last,
        ]
    }

    /// Default P2P port.
    pub fn default_port(self) -> u16 {
        match self {
            Network::Mainnet => 18080,
            Network::Testnet => 28080,
            Network::Stagenet => 38080,
        }
    }

    /// Id of the genesis block, advertised as the top block of a node with no chain.
    pub fn genesis_id(self) -> [u8; 32] {
        match self {
            Network::Mainnet => [
                0x41, 0x80, 0x15, 0xbb, 0x9a, 0xe9, 0x82, 0xa1, 0x97, 0x5d, 0xa7, 0xd7, 0x92,
                0x77, 0xc2, 0x70, 0x57, 0x27, 0xa5, 0x68, 0x94, 0xba, 0x0f, 0xb2, 0x46, 0xad,
                0xaa, 0xbb, 0x1f, 0x46, 0x32, 0xe3,
            ],
            Network::Testnet => [
                0x48, 0xca, 0x7c, 0xd3, 0xc8, 0xde, 0x5b, 0x6a, 0x4d, 0x53, 0xd2, 0x86, 0x1f,
                0xbd, 0xae, 0xdc, 0xa1, 0x41, 0x55, 0x35, 0x59, 0xf9, 0xbe, 0x95, 0x20, 0x06,
                0x80, 0x53, 0xcd, 0xa8, 0x43, 0x0b,
            ],
            Network::Stagenet => [
                0x76, 0xee, 0x3c, 0xc9, 0x86, 0x46, 0x29, 0x22, 0x06, 0xcd, 0x3e, 0x86, 0xf7,
                0x4d, 0x88, 0xb4, 0xdc, 0xc1, 0xd9, 0x37, 0x08, 0x86, 0x45, 0xe9, 0xb0, 0xcb,
                0xca, 0x84, 0xb7, 0xce, 0x74, 0xeb,
            ],
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Stagenet => write!(f, "stagenet"),
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "stagenet" | "stage" => Ok(Network::Stagenet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// Chain state advertised in the handshake `payload_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainState {
    pub current_height: u64,
    pub cumulative_difficulty: u64,
    pub top_id: [u8; 32],
    pub top_version: u8,
    pub pruning_seed: u32,
}

impl ChainState {
    /// A node which only has the genesis block.
    pub fn genesis(network: Network) -> Self {
        ChainState {
            current_height: 1,
            cumulative_difficulty: 1,
            top_id: network.genesis_id(),
            top_version: 1,
            pruning_seed: 0,
        }
    }
}

/// Configuration used to build a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfiguration {
    pub network: Network,
    /// Port advertised in `node_data`.
    pub my_port: u32,
    /// Support flags advertised in `node_data` and answered to `support_flags` requests.
    pub support_flags: u32,
    pub chain: ChainState,
    /// SOCKS5 proxy to dial through, if any.
    pub proxy: Option<SocketAddr>,
    /// Timeout for connection establishment.
    pub connection_timeout: Duration,
    /// Largest levin payload accepted from the peer.
    pub max_payload_size: u64,
}

impl ConnectionConfiguration {
    /// Creates a new configuration for a non-listening node.
    ///
    /// This configuration advertises port 0 and a chain consisting of only the
    /// genesis block. Frames are capped at [`MAX_HANDSHAKE_PAYLOAD_SIZE`], the
    /// limit a node applies to a peer that has not completed a handshake. It's suitable for crawlers and other software that just
    /// wants to query the network without accepting incoming connections.
    pub fn non_listening(network: Network) -> Self {
        Self {
            network,
            my_port: NON_LISTENING_PORT,
            support_flags: SUPPORT_FLAG_FLUFFY_BLOCKS,
            chain: ChainState::genesis(network),
            proxy: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_payload_size: MAX_HANDSHAKE_PAYLOAD_SIZE,
        }
    }

    /// Set the timeout for connection establishment.
    ///
    /// This covers the TCP connect, and the SOCKS5 negotiation when a proxy is set.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use monero_peers_connection::{ConnectionConfiguration, Network};
    ///
    /// let config = ConnectionConfiguration::non_listening(Network::Mainnet)
    ///     .with_connection_timeout(Duration::from_secs(30));
    /// assert_eq!(config.connection_timeout, Duration::from_secs(30));
    /// ```
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Dial peers through a SOCKS5 proxy.
    pub fn with_proxy(mut self, proxy: SocketAddr) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set the largest payload accepted before rejecting a frame.
    pub fn with_max_payload_size(mut self, max: u64) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Advertise a different chain state.
    pub fn with_chain_state(mut self, chain: ChainState) -> Self {
        self.chain = chain;
        self
    }
}

impl fmt::Display for ConnectionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proxy = match &self.proxy {
            Some(proxy) => proxy.to_string(),
            None => "none".to_string(),
        };

        write!(
            f,
            "ConnectionConfiguration {{ network: {}, my_port: {}, height: {}, proxy: {}, timeout: {:?} }}",
            self.network, self.my_port, self.chain.current_height, proxy, self.connection_timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_configuration_timeout() {
        let config = ConnectionConfiguration::non_listening(Network::Mainnet);
        assert_eq!(config.connection_timeout, DEFAULT_CONNECTION_TIMEOUT);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));

        let custom_timeout = Duration::from_secs(30);
        let config_with_timeout = config.with_connection_timeout(custom_timeout);
        assert_eq!(config_with_timeout.connection_timeout, custom_timeout);
    }

    #[test]
    fn test_non_listening_defaults() {
        let config = ConnectionConfiguration::non_listening(Network::Stagenet);
        assert_eq!(config.my_port, NON_LISTENING_PORT);
        assert_eq!(config.chain.current_height, 1);
        assert_eq!(config.chain.top_id, Network::Stagenet.genesis_id());
        assert!(config.proxy.is_none());
        assert_eq!(config.max_payload_size, MAX_HANDSHAKE_PAYLOAD_SIZE);
        assert_eq!(config.max_payload_size, 262_144);
    }

    #[test]
    fn test_network_ids_differ_in_last_byte() {
        let main = Network::Mainnet.network_id();
        let test = Network::Testnet.network_id();
        assert_eq!(main[..15], test[..15]);
        assert_eq!(main[15], 0x10);
        assert_eq!(test[15], 0x11);
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("Mainnet".parse::<Network>(), Ok(Network::Mainnet));
        assert_eq!("stage".parse::<Network>(), Ok(Network::Stagenet));
        assert!("regtest".parse::<Network>().is_err());
        assert_eq!(Network::Testnet.default_port(), 28080);
    }
}
