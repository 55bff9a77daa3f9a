//! Builder pattern for configuring and creating crawler instances.

use crate::crawler::Crawler;
use monero_peers_connection::{Network, DEFAULT_CONNECTION_TIMEOUT};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Default maximum number of concurrent connection tasks.
const DEFAULT_MAX_CONCURRENT_TASKS: usize = 250;
/// Default timeout for a handshake with one peer.
const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors that can occur during crawler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlerBuilderError {
    /// Proxy address is not an `ip:port` socket address.
    InvalidProxy(String),
}

impl fmt::Display for CrawlerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerBuilderError::InvalidProxy(proxy) => {
                write!(f, "Invalid proxy address: {proxy}")
            }
        }
    }
}

impl std::error::Error for CrawlerBuilderError {}

/// Builder for creating a customized [`Crawler`] instance.
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), monero_peers_crawler::CrawlerBuilderError> {
/// use std::time::Duration;
/// use monero_peers_crawler::{CrawlerBuilder, Network};
///
/// // Create a basic crawler for mainnet
/// let basic_crawler = CrawlerBuilder::new(Network::Mainnet).build();
///
/// // Create a crawler with custom settings
/// let custom_crawler = CrawlerBuilder::new(Network::Stagenet)
///     .with_proxy("127.0.0.1:9050")?
///     .with_max_concurrent_tasks(64)
///     .with_peer_timeout(Duration::from_secs(10))
///     .with_crawl_deadline(Duration::from_secs(600))
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CrawlerBuilder {
    /// Monero network the crawler will operate on.
    network: Network,
    /// Maximum number of concurrent connection tasks.
    max_concurrent_tasks: usize,
    /// Timeout for the handshake with one peer.
    peer_timeout: Duration,
    /// Timeout for establishing a connection.
    connection_timeout: Duration,
    /// Overall crawl deadline.
    deadline: Option<Duration>,
    /// SOCKS5 proxy to dial through.
    proxy: Option<SocketAddr>,
    stop_when_quiescent: bool,
}

impl CrawlerBuilder {
    /// Create a new crawler builder for the specified network.
    pub fn new(network: Network) -> Self {
        CrawlerBuilder {
            network,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            deadline: None,
            proxy: None,
            stop_when_quiescent: true,
        }
    }

    /// Dial every peer through a SOCKS5 proxy at `ip:port`.
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining if the address parses.
    /// * `Err(CrawlerBuilderError)` - If the address is not an `ip:port` pair.
    pub fn with_proxy<S: Into<String>>(mut self, proxy: S) -> Result<Self, CrawlerBuilderError> {
        let proxy = proxy.into();
        let addr = proxy
            .parse::<SocketAddr>()
            .map_err(|_| CrawlerBuilderError::InvalidProxy(proxy))?;
        self.proxy = Some(addr);
        Ok(self)
    }

    /// Set the number of worker tasks.
    ///
    /// Controls how many peers can be tested simultaneously. Higher values
    /// may speed up crawling, but increase resource usage and network load.
    /// Values below 1 are raised to 1.
    ///
    /// # Recommendations
    ///
    /// * **Conservative (8-32)** - For slow networks, or when crawling through Tor.
    /// * **Default (250)** - Good balance for a crawl of the full network.
    pub fn with_max_concurrent_tasks(mut self, max_tasks: usize) -> Self {
        self.max_concurrent_tasks = max_tasks.max(1);
        self
    }

    /// Set the timeout for the handshake with a single peer.
    ///
    /// A peer which does not answer within this time is recorded as visited
    /// with a timeout error (defaults to 20 seconds).
    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    /// Set the timeout for establishing each connection (defaults to 10 seconds).
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Stop the crawl after `deadline`, returning what was visited so far.
    ///
    /// Without a deadline the crawl runs until the network is exhausted.
    pub fn with_crawl_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether to end the crawl once no peer is queued or in flight (defaults to true).
    ///
    /// When disabled the crawl only ends on its deadline or cancellation.
    pub fn with_stop_when_quiescent(mut self, stop: bool) -> Self {
        self.stop_when_quiescent = stop;
        self
    }

    /// Build the crawler with the configured options.
    pub fn build(self) -> Crawler {
        Crawler::new(
            self.network,
            self.max_concurrent_tasks,
            self.peer_timeout,
            self.connection_timeout,
            self.deadline,
            self.proxy,
            self.stop_when_quiescent,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_proxy() {
        let result = CrawlerBuilder::new(Network::Mainnet).with_proxy("localhost");
        assert_eq!(
            result.unwrap_err(),
            CrawlerBuilderError::InvalidProxy("localhost".to_string())
        );
    }

    #[test]
    fn test_zero_tasks_raised() {
        let builder = CrawlerBuilder::new(Network::Mainnet).with_max_concurrent_tasks(0);
        assert_eq!(builder.max_concurrent_tasks, 1);
    }

    #[test]
    fn test_defaults() {
        let builder = CrawlerBuilder::new(Network::Testnet);
        assert_eq!(builder.max_concurrent_tasks, 250);
        assert_eq!(builder.peer_timeout, DEFAULT_PEER_TIMEOUT);
        assert!(builder.deadline.is_none());
        assert!(builder.stop_when_quiescent);
        assert_eq!(builder.build().network(), Network::Testnet);
    }
}
