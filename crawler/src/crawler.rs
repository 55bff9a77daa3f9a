use crate::connection::{Connector, PeerConnector};
use crate::session::{CrawlSession, SessionConfig};
use log::{debug, info};
use monero_peers_connection::{
    check_proxy, ConnectionConfiguration, ConnectionError, Network, Peer,
};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

/// The terminal outcome of one discovery attempt.
#[derive(Debug, Clone)]
pub struct VisitedPeer {
    /// The peer, enriched with the metadata it reported when the handshake succeeded.
    pub peer: Peer,
    /// Number of peers the handshake response advertised.
    pub discovered: usize,
    /// Why the attempt failed, if it did.
    pub error: Option<Arc<ConnectionError>>,
}

impl VisitedPeer {
    pub fn reachable(peer: Peer, discovered: usize) -> Self {
        VisitedPeer {
            peer,
            discovered,
            error: None,
        }
    }

    pub fn failed(peer: Peer, error: ConnectionError) -> Self {
        VisitedPeer {
            peer,
            discovered: 0,
            error: Some(Arc::new(error)),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for VisitedPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(
                f,
                "Reachable: {} ({} peers advertised)",
                self.peer, self.discovered
            ),
            Some(error) => write!(f, "Unreachable: {} ({error})", self.peer.address()),
        }
    }
}

/// Result of a crawl, every visited peer keyed by `ip:port`.
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub visited: HashMap<String, VisitedPeer>,
}

impl CrawlReport {
    pub fn new(visited: HashMap<String, VisitedPeer>) -> Self {
        CrawlReport { visited }
    }

    /// Peers which completed a handshake.
    pub fn reachable(&self) -> impl Iterator<Item = &VisitedPeer> {
        self.visited.values().filter(|v| v.is_reachable())
    }

    /// Peers whose attempt failed.
    pub fn unreachable(&self) -> impl Iterator<Item = &VisitedPeer> {
        self.visited.values().filter(|v| !v.is_reachable())
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

/// Errors which stop a crawl before any peer is visited.
#[derive(Debug)]
pub enum CrawlerError {
    /// No seed peers were given.
    NoSeeds,
    /// A seed could not be resolved to an IPv4 address.
    SeedResolution { seed: String, reason: String },
    /// The configured SOCKS5 proxy is unusable.
    Proxy(ConnectionError),
}

impl fmt::Display for CrawlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerError::NoSeeds => write!(f, "No seed peers given"),
            CrawlerError::SeedResolution { seed, reason } => {
                write!(f, "Cannot resolve seed {seed}: {reason}")
            }
            CrawlerError::Proxy(err) => write!(f, "Proxy unusable: {err}"),
        }
    }
}

impl std::error::Error for CrawlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrawlerError::Proxy(err) => Some(err),
            CrawlerError::NoSeeds | CrawlerError::SeedResolution { .. } => None,
        }
    }
}

/// Crawls the monero network by handshaking with every peer it learns about.
///
/// Built with a [`CrawlerBuilder`](crate::CrawlerBuilder). A crawler holds no
/// state between crawls, each call starts from its seeds.
#[derive(Debug, Clone)]
pub struct Crawler {
    network: Network,
    max_concurrent_tasks: usize,
    peer_timeout: Duration,
    connection_timeout: Duration,
    deadline: Option<Duration>,
    proxy: Option<SocketAddr>,
    stop_when_quiescent: bool,
}

impl Crawler {
    pub(crate) fn new(
        network: Network,
        max_concurrent_tasks: usize,
        peer_timeout: Duration,
        connection_timeout: Duration,
        deadline: Option<Duration>,
        proxy: Option<SocketAddr>,
        stop_when_quiescent: bool,
    ) -> Self {
        Crawler {
            network,
            max_concurrent_tasks,
            peer_timeout,
            connection_timeout,
            deadline,
            proxy,
            stop_when_quiescent,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Crawl from `seeds` until the network is exhausted or the deadline fires.
    ///
    /// Seeds are `host:port` strings, or a bare host which uses the network's
    /// default port.
    ///
    /// # Errors
    ///
    /// Fails only if no seed is given, a seed cannot be resolved, or the
    /// configured proxy does not accept connections. Failures against
    /// individual peers are recorded in the [`CrawlReport`].
    pub async fn crawl<S: AsRef<str>>(&self, seeds: &[S]) -> Result<CrawlReport, CrawlerError> {
        self.crawl_until(seeds, std::future::pending()).await
    }

    /// Like [`crawl`](Self::crawl), but also stops when `cancel` completes.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use monero_peers_crawler::{CrawlerBuilder, Network};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let crawler = CrawlerBuilder::new(Network::Mainnet).build();
    /// let report = crawler
    ///     .crawl_until(&["node.example.com:18080"], async {
    ///         let _ = tokio::signal::ctrl_c().await;
    ///     })
    ///     .await?;
    /// println!("{} reachable peers", report.reachable().count());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn crawl_until<S, F>(
        &self,
        seeds: &[S],
        cancel: F,
    ) -> Result<CrawlReport, CrawlerError>
    where
        S: AsRef<str>,
        F: Future<Output = ()>,
    {
        let seeds = self.resolve_seeds(seeds).await?;

        if let Some(proxy) = self.proxy {
            check_proxy(proxy, self.connection_timeout)
                .await
                .map_err(CrawlerError::Proxy)?;
            info!("Crawling through SOCKS5 proxy {proxy}");
        }

        let connector = PeerConnector::new(self.connection_configuration());
        Ok(self.crawl_with(connector, seeds, cancel).await)
    }

    /// Run a crawl session over any connector.
    pub(crate) async fn crawl_with<C, F>(
        &self,
        connector: C,
        seeds: Vec<Peer>,
        cancel: F,
    ) -> CrawlReport
    where
        C: Connector,
        F: Future<Output = ()>,
    {
        info!(
            "Crawling {} from {} seeds with {} workers",
            self.network,
            seeds.len(),
            self.max_concurrent_tasks
        );
        let config = SessionConfig {
            max_concurrent_tasks: self.max_concurrent_tasks,
            peer_timeout: self.peer_timeout,
            deadline: self.deadline,
            stop_when_quiescent: self.stop_when_quiescent,
        };
        CrawlSession::new(config, connector).run(seeds, cancel).await
    }

    fn connection_configuration(&self) -> ConnectionConfiguration {
        let config = ConnectionConfiguration::non_listening(self.network)
            .with_connection_timeout(self.connection_timeout);
        match self.proxy {
            Some(proxy) => config.with_proxy(proxy),
            None => config,
        }
    }

    async fn resolve_seeds<S: AsRef<str>>(&self, seeds: &[S]) -> Result<Vec<Peer>, CrawlerError> {
        if seeds.is_empty() {
            return Err(CrawlerError::NoSeeds);
        }

        let mut peers = Vec::with_capacity(seeds.len());
        for seed in seeds {
            peers.push(self.resolve_seed(seed.as_ref()).await?);
        }
        Ok(peers)
    }

    async fn resolve_seed(&self, seed: &str) -> Result<Peer, CrawlerError> {
        if let Ok(addr) = seed.parse::<SocketAddrV4>() {
            return Ok(Peer::from(addr));
        }
        if let Ok(ip) = seed.parse::<Ipv4Addr>() {
            return Ok(Peer::new(ip, self.network.default_port()));
        }

        let host = if seed.contains(':') {
            seed.to_string()
        } else {
            format!("{seed}:{}", self.network.default_port())
        };
        let resolution_error = |reason: String| CrawlerError::SeedResolution {
            seed: seed.to_string(),
            reason,
        };

        let mut addrs = tokio::net::lookup_host(host.as_str())
            .await
            .map_err(|e| resolution_error(e.to_string()))?;
        let addr = addrs
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(v4),
                SocketAddr::V6(_) => None,
            })
            .ok_or_else(|| resolution_error("no IPv4 address".to_string()))?;

        debug!("Resolved seed {seed} to {addr}");
        Ok(Peer::from(addr))
    }
}
