mod builder;
mod connection;
mod crawler;
mod session;
mod state;

pub use builder::{CrawlerBuilder, CrawlerBuilderError};
pub use crawler::{CrawlReport, Crawler, CrawlerError, VisitedPeer};

// Re-exports.
pub use monero_peers_connection::{ConnectionError, Network, Peer};
