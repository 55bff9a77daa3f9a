//! Example of using the monero-peers crawler.

use clap::Parser;
use log::LevelFilter;
use monero_peers_crawler::{CrawlerBuilder, Network};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Seed nodes to start from, as host:port or a bare host on the default port.
    #[arg(short, long, required = true)]
    seed: Vec<String>,

    /// Network to crawl (mainnet, testnet or stagenet).
    #[arg(short, long, default_value = "mainnet")]
    network: Network,

    /// Maximum number of concurrent tasks for crawling.
    #[arg(short, long, default_value = "250")]
    concurrent_tasks: usize,

    /// Seconds to wait for a handshake with each peer.
    #[arg(long, default_value = "20")]
    peer_timeout: u64,

    /// Stop the crawl after this many seconds.
    #[arg(short, long)]
    deadline: Option<u64>,

    /// SOCKS5 proxy (ip:port) to dial peers through.
    #[arg(short, long)]
    proxy: Option<String>,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    // Configure fern logger
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()?;

    log::info!("CRAWLING THE MONERO {} NETWORK", args.network);

    let mut builder = CrawlerBuilder::new(args.network)
        .with_max_concurrent_tasks(args.concurrent_tasks)
        .with_peer_timeout(Duration::from_secs(args.peer_timeout));
    if let Some(proxy) = args.proxy.clone() {
        log::debug!("Using SOCKS5 proxy: {proxy}");
        builder = builder.with_proxy(proxy)?;
    }
    if let Some(deadline) = args.deadline {
        builder = builder.with_crawl_deadline(Duration::from_secs(deadline));
    }

    let crawler = builder.build();

    // Ctrl-C ends the crawl early, keeping what was visited so far.
    let report = crawler
        .crawl_until(args.seed.as_slice(), async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| format!("Crawler error: {e}"))?;

    let mut visited: Vec<_> = report.visited.values().collect();
    visited.sort_by_key(|v| (v.peer.ip, v.peer.port));
    for peer in visited {
        println!("{peer}");
    }

    println!(
        "{} peers visited, {} reachable, {} unreachable",
        report.len(),
        report.reachable().count(),
        report.unreachable().count()
    );

    Ok(())
}
