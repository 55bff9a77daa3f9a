//! Internal session coordination for crawling operations.
//!
//! This module contains the [`CrawlSession`] which orchestrates the crawling process
//! by supervising a fixed pool of worker tasks over the shared [`CrawlerState`].

use crate::connection::{Connector, PeerConnection};
use crate::crawler::{CrawlReport, VisitedPeer};
use crate::state::CrawlerState;
use log::{debug, info, warn};
use monero_peers_connection::Peer;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep, sleep_until, Instant};

/// How long an idle worker sleeps before checking for work again.
const IDLE_POLL: Duration = Duration::from_millis(100);
/// How often the supervisor logs progress.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for a crawl session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_concurrent_tasks: usize,
    pub peer_timeout: Duration,
    /// Overall crawl deadline, measured from the start of the session.
    pub deadline: Option<Duration>,
    /// End the crawl once nothing is queued or in flight.
    pub stop_when_quiescent: bool,
}

/// Internal coordinator for a crawling session.
///
/// # Architecture
///
/// * **Workers** (`work()`) - A fixed pool of tasks which each take a not
///   visited peer, handshake with it and report what they found.
/// * **Supervisor** (`run()`) - Queues found peers, records visits and decides
///   when the crawl is over. It is the only writer of queued and visited peers.
///
/// Workers report over two channels, found peers first and the visit second, so
/// the supervisor can drain found peers before it checks for quiescence.
pub struct CrawlSession<C: Connector> {
    config: SessionConfig,
    connector: C,
    state: CrawlerState,
    /// Wakes idle workers when peers are queued.
    wake: Arc<Notify>,
}

impl<C: Connector> CrawlSession<C> {
    pub fn new(config: SessionConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            state: CrawlerState::new(),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Crawl outward from `seeds` until quiescence, the deadline, or `cancel` completes.
    ///
    /// All workers are joined before returning. Visits recorded up to that
    /// point make up the report.
    pub async fn run<F>(self, seeds: Vec<Peer>, cancel: F) -> CrawlReport
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        for seed in seeds {
            if !self.enqueue(seed).await {
                debug!("Skipping duplicate seed");
            }
        }

        let (found_tx, mut found_rx) = mpsc::unbounded_channel::<Vec<Peer>>();
        let (visited_tx, mut visited_rx) = mpsc::unbounded_channel::<VisitedPeer>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut workers = JoinSet::new();
        for id in 0..self.config.max_concurrent_tasks.max(1) {
            workers.spawn(work(
                id,
                self.connector.clone(),
                self.state.clone(),
                self.wake.clone(),
                found_tx.clone(),
                visited_tx.clone(),
                shutdown_rx.clone(),
                self.config.peer_timeout,
            ));
        }
        drop(found_tx);
        drop(visited_tx);

        let deadline = self.config.deadline.map(|d| started + d);
        let deadline = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(cancel);

        let mut progress = interval_at(started + PROGRESS_INTERVAL, PROGRESS_INTERVAL);

        loop {
            tokio::select! {
                Some(peers) = found_rx.recv() => {
                    self.enqueue_all(peers).await;
                }
                Some(visited) = visited_rx.recv() => {
                    // Queue what the visit found before judging quiescence.
                    while let Ok(peers) = found_rx.try_recv() {
                        self.enqueue_all(peers).await;
                    }
                    debug!("Visited {visited}");
                    self.state.mark_visited(visited).await;

                    if self.config.stop_when_quiescent && self.state.is_quiescent().await {
                        info!("Crawler exhausted - all discovered peers visited");
                        break;
                    }
                }
                _ = &mut deadline => {
                    info!("Crawl deadline reached after {:?}", started.elapsed());
                    break;
                }
                _ = &mut cancel => {
                    info!("Crawl cancelled");
                    break;
                }
                _ = progress.tick() => {
                    let counts = self.state.counts().await;
                    info!(
                        "{} visited, {} in flight, {} waiting (workers: {})",
                        counts.visited, counts.in_flight, counts.not_visited, workers.len()
                    );
                }
            }
        }

        // Dropping in flight attempts closes their connections.
        let _ = shutdown_tx.send(true);
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                warn!("Crawl worker failed: {e}");
            }
        }

        // Attempts which finished before the workers saw the shutdown still count.
        while let Ok(visited) = visited_rx.try_recv() {
            self.state.mark_visited(visited).await;
        }

        let report = CrawlReport::new(self.state.take_visited().await);
        info!(
            "Crawl finished in {:?}: {} visited, {} reachable",
            started.elapsed(),
            report.len(),
            report.reachable().count()
        );
        report
    }

    async fn enqueue(&self, peer: Peer) -> bool {
        let queued = self.state.try_enqueue(peer).await;
        if queued {
            self.wake.notify_one();
        }
        queued
    }

    async fn enqueue_all(&self, peers: Vec<Peer>) {
        let mut queued = 0;
        for peer in peers {
            if self.enqueue(peer).await {
                queued += 1;
            }
        }
        if queued > 0 {
            debug!("Queued {queued} new peers");
        }
    }
}

/// Handshake with one peer, returning the visit and the peers it advertised.
async fn visit<C: Connector>(
    connector: &C,
    peer: Peer,
    peer_timeout: Duration,
) -> (VisitedPeer, Vec<Peer>) {
    let mut conn = match connector.connect(&peer).await {
        Ok(conn) => conn,
        Err(e) => {
            debug!("Failed to connect to {peer}: {e}");
            return (VisitedPeer::failed(peer, e), Vec::new());
        }
    };

    let result = conn.handshake(peer_timeout).await;
    conn.close().await;

    match result {
        Ok(directory) => {
            let enriched = peer.with_node_info(&directory.node, &directory.chain);
            let found: Vec<Peer> = directory.peers.into_values().collect();
            (VisitedPeer::reachable(enriched, found.len()), found)
        }
        Err(e) => {
            debug!("Handshake with {peer} failed: {e}");
            (VisitedPeer::failed(peer, e), Vec::new())
        }
    }
}

/// Worker loop: take a peer, visit it, report, repeat until shutdown.
#[allow(clippy::too_many_arguments)]
async fn work<C: Connector>(
    id: usize,
    connector: C,
    state: CrawlerState,
    wake: Arc<Notify>,
    found_tx: mpsc::UnboundedSender<Vec<Peer>>,
    visited_tx: mpsc::UnboundedSender<VisitedPeer>,
    mut shutdown: watch::Receiver<bool>,
    peer_timeout: Duration,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(peer) = state.take_not_visited().await else {
            tokio::select! {
                _ = wake.notified() => {}
                _ = sleep(IDLE_POLL) => {}
                _ = shutdown.changed() => break,
            }
            continue;
        };

        let (visited, found) = tokio::select! {
            outcome = visit(&connector, peer, peer_timeout) => outcome,
            _ = shutdown.changed() => break,
        };

        if !found.is_empty() && found_tx.send(found).is_err() {
            break;
        }
        if visited_tx.send(visited).is_err() {
            break;
        }
    }
    debug!("Crawl worker {id} exiting");
}
