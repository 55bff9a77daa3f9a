//! Synchronized peer sets shared by the crawl supervisor and its workers.

use crate::crawler::VisitedPeer;
use monero_peers_connection::Peer;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Snapshot of the state sizes, for progress logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub not_visited: usize,
    pub in_flight: usize,
    pub visited: usize,
}

#[derive(Debug, Default)]
struct PeerSets {
    not_visited: HashMap<String, Peer>,
    in_flight: HashSet<String>,
    visited: HashMap<String, VisitedPeer>,
}

/// Crawl state keyed by peer address.
///
/// An address lives in at most one of the not visited, in flight and visited
/// sets. Visited is terminal. The sets are only reachable through the methods
/// below, each of which holds the lock for its whole update.
#[derive(Debug, Clone, Default)]
pub struct CrawlerState {
    sets: Arc<Mutex<PeerSets>>,
}

impl CrawlerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a peer unless its address is already known in any set.
    ///
    /// Returns whether the peer was queued.
    pub async fn try_enqueue(&self, peer: Peer) -> bool {
        let mut sets = self.sets.lock().await;
        let address = peer.address();
        if sets.visited.contains_key(&address)
            || sets.in_flight.contains(&address)
            || sets.not_visited.contains_key(&address)
        {
            return false;
        }
        sets.not_visited.insert(address, peer);
        true
    }

    /// Take any not visited peer and mark it in flight.
    pub async fn take_not_visited(&self) -> Option<Peer> {
        let mut sets = self.sets.lock().await;
        let address = sets.not_visited.keys().next()?.clone();
        let peer = sets.not_visited.remove(&address)?;
        sets.in_flight.insert(address);
        Some(peer)
    }

    /// Record the outcome of an attempt, moving its address to visited.
    pub async fn mark_visited(&self, visited: VisitedPeer) {
        let mut sets = self.sets.lock().await;
        let address = visited.peer.address();
        sets.in_flight.remove(&address);
        sets.not_visited.remove(&address);
        sets.visited.entry(address).or_insert(visited);
    }

    /// No peer is waiting and no attempt is running.
    pub async fn is_quiescent(&self) -> bool {
        let sets = self.sets.lock().await;
        sets.not_visited.is_empty() && sets.in_flight.is_empty()
    }

    pub async fn counts(&self) -> StateCounts {
        let sets = self.sets.lock().await;
        StateCounts {
            not_visited: sets.not_visited.len(),
            in_flight: sets.in_flight.len(),
            visited: sets.visited.len(),
        }
    }

    /// Move the visited map out, leaving it empty.
    pub async fn take_visited(&self) -> HashMap<String, VisitedPeer> {
        std::mem::take(&mut self.sets.lock().await.visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn peer(last: u8) -> Peer {
        Peer::new(Ipv4Addr::new(10, 0, 0, last), 18080)
    }

    #[tokio::test]
    async fn test_enqueue_dedup() {
        let state = CrawlerState::new();
        assert!(state.try_enqueue(peer(1)).await);
        assert!(!state.try_enqueue(peer(1)).await);

        let taken = state.take_not_visited().await.unwrap();
        assert_eq!(taken, peer(1));
        // In flight.
        assert!(!state.try_enqueue(peer(1)).await);

        state.mark_visited(VisitedPeer::reachable(taken, 0)).await;
        // Visited is terminal.
        assert!(!state.try_enqueue(peer(1)).await);
        assert!(state.take_not_visited().await.is_none());
    }

    #[tokio::test]
    async fn test_quiescence() {
        let state = CrawlerState::new();
        assert!(state.is_quiescent().await);

        state.try_enqueue(peer(1)).await;
        state.try_enqueue(peer(2)).await;
        assert!(!state.is_quiescent().await);

        let first = state.take_not_visited().await.unwrap();
        let second = state.take_not_visited().await.unwrap();
        assert_eq!(
            state.counts().await,
            StateCounts {
                not_visited: 0,
                in_flight: 2,
                visited: 0
            }
        );
        assert!(!state.is_quiescent().await);

        state.mark_visited(VisitedPeer::reachable(first, 3)).await;
        state
            .mark_visited(VisitedPeer::failed(
                second,
                monero_peers_connection::ConnectionError::Timeout,
            ))
            .await;
        assert!(state.is_quiescent().await);

        let visited = state.take_visited().await;
        assert_eq!(visited.len(), 2);
        assert_eq!(state.counts().await, StateCounts::default());
    }

    #[tokio::test]
    async fn test_concurrent_take_hands_out_each_peer_once() {
        let state = CrawlerState::new();
        for last in 0..50 {
            state.try_enqueue(peer(last)).await;
        }

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let state = state.clone();
            tasks.spawn(async move {
                let mut taken = Vec::new();
                while let Some(peer) = state.take_not_visited().await {
                    taken.push(peer.address());
                    tokio::task::yield_now().await;
                }
                taken
            });
        }

        let mut all = Vec::new();
        while let Some(taken) = tasks.join_next().await {
            all.extend(taken.unwrap());
        }
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), 50);
        assert_eq!(unique.len(), 50);
    }
}
