//! Payloads exchanged during the levin handshake.
//!
//! The async exchange itself lives in the io module. This module builds the
//! portable storage objects for the requests and responses.

use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use super::configuration::ConnectionConfiguration;
use crate::storage::{PortableStorage, Section};

/// Gets the current Unix timestamp (seconds since January 1, 1970 00:00:00 UTC).
///
/// A clock set before the epoch reports 0 rather than failing, peers only use
/// the value for clock skew hints.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Generates a 64-bit peer id for the `node_data` section.
///
/// This function creates a reasonably unique id without requiring a `rand` crate.
/// While *not* cryptographically secure, it is only used by peers to recognize
/// connections to themselves.
pub fn generate_peer_id() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    // Mix in the process ID for additional entropy.
    let pid = process::id() as u64;

    // Combine the values with bitwise operations.
    now ^ (pid.rotate_left(32))
}

/// The `node_data` section describing this node.
pub fn node_data(config: &ConnectionConfiguration, peer_id: u64) -> Section {
    Section::new()
        .with("local_time", unix_timestamp())
        .with("my_port", config.my_port)
        .with("network_id", config.network.network_id().to_vec())
        .with("peer_id", peer_id)
        .with("support_flags", config.support_flags)
}

/// The `payload_data` section describing this node's chain.
pub fn payload_data(config: &ConnectionConfiguration) -> Section {
    let chain = &config.chain;
    Section::new()
        .with("cumulative_difficulty", chain.cumulative_difficulty)
        .with("cumulative_difficulty_top64", 0u64)
        .with("current_height", chain.current_height)
        .with("pruning_seed", chain.pruning_seed)
        .with("top_id", chain.top_id.to_vec())
        .with("top_version", chain.top_version)
}

/// Handshake request payload.
pub fn handshake_request(config: &ConnectionConfiguration, peer_id: u64) -> PortableStorage {
    PortableStorage::new(
        Section::new()
            .with("node_data", node_data(config, peer_id))
            .with("payload_data", payload_data(config)),
    )
}

/// Response to a peer's `support_flags` request.
pub fn support_flags_response(config: &ConnectionConfiguration) -> PortableStorage {
    PortableStorage::new(Section::new().with("support_flags", config.support_flags))
}
