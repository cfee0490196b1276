//! # Hermes Discovery - Peer Exchange and Topology Maintenance
//!
//! Keeps a node's view of the mesh alive and fresh: resolves the bootstrap
//! endpoint from the page origin, learns additional peers through the
//! peer-exchange sub-protocol, self-heals when the connected-peer count
//! drops below [`MIN_PEERS`], and periodically rotates the longest-held
//! connection once the node sits at [`MAX_PEERS`] so the topology never
//! ossifies into a stale clique.
//!
//! The crate talks to the transport only through the [`NetworkAccess`]
//! capability trait, so the loops are testable against an in-memory fake
//! and multiple independent discovery instances can coexist in one process.

pub mod cache;
pub mod protocol;
pub mod selection;
pub mod service;

pub use cache::{KnownPeer, KnownPeersCache};
pub use protocol::{bootstrap_nodes, detect_protocol_message, PeerExchange, ProtocolDetect};
pub use selection::{select_peer_for_connection, select_peer_for_rotation, PeerInfo};
pub use service::{Discovery, NetworkAccess};

use thiserror::Error;

/// Minimum healthy connected-peer count; below this the self-heal loop acts.
pub const MIN_PEERS: usize = 3;
/// Connected-peer count at which rotation starts.
pub const MAX_PEERS: usize = 5;
/// Capacity of the known-peers cache.
pub const KNOWN_PEERS_MAX: usize = 50;
/// Seconds between self-heal ticks.
pub const DISCOVERY_INTERVAL_SECS: u64 = 30;
/// Seconds between rotation ticks.
pub const ROTATION_INTERVAL_SECS: u64 = 300;
/// Maximum peer URLs returned in a peer-exchange response.
pub const PEER_EXCHANGE_LIMIT: usize = 5;

/// Discovery failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// A peer URL was empty.
    #[error("peer url must be a non-empty string")]
    EmptyPeerUrl,
}
