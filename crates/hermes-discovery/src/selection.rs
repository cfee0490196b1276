//! Peer selection for rotation and new connections.

use crate::KnownPeersCache;
use rand::rngs::OsRng;
use rand::Rng;
use std::collections::HashSet;

/// Snapshot of a live peer connection, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// WebSocket URL of the peer.
    pub url: String,
    /// When the connection opened, epoch milliseconds.
    pub connected_at: i64,
}

/// Pick the longest-connected peer for rotation.
///
/// Ties keep the first-encountered peer. Returns `None` for an empty slice.
pub fn select_peer_for_rotation(connected: &[PeerInfo]) -> Option<&str> {
    let mut oldest: Option<&PeerInfo> = None;
    for peer in connected {
        match oldest {
            Some(current) if peer.connected_at >= current.connected_at => {}
            _ => oldest = Some(peer),
        }
    }
    oldest.map(|peer| peer.url.as_str())
}

/// Pick a uniformly-random cached peer that is not already connected.
///
/// The index comes from the OS randomness source, so a peer observing many
/// connection attempts cannot predict which cached candidate is next.
pub fn select_peer_for_connection(
    cache: &KnownPeersCache,
    connected: &[String],
) -> Option<String> {
    let connected: HashSet<&str> = connected.iter().map(String::as_str).collect();
    let eligible: Vec<&str> = cache
        .all()
        .into_iter()
        .map(|peer| peer.url.as_str())
        .filter(|url| !connected.contains(url))
        .collect();

    if eligible.is_empty() {
        return None;
    }
    let index = OsRng.gen_range(0..eligible.len());
    Some(eligible[index].to_string())
}
