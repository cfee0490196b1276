//! Bounded cache of peers learned through discovery.
//!
//! Distinct from the live peer table held by the transport: entries here are
//! candidates for future connections, keyed by URL and evicted
//! least-recently-seen when the cache is full.

use crate::{DiscoveryError, KNOWN_PEERS_MAX};
use hermes_core::now_millis;
use std::collections::HashMap;

/// A peer URL learned through discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPeer {
    /// WebSocket URL of the peer.
    pub url: String,
    /// When the peer was last announced or touched, epoch milliseconds.
    pub last_seen: i64,
    /// Last measured round-trip latency in milliseconds, if any.
    pub last_latency: Option<u64>,
}

/// Bounded LRU cache of known peer URLs.
#[derive(Debug)]
pub struct KnownPeersCache {
    max_size: usize,
    entries: HashMap<String, KnownPeer>,
}

impl KnownPeersCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(KNOWN_PEERS_MAX)
    }

    /// Create a cache with a custom capacity; zero falls back to the default.
    pub fn with_capacity(max_size: usize) -> Self {
        let max_size = if max_size == 0 { KNOWN_PEERS_MAX } else { max_size };
        Self {
            max_size,
            entries: HashMap::new(),
        }
    }

    /// Record a peer sighting.
    ///
    /// Re-recording an existing URL refreshes `last_seen` and, when a
    /// latency sample is supplied, `last_latency`. Inserting a new URL at
    /// capacity evicts the least-recently-seen entry first.
    pub fn record(&mut self, url: &str, latency: Option<u64>) -> Result<(), DiscoveryError> {
        self.record_at(url, latency, now_millis())
    }

    /// [`Self::record`] against an explicit clock.
    pub fn record_at(
        &mut self,
        url: &str,
        latency: Option<u64>,
        now_ms: i64,
    ) -> Result<(), DiscoveryError> {
        if url.is_empty() {
            return Err(DiscoveryError::EmptyPeerUrl);
        }

        if let Some(existing) = self.entries.get_mut(url) {
            existing.last_seen = now_ms;
            if latency.is_some() {
                existing.last_latency = latency;
            }
            return Ok(());
        }

        if self.entries.len() >= self.max_size {
            self.evict_oldest();
        }

        self.entries.insert(
            url.to_string(),
            KnownPeer {
                url: url.to_string(),
                last_seen: now_ms,
                last_latency: latency,
            },
        );
        Ok(())
    }

    /// Look up a cached peer.
    pub fn get(&self, url: &str) -> Option<&KnownPeer> {
        self.entries.get(url)
    }

    /// Remove a peer; no-op when absent.
    pub fn remove(&mut self, url: &str) {
        self.entries.remove(url);
    }

    /// All cached peers, in no particular order.
    pub fn all(&self) -> Vec<&KnownPeer> {
        self.entries.values().collect()
    }

    /// Number of cached peers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the cache holds no peers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .values()
            .min_by_key(|entry| entry.last_seen)
            .map(|entry| entry.url.clone());
        if let Some(url) = oldest {
            tracing::debug!(%url, "evicting least-recently-seen known peer");
            self.entries.remove(&url);
        }
    }
}

impl Default for KnownPeersCache {
    fn default() -> Self {
        Self::new()
    }
}
