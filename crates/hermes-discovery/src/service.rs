//! The discovery service: capability boundary, self-heal loop, rotation
//! loop, and peer-exchange handling.
//!
//! # Design
//!
//! **Capability injection**: the service drives the transport exclusively
//! through [`NetworkAccess`]. The trait bound guarantees at compile time
//! that every required capability exists, which replaces the original
//! runtime probe of the injected object.
//!
//! **Independent loops**: self-heal and rotation run as separate spawned
//! tasks on their own intervals. [`Discovery::stop`] aborts both and may be
//! called any number of times.

use crate::cache::{KnownPeer, KnownPeersCache};
use crate::protocol::{detect_protocol_message, PeerExchange, ProtocolDetect};
use crate::selection::{select_peer_for_connection, select_peer_for_rotation, PeerInfo};
use crate::{DISCOVERY_INTERVAL_SECS, MAX_PEERS, MIN_PEERS, PEER_EXCHANGE_LIMIT, ROTATION_INTERVAL_SECS};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, trace, warn};

/// Network capabilities discovery needs from the transport.
///
/// All operations are non-blocking from the caller's perspective; they
/// inspect or mutate the live peer table without waiting on socket I/O.
#[async_trait]
pub trait NetworkAccess: Send + Sync {
    /// Number of peers currently in the `open` state.
    async fn connected_peer_count(&self) -> usize;
    /// URLs of peers currently in the `open` state.
    async fn connected_peer_urls(&self) -> Vec<String>;
    /// Open peers with their connection timestamps.
    async fn connected_peer_info(&self) -> Vec<PeerInfo>;
    /// Begin connecting to a peer URL.
    async fn connect_to_peer(&self, url: &str);
    /// Disconnect a peer and drop its record.
    async fn disconnect_peer(&self, url: &str);
    /// Send a raw text frame to one peer.
    async fn send_to_peer(&self, url: &str, text: String);
    /// Send a raw text frame to every open peer.
    async fn broadcast_raw(&self, text: String);
    /// The local node's public key for peer-exchange identification.
    async fn local_public_key(&self) -> String {
        String::new()
    }
}

/// Peer discovery coordinator.
///
/// Owns the known-peers cache and the two maintenance loops. Constructed
/// per client instance; independent instances never share state.
pub struct Discovery<N: NetworkAccess + 'static> {
    network: Arc<N>,
    cache: Arc<Mutex<KnownPeersCache>>,
    bootstrap: Vec<String>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<N: NetworkAccess + 'static> Discovery<N> {
    /// Create a discovery service resolving bootstrap nodes from a page
    /// origin, when one is known.
    pub fn new(network: Arc<N>, origin: Option<&str>) -> Self {
        let bootstrap = origin.map(crate::bootstrap_nodes).unwrap_or_default();
        Self::with_bootstrap(network, bootstrap)
    }

    /// Create a discovery service with explicit bootstrap URLs.
    pub fn with_bootstrap(network: Arc<N>, bootstrap: Vec<String>) -> Self {
        Self {
            network,
            cache: Arc::new(Mutex::new(KnownPeersCache::new())),
            bootstrap,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the self-heal and rotation loops.
    ///
    /// Calling `start` twice stacks no extra loops: previous tasks are
    /// stopped first.
    pub async fn start(&self) {
        self.stop().await;

        let mut tasks = self.tasks.lock().await;

        let network = Arc::clone(&self.network);
        let cache = Arc::clone(&self.cache);
        let bootstrap = self.bootstrap.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(DISCOVERY_INTERVAL_SECS));
            // The first interval tick completes immediately; skip it so the
            // loop acts only after a full period, never at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self_heal_tick(network.as_ref(), &cache, &bootstrap).await;
            }
        }));

        let network = Arc::clone(&self.network);
        let cache = Arc::clone(&self.cache);
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(ROTATION_INTERVAL_SECS));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                rotation_tick(network.as_ref(), &cache).await;
            }
        }));

        debug!(
            bootstrap = self.bootstrap.len(),
            "discovery loops started"
        );
    }

    /// Stop both loops. Idempotent: repeat calls are no-ops.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Handle a peer-exchange text frame received from `from_url`.
    ///
    /// Requests are answered with up to [`PEER_EXCHANGE_LIMIT`] connected
    /// peer URLs, excluding the requester; responses feed the known-peers
    /// cache with latency unknown.
    pub async fn handle_protocol_message(&self, text: &str, from_url: &str) {
        match detect_protocol_message(text) {
            ProtocolDetect::Message(PeerExchange::Request { .. }) => {
                let peers: Vec<String> = self
                    .network
                    .connected_peer_urls()
                    .await
                    .into_iter()
                    .filter(|url| url != from_url)
                    .take(PEER_EXCHANGE_LIMIT)
                    .collect();
                trace!(to = %from_url, count = peers.len(), "answering peer exchange request");
                let response =
                    PeerExchange::response(peers, self.network.local_public_key().await);
                self.network
                    .send_to_peer(from_url, response.to_json())
                    .await;
            }
            ProtocolDetect::Message(PeerExchange::Response { peers, .. }) => {
                let mut cache = self.cache.lock().await;
                for url in peers {
                    if let Err(error) = cache.record(&url, None) {
                        warn!(%url, %error, "ignoring announced peer");
                    }
                }
            }
            ProtocolDetect::Unrecognized => {
                trace!(from = %from_url, "ignoring unrecognized peer exchange message");
            }
            ProtocolDetect::NotProtocol => {}
        }
    }

    /// Record an externally-observed peer sighting (e.g. a successful
    /// connection with a measured latency).
    pub async fn record_peer(&self, url: &str, latency: Option<u64>) {
        if let Err(error) = self.cache.lock().await.record(url, latency) {
            warn!(%url, %error, "could not record peer");
        }
    }

    /// Snapshot of the known-peers cache.
    pub async fn known_peers(&self) -> Vec<KnownPeer> {
        self.cache.lock().await.all().into_iter().cloned().collect()
    }
}

/// One self-heal pass: when the mesh is under-connected, ask every open
/// peer for more peers and attempt one new connection.
async fn self_heal_tick<N: NetworkAccess>(
    network: &N,
    cache: &Mutex<KnownPeersCache>,
    bootstrap: &[String],
) {
    let count = network.connected_peer_count().await;
    if count >= MIN_PEERS {
        return;
    }
    debug!(connected = count, min = MIN_PEERS, "under-connected, self-healing");

    let connected = network.connected_peer_urls().await;

    let request = PeerExchange::request(network.local_public_key().await);
    network.broadcast_raw(request.to_json()).await;

    let candidate = {
        let cache = cache.lock().await;
        select_peer_for_connection(&cache, &connected)
    };
    if let Some(url) = candidate {
        network.connect_to_peer(&url).await;
        return;
    }
    for node in bootstrap {
        if !connected.iter().any(|url| url == node) {
            network.connect_to_peer(node).await;
            break;
        }
    }
}

/// One rotation pass: at capacity, disconnect the longest-held peer and
/// refill the slot from the cache.
async fn rotation_tick<N: NetworkAccess>(network: &N, cache: &Mutex<KnownPeersCache>) {
    let peers = network.connected_peer_info().await;
    if peers.len() < MAX_PEERS {
        return;
    }

    let Some(oldest) = select_peer_for_rotation(&peers).map(str::to_string) else {
        return;
    };
    debug!(url = %oldest, "rotating longest-held peer connection");
    network.disconnect_peer(&oldest).await;

    let connected: Vec<String> = peers.into_iter().map(|peer| peer.url).collect();
    let candidate = {
        let cache = cache.lock().await;
        select_peer_for_connection(&cache, &connected)
    };
    if let Some(url) = candidate {
        network.connect_to_peer(&url).await;
    }
}
