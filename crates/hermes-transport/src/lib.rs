//! # Hermes Transport - WebSocket Gossip Mesh
//!
//! The network layer of the mesh: one WebSocket connection per peer, a
//! per-peer connection state machine with fixed-delay reconnection, the
//! receive pipeline (unpad, parse, expiry, dedup, verification, delivery,
//! probabilistic rebroadcast), and the periodic maintenance that keeps the
//! node attached to its bootstrap targets and bounds dedup memory.
//!
//! ## Design
//!
//! **Explicit instance state**: every table the transport mutates (peer
//! records, seen-message set) lives inside one [`MeshTransport`] value.
//! There are no process-wide singletons; tests run several independent
//! meshes in one process.
//!
//! **Events over callbacks**: accepted messages, peer-exchange frames, and
//! peer status transitions are delivered on an `mpsc` channel returned from
//! [`MeshTransport::new`], keeping ordering and cancellation auditable.
//!
//! **Fail-silent receive path**: malformed frames, expired or duplicate
//! envelopes, and bad signatures are dropped with a trace line, never an
//! error. Only setup-time misuse surfaces as an error.

pub mod events;
pub mod mesh;
pub mod peer;
pub mod pipeline;

pub use events::MeshEvent;
pub use mesh::{MeshConfig, MeshTransport};
pub use peer::{PeerSnapshot, PeerStatus, StatusSummary};
pub use pipeline::{DropReason, ReceivePipeline, Verdict};

use std::time::Duration;

/// Delay before retrying a failed or uncleanly-closed connection.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Interval of the loop that keeps bootstrap/configured targets connected.
pub const PEER_MANAGEMENT_INTERVAL: Duration = Duration::from_secs(30);
/// How long a message id stays in the seen-set.
///
/// Deliberately much shorter than any message TTL: dedup bounds memory, it
/// does not guarantee at-most-once over the message's whole lifetime.
pub const SEEN_TTL: Duration = Duration::from_secs(120);
/// Interval of the seen-set purge sweep.
pub const SEEN_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
