//! Events the transport publishes to its subscriber.

use crate::peer::{PeerStatus, StatusSummary};
use hermes_core::Envelope;

/// An event on the mesh subscription channel.
///
/// Exactly one [`MeshEvent::Message`] is emitted per accepted, deduplicated,
/// verified envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    /// A message made it through the full receive pipeline.
    Message {
        /// URL of the peer the frame arrived from.
        peer: String,
        /// The accepted envelope.
        envelope: Envelope,
    },
    /// A peer-exchange text frame, routed around the message pipeline for
    /// the discovery layer to handle.
    ProtocolText {
        /// URL of the peer the frame arrived from.
        peer: String,
        /// The raw frame text.
        text: String,
    },
    /// A peer record changed state.
    PeerStatus {
        /// Peer URL.
        url: String,
        /// New lifecycle state.
        status: PeerStatus,
        /// Aggregate table health after the transition.
        summary: StatusSummary,
    },
}
