//! The assembled client: transport, discovery, and the application event
//! stream.

use crate::outbound::{encode_frame, open_envelope, package_message, OpenedMessage, PackageError};
use crate::profile::Profile;
use hermes_core::{Envelope, MessageIdGenerator, MessageKind};
use hermes_discovery::Discovery;
use hermes_transport::{MeshConfig, MeshEvent, MeshTransport, PeerStatus, StatusSummary};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// An event on the client subscription channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// An accepted inbound message, with its payload opened against the
    /// local profile where possible.
    Message {
        /// URL of the peer that relayed the message.
        peer: String,
        /// The verbatim envelope.
        envelope: Envelope,
        /// The opened payload.
        opened: OpenedMessage,
    },
    /// A peer connection changed state.
    PeerStatus {
        /// Peer URL.
        url: String,
        /// New lifecycle state.
        status: PeerStatus,
        /// Aggregate connection health.
        summary: StatusSummary,
    },
}

/// A running Hermes client instance.
///
/// Owns the transport, the discovery service, and the router task that
/// feeds discovery and the application event stream. Everything is
/// instance state; independent clients coexist in one process.
pub struct HermesClient {
    profile: Arc<RwLock<Profile>>,
    transport: MeshTransport,
    discovery: Arc<Discovery<MeshTransport>>,
    ids: MessageIdGenerator,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl HermesClient {
    /// Start a client: connect the mesh, spawn discovery, and return the
    /// application event stream.
    pub async fn start(
        profile: Profile,
        mut config: MeshConfig,
    ) -> (Self, UnboundedReceiver<ClientEvent>) {
        config.local_public_key = profile.user.pub_key.clone();
        let origin = config.origin.clone();

        let (transport, mut mesh_events) = MeshTransport::new(config);
        transport.start().await;

        let discovery = Arc::new(Discovery::new(
            Arc::new(transport.clone()),
            origin.as_deref(),
        ));
        discovery.start().await;

        let profile = Arc::new(RwLock::new(profile));
        let (events, receiver) = mpsc::unbounded_channel();

        let router = {
            let discovery = Arc::clone(&discovery);
            let profile = Arc::clone(&profile);
            tokio::spawn(async move {
                while let Some(event) = mesh_events.recv().await {
                    match event {
                        MeshEvent::ProtocolText { peer, text } => {
                            discovery.handle_protocol_message(&text, &peer).await;
                        }
                        MeshEvent::Message { peer, envelope } => {
                            let opened = open_envelope(&envelope, &*profile.read().await);
                            let _ = events.send(ClientEvent::Message {
                                peer,
                                envelope,
                                opened,
                            });
                        }
                        MeshEvent::PeerStatus {
                            url,
                            status,
                            summary,
                        } => {
                            let _ = events.send(ClientEvent::PeerStatus {
                                url,
                                status,
                                summary,
                            });
                        }
                    }
                }
            })
        };

        let client = Self {
            profile,
            transport,
            discovery,
            ids: MessageIdGenerator::new(),
            router: Mutex::new(Some(router)),
        };
        (client, receiver)
    }

    /// Package, sign, pad, and broadcast an outgoing message; returns the
    /// envelope for local echo.
    pub async fn send(
        &self,
        text: &str,
        kind: MessageKind,
        to: &str,
    ) -> Result<Envelope, PackageError> {
        let envelope = {
            let profile = self.profile.read().await;
            package_message(text, kind, to, &profile, &self.ids)?
        };
        let frame = encode_frame(&envelope)?;
        self.transport.broadcast(&frame).await;
        debug!(id = %envelope.id, kind = ?kind, "broadcast outgoing message");
        Ok(envelope)
    }

    /// Inject a pre-built binary frame into the mesh (demo/bot surface).
    pub async fn inject_frame(&self, frame: &[u8]) {
        self.transport.broadcast(frame).await;
    }

    /// Inject a raw text frame to every open peer (demo/bot surface).
    pub async fn inject_text(&self, text: &str) {
        self.transport.broadcast_text(text).await;
    }

    /// Send a raw text frame to a single peer (demo/bot surface).
    pub async fn send_text_to_peer(&self, url: &str, text: &str) {
        self.transport.send_text(url, text).await;
    }

    /// Shared handle to the profile, for interface-layer mutation.
    pub fn profile(&self) -> Arc<RwLock<Profile>> {
        Arc::clone(&self.profile)
    }

    /// The underlying transport handle.
    pub fn transport(&self) -> &MeshTransport {
        &self.transport
    }

    /// Connect an additional peer by URL.
    pub async fn connect_peer(&self, url: &str) {
        self.transport.connect(url).await;
    }

    /// Known peers learned through discovery.
    pub async fn known_peers(&self) -> Vec<hermes_discovery::KnownPeer> {
        self.discovery.known_peers().await
    }

    /// Tear everything down: discovery loops, transport timers and
    /// sockets, and the event router. Idempotent.
    pub async fn shutdown(&self) {
        self.discovery.stop().await;
        self.transport.shutdown().await;
        if let Some(router) = self.router.lock().await.take() {
            router.abort();
        }
    }
}
