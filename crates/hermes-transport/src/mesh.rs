//! The mesh transport: connection lifecycle, frame dispatch, gossip
//! rebroadcast, and periodic maintenance.

use crate::events::MeshEvent;
use crate::peer::{PeerSnapshot, PeerState, PeerStatus, StatusSummary};
use crate::pipeline::{ReceivePipeline, Verdict};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use hermes_core::{now_millis, Envelope};
use hermes_discovery::{
    bootstrap_nodes, detect_protocol_message, NetworkAccess, PeerInfo, ProtocolDetect,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

/// Mesh transport configuration.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Page origin; when set, its `/ws` endpoint is kept connected by the
    /// peer-management loop.
    pub origin: Option<String>,
    /// Explicitly configured node URLs, also kept connected.
    pub nodes: Vec<String>,
    /// This node's public key, handed to discovery for peer-exchange
    /// identification.
    pub local_public_key: String,
    /// Delay before retrying a failed or uncleanly-closed connection.
    pub reconnect_delay: Duration,
    /// Interval of the bootstrap/configured-target reconnect loop.
    pub peer_management_interval: Duration,
    /// Age past which seen-message ids are purged.
    pub seen_ttl: Duration,
    /// Interval of the seen-set purge sweep.
    pub seen_cleanup_interval: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            origin: None,
            nodes: Vec::new(),
            local_public_key: String::new(),
            reconnect_delay: crate::RECONNECT_DELAY,
            peer_management_interval: crate::PEER_MANAGEMENT_INTERVAL,
            seen_ttl: crate::SEEN_TTL,
            seen_cleanup_interval: crate::SEEN_CLEANUP_INTERVAL,
        }
    }
}

struct MeshInner {
    config: MeshConfig,
    peers: Mutex<HashMap<String, PeerState>>,
    pipeline: Mutex<ReceivePipeline>,
    events: UnboundedSender<MeshEvent>,
    maintenance: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

/// Handle to one mesh transport instance.
///
/// Cheap to clone; all clones share the same peer table, seen-set, and
/// event channel.
#[derive(Clone)]
pub struct MeshTransport {
    inner: Arc<MeshInner>,
}

impl MeshTransport {
    /// Create a transport and the event stream it publishes to.
    pub fn new(config: MeshConfig) -> (Self, UnboundedReceiver<MeshEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(MeshInner {
                config,
                peers: Mutex::new(HashMap::new()),
                pipeline: Mutex::new(ReceivePipeline::new()),
                events,
                maintenance: Mutex::new(Vec::new()),
                shutdown: AtomicBool::new(false),
            }),
        };
        (transport, receiver)
    }

    /// Connect the initial targets and spawn the maintenance loops.
    pub async fn start(&self) {
        let targets = targets_of(&self.inner.config);
        info!(count = targets.len(), "starting mesh transport");
        for url in &targets {
            connect_peer(&self.inner, url).await;
        }

        let mut maintenance = self.inner.maintenance.lock().await;

        let inner = Arc::clone(&self.inner);
        maintenance.push(tokio::spawn(async move {
            let mut ticker = interval(inner.config.peer_management_interval);
            // The first interval tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manage_peers(&inner).await;
            }
        }));

        let inner = Arc::clone(&self.inner);
        maintenance.push(tokio::spawn(async move {
            let mut ticker = interval(inner.config.seen_cleanup_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = inner
                    .pipeline
                    .lock()
                    .await
                    .purge_seen(now_millis(), inner.config.seen_ttl.as_millis() as i64);
                if removed > 0 {
                    debug!(removed, "purged stale seen-message ids");
                }
            }
        }));
    }

    /// Begin connecting to a peer. No-op when already open or connecting.
    pub async fn connect(&self, url: &str) {
        connect_peer(&self.inner, url).await;
    }

    /// Cleanly close and forget a peer record.
    ///
    /// The explicit path (used by rotation) is the only way a record leaves
    /// the table; transient failures merely change its status.
    pub async fn disconnect(&self, url: &str) {
        let state = self.inner.peers.lock().await.remove(url);
        let Some(mut state) = state else { return };

        if let Some(sender) = state.sender.take() {
            // The writer flushes this close frame, then exits when the
            // channel drops.
            let _ = sender.send(Message::Close(None));
        }
        if let Some(task) = state.connection_task.take() {
            task.abort();
        }
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }
        info!(%url, "disconnected peer");

        let peers = self.inner.peers.lock().await;
        let _ = self.inner.events.send(MeshEvent::PeerStatus {
            url: url.to_string(),
            status: PeerStatus::Disconnected,
            summary: summary_of(&peers),
        });
    }

    /// Send a binary frame to every open peer.
    pub async fn broadcast(&self, data: &[u8]) {
        let peers = self.inner.peers.lock().await;
        let mut sent = 0;
        for state in peers.values().filter(|state| state.is_open()) {
            if let Some(sender) = &state.sender {
                if sender.send(Message::Binary(data.to_vec())).is_ok() {
                    sent += 1;
                }
            }
        }
        trace!(bytes = data.len(), peers = sent, "broadcast binary frame");
    }

    /// Send a raw text frame to every open peer.
    pub async fn broadcast_text(&self, text: &str) {
        let peers = self.inner.peers.lock().await;
        for state in peers.values().filter(|state| state.is_open()) {
            if let Some(sender) = &state.sender {
                let _ = sender.send(Message::Text(text.to_string()));
            }
        }
    }

    /// Send a binary frame to one peer; no-op unless that peer is open.
    pub async fn send_binary(&self, url: &str, data: &[u8]) {
        let peers = self.inner.peers.lock().await;
        if let Some(state) = peers.get(url).filter(|state| state.is_open()) {
            if let Some(sender) = &state.sender {
                let _ = sender.send(Message::Binary(data.to_vec()));
            }
        }
    }

    /// Send a raw text frame to one peer; no-op unless that peer is open.
    pub async fn send_text(&self, url: &str, text: &str) {
        let peers = self.inner.peers.lock().await;
        if let Some(state) = peers.get(url).filter(|state| state.is_open()) {
            if let Some(sender) = &state.sender {
                let _ = sender.send(Message::Text(text.to_string()));
            }
        }
    }

    /// Snapshot of every tracked peer record.
    pub async fn peers(&self) -> Vec<PeerSnapshot> {
        let peers = self.inner.peers.lock().await;
        peers
            .iter()
            .map(|(url, state)| PeerSnapshot {
                url: url.clone(),
                status: state.status,
                connected_at: state.connected_at,
            })
            .collect()
    }

    /// Aggregate connection health.
    pub async fn status_summary(&self) -> StatusSummary {
        summary_of(&*self.inner.peers.lock().await)
    }

    /// Tear the transport down: stop every timer, abort every connection
    /// and reconnect task, and drop all peer records. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.inner.maintenance.lock().await.drain(..) {
            task.abort();
        }
        let mut peers = self.inner.peers.lock().await;
        for state in peers.values_mut() {
            if let Some(sender) = state.sender.take() {
                let _ = sender.send(Message::Close(None));
            }
            state.abort_tasks();
        }
        peers.clear();
        info!("mesh transport shut down");
    }
}

#[async_trait]
impl NetworkAccess for MeshTransport {
    async fn connected_peer_count(&self) -> usize {
        let peers = self.inner.peers.lock().await;
        peers.values().filter(|state| state.is_open()).count()
    }

    async fn connected_peer_urls(&self) -> Vec<String> {
        let peers = self.inner.peers.lock().await;
        peers
            .iter()
            .filter(|(_, state)| state.is_open())
            .map(|(url, _)| url.clone())
            .collect()
    }

    async fn connected_peer_info(&self) -> Vec<PeerInfo> {
        let peers = self.inner.peers.lock().await;
        peers
            .iter()
            .filter(|(_, state)| state.is_open())
            .map(|(url, state)| PeerInfo {
                url: url.clone(),
                connected_at: state.connected_at.unwrap_or(0),
            })
            .collect()
    }

    async fn connect_to_peer(&self, url: &str) {
        connect_peer(&self.inner, url).await;
    }

    async fn disconnect_peer(&self, url: &str) {
        self.disconnect(url).await;
    }

    async fn send_to_peer(&self, url: &str, text: String) {
        self.send_text(url, &text).await;
    }

    async fn broadcast_raw(&self, text: String) {
        self.broadcast_text(&text).await;
    }

    async fn local_public_key(&self) -> String {
        self.inner.config.local_public_key.clone()
    }
}

/// Bootstrap plus configured node URLs, deduplicated in order.
fn targets_of(config: &MeshConfig) -> Vec<String> {
    let mut targets = Vec::new();
    if let Some(origin) = &config.origin {
        targets.extend(bootstrap_nodes(origin));
    }
    for node in &config.nodes {
        if !targets.contains(node) {
            targets.push(node.clone());
        }
    }
    targets
}

fn summary_of(peers: &HashMap<String, PeerState>) -> StatusSummary {
    let mut summary = StatusSummary {
        tracked: peers.len(),
        ..StatusSummary::default()
    };
    for state in peers.values() {
        match state.status {
            PeerStatus::Open => summary.open += 1,
            PeerStatus::Connecting => summary.connecting += 1,
            PeerStatus::Error => summary.errored += 1,
            PeerStatus::Disconnected => {}
        }
    }
    summary
}

/// Update a peer's status and publish the transition. Skips records that
/// were deliberately removed.
fn transition(
    peers: &mut HashMap<String, PeerState>,
    events: &UnboundedSender<MeshEvent>,
    url: &str,
    status: PeerStatus,
) {
    let Some(state) = peers.get_mut(url) else {
        return;
    };
    state.status = status;
    let summary = summary_of(peers);
    let _ = events.send(MeshEvent::PeerStatus {
        url: url.to_string(),
        status,
        summary,
    });
}

// Boxed return type breaks the async-recursion cycle
// (connect_peer -> run_connection -> schedule_reconnect -> connect_peer) so the
// compiler can resolve the opaque future's `Send`-ness.
fn connect_peer<'a>(
    inner: &'a Arc<MeshInner>,
    url: &'a str,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        if !url.starts_with("ws") {
            warn!(%url, "refusing to connect: not a websocket url");
            return;
        }

        let mut peers = inner.peers.lock().await;
        if let Some(state) = peers.get(url) {
            if matches!(state.status, PeerStatus::Connecting | PeerStatus::Open) {
                return;
            }
        }
        debug!(%url, "connecting to peer");
        let state = peers.entry(url.to_string()).or_default();
        state.sender = None;
        let task = tokio::spawn(run_connection(Arc::clone(inner), url.to_string()));
        if let Some(old) = state.connection_task.replace(task) {
            old.abort();
        }
        transition(&mut peers, &inner.events, url, PeerStatus::Connecting);
    })
}

/// One connection's full lifecycle: dial, pump frames, classify the close,
/// and hand off to the reconnect scheduler when the closure was not clean.
async fn run_connection(inner: Arc<MeshInner>, url: String) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(error) => {
            warn!(%url, %error, "peer connection failed");
            {
                let mut peers = inner.peers.lock().await;
                transition(&mut peers, &inner.events, &url, PeerStatus::Error);
            }
            schedule_reconnect(&inner, &url).await;
            return;
        }
    };

    info!(%url, "peer connection open");
    let (mut sink, mut reader) = stream.split();
    let (sender, mut outbound) = mpsc::unbounded_channel::<Message>();
    {
        let mut peers = inner.peers.lock().await;
        let Some(state) = peers.get_mut(&url) else {
            // Removed while the handshake was in flight.
            return;
        };
        state.sender = Some(sender);
        state.connected_at = Some(now_millis());
        state.reconnect_pending = false;
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });
        if let Some(old) = state.writer_task.replace(writer) {
            old.abort();
        }
        transition(&mut peers, &inner.events, &url, PeerStatus::Open);
    }

    let mut clean_close = false;
    let mut errored = false;
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Binary(data)) => handle_binary(&inner, &url, data).await,
            Ok(Message::Text(text)) => handle_text(&inner, &url, text).await,
            Ok(Message::Close(frame)) => {
                clean_close = matches!(
                    frame.as_ref().map(|f| f.code),
                    Some(CloseCode::Normal) | Some(CloseCode::Away)
                );
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Err(error) => {
                warn!(%url, %error, "peer socket error");
                errored = true;
                break;
            }
        }
    }

    if inner.shutdown.load(Ordering::SeqCst) {
        return;
    }
    {
        let mut peers = inner.peers.lock().await;
        let Some(state) = peers.get_mut(&url) else {
            // Removed deliberately; nothing to transition or reconnect.
            return;
        };
        state.sender = None;
        if let Some(writer) = state.writer_task.take() {
            writer.abort();
        }
        let status = if errored {
            PeerStatus::Error
        } else {
            PeerStatus::Disconnected
        };
        transition(&mut peers, &inner.events, &url, status);
    }

    if clean_close && !errored {
        info!(%url, "peer connection closed cleanly");
    } else {
        schedule_reconnect(&inner, &url).await;
    }
}

/// Arrange a single reconnect attempt after the configured delay, unless
/// one is already pending for this peer.
async fn schedule_reconnect(inner: &Arc<MeshInner>, url: &str) {
    if inner.shutdown.load(Ordering::SeqCst) {
        return;
    }
    let delay = inner.config.reconnect_delay;
    let mut peers = inner.peers.lock().await;
    let Some(state) = peers.get_mut(url) else {
        return;
    };
    if state.reconnect_pending {
        return;
    }
    state.reconnect_pending = true;
    debug!(%url, ?delay, "scheduling reconnect");

    let task = tokio::spawn({
        let inner = Arc::clone(inner);
        let url = url.to_string();
        async move {
            tokio::time::sleep(delay).await;
            if inner.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let eligible = {
                let mut peers = inner.peers.lock().await;
                match peers.get_mut(&url) {
                    Some(state) => {
                        state.reconnect_pending = false;
                        !matches!(state.status, PeerStatus::Open | PeerStatus::Connecting)
                    }
                    None => false,
                }
            };
            if eligible {
                connect_peer(&inner, &url).await;
            }
        }
    });
    if let Some(old) = state.reconnect_task.replace(task) {
        old.abort();
    }
}

async fn handle_binary(inner: &Arc<MeshInner>, url: &str, data: Vec<u8>) {
    let payload = match hermes_framing::unpad(&data) {
        Ok(payload) => payload,
        Err(error) => {
            trace!(%url, %error, "dropping malformed binary frame");
            return;
        }
    };
    let envelope = match Envelope::from_bytes(&payload) {
        Ok(envelope) => envelope,
        Err(error) => {
            trace!(%url, %error, "dropping unparseable envelope");
            return;
        }
    };
    process_envelope(inner, url, envelope, Message::Binary(data)).await;
}

async fn handle_text(inner: &Arc<MeshInner>, url: &str, text: String) {
    if !matches!(detect_protocol_message(&text), ProtocolDetect::NotProtocol) {
        // Discovery traffic bypasses the message pipeline entirely.
        let _ = inner.events.send(MeshEvent::ProtocolText {
            peer: url.to_string(),
            text,
        });
        return;
    }
    // Legacy peers send unpadded JSON envelopes as text frames.
    let envelope = match Envelope::from_json(&text) {
        Ok(envelope) => envelope,
        Err(error) => {
            trace!(%url, %error, "dropping unparseable text frame");
            return;
        }
    };
    process_envelope(inner, url, envelope, Message::Text(text)).await;
}

/// Expiry, dedup, and verification; then delivery and the gossip coin flip.
/// The original frame is forwarded verbatim so downstream relays verify the
/// exact bytes the origin produced.
async fn process_envelope(inner: &Arc<MeshInner>, url: &str, envelope: Envelope, raw: Message) {
    let verdict = {
        let mut pipeline = inner.pipeline.lock().await;
        pipeline.evaluate(&envelope, now_millis(), rand::random::<f64>())
    };
    match verdict {
        Verdict::Drop(reason) => {
            trace!(%url, id = %envelope.id, ?reason, "dropping envelope");
        }
        Verdict::Deliver { rebroadcast } => {
            let id = envelope.id.clone();
            let _ = inner.events.send(MeshEvent::Message {
                peer: url.to_string(),
                envelope,
            });
            if rebroadcast {
                let count = rebroadcast_raw(inner, url, raw).await;
                trace!(%id, peers = count, "rebroadcast frame");
            }
        }
    }
}

/// Forward a raw frame to every open peer except the one it arrived from.
async fn rebroadcast_raw(inner: &Arc<MeshInner>, origin: &str, raw: Message) -> usize {
    let peers = inner.peers.lock().await;
    let mut count = 0;
    for (url, state) in peers.iter() {
        if url == origin || !state.is_open() {
            continue;
        }
        if let Some(sender) = &state.sender {
            if sender.send(raw.clone()).is_ok() {
                count += 1;
            }
        }
    }
    count
}

/// Reconnect any bootstrap/configured target that is not currently open,
/// connecting, or awaiting a scheduled reconnect.
async fn manage_peers(inner: &Arc<MeshInner>) {
    for url in targets_of(&inner.config) {
        let needs_connect = {
            let peers = inner.peers.lock().await;
            match peers.get(&url) {
                None => true,
                Some(state) => {
                    matches!(state.status, PeerStatus::Disconnected | PeerStatus::Error)
                        && !state.reconnect_pending
                }
            }
        };
        if needs_connect {
            connect_peer(inner, &url).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use hermes_core::{MessageKind, Payload, Sender, Timestamp};
    use hermes_crypto::{generate_keypair, sign_detached};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn fresh_envelope(id: &str) -> Envelope {
        Envelope {
            id: id.into(),
            kind: MessageKind::Public,
            timestamp: Timestamp::Millis(now_millis()),
            ttl: 86_400,
            to: "General".into(),
            from: Sender {
                name: "pseud".into(),
                pub_key: None,
            },
            message: Payload::Plain("hello".into()),
            signature: String::new(),
        }
    }

    fn padded_frame(envelope: &Envelope) -> Vec<u8> {
        hermes_framing::pad(envelope.to_json().unwrap().as_bytes()).unwrap()
    }

    /// Serve one WebSocket connection that sends `frames` then stays open.
    async fn serve_frames(frames: Vec<Message>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            for frame in frames {
                socket.send(frame).await.unwrap();
            }
            while socket.next().await.is_some() {}
        });
        url
    }

    async fn next_message(
        events: &mut UnboundedReceiver<MeshEvent>,
    ) -> Option<(String, Envelope)> {
        loop {
            match timeout(WAIT, events.recv()).await {
                Ok(Some(MeshEvent::Message { peer, envelope })) => {
                    return Some((peer, envelope))
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return None,
            }
        }
    }

    async fn wait_for_open(events: &mut UnboundedReceiver<MeshEvent>) {
        loop {
            match timeout(WAIT, events.recv()).await {
                Ok(Some(MeshEvent::PeerStatus {
                    status: PeerStatus::Open,
                    ..
                })) => return,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => panic!("peer never opened"),
            }
        }
    }

    #[tokio::test]
    async fn delivers_and_deduplicates_binary_frames() {
        let first = fresh_envelope("msg_1_0_aaa");
        let second = fresh_envelope("msg_1_0_bbb");
        let url = serve_frames(vec![
            Message::Binary(padded_frame(&first)),
            Message::Binary(padded_frame(&first)),
            Message::Binary(padded_frame(&second)),
        ])
        .await;

        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.connect(&url).await;

        let (peer, delivered) = next_message(&mut events).await.unwrap();
        assert_eq!(peer, url);
        assert_eq!(delivered.id, first.id);

        // The duplicate is swallowed; the next delivery is the second id.
        let (_, delivered) = next_message(&mut events).await.unwrap();
        assert_eq!(delivered.id, second.id);

        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn expired_envelopes_are_dropped_silently() {
        let mut stale = fresh_envelope("msg_1_0_stale");
        stale.timestamp = Timestamp::Millis(now_millis() - 90_000_000);
        let sentinel = fresh_envelope("msg_1_0_live");
        let url = serve_frames(vec![
            Message::Binary(padded_frame(&stale)),
            Message::Binary(padded_frame(&sentinel)),
        ])
        .await;

        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.connect(&url).await;

        let (_, delivered) = next_message(&mut events).await.unwrap();
        assert_eq!(delivered.id, sentinel.id);

        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn declared_key_with_forged_signature_is_dropped() {
        let pair = generate_keypair();
        let mut forged = fresh_envelope("msg_1_0_forged");
        forged.from.pub_key = Some(pair.pub_key.clone());
        forged.signature = sign_detached("something else", &pair.priv_key).unwrap();

        let mut genuine = fresh_envelope("msg_1_0_genuine");
        genuine.from.pub_key = Some(pair.pub_key.clone());
        genuine.signature = sign_detached("hello", &pair.priv_key).unwrap();

        let url = serve_frames(vec![
            Message::Binary(padded_frame(&forged)),
            Message::Binary(padded_frame(&genuine)),
        ])
        .await;

        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.connect(&url).await;

        let (_, delivered) = next_message(&mut events).await.unwrap();
        assert_eq!(delivered.id, genuine.id);

        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn garbage_binary_frames_do_not_poison_the_connection() {
        let sentinel = fresh_envelope("msg_1_0_after_garbage");
        let url = serve_frames(vec![
            Message::Binary(vec![0u8; 10]),
            Message::Binary(b"not a frame".to_vec()),
            Message::Binary(padded_frame(&sentinel)),
        ])
        .await;

        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.connect(&url).await;

        let (_, delivered) = next_message(&mut events).await.unwrap();
        assert_eq!(delivered.id, sentinel.id);

        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn peer_exchange_text_frames_bypass_the_message_pipeline() {
        let request = hermes_discovery::PeerExchange::request("cHVi").to_json();
        let url = serve_frames(vec![Message::Text(request.clone())]).await;

        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.connect(&url).await;

        loop {
            match timeout(WAIT, events.recv()).await {
                Ok(Some(MeshEvent::ProtocolText { peer, text })) => {
                    assert_eq!(peer, url);
                    assert_eq!(text, request);
                    break;
                }
                Ok(Some(MeshEvent::Message { .. })) => {
                    panic!("protocol frame leaked into the message pipeline")
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => panic!("no protocol event"),
            }
        }

        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn legacy_text_envelopes_run_the_same_pipeline() {
        let envelope = fresh_envelope("msg_1_0_legacy");
        let json = envelope.to_json().unwrap();
        let url = serve_frames(vec![
            Message::Text(json.clone()),
            // Same id again as binary: still a duplicate
            Message::Binary(padded_frame(&envelope)),
            Message::Text(fresh_envelope("msg_1_0_tail").to_json().unwrap()),
        ])
        .await;

        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.connect(&url).await;

        let (_, first) = next_message(&mut events).await.unwrap();
        assert_eq!(first.id, "msg_1_0_legacy");
        let (_, second) = next_message(&mut events).await.unwrap();
        assert_eq!(second.id, "msg_1_0_tail");

        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn broadcast_reaches_the_open_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            match socket.next().await {
                Some(Ok(Message::Binary(data))) => data,
                other => panic!("expected binary frame, got {other:?}"),
            }
        });

        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.connect(&url).await;
        wait_for_open(&mut events).await;

        let frame = padded_frame(&fresh_envelope("msg_1_0_out"));
        mesh.broadcast(&frame).await;

        let received = timeout(WAIT, server).await.unwrap().unwrap();
        assert_eq!(received, frame);

        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn network_access_reflects_and_mutates_the_peer_table() {
        let url = serve_frames(Vec::new()).await;

        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.connect(&url).await;
        wait_for_open(&mut events).await;

        assert_eq!(mesh.connected_peer_count().await, 1);
        assert_eq!(mesh.connected_peer_urls().await, vec![url.clone()]);
        let info = mesh.connected_peer_info().await;
        assert_eq!(info.len(), 1);
        assert!(info[0].connected_at > 0);

        mesh.disconnect(&url).await;
        assert_eq!(mesh.connected_peer_count().await, 0);
        assert!(mesh.peers().await.is_empty());

        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_clears_state() {
        let url = serve_frames(Vec::new()).await;

        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.start().await;
        mesh.connect(&url).await;
        wait_for_open(&mut events).await;

        mesh.shutdown().await;
        mesh.shutdown().await;

        assert!(mesh.peers().await.is_empty());
        assert_eq!(mesh.status_summary().await, StatusSummary::default());
    }

    #[tokio::test]
    async fn connection_failure_marks_the_peer_errored() {
        // Nothing listens on this port
        let (mesh, mut events) = MeshTransport::new(MeshConfig::default());
        mesh.connect("ws://127.0.0.1:9/ws").await;

        loop {
            match timeout(WAIT, events.recv()).await {
                Ok(Some(MeshEvent::PeerStatus {
                    status: PeerStatus::Error,
                    summary,
                    ..
                })) => {
                    assert_eq!(summary.errored, 1);
                    break;
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => panic!("no error status event"),
            }
        }

        mesh.shutdown().await;
    }

    #[test]
    fn targets_deduplicate_origin_and_nodes() {
        let config = MeshConfig {
            origin: Some("https://hermes.example".into()),
            nodes: vec![
                "wss://hermes.example/ws".into(),
                "wss://other.example/ws".into(),
            ],
            ..MeshConfig::default()
        };
        assert_eq!(
            targets_of(&config),
            vec![
                "wss://hermes.example/ws".to_string(),
                "wss://other.example/ws".to_string(),
            ]
        );
    }
}
