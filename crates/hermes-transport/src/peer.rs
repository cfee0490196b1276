//! Per-peer connection records and status reporting.

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Connection lifecycle state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerStatus {
    /// TCP/WebSocket handshake in progress.
    #[default]
    Connecting,
    /// Socket open; the peer receives broadcasts.
    Open,
    /// Socket closed; the record remains until explicitly removed.
    Disconnected,
    /// Socket failed; a reconnect is typically pending.
    Error,
}

/// Public snapshot of one peer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    /// Peer WebSocket URL.
    pub url: String,
    /// Current lifecycle state.
    pub status: PeerStatus,
    /// When the connection opened, epoch milliseconds. `None` until the
    /// first successful open.
    pub connected_at: Option<i64>,
}

/// Aggregate connection health, recomputed whenever the peer table changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSummary {
    /// Peers with an open socket.
    pub open: usize,
    /// Peers mid-handshake.
    pub connecting: usize,
    /// Peers in the error state.
    pub errored: usize,
    /// Total tracked peer records.
    pub tracked: usize,
}

/// Internal mutable state of one peer record.
#[derive(Debug, Default)]
pub(crate) struct PeerState {
    pub(crate) status: PeerStatus,
    pub(crate) connected_at: Option<i64>,
    /// Writer channel into the socket task; present only while open.
    pub(crate) sender: Option<UnboundedSender<Message>>,
    pub(crate) connection_task: Option<JoinHandle<()>>,
    pub(crate) writer_task: Option<JoinHandle<()>>,
    pub(crate) reconnect_task: Option<JoinHandle<()>>,
    pub(crate) reconnect_pending: bool,
}

impl PeerState {
    pub(crate) fn is_open(&self) -> bool {
        self.status == PeerStatus::Open
    }

    /// Abort every task owned by this record.
    pub(crate) fn abort_tasks(&mut self) {
        for task in [
            self.connection_task.take(),
            self.writer_task.take(),
            self.reconnect_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}
