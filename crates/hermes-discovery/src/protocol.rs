//! Peer-exchange protocol messages and bootstrap resolution.
//!
//! Peer-exchange messages travel as JSON text frames, distinguished from
//! envelope traffic by a `type` field carrying the `peer_exchange_` prefix.
//! They bypass the message pipeline entirely (no padding, no dedup, no
//! signature check).

use hermes_core::now_millis;
use serde::{Deserialize, Serialize};

/// `type`-field prefix shared by all peer-exchange messages.
pub const PROTOCOL_PREFIX: &str = "peer_exchange_";

/// Sender stub attached to peer-exchange messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeFrom {
    /// Sender's long-term public key, base64. May be empty.
    #[serde(rename = "pubKey")]
    pub pub_key: String,
}

/// A peer-exchange protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerExchange {
    /// Ask a peer for the URLs of its currently-connected peers.
    #[serde(rename = "peer_exchange_request")]
    Request {
        /// Requester identification.
        from: ExchangeFrom,
        /// Creation time, epoch milliseconds.
        timestamp: i64,
    },
    /// Announce up to five connected peer URLs.
    #[serde(rename = "peer_exchange_response")]
    Response {
        /// Announced peer URLs.
        peers: Vec<String>,
        /// Responder identification.
        from: ExchangeFrom,
        /// Creation time, epoch milliseconds.
        timestamp: i64,
    },
}

impl PeerExchange {
    /// Build a request stamped with the current time.
    pub fn request(pub_key: impl Into<String>) -> Self {
        Self::Request {
            from: ExchangeFrom {
                pub_key: pub_key.into(),
            },
            timestamp: now_millis(),
        }
    }

    /// Build a response stamped with the current time.
    pub fn response(peers: Vec<String>, pub_key: impl Into<String>) -> Self {
        Self::Response {
            peers,
            from: ExchangeFrom {
                pub_key: pub_key.into(),
            },
            timestamp: now_millis(),
        }
    }

    /// Serialize to the wire JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Classification of an incoming text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolDetect {
    /// A well-formed peer-exchange message.
    Message(PeerExchange),
    /// Carries the `peer_exchange_` type prefix but is not a message this
    /// node understands; consumed without further processing.
    Unrecognized,
    /// Not peer-exchange traffic; treat as a legacy envelope.
    NotProtocol,
}

/// Decide whether a text frame belongs to the peer-exchange protocol.
pub fn detect_protocol_message(text: &str) -> ProtocolDetect {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return ProtocolDetect::NotProtocol;
    };
    let is_protocol = value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(|ty| ty.as_str())
        .is_some_and(|ty| ty.starts_with(PROTOCOL_PREFIX));
    if !is_protocol {
        return ProtocolDetect::NotProtocol;
    }

    match serde_json::from_value::<PeerExchange>(value) {
        Ok(message) => ProtocolDetect::Message(message),
        Err(_) => ProtocolDetect::Unrecognized,
    }
}

/// Resolve the bootstrap WebSocket endpoints for a page origin.
///
/// `https` origins map to `wss`, `http` to `ws`, anything else defaults to
/// `wss`; the path is always `/ws`.
pub fn bootstrap_nodes(origin: &str) -> Vec<String> {
    let url = if let Some(host) = origin.strip_prefix("https://") {
        format!("wss://{host}/ws")
    } else if let Some(host) = origin.strip_prefix("http://") {
        format!("ws://{host}/ws")
    } else {
        format!("wss://{origin}/ws")
    };
    vec![url]
}
