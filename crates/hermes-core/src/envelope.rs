//! Message envelope types exchanged between mesh peers.
//!
//! An [`Envelope`] is the unit the wire protocol floods through the gossip
//! overlay: binary frames carry its JSON serialization inside a padded
//! frame, legacy text frames carry the JSON directly. Deserialization is the
//! single structural validation point; a frame that does not parse into an
//! `Envelope` is protocol-fatal and dropped by the transport.

use serde::{Deserialize, Serialize};

/// Message confidentiality class.
///
/// Determines the encryption treatment and the TTL class stamped at origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plaintext channel message, readable by the whole mesh.
    Public,
    /// Channel message sealed under a shared symmetric channel key.
    Private,
    /// One-to-one message sealed to a friend's public key.
    Direct,
}

/// Origin timestamp of an envelope.
///
/// Locally-created envelopes always carry epoch milliseconds; remote peers
/// may send ISO-8601 strings, which are accepted on the wire and parsed
/// lazily by the TTL layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    /// ISO-8601 / RFC 3339 date string.
    Iso(String),
}

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::Millis(crate::time::now_millis())
    }

    /// Resolve to epoch milliseconds, if the value is well-formed.
    pub fn epoch_millis(&self) -> Option<i64> {
        match self {
            Self::Millis(ms) => Some(*ms),
            Self::Iso(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis()),
        }
    }
}

/// Sender information attached to an envelope.
///
/// `pub_key` is present only on direct messages; channel messages omit it
/// entirely (the pseudonym in `name` stands in for a routable identity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Display name: the real username for direct messages, a shortened
    /// per-channel pseudonym for channel messages.
    pub name: String,
    /// Long-term public key, base64. Absent (not null) for channel messages.
    #[serde(rename = "pubKey", default, skip_serializing_if = "Option::is_none")]
    pub pub_key: Option<String>,
}

/// Ciphertext payload of an encrypted envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    /// AEAD ciphertext, base64.
    pub encrypted: String,
    /// AEAD nonce, base64.
    pub nonce: String,
    /// Ephemeral X25519 public key, base64. Present only on direct messages.
    #[serde(
        rename = "ephemeralPubKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ephemeral_pub_key: Option<String>,
}

/// Message body: plaintext or a sealed ciphertext object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Plaintext body (`public`, or `private`/`direct` with no usable key).
    Plain(String),
    /// Encrypted body.
    Sealed(SealedPayload),
}

impl Payload {
    /// The exact string the origin signed: the plaintext itself, or the JSON
    /// serialization of the sealed object.
    pub fn signing_string(&self) -> String {
        match self {
            Self::Plain(text) => text.clone(),
            // Struct field order is fixed, so this reproduces the byte-exact
            // string the sender serialized before signing.
            Self::Sealed(sealed) => serde_json::to_string(sealed).unwrap_or_default(),
        }
    }

    /// True when the payload is a sealed ciphertext object.
    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }
}

/// The message envelope flooded through the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Globally-unique message id, the deduplication key. Generated once at
    /// origin and never regenerated by relays.
    pub id: String,
    /// Confidentiality class.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Origin creation time.
    pub timestamp: Timestamp,
    /// Time-to-live in seconds, fixed per kind at creation.
    pub ttl: u64,
    /// Target channel or friend name. A routing hint only: the mesh floods,
    /// it does not route.
    pub to: String,
    /// Sender information.
    pub from: Sender,
    /// Message body.
    pub message: Payload,
    /// Detached signature over [`Payload::signing_string`], base64.
    pub signature: String,
}

impl Envelope {
    /// Parse an envelope from its wire JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse an envelope from raw (unpadded) frame bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serialize to wire JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
