//! # Hermes Core - Wire Envelope Model
//!
//! Shared protocol types for the Hermes peer-to-peer messaging mesh: the
//! message envelope exchanged between peers, the sender/payload unions it
//! carries, message identifier generation, and wall-clock helpers.
//!
//! ## Design Principles
//!
//! **Validate once**: the envelope is a fully-typed structure whose shape is
//! enforced at deserialization. Downstream pipeline stages (expiry, dedup,
//! verification) operate on typed fields instead of re-checking structure at
//! every use site.
//!
//! **Wire-stable field names**: serde renames pin the JSON field names
//! (`type`, `pubKey`, `ephemeralPubKey`) so envelopes interoperate with
//! every mesh node regardless of implementation.

pub mod envelope;
pub mod id;
pub mod time;

pub use envelope::{Envelope, MessageKind, Payload, SealedPayload, Sender, Timestamp};
pub use id::MessageIdGenerator;
pub use time::now_millis;
