//! # Hermes Client - Profile Model and Outbound Pipeline
//!
//! The application-facing composition of the protocol stack. Holds the
//! user's profile (identity, channels, friends), packages outgoing messages
//! through the full pipeline (encrypt, TTL stamp, pseudonym substitution,
//! sign, serialize, pad, broadcast), opens inbound payloads against the
//! local key material, and wires the mesh transport to the discovery
//! service.
//!
//! Rendering, persistence of the profile, and demo traffic generation stay
//! outside this crate; the raw injection methods on [`HermesClient`] are
//! the surface those collaborators consume.

pub mod client;
pub mod outbound;
pub mod profile;

pub use client::{ClientEvent, HermesClient};
pub use outbound::{open_envelope, package_message, OpenedMessage, PackageError};
pub use profile::{ChannelEntry, FriendEntry, Profile, ProfileError, UserIdentity};
