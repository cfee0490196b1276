//! # Hermes TTL - Message Ephemerality
//!
//! Time-to-live stamping, expiry evaluation, and the linearly-decaying
//! rebroadcast probability that drives gossip fade-out.
//!
//! ## Fail-safe directions
//!
//! These functions sit on the hot receive path and never propagate errors
//! into it. Each fails in the direction that stops propagation:
//! [`is_expired`] treats any malformed envelope as expired, and
//! [`rebroadcast_probability`] returns `0.0` whenever it cannot compute a
//! meaningful value. [`remaining_secs`] is the one `Result`-returning entry
//! point, for callers that want the error rather than the sentinel.

use hermes_core::{now_millis, Envelope, MessageKind};
use thiserror::Error;

/// TTL in seconds for direct messages.
pub const DIRECT_TTL: u64 = 300;
/// TTL in seconds for private channel messages.
pub const PRIVATE_TTL: u64 = 3_600;
/// TTL in seconds for public channel messages.
pub const PUBLIC_TTL: u64 = 86_400;

/// Rebroadcast probability of a freshly-created message.
pub const BASE_REBROADCAST_PROBABILITY: f64 = 0.6;

/// TTL evaluation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TtlError {
    /// The envelope timestamp could not be resolved to epoch milliseconds.
    #[error("envelope timestamp is not a valid epoch-ms value or ISO-8601 string")]
    InvalidTimestamp,
}

/// Default TTL in seconds for a message kind.
pub fn default_ttl(kind: MessageKind) -> u64 {
    match kind {
        MessageKind::Direct => DIRECT_TTL,
        MessageKind::Private => PRIVATE_TTL,
        MessageKind::Public => PUBLIC_TTL,
    }
}

/// Stamp an envelope's TTL from its kind. Relays never re-stamp.
pub fn stamp(envelope: &mut Envelope) {
    envelope.ttl = default_ttl(envelope.kind);
}

/// Whether the envelope has outlived its TTL.
///
/// Fail-safe: a malformed timestamp or zero TTL reads as expired.
pub fn is_expired(envelope: &Envelope) -> bool {
    is_expired_at(envelope, now_millis())
}

/// [`is_expired`] against an explicit clock.
pub fn is_expired_at(envelope: &Envelope, now_ms: i64) -> bool {
    match age_secs(envelope, now_ms) {
        Ok(age) => age >= envelope.ttl as f64,
        Err(_) => true,
    }
}

/// Seconds left before the envelope expires, clamped to zero.
pub fn remaining_secs(envelope: &Envelope) -> Result<f64, TtlError> {
    remaining_secs_at(envelope, now_millis())
}

/// [`remaining_secs`] against an explicit clock.
pub fn remaining_secs_at(envelope: &Envelope, now_ms: i64) -> Result<f64, TtlError> {
    let age = age_secs(envelope, now_ms)?;
    Ok((envelope.ttl as f64 - age).max(0.0))
}

/// Probability of forwarding the envelope onward, decaying linearly from
/// [`BASE_REBROADCAST_PROBABILITY`] at creation to `0.0` at expiry.
///
/// Fail-safe: returns `0.0` on any malformed input, so an undecodable
/// message is never amplified.
pub fn rebroadcast_probability(envelope: &Envelope) -> f64 {
    rebroadcast_probability_at(envelope, now_millis())
}

/// [`rebroadcast_probability`] against an explicit clock.
pub fn rebroadcast_probability_at(envelope: &Envelope, now_ms: i64) -> f64 {
    if envelope.ttl == 0 {
        return 0.0;
    }
    match remaining_secs_at(envelope, now_ms) {
        Ok(remaining) => BASE_REBROADCAST_PROBABILITY * (remaining / envelope.ttl as f64),
        Err(_) => 0.0,
    }
}

/// Age of the envelope in seconds, clamped to zero for future timestamps.
fn age_secs(envelope: &Envelope, now_ms: i64) -> Result<f64, TtlError> {
    let ts = envelope
        .timestamp
        .epoch_millis()
        .ok_or(TtlError::InvalidTimestamp)?;
    Ok(((now_ms - ts) as f64 / 1000.0).max(0.0))
}
