//! The per-envelope receive pipeline: expiry, dedup, verification, and the
//! rebroadcast decision.
//!
//! Kept separate from the socket machinery so the drop/deliver logic is
//! unit-testable with an injected clock and coin. The seen-set mutation is
//! a single check-then-insert performed under one lock acquisition by the
//! caller, which keeps dedup atomic for concurrently-arriving frames.

use hermes_core::Envelope;
use std::collections::HashMap;

/// Why an envelope was silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// TTL exceeded (or unreadable, which fails toward expired).
    Expired,
    /// The id is already in the seen-set.
    Duplicate,
    /// A public key was declared but the signature did not verify.
    BadSignature,
}

/// Outcome of running an envelope through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deliver to the application; forward onward when `rebroadcast` is set.
    Deliver {
        /// Whether the TTL-decayed coin flip selected this frame for
        /// rebroadcast.
        rebroadcast: bool,
    },
    /// Drop without side effects.
    Drop(DropReason),
}

/// Seen-message tracking plus the envelope acceptance rules.
#[derive(Debug, Default)]
pub struct ReceivePipeline {
    /// Message id to first-seen timestamp (epoch ms).
    seen: HashMap<String, i64>,
}

impl ReceivePipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one envelope through expiry, dedup, and signature checks.
    ///
    /// `coin` is a uniform sample from `[0, 1)`; the envelope is selected
    /// for rebroadcast when it falls below the TTL-decayed probability.
    /// Recording into the seen-set happens here, atomically with the check.
    pub fn evaluate(&mut self, envelope: &Envelope, now_ms: i64, coin: f64) -> Verdict {
        if hermes_ttl::is_expired_at(envelope, now_ms) {
            return Verdict::Drop(DropReason::Expired);
        }

        if self.seen.contains_key(&envelope.id) {
            return Verdict::Drop(DropReason::Duplicate);
        }
        self.seen.insert(envelope.id.clone(), now_ms);

        if let Some(pub_key) = &envelope.from.pub_key {
            let content = envelope.message.signing_string();
            if !hermes_crypto::verify_detached(&content, &envelope.signature, pub_key) {
                return Verdict::Drop(DropReason::BadSignature);
            }
        }

        let probability = hermes_ttl::rebroadcast_probability_at(envelope, now_ms);
        Verdict::Deliver {
            rebroadcast: coin < probability,
        }
    }

    /// Purge seen-set entries older than `ttl_ms`, returning how many were
    /// removed. Independent of the envelopes' own TTLs.
    pub fn purge_seen(&mut self, now_ms: i64, ttl_ms: i64) -> usize {
        let before = self.seen.len();
        self.seen
            .retain(|_, first_seen| now_ms - *first_seen <= ttl_ms);
        before - self.seen.len()
    }

    /// Number of tracked message ids.
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }
}
