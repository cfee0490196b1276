//! Message identifier generation.
//!
//! Ids have the form `msg_<epoch_ms>_<counter>_<random>`: the timestamp and
//! per-instance counter make collisions between messages from one origin
//! impossible, the random suffix makes cross-origin collisions
//! overwhelmingly unlikely. An id is assigned exactly once, at origin;
//! relays never regenerate it.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Length of the random id suffix in characters.
const RANDOM_SUFFIX_LEN: usize = 8;

/// Per-instance message id source.
///
/// Owned by a single client instance rather than living in module-global
/// state, so independent instances in one process (or in tests) never share
/// a counter.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    counter: AtomicU64,
}

impl MessageIdGenerator {
    /// Create a generator with the counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next unique message id.
    pub fn next_id(&self) -> String {
        self.next_id_at(crate::time::now_millis())
    }

    /// Produce the next id with an explicit timestamp (test hook).
    pub fn next_id_at(&self, now_ms: i64) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_SUFFIX_LEN)
            .map(char::from)
            .collect();
        format!("msg_{now_ms}_{count}_{suffix}")
    }
}
