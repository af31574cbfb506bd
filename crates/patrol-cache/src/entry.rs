//! Cache entry bookkeeping.

use std::time::{Duration, Instant};

use patrol_core::AnalysisResult;

/// One cached analysis with its lifetime markers.
///
/// Owned exclusively by the store; callers always receive clones of the
/// wrapped result. Ordering uses monotonic sequence numbers rather than
/// wall-clock timestamps, so entries inserted within the same millisecond
/// still evict in insertion order.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub result: AnalysisResult,
    pub expires_at: Instant,
    /// Assigned at first insertion; preserved across overwrites.
    pub insert_seq: u64,
    /// Bumped on every hit and on every overwrite.
    pub access_seq: u64,
}

impl CacheEntry {
    pub fn new(result: AnalysisResult, ttl: Duration, seq: u64) -> Self {
        Self {
            result,
            expires_at: Instant::now() + ttl,
            insert_seq: seq,
            access_seq: seq,
        }
    }

    /// A zero TTL means the entry is already expired at insertion time.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Overwrite the value and restart the TTL, keeping insertion order.
    pub fn refresh(&mut self, result: AnalysisResult, ttl: Duration, seq: u64) {
        self.result = result;
        self.expires_at = Instant::now() + ttl;
        self.access_seq = seq;
    }

    pub fn touch(&mut self, seq: u64) {
        self.access_seq = seq;
    }
}
