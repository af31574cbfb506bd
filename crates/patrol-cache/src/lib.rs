//! Patrol fingerprinting and analysis-result cache.
//!
//! This crate provides the deduplication layer of the analysis pipeline:
//! a deterministic content fingerprint for error records, and a bounded
//! in-memory cache with TTL and configurable LRU/FIFO eviction that keys
//! analysis results by that fingerprint.

pub mod fingerprint;

mod entry;
mod store;

pub use fingerprint::{fingerprint, ErrorFingerprint, FINGERPRINT_VERSION};
pub use store::EvictionPolicy;

use std::sync::Mutex;
use std::time::Duration;

use patrol_core::AnalysisResult;

use crate::store::Store;

/// Construction parameters for [`AnalysisCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries; 0 is valid and means the cache never
    /// retains anything.
    pub max_size: usize,
    pub policy: EvictionPolicy,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            policy: EvictionPolicy::Lru,
            ttl: Duration::from_secs(86400),
        }
    }
}

/// Bounded in-memory cache of analysis results.
///
/// One instance lives for the whole process and is shared across engine
/// invocations. All mutating operations, including the recency update
/// inside `get`, are serialized behind a single mutex scoped to the
/// instance.
pub struct AnalysisCache {
    inner: Mutex<Store>,
}

impl AnalysisCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Store::new(config.max_size, config.policy, config.ttl)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the counters may be off by one but the map itself stays valid.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a clone of the cached result, refreshing recency under LRU.
    /// Expired entries are removed and reported as misses.
    pub fn get(&self, key: &str) -> Option<AnalysisResult> {
        let found = self.lock().get(key);
        match &found {
            Some(_) => log::debug!("cache hit: {}", key_prefix(key)),
            None => log::debug!("cache miss: {}", key_prefix(key)),
        }
        found
    }

    /// Inserts or overwrites; at capacity a new key evicts one entry per
    /// the configured policy before landing.
    pub fn put(&self, key: &str, result: AnalysisResult) {
        self.lock().put(key, result);
        log::debug!("cache stored: {}", key_prefix(key));
    }

    /// Read-only snapshot of the counters, taken under the same lock as
    /// the mutating operations.
    pub fn stats(&self) -> CacheStats {
        let store = self.lock();
        let total = store.hits + store.misses;
        let hit_rate = if total > 0 {
            store.hits as f64 / total as f64
        } else {
            0.0
        };
        let utilization = if store.max_size() > 0 {
            store.len() as f64 / store.max_size() as f64 * 100.0
        } else {
            0.0
        };

        CacheStats {
            hits: store.hits,
            misses: store.misses,
            writes: store.writes,
            evictions: store.evictions,
            expirations: store.expirations,
            size: store.len(),
            max_size: store.max_size(),
            policy: store.policy(),
            hit_rate,
            utilization,
        }
    }

    /// Drop all entries. Administrative and test use.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop expired entries eagerly, returning the count removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self.lock().purge_expired();
        if removed > 0 {
            log::info!("purged {removed} expired cache entries");
        }
        removed
    }
}

fn key_prefix(key: &str) -> &str {
    key.get(..24).unwrap_or(key)
}

/// Point-in-time view over the cache counters.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub max_size: usize,
    pub policy: EvictionPolicy,
    /// hits / (hits + misses), 0 when nothing was looked up yet.
    pub hit_rate: f64,
    /// Occupancy in percent; 0 for a zero-capacity cache.
    pub utilization: f64,
}
