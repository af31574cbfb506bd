//! The bounded map behind the cache facade: eviction, expiry, counters.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use patrol_core::AnalysisResult;
use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;

/// Rule choosing the victim when the store is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionPolicy {
    Lru,
    Fifo,
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LRU" => Ok(EvictionPolicy::Lru),
            "FIFO" => Ok(EvictionPolicy::Fifo),
            other => Err(format!("unknown eviction policy: {other}")),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Store {
    entries: HashMap<String, CacheEntry>,
    max_size: usize,
    policy: EvictionPolicy,
    ttl: Duration,
    next_seq: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl Store {
    pub fn new(max_size: usize, policy: EvictionPolicy, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            policy,
            ttl,
            next_seq: 0,
            hits: 0,
            misses: 0,
            writes: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Look up a key. An expired entry is removed and counted as a miss,
    /// never as a hit-then-discard. Under LRU a hit refreshes recency.
    pub fn get(&mut self, key: &str) -> Option<AnalysisResult> {
        let now = Instant::now();
        let expired = self.entries.get(key).map(|entry| entry.is_expired(now));

        match expired {
            None => {
                self.misses += 1;
                None
            }
            Some(true) => {
                self.entries.remove(key);
                self.expirations += 1;
                self.misses += 1;
                None
            }
            Some(false) => {
                self.hits += 1;
                let seq = self.bump_seq();
                let entry = self.entries.get_mut(key)?;
                if self.policy == EvictionPolicy::Lru {
                    entry.touch(seq);
                }
                Some(entry.result.clone())
            }
        }
    }

    /// Insert or overwrite. A new key at capacity evicts exactly one entry
    /// first. With `max_size == 0` the store never grows and `put` is a
    /// recorded no-op.
    pub fn put(&mut self, key: &str, result: AnalysisResult) {
        self.writes += 1;

        if self.max_size == 0 {
            return;
        }

        let seq = self.bump_seq();
        let ttl = self.ttl;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.refresh(result, ttl, seq);
            return;
        }

        while self.entries.len() >= self.max_size {
            self.evict_one();
        }
        self.entries
            .insert(key.to_string(), CacheEntry::new(result, self.ttl, seq));
    }

    fn evict_one(&mut self) {
        let policy = self.policy;
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| match policy {
                EvictionPolicy::Lru => entry.access_seq,
                EvictionPolicy::Fifo => entry.insert_seq,
            })
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            self.evictions += 1;
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - self.entries.len();
        self.expirations += removed as u64;
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }
}
