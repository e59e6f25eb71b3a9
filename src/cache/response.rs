//! In-memory TTL cache for endpoint responses.
//!
//! # Key design
//!
//! The key is `"{call}:{params}"` where `params` is the compact JSON
//! serialization of the parameter value. `serde_json::Value` stores objects
//! in an ordered map, so two structurally equal parameter values serialize to
//! the same string no matter how (or in which key order) they were built.
//! Keeping the function name as a readable prefix is what lets
//! [`ResponseCache::clear`] target one family of calls by substring.
//!
//! # Concurrency
//!
//! A single `Mutex` guards the map. Every operation, including the overflow
//! sweep, completes inside one critical section and never awaits, so no
//! reader can observe a half-applied update.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use super::CacheConfig;
use crate::clock::{Clock, TokioClock};
use crate::telemetry;

/// A cached endpoint result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached payload.
    pub value: Value,
    /// When the entry was written.
    pub created_at: Instant,
    /// How long the entry stays valid.
    pub ttl: Duration,
    /// Insertion order, breaks ties between equal `created_at`.
    seq: u64,
}

impl CacheEntry {
    /// Whether the entry is still valid at `now` (`now - created_at < ttl`).
    pub fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    next_seq: u64,
}

/// In-memory response cache with per-entry TTL.
///
/// See the [module docs](super) for the eviction policy.
pub struct ResponseCache {
    entries: Mutex<Entries>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    /// Create a cache driven by the tokio clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    /// Create a cache that reads time from `clock`.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            config,
            clock,
        }
    }

    /// Look up a cached result.
    ///
    /// Returns `None` on a miss. An expired entry is removed and reported as
    /// a miss. Emits cache hit/miss metrics.
    pub fn get(&self, call: &str, params: &Value) -> Option<Value> {
        let key = cache_key(call, params);
        let now = self.clock.now();
        let mut entries = self.lock();

        let hit = match entries.map.get(&key) {
            Some(entry) if entry.is_valid(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.map.remove(&key);
                debug!(call, "expired cache entry dropped");
                None
            }
            None => None,
        };
        drop(entries);

        match hit {
            Some(value) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "call" => call.to_owned())
                    .increment(1);
                Some(value)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "call" => call.to_owned())
                    .increment(1);
                None
            }
        }
    }

    /// Insert (or overwrite) a result with the given time-to-live.
    ///
    /// Runs the overflow sweep when the cache grows past the high-water mark.
    pub fn set(&self, call: &str, params: &Value, value: Value, ttl: Duration) {
        let key = cache_key(call, params);
        let now = self.clock.now();
        let mut entries = self.lock();

        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.map.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                ttl,
                seq,
            },
        );

        if entries.map.len() > self.config.high_water {
            let evicted = self.sweep(&mut entries, now);
            if evicted > 0 {
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(evicted as u64);
                debug!(evicted, remaining = entries.map.len(), "cache overflow sweep");
            }
        }
    }

    /// Remove entries whose key contains `pattern`, or every entry when
    /// `pattern` is `None`.
    ///
    /// Returns the number of removed entries.
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        let mut entries = self.lock();
        let before = entries.map.len();
        match pattern {
            Some(pattern) => entries.map.retain(|key, _| !key.contains(pattern)),
            None => entries.map.clear(),
        }
        before - entries.map.len()
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.map.len();
        entries.map.retain(|_, entry| entry.is_valid(now));
        before - entries.map.len()
    }

    /// Number of entries currently stored, expired ones included until they
    /// are swept.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expired sweep, then oldest-first trim down to the low-water mark.
    fn sweep(&self, entries: &mut Entries, now: Instant) -> usize {
        let before = entries.map.len();
        entries.map.retain(|_, entry| entry.is_valid(now));

        if entries.map.len() > self.config.low_water {
            let excess = entries.map.len() - self.config.low_water;
            let mut by_age: Vec<(Instant, u64, String)> = entries
                .map
                .iter()
                .map(|(key, entry)| (entry.created_at, entry.seq, key.clone()))
                .collect();
            by_age.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
            for (_, _, key) in by_age.into_iter().take(excess) {
                entries.map.remove(&key);
            }
        }

        before - entries.map.len()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Compute the cache key for a call.
pub fn cache_key(call: &str, params: &Value) -> String {
    format!("{call}:{params}")
}
