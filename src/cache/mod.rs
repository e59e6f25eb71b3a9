//! Caching subsystem.
//!
//! [`ResponseCache`] stores endpoint results keyed on
//! `(function name, parameters)`, each entry with its own time-to-live.
//! Consulted by the [`CallExecutor`](crate::executor::CallExecutor) when a
//! call opts in via [`CallOptions::use_cache`](crate::CallOptions::use_cache).
//!
//! # Eviction
//!
//! Expiry is lazy: an expired entry is removed when it is next read, or by the
//! overflow sweep. The sweep runs when an insert pushes the entry count past
//! [`CacheConfig::high_water`]; it drops every expired entry and then, if the
//! cache is still above [`CacheConfig::low_water`], evicts the oldest entries
//! by creation time. Reads do not refresh an entry; this is not an LRU.

pub mod response;

pub use response::{CacheEntry, ResponseCache, cache_key};

/// Configuration for the response cache.
///
/// ```rust
/// # use huginn::CacheConfig;
/// let config = CacheConfig::new()
///     .high_water(2_000)
///     .low_water(1_500);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entry count above which an insert triggers the sweep. Default: 1,000.
    pub high_water: usize,
    /// Target entry count for the oldest-first trim. Default: 800.
    pub low_water: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            high_water: 1_000,
            low_water: 800,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the high-water mark.
    pub fn high_water(mut self, n: usize) -> Self {
        self.high_water = n;
        self
    }

    /// Set the low-water mark.
    pub fn low_water(mut self, n: usize) -> Self {
        self.low_water = n;
        self
    }
}
