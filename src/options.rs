//! Per-call configuration.

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduling priority for queued calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Numeric rank, higher runs first: high = 3, normal = 2, low = 1.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Options for a single optimized call.
///
/// ```rust
/// # use huginn::{CallOptions, Priority};
/// # use std::time::Duration;
/// let options = CallOptions::default()
///     .ttl(Duration::from_secs(600))
///     .retries(2)
///     .priority(Priority::High);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    /// Read from and write to the response cache. Default: true.
    pub use_cache: bool,
    /// Lifetime of a cached result. Default: 5 minutes.
    pub ttl: Duration,
    /// Queue priority (ignored by direct calls). Default: normal.
    pub priority: Priority,
    /// Retries after the first attempt. Default: 3.
    pub retries: u32,
    /// Bound on each individual attempt. Default: 30s.
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            ttl: Duration::from_secs(300),
            priority: Priority::Normal,
            retries: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CallOptions {
    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_by_rank() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn priority_parses_lowercase() {
        let p: Priority = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(p, Priority::High);
    }
}
