//! In-process performance counters.
//!
//! [`PerformanceMetrics`] is updated by the executor and read through
//! [`OptimizedAiService::snapshot()`](crate::OptimizedAiService::snapshot).
//! It complements the `metrics` facade ([`telemetry`](crate::telemetry)):
//! the facade feeds an external recorder, these counters answer "how is the
//! optimizer doing right now" without one.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    total_requests: u64,
    cache_hits: u64,
    total_response_time_ms: u64,
    error_count: u64,
}

/// Request, cache-hit, latency and error tallies.
///
/// All counters sit behind one lock so a snapshot never mixes values from
/// before and after a [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    counters: Mutex<Counters>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a call entering the executor.
    pub(crate) fn record_request(&self) {
        self.lock().total_requests += 1;
    }

    /// Count a call answered from the cache, with the time it took.
    pub(crate) fn record_cache_hit(&self, elapsed: Duration) {
        let mut counters = self.lock();
        counters.cache_hits += 1;
        counters.total_response_time_ms += elapsed.as_millis() as u64;
    }

    /// Add the duration of a successful endpoint call.
    pub(crate) fn record_response_time(&self, elapsed: Duration) {
        self.lock().total_response_time_ms += elapsed.as_millis() as u64;
    }

    /// Count a call that failed after exhausting its retries.
    pub(crate) fn record_error(&self) {
        self.lock().error_count += 1;
    }

    /// Zero every counter.
    pub fn reset(&self) {
        *self.lock() = Counters::default();
    }

    /// Derive rates and averages from the current counters.
    ///
    /// `cache_size` and `queue_length` are left at zero; the service fills
    /// them in from the cache and queue it owns.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = *self.lock();
        MetricsSnapshot {
            total_requests: c.total_requests,
            cache_hits: c.cache_hits,
            error_count: c.error_count,
            cache_hit_rate: ratio(c.cache_hits as f64, c.total_requests),
            average_response_time_ms: ratio(c.total_response_time_ms as f64, c.total_requests),
            error_rate: ratio(c.error_count as f64, c.total_requests),
            cache_size: 0,
            queue_length: 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ratio(numerator: f64, requests: u64) -> f64 {
    if requests == 0 {
        0.0
    } else {
        numerator / requests as f64
    }
}

/// Point-in-time view of the optimizer's performance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub error_count: u64,
    /// `cache_hits / total_requests`, 0 with no requests.
    pub cache_hit_rate: f64,
    /// `total_response_time_ms / total_requests`, 0 with no requests.
    pub average_response_time_ms: f64,
    /// `error_count / total_requests`, 0 with no requests.
    pub error_rate: f64,
    pub cache_size: usize,
    pub queue_length: usize,
}
