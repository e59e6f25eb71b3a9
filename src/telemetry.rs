//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! These are exported in addition to the in-process
//! [`PerformanceMetrics`](crate::PerformanceMetrics) counters, which back
//! [`OptimizedAiService::snapshot()`](crate::OptimizedAiService::snapshot).
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `call`: endpoint function name (e.g. "student-analysis")
//! - `status`: outcome: "ok", "cached", "error" or "cancelled"

/// Total calls handled by the executor, including cache hits.
///
/// Labels: `call`, `status` ("ok" | "cached" | "error" | "cancelled").
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// Call duration in seconds, measured from entry to return.
///
/// Labels: `call`.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Total retry attempts (not counting the initial attempt).
///
/// Labels: `call`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total response cache hits.
///
/// Labels: `call`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total response cache misses (absent or expired).
///
/// Labels: `call`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Entries removed by the overflow sweep (expired or oldest-first trim).
pub const CACHE_EVICTIONS_TOTAL: &str = "huginn_cache_evictions_total";

/// Number of requests waiting in the priority queue.
pub const QUEUE_DEPTH: &str = "huginn_queue_depth";

/// Batch items that resolved to `None`.
///
/// Labels: `call`.
pub const BATCH_ITEM_FAILURES_TOTAL: &str = "huginn_batch_item_failures_total";
