//! Cache-aware, timeout-bounded call execution with retry.
//!
//! [`CallExecutor::call`] is the single path every optimized call takes,
//! whether issued directly, drained from the queue, or fanned out by the
//! batch runner:
//!
//! 1. consult the [`ResponseCache`] when the call opts in,
//! 2. invoke the endpoint, bounded by [`CallOptions::timeout`],
//! 3. on failure, back off `base_delay * 2^attempt` and try again, up to
//!    [`CallOptions::retries`] more times,
//! 4. record the outcome in [`PerformanceMetrics`] and the `metrics` facade.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::cache::ResponseCache;
use crate::clock::Clock;
use crate::endpoint::AiEndpoint;
use crate::options::CallOptions;
use crate::performance::PerformanceMetrics;
use crate::telemetry;
use crate::{HuginnError, Result};

/// Which failures the executor retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Retry only errors classified as transient by
    /// [`HuginnError::is_transient()`]. Permanent errors return at once.
    #[default]
    TransientOnly,
    /// Retry every error, including ones that will recur identically.
    Blanket,
}

/// Backoff policy shared by all calls of an executor.
///
/// ```rust
/// # use huginn::{RetryMode, RetryPolicy};
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .base_delay(Duration::from_millis(250))
///     .mode(RetryMode::Blanket);
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry; doubles on each further retry. Default: 1s.
    pub base_delay: Duration,
    /// Error classes eligible for retry. Default: transient only.
    pub mode: RetryMode,
    /// Upper bound on a server `retry-after` hint. Default: 60s.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            mode: RetryMode::default(),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set which errors are retried.
    pub fn mode(mut self, mode: RetryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the longest wait a `retry-after` hint may impose.
    pub fn max_retry_after(mut self, limit: Duration) -> Self {
        self.max_retry_after = limit;
        self
    }

    /// Backoff after the failed attempt `attempt` (0-indexed):
    /// `base_delay * 2^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Backoff respecting a server `retry_after` hint, which wins when present.
    ///
    /// The hint is capped at [`max_retry_after`](Self::max_retry_after) so one
    /// rate-limited call cannot park the queue worker indefinitely.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_retry_after),
            None => self.delay_for_attempt(attempt),
        }
    }

    /// Whether `err` may be retried under this policy.
    pub fn should_retry(&self, err: &HuginnError) -> bool {
        match self.mode {
            RetryMode::TransientOnly => err.is_transient(),
            RetryMode::Blanket => true,
        }
    }
}

/// Executes calls against an endpoint through the cache with retry.
///
/// Holds no mutable state of its own; side effects go to the shared cache
/// and metrics.
pub struct CallExecutor {
    endpoint: Arc<dyn AiEndpoint>,
    cache: Arc<ResponseCache>,
    metrics: Arc<PerformanceMetrics>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl CallExecutor {
    pub fn new(
        endpoint: Arc<dyn AiEndpoint>,
        cache: Arc<ResponseCache>,
        metrics: Arc<PerformanceMetrics>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            endpoint,
            cache,
            metrics,
            clock,
            policy,
        }
    }

    /// The clock used for backoff and timing.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The backoff policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one optimized call.
    ///
    /// Makes at most `options.retries + 1` endpoint attempts. Returns the last
    /// error once retries are exhausted or the error is not retryable.
    ///
    /// Every call records exactly one outcome. A call dropped before it
    /// finishes (for example by a batch step timeout) counts as an error.
    #[instrument(skip(self, params, options), fields(endpoint = self.endpoint.name()))]
    pub async fn call(&self, call: &str, params: &Value, options: &CallOptions) -> Result<Value> {
        self.metrics.record_request();
        let mut outcome = Outcome {
            executor: self,
            call,
            start: self.clock.now(),
            settled: false,
        };

        if options.use_cache
            && let Some(value) = self.cache.get(call, params)
        {
            let elapsed = outcome.settle("cached");
            self.metrics.record_cache_hit(elapsed);
            debug!(call, "served from cache");
            return Ok(value);
        }

        let mut attempt = 0;
        loop {
            match self.attempt(call, params, options.timeout).await {
                Ok(value) => {
                    if options.use_cache {
                        self.cache.set(call, params, value.clone(), options.ttl);
                    }
                    let elapsed = outcome.settle("ok");
                    self.metrics.record_response_time(elapsed);
                    return Ok(value);
                }
                Err(e) if attempt < options.retries && self.policy.should_retry(&e) => {
                    let delay = self.policy.effective_delay(attempt, e.retry_after());
                    metrics::counter!(telemetry::RETRIES_TOTAL, "call" => call.to_owned())
                        .increment(1);
                    warn!(
                        call,
                        attempt = attempt + 1,
                        max_attempts = options.retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after failed call"
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    outcome.settle("error");
                    self.metrics.record_error();
                    return Err(e);
                }
            }
        }
    }

    /// A single endpoint attempt. Dropping the invocation on timeout cancels
    /// the in-flight request.
    async fn attempt(&self, call: &str, params: &Value, timeout: Duration) -> Result<Value> {
        match tokio::time::timeout(timeout, self.endpoint.invoke(call, params)).await {
            Ok(result) => result,
            Err(_) => Err(HuginnError::Timeout(timeout)),
        }
    }

    fn record_outcome(call: &str, status: &'static str, elapsed: Duration) {
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "call" => call.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "call" => call.to_owned(),
        )
        .record(elapsed.as_secs_f64());
    }
}

/// Tracks a started call until its outcome is recorded; a call dropped
/// while unsettled is recorded as a cancelled error.
struct Outcome<'a> {
    executor: &'a CallExecutor,
    call: &'a str,
    start: Instant,
    settled: bool,
}

impl Outcome<'_> {
    /// Emit the outcome telemetry and return the call's elapsed time.
    fn settle(&mut self, status: &'static str) -> Duration {
        self.settled = true;
        let elapsed = self.elapsed();
        CallExecutor::record_outcome(self.call, status, elapsed);
        elapsed
    }

    fn elapsed(&self) -> Duration {
        self.executor
            .clock
            .now()
            .saturating_duration_since(self.start)
    }
}

impl Drop for Outcome<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.executor.metrics.record_error();
        CallExecutor::record_outcome(self.call, "cancelled", self.elapsed());
        debug!(call = self.call, "call dropped before completion");
    }
}
