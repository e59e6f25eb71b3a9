//! Service facade tying the cache, executor, queue and batch runner together.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::batch::{BatchOptions, BatchReport, BatchRunner, BatchStep};
use crate::cache::{CacheConfig, ResponseCache};
use crate::clock::{Clock, TokioClock};
use crate::config::Config;
use crate::endpoint::{AiEndpoint, HttpEndpoint};
use crate::executor::{CallExecutor, RetryMode, RetryPolicy};
use crate::options::CallOptions;
use crate::performance::{MetricsSnapshot, PerformanceMetrics};
use crate::queue::{CallQueue, PendingCall};
use crate::{HuginnError, Result};

/// Main entry point for creating service instances.
pub struct Huginn;

impl Huginn {
    /// Create a new builder for configuring the service.
    pub fn builder() -> HuginnBuilder {
        HuginnBuilder::new()
    }
}

/// Builder for configuring service instances.
pub struct HuginnBuilder {
    endpoint: Option<Arc<dyn AiEndpoint>>,
    http: Option<(String, String, Option<Duration>)>,
    cache_config: CacheConfig,
    retry_policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    default_options: CallOptions,
    batch_options: BatchOptions,
}

impl HuginnBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: None,
            http: None,
            cache_config: CacheConfig::default(),
            retry_policy: RetryPolicy::default(),
            clock: Arc::new(TokioClock),
            default_options: CallOptions::default(),
            batch_options: BatchOptions::default(),
        }
    }

    /// Use a custom endpoint implementation.
    pub fn endpoint(mut self, endpoint: Arc<dyn AiEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Call serverless functions over HTTP under `base_url`.
    ///
    /// Ignored when [`endpoint`](Self::endpoint) is also set.
    pub fn http_endpoint(
        mut self,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.http = Some((base_url.into(), api_key.into(), None));
        self
    }

    /// Set cache limits.
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Set the full backoff policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set which errors are retried.
    ///
    /// - [`RetryMode::TransientOnly`]: permanent errors return immediately (default)
    /// - [`RetryMode::Blanket`]: every error consumes the retry budget
    pub fn retry_mode(mut self, mode: RetryMode) -> Self {
        self.retry_policy.mode = mode;
        self
    }

    /// Set the delay before the first retry.
    pub fn backoff_base(mut self, delay: Duration) -> Self {
        self.retry_policy.base_delay = delay;
        self
    }

    /// Replace the time source used for backoff, pacing and cache expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Options used by [`OptimizedAiService::call_default`].
    pub fn default_options(mut self, options: CallOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Options used by [`OptimizedAiService::run_batch_default`].
    pub fn batch_options(mut self, options: BatchOptions) -> Self {
        self.batch_options = options;
        self
    }

    /// Apply every setting from a loaded [`Config`].
    pub fn from_config(mut self, config: &Config) -> Self {
        if let Some(base_url) = &config.endpoint.base_url {
            let api_key = config.endpoint.resolve_api_key().unwrap_or_default();
            self.http = Some((
                base_url.clone(),
                api_key,
                Some(Duration::from_secs(config.endpoint.http_timeout_secs)),
            ));
        }
        self.cache_config = config.cache.to_cache_config();
        self.retry_policy = config.retry.to_policy();
        self.default_options = config.call_options();
        self.batch_options = config.batch_options();
        self
    }

    /// Build the service.
    pub fn build(self) -> Result<OptimizedAiService> {
        let endpoint: Arc<dyn AiEndpoint> = match (self.endpoint, self.http) {
            (Some(endpoint), _) => endpoint,
            (None, Some((base_url, api_key, timeout))) => Arc::new(match timeout {
                Some(timeout) => HttpEndpoint::with_timeout(base_url, api_key, timeout)?,
                None => HttpEndpoint::new(base_url, api_key)?,
            }),
            (None, None) => return Err(HuginnError::NoEndpoint),
        };

        if self.cache_config.low_water > self.cache_config.high_water {
            return Err(HuginnError::Configuration(format!(
                "cache low-water mark ({}) exceeds high-water mark ({})",
                self.cache_config.low_water, self.cache_config.high_water
            )));
        }

        let cache = Arc::new(ResponseCache::with_clock(
            self.cache_config,
            self.clock.clone(),
        ));
        let metrics = Arc::new(PerformanceMetrics::new());
        let executor = Arc::new(CallExecutor::new(
            endpoint.clone(),
            cache.clone(),
            metrics.clone(),
            self.clock,
            self.retry_policy,
        ));

        info!(endpoint = endpoint.name(), "optimized AI service ready");

        Ok(OptimizedAiService {
            inner: Arc::new(Inner {
                queue: CallQueue::new(executor.clone()),
                batch: BatchRunner::new(executor.clone()),
                executor,
                cache,
                metrics,
                default_options: self.default_options,
                batch_options: self.batch_options,
            }),
        })
    }
}

impl Default for HuginnBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    executor: Arc<CallExecutor>,
    queue: CallQueue,
    batch: BatchRunner,
    cache: Arc<ResponseCache>,
    metrics: Arc<PerformanceMetrics>,
    default_options: CallOptions,
    batch_options: BatchOptions,
}

/// Optimized access to an AI endpoint: cached, retried, queued and batched.
///
/// Build once with [`Huginn::builder()`] and share by cloning; clones use
/// the same cache, queue and counters.
#[derive(Clone)]
pub struct OptimizedAiService {
    inner: Arc<Inner>,
}

impl OptimizedAiService {
    /// Run a call directly, bypassing the queue.
    pub async fn call(&self, call: &str, params: &Value, options: &CallOptions) -> Result<Value> {
        self.inner.executor.call(call, params, options).await
    }

    /// [`call`](Self::call) with the configured default options.
    pub async fn call_default(&self, call: &str, params: &Value) -> Result<Value> {
        self.call(call, params, &self.inner.default_options).await
    }

    /// Queue a call by `options.priority`; await the handle for the result.
    pub fn enqueue(
        &self,
        call: impl Into<String>,
        params: Value,
        options: CallOptions,
    ) -> PendingCall {
        self.inner.queue.enqueue(call, params, options)
    }

    /// Run a batch of calls; see [`BatchRunner::run_batch`].
    pub async fn run_batch(
        &self,
        call: &str,
        params: &[Value],
        options: &BatchOptions,
    ) -> BatchReport {
        self.inner.batch.run_batch(call, params, options).await
    }

    /// [`run_batch`](Self::run_batch) with the configured default batch options.
    pub async fn run_batch_default(&self, call: &str, params: &[Value]) -> BatchReport {
        self.run_batch(call, params, &self.inner.batch_options).await
    }

    /// Run a batch, reporting `(completed, total)` after every chunk.
    pub async fn run_batch_with_progress(
        &self,
        call: &str,
        params: &[Value],
        options: &BatchOptions,
        on_progress: impl FnMut(usize, usize),
    ) -> BatchReport {
        self.inner
            .batch
            .run_batch_with_progress(call, params, options, on_progress)
            .await
    }

    /// Run a batch, handing accumulated results to `on_step` after every chunk.
    pub async fn run_progressive(
        &self,
        call: &str,
        params: &[Value],
        options: &BatchOptions,
        on_step: impl FnMut(&BatchStep),
    ) -> BatchReport {
        self.inner
            .batch
            .run_progressive(call, params, options, on_step)
            .await
    }

    /// Run a batch in the background, streaming a step after every chunk.
    pub fn progressive_stream(
        &self,
        call: impl Into<String>,
        params: Vec<Value>,
        options: BatchOptions,
    ) -> Pin<Box<dyn Stream<Item = BatchStep> + Send>> {
        self.inner.batch.progressive_stream(call, params, options)
    }

    /// Current counters plus cache size and queue length.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_size: self.inner.cache.len(),
            queue_length: self.inner.queue.len(),
            ..self.inner.metrics.snapshot()
        }
    }

    /// Zero the performance counters.
    pub fn reset_metrics(&self) {
        self.inner.metrics.reset();
    }

    /// Remove cached results whose key contains `pattern`, or all of them.
    ///
    /// Keys start with the function name, so `Some("student-analysis")`
    /// drops every cached result of that function.
    pub fn clear_cache(&self, pattern: Option<&str>) -> usize {
        let removed = self.inner.cache.clear(pattern);
        debug!(pattern, removed, "cache cleared");
        removed
    }

    /// Periodically purge expired cache entries until the handle is aborted.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn spawn_cache_janitor(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.inner.cache.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "expired cache entries purged");
                }
            }
        })
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    /// The performance counters.
    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.inner.metrics
    }

    /// Whether the queue worker is currently running.
    pub fn queue_running(&self) -> bool {
        self.inner.queue.is_running()
    }
}
