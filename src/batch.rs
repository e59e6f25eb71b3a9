//! Batch and progressive processing of many calls to the same function.
//!
//! The parameter list is split into fixed-size chunks. Items in a chunk run
//! concurrently through the [`CallExecutor`]; chunks run one after another
//! with a pacing delay in between, which bounds the load put on the
//! endpoint.
//!
//! Failures are isolated per item: a failing item leaves `None` in its slot
//! of [`BatchReport::results`] and an [`ItemFailure`] carrying the reason,
//! while its siblings complete normally. Results are stored by position,
//! so the output order always matches the input order regardless of which
//! item finished first.
//!
//! The progressive variants additionally publish a [`BatchStep`] with the
//! accumulated results after every chunk, either to a callback
//! ([`BatchRunner::run_progressive`]) or as a stream
//! ([`BatchRunner::progressive_stream`]).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use futures_util::future::{join_all, ready};
use serde_json::Value;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::executor::CallExecutor;
use crate::options::CallOptions;
use crate::telemetry;
use crate::{HuginnError, Result};

/// Steps buffered between a progressive run and a slow stream consumer.
pub const DEFAULT_STEP_BUFFER: usize = 16;

/// Options for batch runs.
///
/// ```rust
/// # use huginn::BatchOptions;
/// # use std::time::Duration;
/// let options = BatchOptions::analysis().step_timeout(Duration::from_secs(90));
/// assert_eq!(options.batch_size, 3);
/// ```
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Items per chunk. Default: 5. Zero is treated as one.
    pub batch_size: usize,
    /// Pause between chunks. Default: 100ms.
    pub delay: Duration,
    /// Upper bound on a whole chunk. Items still running when it elapses
    /// resolve to `None` with a timeout failure and the run continues.
    /// Default: none.
    pub step_timeout: Option<Duration>,
    /// Options applied to every item.
    pub call: CallOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            delay: Duration::from_millis(100),
            step_timeout: None,
            call: CallOptions::default(),
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smaller, slower chunks for heavy analysis workloads.
    pub fn analysis() -> Self {
        Self {
            batch_size: 3,
            delay: Duration::from_millis(500),
            ..Self::default()
        }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn call_options(mut self, options: CallOptions) -> Self {
        self.call = options;
        self
    }
}

/// Why a batch item produced no value.
#[derive(Debug)]
pub struct ItemFailure {
    /// Position of the item in the input list.
    pub index: usize,
    pub error: HuginnError,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One slot per input item, in input order; `None` marks a failure.
    pub results: Vec<Option<Value>>,
    /// Failure reasons, in input order.
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    fn with_len(len: usize) -> Self {
        Self {
            results: vec![None; len],
            failures: Vec::new(),
        }
    }

    /// Number of items that produced a value.
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    /// Number of items that failed.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Position of a progressive run after a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Zero-based index of the chunk just finished.
    pub batch_index: usize,
    pub total_batches: usize,
    /// Items processed so far, failed ones included.
    pub completed: usize,
    pub total: usize,
}

/// Snapshot published after each chunk of a progressive run.
#[derive(Debug, Clone)]
pub struct BatchStep {
    pub progress: BatchProgress,
    /// Results so far; slots of unprocessed items are `None`.
    pub results: Vec<Option<Value>>,
}

/// Runs lists of calls in paced, concurrent chunks.
#[derive(Clone)]
pub struct BatchRunner {
    executor: Arc<CallExecutor>,
}

impl BatchRunner {
    pub fn new(executor: Arc<CallExecutor>) -> Self {
        Self { executor }
    }

    /// Run `call` once per entry of `params`.
    pub async fn run_batch(
        &self,
        call: &str,
        params: &[Value],
        options: &BatchOptions,
    ) -> BatchReport {
        self.run_batch_with_progress(call, params, options, |_, _| {}).await
    }

    /// Like [`run_batch`](Self::run_batch), reporting `(completed, total)`
    /// after each chunk.
    pub async fn run_batch_with_progress(
        &self,
        call: &str,
        params: &[Value],
        options: &BatchOptions,
        mut on_progress: impl FnMut(usize, usize),
    ) -> BatchReport {
        self.run_steps(call, params, options, |progress, _| {
            on_progress(progress.completed, progress.total);
            ready(true)
        })
        .await
    }

    /// Like [`run_batch`](Self::run_batch), handing the accumulated results
    /// to `on_step` after each chunk.
    pub async fn run_progressive(
        &self,
        call: &str,
        params: &[Value],
        options: &BatchOptions,
        mut on_step: impl FnMut(&BatchStep),
    ) -> BatchReport {
        self.run_steps(call, params, options, |progress, results| {
            on_step(&BatchStep {
                progress,
                results: results.to_vec(),
            });
            ready(true)
        })
        .await
    }

    /// Run progressively in a background task and stream the steps.
    ///
    /// The stream is bounded: the run pauses when the consumer falls
    /// [`DEFAULT_STEP_BUFFER`] steps behind, and stops once the stream is
    /// dropped.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn progressive_stream(
        &self,
        call: impl Into<String>,
        params: Vec<Value>,
        options: BatchOptions,
    ) -> Pin<Box<dyn Stream<Item = BatchStep> + Send>> {
        let (tx, rx) = tokio::sync::mpsc::channel(DEFAULT_STEP_BUFFER);
        let runner = self.clone();
        let call = call.into();

        tokio::spawn(async move {
            runner
                .run_steps(&call, &params, &options, |progress, results| {
                    let tx = tx.clone();
                    let step = BatchStep {
                        progress,
                        results: results.to_vec(),
                    };
                    async move { tx.send(step).await.is_ok() }
                })
                .await;
        });

        Box::pin(ReceiverStream::new(rx))
    }

    /// Shared chunk loop. `sink` sees every step; returning `false` stops the
    /// run early.
    async fn run_steps<F, Fut>(
        &self,
        call: &str,
        params: &[Value],
        options: &BatchOptions,
        mut sink: F,
    ) -> BatchReport
    where
        F: FnMut(BatchProgress, &[Option<Value>]) -> Fut,
        Fut: Future<Output = bool>,
    {
        let total = params.len();
        let size = options.batch_size.max(1);
        let total_batches = total.div_ceil(size);
        let mut report = BatchReport::with_len(total);

        for (batch_index, chunk) in params.chunks(size).enumerate() {
            if batch_index > 0 && !options.delay.is_zero() {
                self.executor.clock().sleep(options.delay).await;
            }

            let offset = batch_index * size;
            let outcomes = self.run_chunk(call, chunk, options).await;
            for (i, outcome) in outcomes.into_iter().enumerate() {
                let index = offset + i;
                match outcome {
                    Ok(value) => report.results[index] = Some(value),
                    Err(error) => {
                        warn!(call, index, error = %error, "batch item failed");
                        metrics::counter!(
                            telemetry::BATCH_ITEM_FAILURES_TOTAL,
                            "call" => call.to_owned()
                        )
                        .increment(1);
                        report.failures.push(ItemFailure { index, error });
                    }
                }
            }

            let progress = BatchProgress {
                batch_index,
                total_batches,
                completed: offset + chunk.len(),
                total,
            };
            debug!(call, ?progress, "batch finished");
            if !sink(progress, &report.results).await {
                debug!(call, "step consumer gone, stopping batch run");
                break;
            }
        }

        report
    }

    /// Run one chunk concurrently; results come back in chunk order.
    ///
    /// With a step timeout, every item shares one deadline. Items still
    /// running when it passes are dropped and resolve to
    /// [`HuginnError::Timeout`]; items that already finished keep their result.
    async fn run_chunk(
        &self,
        call: &str,
        chunk: &[Value],
        options: &BatchOptions,
    ) -> Vec<Result<Value>> {
        let deadline = options
            .step_timeout
            .map(|limit| (Instant::now() + limit, limit));

        join_all(chunk.iter().map(|params| async move {
            let item = self.executor.call(call, params, &options.call);
            match deadline {
                None => item.await,
                Some((at, limit)) => tokio::time::timeout_at(at, item)
                    .await
                    .unwrap_or_else(|_| Err(HuginnError::Timeout(limit))),
            }
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_general_and_analysis_workloads() {
        let general = BatchOptions::default();
        assert_eq!(general.batch_size, 5);
        assert_eq!(general.delay, Duration::from_millis(100));
        assert!(general.step_timeout.is_none());

        let analysis = BatchOptions::analysis();
        assert_eq!(analysis.batch_size, 3);
        assert_eq!(analysis.delay, Duration::from_millis(500));
    }

    #[test]
    fn report_counts() {
        let mut report = BatchReport::with_len(3);
        report.results[0] = Some(Value::Null);
        report.results[2] = Some(Value::Bool(true));
        report.failures.push(ItemFailure {
            index: 1,
            error: HuginnError::EmptyResponse,
        });
        assert_eq!(report.successful(), 2);
        assert_eq!(report.failed(), 1);
    }
}
