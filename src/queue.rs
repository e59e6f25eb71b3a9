//! Priority queue for optimized calls, drained by a single serial worker.
//!
//! Requests are ordered by [`Priority`] (high before normal before low) and,
//! within a priority, by arrival. One worker task pops the head, runs it
//! through the [`CallExecutor`] to completion, settles the caller's
//! [`PendingCall`], and moves on; calls from the queue never overlap.
//!
//! The worker is started on demand: an enqueue that finds no worker running
//! spawns one, and the worker exits once the queue is empty. The running
//! flag lives under the same lock as the pending list, so "queue empty, stop"
//! and "request added, start" are decided atomically and at most one worker
//! exists at a time.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::executor::CallExecutor;
use crate::options::{CallOptions, Priority};
use crate::telemetry;
use crate::{HuginnError, Result};

/// A call waiting for the worker.
struct QueuedRequest {
    id: String,
    call: String,
    params: Value,
    options: CallOptions,
    priority: Priority,
    enqueued_at: Instant,
    responder: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct QueueState {
    /// Sorted: priority descending, then arrival ascending.
    pending: Vec<QueuedRequest>,
    running: bool,
    next_seq: u64,
}

struct Shared {
    state: Mutex<QueueState>,
    executor: Arc<CallExecutor>,
}

/// Serial, priority-ordered call queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct CallQueue {
    shared: Arc<Shared>,
}

impl CallQueue {
    pub fn new(executor: Arc<CallExecutor>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                executor,
            }),
        }
    }

    /// Queue a call and return a handle that resolves with its result.
    ///
    /// The request's priority is taken from `options.priority`.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context when a worker has to be started.
    pub fn enqueue(
        &self,
        call: impl Into<String>,
        params: Value,
        options: CallOptions,
    ) -> PendingCall {
        let (responder, receiver) = oneshot::channel();
        let call = call.into();

        let (id, start_worker) = {
            let mut state = self.shared.lock();
            let seq = state.next_seq;
            state.next_seq += 1;

            let id = format!("req-{seq}");
            let priority = options.priority;
            let request = QueuedRequest {
                id: id.clone(),
                call,
                params,
                options,
                priority,
                enqueued_at: Instant::now(),
                responder,
            };

            // Equal priorities keep arrival order: insert after them.
            let pos = state
                .pending
                .partition_point(|queued| queued.priority >= priority);
            state.pending.insert(pos, request);
            metrics::gauge!(telemetry::QUEUE_DEPTH).set(state.pending.len() as f64);

            let start_worker = !state.running;
            state.running = true;
            (id, start_worker)
        };

        debug!(id = %id, start_worker, "call enqueued");
        if start_worker {
            tokio::spawn(Shared::drain(self.shared.clone()));
        }

        PendingCall { id, receiver }
    }

    /// Number of requests waiting (the one being executed is not counted).
    pub fn len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a worker is currently draining the queue.
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Worker loop: run queued calls one at a time until the queue is empty.
    async fn drain(self: Arc<Self>) {
        let mut guard = WorkerGuard {
            shared: self.clone(),
            armed: true,
        };

        loop {
            let request = {
                let mut state = self.lock();
                if state.pending.is_empty() {
                    state.running = false;
                    guard.armed = false;
                    return;
                }
                let request = state.pending.remove(0);
                metrics::gauge!(telemetry::QUEUE_DEPTH).set(state.pending.len() as f64);
                request
            };

            debug!(
                id = %request.id,
                call = %request.call,
                priority = ?request.priority,
                waited_ms = request.enqueued_at.elapsed().as_millis() as u64,
                "dispatching queued call"
            );
            let result = self
                .executor
                .call(&request.call, &request.params, &request.options)
                .await;
            if request.responder.send(result).is_err() {
                debug!(id = %request.id, "caller dropped its handle, result discarded");
            }
        }
    }
}

/// Clears the running flag if the worker dies before finishing normally, so
/// the next enqueue can start a fresh one.
struct WorkerGuard {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if self.armed {
            self.shared.lock().running = false;
        }
    }
}

/// Handle to a queued call's eventual result.
///
/// Resolves to [`HuginnError::QueueClosed`] if the worker is torn down
/// before settling the request.
#[must_use = "a pending call does nothing unless awaited"]
pub struct PendingCall {
    id: String,
    receiver: oneshot::Receiver<Result<Value>>,
}

impl PendingCall {
    /// Unique request id, as logged by the worker.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(HuginnError::QueueClosed)))
    }
}
