//! Huginn - caching, retrying, queueing and batching for AI analysis calls
//!
//! This crate sits between an application and a service exposing named AI
//! analysis functions (JSON in, JSON out). It adds a TTL response cache,
//! timeout-bounded calls with exponential-backoff retry, a priority queue
//! drained by a single worker, and paced batch processing with per-item
//! failure isolation. A metrics collector summarises hit rate, latency and
//! errors.
//!
//! # Call Example
//!
//! ```rust,no_run
//! use huginn::{CallOptions, Huginn};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let service = Huginn::builder()
//!         .http_endpoint("https://project.example.test", "anon-key")
//!         .build()?;
//!
//!     let analysis = service
//!         .call(
//!             "student-analysis",
//!             &json!({"student_id": "s-42"}),
//!             &CallOptions::default(),
//!         )
//!         .await?;
//!
//!     println!("{analysis}");
//!     println!("{:?}", service.snapshot());
//!     Ok(())
//! }
//! ```
//!
//! # Batch Example
//!
//! ```rust,ignore
//! use huginn::BatchOptions;
//!
//! let params: Vec<_> = student_ids.iter().map(|id| json!({"student_id": id})).collect();
//! let report = service
//!     .run_batch("student-analysis", &params, &BatchOptions::analysis())
//!     .await;
//!
//! for failure in &report.failures {
//!     eprintln!("student #{} failed: {}", failure.index, failure.error);
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod clock;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod options;
pub mod performance;
pub mod queue;
pub mod service;
pub mod telemetry;

// Re-export main types at crate root
pub use batch::{BatchOptions, BatchProgress, BatchReport, BatchRunner, BatchStep, ItemFailure};
pub use cache::{CacheConfig, ResponseCache};
pub use clock::{Clock, TokioClock};
pub use config::Config;
pub use endpoint::{AiEndpoint, HttpEndpoint};
pub use error::{HuginnError, Result};
pub use executor::{CallExecutor, RetryMode, RetryPolicy};
pub use options::{CallOptions, Priority};
pub use performance::{MetricsSnapshot, PerformanceMetrics};
pub use queue::{CallQueue, PendingCall};
pub use service::{Huginn, HuginnBuilder, OptimizedAiService};
