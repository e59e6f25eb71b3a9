//! Time source and delay capability.
//!
//! Backoff sleeps, batch pacing and cache expiry all go through a [`Clock`]
//! so tests can observe or replace them. [`TokioClock`] is built on
//! `tokio::time`, which means `#[tokio::test(start_paused = true)]` already
//! gives a virtual clock; a custom implementation can record the requested
//! delays as well.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Source of the current time and of delays.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Default clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
