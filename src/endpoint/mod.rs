//! Endpoint abstraction for named AI analysis functions.
//!
//! The optimizer treats the analysis service as an opaque RPC: a function
//! name plus JSON parameters in, JSON out, with an error channel. Anything
//! implementing [`AiEndpoint`] can sit behind the executor: the bundled
//! [`HttpEndpoint`] for serverless functions, or a mock in tests.
//!
//! # Example
//!
//! ```ignore
//! struct Echo;
//!
//! #[async_trait]
//! impl AiEndpoint for Echo {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn invoke(&self, _function: &str, params: &Value) -> Result<Value> {
//!         Ok(params.clone())
//!     }
//! }
//! ```

pub mod http;

pub use http::HttpEndpoint;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// A remote service exposing named analysis functions.
#[async_trait]
pub trait AiEndpoint: Send + Sync {
    /// Endpoint name for logging/debugging.
    fn name(&self) -> &str;

    /// Invoke `function` with `params`.
    ///
    /// Implementations report failures through [`HuginnError`](crate::HuginnError);
    /// [`is_transient()`](crate::HuginnError::is_transient) decides whether the
    /// executor retries them.
    async fn invoke(&self, function: &str, params: &Value) -> Result<Value>;
}
