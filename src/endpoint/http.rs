//! HTTP client for serverless analysis functions.
//!
//! Functions are invoked with `POST {base_url}/functions/v1/{function}` and a
//! JSON body, authenticated with the project key in both the
//! `Authorization: Bearer` and `apikey` headers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::AiEndpoint;
use crate::{HuginnError, Result};

/// Transport-level timeout. Per-call timeouts are enforced by the executor.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for serverless functions over HTTP.
#[derive(Clone)]
pub struct HttpEndpoint {
    api_key: String,
    http: Client,
    base_url: String,
}

impl HttpEndpoint {
    /// Create a client for the functions hosted under `base_url`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a client with a custom transport timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn function_url(&self, function: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, function)
    }

    /// Map non-success statuses to error variants.
    fn handle_response_errors(&self, response: &reqwest::Response, function: &str) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 | 403 => Err(HuginnError::AuthenticationFailed),
            404 => Err(HuginnError::FunctionNotFound(function.to_string())),
            400 | 422 => Err(HuginnError::InvalidInput(format!(
                "function '{function}' rejected its parameters ({status})"
            ))),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(HuginnError::RateLimited { retry_after })
            }
            code => Err(HuginnError::Api {
                status: code,
                message: format!("function '{function}' failed: {status}"),
            }),
        }
    }
}

#[async_trait]
impl AiEndpoint for HttpEndpoint {
    fn name(&self) -> &str {
        "http"
    }

    async fn invoke(&self, function: &str, params: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.function_url(function))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("apikey", &self.api_key)
            .json(params)
            .send()
            .await?;

        self.handle_response_errors(&response, function)?;
        let status = response.status().as_u16();

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(HuginnError::EmptyResponse);
        }
        // Malformed bodies surface as `Json`, which is never retried.
        let value: Value = serde_json::from_slice(&body)?;

        // Functions may report failures in-band with a 2xx status.
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Err(HuginnError::Api {
                status,
                message: message.to_string(),
            });
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_url_strips_trailing_slash() {
        let endpoint = HttpEndpoint::new("https://example.test/", "key").unwrap();
        assert_eq!(
            endpoint.function_url("student-analysis"),
            "https://example.test/functions/v1/student-analysis"
        );
    }
}
