//! HTTP fetch with bounded retry
//!
//! Every upstream call goes through [`RetryingHttpClient`]. Network-level
//! failures, rate limiting (429) and upstream 5xx responses are retried with a
//! linear backoff; everything else fails immediately.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of a single upstream request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            FetchError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FetchError::Decode(_) => false,
        }
    }
}

/// Retry budget and backoff shape
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3)
    pub max_retries: u32,
    /// Delay before retry `n` is `n * base_delay` (default: 1000ms)
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }
}

/// Run `f` until it succeeds, fails with a non-retriable error, or the retry
/// budget is spent.
pub async fn execute_with_retry<F, Fut, T>(
    label: &str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut retry = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if retry < policy.max_retries && e.is_retriable() => {
                retry += 1;
                let delay = policy.delay_for(retry);
                warn!(
                    "{} failed (retry {}/{}): {}. Retrying in {}ms",
                    label,
                    retry,
                    policy.max_retries,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Shared reqwest client with per-request timeout and retry policy
#[derive(Debug, Clone)]
pub struct RetryingHttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl RetryingHttpClient {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("TokenPulse/1.0")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` with `params` appended as a query string and decode JSON.
    pub async fn get_json<T>(&self, url: &str, params: &[(&str, &str)]) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let label = format!("GET {}", url);
        execute_with_retry(&label, &self.policy, || self.get_once(url, params)).await
    }

    async fn get_once<T>(&self, url: &str, params: &[(&str, &str)]) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        debug!("GET {} {:?}", url, params);

        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status { status, body });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
