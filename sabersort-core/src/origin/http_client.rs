//! HTTP client shared by origin resolvers, with retry and backoff.

use std::time::{Duration, Instant};

use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by [`FetchClient`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered 404; origins read this as a deleted post.
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Configuration for the shared HTTP client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retry attempts for transient errors.
    pub max_retries: u32,
    /// Initial retry interval in milliseconds.
    pub initial_interval_ms: u64,
    /// Maximum retry interval in milliseconds.
    pub max_interval_ms: u64,
    /// User agent sent with every request.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            initial_interval_ms: 200,
            max_interval_ms: 5_000,
            user_agent: None,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HTTP client with retry and backoff.
///
/// One client is built per sort run and shared by every resolver; dropping
/// the run drops the connection pool.
pub struct FetchClient {
    client: Client,
    config: HttpConfig,
}

impl FetchClient {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder().timeout(config.timeout());
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let client = builder.build()?;

        Ok(Self { client, config })
    }

    /// GET `url` and return the body, retrying transient failures.
    pub async fn get_bytes(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> Result<Vec<u8>, FetchError> {
        retry_notify(
            self.build_backoff(),
            || async move { self.fetch_once(url, headers).await },
            |err: FetchError, duration: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await
    }

    /// GET `url` and parse the body as JSON.
    pub async fn get_json<R: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> Result<R, FetchError> {
        let body = self.get_bytes(url, headers).await?;
        serde_json::from_slice(&body).map_err(|e| {
            warn!(url, error = %e, "Failed to parse JSON response");
            FetchError::Decode(e.to_string())
        })
    }

    async fn fetch_once(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> Result<Vec<u8>, backoff::Error<FetchError>> {
        let start = Instant::now();

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            if is_transient_error(&e) {
                warn!(url, error = %e, latency_ms, "Transient error, will retry");
                backoff::Error::transient(FetchError::Transport(e))
            } else {
                warn!(url, error = %e, latency_ms, "Permanent error, aborting");
                backoff::Error::permanent(FetchError::Transport(e))
            }
        })?;

        let status = response.status();
        debug!(url, status = %status, "Received HTTP response");

        if status == StatusCode::NOT_FOUND {
            return Err(backoff::Error::permanent(FetchError::NotFound(
                url.to_string(),
            )));
        }
        if !status.is_success() {
            let err = FetchError::Status {
                url: url.to_string(),
                status,
            };
            return if is_transient_status(status) {
                warn!(url, status = %status, "Transient HTTP status, will retry");
                Err(backoff::Error::transient(err))
            } else {
                warn!(url, status = %status, "Permanent HTTP error");
                Err(backoff::Error::permanent(err))
            };
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| backoff::Error::permanent(FetchError::Transport(e)))?;

        debug!(
            url,
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed successfully"
        );
        Ok(body.to_vec())
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.config.initial_interval_ms),
            max_interval: Duration::from_millis(self.config.max_interval_ms),
            max_elapsed_time: Some(self.config.timeout() * self.config.max_retries.max(1)),
            ..Default::default()
        }
    }
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_status_codes() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn test_client_builds_with_user_agent() {
        let config = HttpConfig {
            user_agent: Some("sabersort-test".into()),
            ..Default::default()
        };
        assert!(FetchClient::new(config).is_ok());
    }
}
