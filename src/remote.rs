//! Shared HTTP plumbing for remote providers: client construction and retry with backoff.
//!
//! Transport failures, timeouts, `429 Too Many Requests`, and `5xx` responses are retried with an
//! exponential delay. Any other non-success status is returned to the caller immediately so each
//! provider can map it onto its own error type.

use crate::config::Config;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;

/// Retry schedule for remote provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first request.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Build the policy from the `REMOTE_*` configuration values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.remote_max_retries,
            base_delay: Duration::from_millis(config.remote_retry_base_ms),
        }
    }

    /// Policy that sends exactly one request.
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Failure observed after the retry budget was spent (or a non-retryable status).
#[derive(Debug)]
pub enum RemoteFailure {
    /// The request never produced a response (connect error, timeout, body error). The request
    /// URL is stripped from the error.
    Transport(reqwest::Error),
    /// The provider answered with a non-success status.
    Status {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Response body, best effort.
        body: String,
    },
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(error) if error.is_timeout() => write!(f, "request timed out: {error}"),
            Self::Transport(error) => write!(f, "request failed: {error}"),
            Self::Status { status, body } => write!(f, "provider returned {status}: {body}"),
        }
    }
}

/// Build a `reqwest` client with a per-request timeout.
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send a request built by `build`, retrying transient failures according to `policy`.
///
/// `build` is invoked once per attempt because a `RequestBuilder` is consumed on send.
pub async fn send_with_retry<F>(
    policy: RetryPolicy,
    provider: &str,
    build: F,
) -> Result<Response, RemoteFailure>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let failure = match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let failure = RemoteFailure::Status { status, body };
                if !is_transient(status) {
                    return Err(failure);
                }
                failure
            }
            // Provider URLs can carry credentials; never let them reach logs or callers.
            Err(error) => RemoteFailure::Transport(error.without_url()),
        };

        if attempt >= policy.max_retries {
            tracing::warn!(provider, attempts = attempt + 1, error = %failure, "Remote call failed");
            return Err(failure);
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            provider,
            attempt = attempt + 1,
            max_attempts = policy.max_retries + 1,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Transient remote failure; retrying"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn retries_rate_limited_responses_until_budget_is_spent() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/limited");
                then.status(429).body("slow down");
            })
            .await;

        let client = build_http_client("docqa-test", Duration::from_secs(5)).expect("client");
        let url = format!("{}/limited", server.base_url());
        let failure = send_with_retry(fast_policy(2), "test", || client.post(&url))
            .await
            .expect_err("rate limited");

        mock.assert_hits_async(3).await;
        assert!(matches!(
            failure,
            RemoteFailure::Status { status, .. } if status == StatusCode::TOO_MANY_REQUESTS
        ));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/bad");
                then.status(400).body("bad request");
            })
            .await;

        let client = build_http_client("docqa-test", Duration::from_secs(5)).expect("client");
        let url = format!("{}/bad", server.base_url());
        let failure = send_with_retry(fast_policy(3), "test", || client.post(&url))
            .await
            .expect_err("bad request");

        mock.assert_hits_async(1).await;
        match failure {
            RemoteFailure::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "bad request");
            }
            other => panic!("unexpected failure: {other}"),
        }
    }

    #[tokio::test]
    async fn transport_errors_surface_after_retries() {
        let client = build_http_client("docqa-test", Duration::from_millis(200)).expect("client");
        // Port 9 (discard) on loopback is expected to refuse connections.
        let failure = send_with_retry(fast_policy(1), "test", || {
            client.post("http://127.0.0.1:9/unreachable")
        })
        .await
        .expect_err("unreachable");
        assert!(matches!(failure, RemoteFailure::Transport(_)));
    }

    #[tokio::test]
    async fn transport_errors_omit_the_request_url() {
        let client = build_http_client("docqa-test", Duration::from_millis(200)).expect("client");
        let failure = send_with_retry(RetryPolicy::no_retry(), "test", || {
            client.post("http://127.0.0.1:9/unreachable?token=hunter2")
        })
        .await
        .expect_err("unreachable");

        let message = failure.to_string();
        assert!(message.starts_with("request failed"), "{message}");
        assert!(!message.contains("hunter2"), "{message}");
        assert!(!message.contains("/unreachable"), "{message}");
    }
}
