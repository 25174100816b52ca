//! Store retry logic with exponential backoff.
//!
//! Retries store HTTP requests on transient failures: connection errors,
//! server errors and rate limits (429). When the platform sends a
//! `Retry-After` header with a 429 the header wins over the computed backoff.

use std::{future::Future, time::Duration};

use reqwest::{StatusCode, header::RETRY_AFTER};
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Determines if a reqwest error is retryable.
pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect()
        || error.is_timeout()
        || error.is_request()
        || error
            .status()
            .map(|s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS)
            .unwrap_or(false)
}

/// Delay requested by the platform through `Retry-After`, in seconds (fractions allowed).
///
/// Values too large for a `Duration` saturate; the caller caps them at `max_delay`.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let value = response.headers().get(RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = value.trim().parse().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

/// Execute an async request with retry logic.
///
/// `make_request` is called once per attempt. Returns the first response that
/// is not retryable (which may still be an error status), or the last error
/// once retries are exhausted.
pub async fn with_retry<F, Fut>(
    config: &RetryConfig,
    operation: &str,
    make_request: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    if !config.enabled {
        return make_request().await;
    }

    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        let last_attempt = attempt + 1 >= max_attempts;

        match make_request().await {
            Ok(response) => {
                let status = response.status();

                if config.should_retry_status(status.as_u16()) && !last_attempt {
                    let delay = match retry_after(&response) {
                        Some(requested) if status == StatusCode::TOO_MANY_REQUESTS => {
                            requested.min(config.max_delay())
                        }
                        _ => config.delay_for_attempt(attempt),
                    };
                    warn!(
                        operation = operation,
                        status = %status,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis(),
                        "Retryable status code, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                if attempt > 0 {
                    debug!(
                        operation = operation,
                        status = %status,
                        attempt = attempt + 1,
                        "Request finished after retry"
                    );
                }

                return Ok(response);
            }
            Err(error) => {
                if is_retryable_error(&error) && !last_attempt {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        operation = operation,
                        error = %error,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis(),
                        "Retryable error, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                if attempt > 0 {
                    warn!(
                        operation = operation,
                        error = %error,
                        attempts = attempt + 1,
                        "Request failed after all retry attempts"
                    );
                }

                return Err(error);
            }
        }
    }
}
