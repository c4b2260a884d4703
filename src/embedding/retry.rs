use crate::error::{Result, RoamerError};
use std::time::Duration;
use tracing::warn;

/// Maximum backoff cap to prevent excessively long waits.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Decide whether a failed embedding call is worth repeating.
///
/// Retryable: rate limiting (429), server errors (500, 502, 503, 504),
/// timeouts and connection failures. The decision reads the HTTP status,
/// never the response body.
fn is_retryable(err: &RoamerError) -> bool {
    match err {
        RoamerError::Http(e) => e.is_timeout() || e.is_connect(),
        RoamerError::ProviderStatus { status, .. } => {
            matches!(*status, 429 | 500 | 502 | 503 | 504)
        }
        _ => false,
    }
}

/// Retry an async provider call with exponential backoff.
///
/// Starts with `initial_delay` and doubles it each attempt, capped at 30 seconds.
/// `max_retries` of 0 runs the call exactly once.
pub async fn retry_with_backoff<F, Fut, T>(
    max_retries: u32,
    initial_delay: Duration,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt >= max_retries || !is_retryable(&err) {
                    return Err(err);
                }

                warn!(
                    attempt = attempt + 1,
                    max_attempts = max_retries + 1,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Embedding request failed, retrying"
                );

                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn http(status: u16, body: &str) -> RoamerError {
        RoamerError::ProviderStatus {
            status,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let result = retry_with_backoff(3, Duration::from_millis(1), || async {
            Ok::<_, RoamerError>(vec![0.5f32])
        })
        .await;

        assert_eq!(result.unwrap(), vec![0.5]);
    }

    #[tokio::test]
    async fn test_retries_on_rate_limit() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(3, Duration::from_millis(1), || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(http(429, "Too Many Requests"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_auth_failure() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(3, Duration::from_millis(1), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(http(401, "unauthorized")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(2, Duration::from_millis(1), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(http(500, "internal server error")) }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt + 2 retries
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(0, Duration::from_millis(1), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(http(503, "unavailable")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&http(429, "Too Many Requests")));
        assert!(is_retryable(&http(502, "Bad Gateway")));
        assert!(is_retryable(&http(504, "Gateway Timeout")));

        assert!(!is_retryable(&http(400, "Bad Request")));
        assert!(!is_retryable(&http(403, "Forbidden")));
        assert!(!is_retryable(&http(404, "model not found")));

        // Malformed responses and non-provider failures are final
        assert!(!is_retryable(&RoamerError::Provider("503 in a message".into())));
        assert!(!is_retryable(&RoamerError::InvalidCall("503".into())));
        assert!(!is_retryable(&RoamerError::Configuration("timeout".into())));
    }

    #[test]
    fn test_status_wins_over_body_text() {
        assert!(is_retryable(&http(503, "invalid backend state, try again")));
        assert!(!is_retryable(&http(400, "upstream returned 503")));
    }

    #[tokio::test]
    async fn test_retries_server_error_with_misleading_body() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(2, Duration::from_millis(1), || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(http(503, "{\"error\": \"invalid state\"}"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
