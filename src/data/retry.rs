use std::time::Duration;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use super::{DataError, DataResult};

/// Longest server-requested pause honoured between attempts
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// Run `operation` up to `max_attempts` times, retrying only errors that
/// `DataError::is_retryable` accepts. A rate-limit response waits out its
/// `Retry-After` before the next attempt.
pub async fn retry_with_backoff<F, Fut, T>(mut operation: F, max_attempts: usize) -> DataResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = DataResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    // 100ms, 200ms, 400ms, ... ; take() counts retries, not attempts
    let retry_strategy = ExponentialBackoff::from_millis(2)
        .factor(50)
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(max_attempts - 1);

    let mut attempt = 0;
    let action = || {
        attempt += 1;
        let last_attempt = attempt >= max_attempts;
        let call = operation();
        async move {
            let result = call.await;
            if let Err(DataError::RateLimit { retry_after }) = &result {
                if !last_attempt {
                    let wait = Duration::from_secs(*retry_after).min(MAX_RATE_LIMIT_WAIT);
                    tracing::warn!(wait_seconds = wait.as_secs(), "Rate limited by broker");
                    tokio::time::sleep(wait).await;
                }
            }
            result
        }
    };

    RetryIf::spawn(retry_strategy, action, |e: &DataError| {
        if e.is_retryable() {
            tracing::warn!(error = %e, "Retryable broker error");
            true
        } else {
            tracing::debug!(error = %e, "Non-retryable broker error");
            false
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = AtomicUsize::new(0);
        let result = retry_with_backoff(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DataError::api_error(503, "busy"))
                    } else {
                        Ok(n)
                    }
                }
            },
            3,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_on_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let result: DataResult<()> = retry_with_backoff(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DataError::Authentication("rejected".into())) }
            },
            5,
        )
        .await;

        assert!(matches!(result, Err(DataError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_limit() {
        let calls = AtomicUsize::new(0);
        let result: DataResult<()> = retry_with_backoff(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DataError::Timeout { timeout_seconds: 1 }) }
            },
            2,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_for_retry_after() {
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let result = retry_with_backoff(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(DataError::RateLimit { retry_after: 7 })
                    } else {
                        Ok(n)
                    }
                }
            },
            3,
        )
        .await;

        assert_eq!(result.unwrap(), 1);
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_on_last_attempt_returns_immediately() {
        let started = tokio::time::Instant::now();
        let result: DataResult<()> =
            retry_with_backoff(|| async { Err(DataError::RateLimit { retry_after: 20 }) }, 1).await;

        assert!(matches!(result, Err(DataError::RateLimit { retry_after: 20 })));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
