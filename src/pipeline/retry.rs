// src/pipeline/retry.rs
//
// Bounded exponential backoff around one analyzer call.
//
//   attempt n (0-based) failed → sleep min(base * 2^n, max) → attempt n+1
//
// Every attempt is bounded by the analyzer timeout and every wait is
// cancellable. Non-retryable errors end the loop immediately.

use crate::error::AnalyzerError;
use crate::types::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_millis(config.base_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay after the given 0-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Result of a retried call, with the number of attempts made.
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, AnalyzerError>,
    pub attempts: u32,
}

pub async fn with_backoff<T, F, Fut>(
    backoff: Backoff,
    timeout: Duration,
    cancel: &CancellationToken,
    mut call: F,
) -> Retried<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AnalyzerError>>,
{
    let mut attempt = 0;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AnalyzerError::Cancelled),
            res = tokio::time::timeout(timeout, call(attempt)) => match res {
                Ok(inner) => inner,
                Err(_) => Err(AnalyzerError::Timeout(timeout)),
            },
        };
        attempt += 1;

        let err = match outcome {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= backoff.max_attempts {
            return Retried {
                result: Err(err),
                attempts: attempt,
            };
        }

        let delay = backoff.delay(attempt - 1);
        debug!("Attempt {} failed ({}), retrying in {:?}", attempt, err, delay);
        tokio::select! {
            _ = cancel.cancelled() => {
                return Retried {
                    result: Err(AnalyzerError::Cancelled),
                    attempts: attempt,
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn backoff(max_attempts: u32) -> Backoff {
        Backoff {
            max_attempts,
            base: Duration::from_millis(10),
            max: Duration::from_millis(40),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let b = backoff(5);
        assert_eq!(b.delay(0), Duration::from_millis(10));
        assert_eq!(b.delay(1), Duration::from_millis(20));
        assert_eq!(b.delay(2), Duration::from_millis(40));
        assert_eq!(b.delay(3), Duration::from_millis(40));
        assert_eq!(b.delay(40), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let counter = calls.clone();
        let out = with_backoff(backoff(3), Duration::from_secs(1), &cancel, move |_| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AnalyzerError::Unavailable("connection refused".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(out.result.unwrap(), 7);
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let cancel = CancellationToken::new();
        let out: Retried<()> = with_backoff(backoff(3), Duration::from_millis(50), &cancel, |_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(matches!(out.result, Err(AnalyzerError::Timeout(_))));
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let cancel = CancellationToken::new();
        let out: Retried<()> = with_backoff(backoff(3), Duration::from_secs(1), &cancel, |_| async {
            Err(AnalyzerError::Rejected {
                status: 400,
                body: "bad request".to_string(),
            })
        })
        .await;
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retry() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out: Retried<()> = with_backoff(backoff(3), Duration::from_secs(1), &cancel, |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(out.result, Err(AnalyzerError::Cancelled)));
        assert_eq!(out.attempts, 1);
    }
}
