//! Retry helper
//!
//! Exponential backoff around transient transport failures. Cancellation,
//! timeout, and shutdown errors are non-retryable: there is no value in
//! retrying an operation the caller has already abandoned.

use crate::ports::GatewayError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Whether an error is worth another attempt
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            GatewayError::Cancelled | GatewayError::Timeout | GatewayError::ShuttingDown
        )
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The external token fired before or between attempts
    #[error("cancelled before attempt {attempt}")]
    Cancelled { attempt: u32 },

    /// The task failed and will not be retried further; `attempts` is the
    /// 1-based count of attempts actually made
    #[error("failed after {attempts} attempt(s): {source}")]
    Failed {
        #[source]
        source: E,
        attempts: u32,
    },
}

impl<E: std::error::Error> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Cancelled { attempt } => *attempt,
            RetryError::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Backoff shape: `min_delay * factor^(attempt-1)`, capped at `max_delay`,
/// jittered into `[1, 2)x` when `randomize` is set
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries beyond the first attempt
    pub retries: u32,
    pub factor: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub randomize: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            factor: 2.0,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            randomize: true,
        }
    }
}

impl RetryPolicy {
    pub fn no_jitter(mut self) -> Self {
        self.randomize = false;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Delay before the retry following the given 1-based failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let base = self.min_delay.as_secs_f64() * exp;
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = if self.randomize {
            capped * rand::rng().random_range(1.0..2.0)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered)
    }
}

/// Run `task` with retries, bailing on errors the [`Retryable`] impl marks
/// non-retryable. The task receives a clone of the external token so it can
/// pass cancellation down into the transport.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    task: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::error::Error + 'static,
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(policy, token, task, |err, _attempt| !err.is_retryable()).await
}

/// Like [`with_retry`] with an explicit bail predicate. The predicate sees
/// each error with its 1-based attempt count; returning true stops retrying
/// immediately.
pub async fn with_retry_if<T, E, F, Fut, B>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut task: F,
    bail: B,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    B: Fn(&E, u32) -> bool,
{
    let mut attempt: u32 = 1;
    loop {
        if token.is_cancelled() {
            return Err(RetryError::Cancelled { attempt });
        }
        match task(token.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if bail(&err, attempt) || attempt > policy.retries {
                    return Err(RetryError::Failed {
                        source: err,
                        attempts: attempt,
                    });
                }
                let delay = policy.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after backoff");
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(RetryError::Cancelled { attempt });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            retries: 3,
            factor: 2.0,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
            randomize: false,
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default().no_jitter();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(20), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay_for(1).as_secs_f64();
            assert!((1.0..2.0).contains(&d), "jittered delay {d}");
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let token = CancellationToken::new();
        let result = with_retry(&fast_policy(), &token, move |_t| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GatewayError::RequestFailed("flaky".into()))
                } else {
                    Ok("done".to_string())
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_error_is_attempted_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let token = CancellationToken::new();
        let result: Result<String, _> = with_retry(&fast_policy(), &token, move |_t| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Cancelled)
            }
        })
        .await;
        match result {
            Err(RetryError::Failed { source, attempts }) => {
                assert!(source.is_cancelled());
                assert_eq!(attempts, 1);
            }
            other => panic!("expected bail, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_error_is_not_retried() {
        let token = CancellationToken::new();
        let result: Result<String, _> = with_retry(&fast_policy(), &token, |_t| async {
            Err(GatewayError::Timeout)
        })
        .await;
        assert!(matches!(
            result,
            Err(RetryError::Failed { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_never_runs_task() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<String, RetryError<GatewayError>> =
            with_retry(&fast_policy(), &token, move |_t| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(GatewayError::Other("must not run".into()))
                }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Cancelled { attempt: 1 })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_carry_final_attempt_count() {
        let token = CancellationToken::new();
        let policy = fast_policy().with_retries(2);
        let result: Result<String, _> = with_retry(&policy, &token, |_t| async {
            Err(GatewayError::RequestFailed("always".into()))
        })
        .await;
        match result {
            Err(RetryError::Failed { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_custom_bail_predicate() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let token = CancellationToken::new();
        let result: Result<String, _> = with_retry_if(
            &fast_policy(),
            &token,
            move |_t| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(GatewayError::RequestFailed("x".into()))
                }
            },
            |_err, attempt| attempt >= 2,
        )
        .await;
        assert!(matches!(
            result,
            Err(RetryError::Failed { attempts: 2, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
