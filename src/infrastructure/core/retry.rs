use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::SniperError;

/// Capped exponential backoff with proportional jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Jitter applied to each delay, as a fraction (0.1 = +/-10%).
    pub jitter_pct: f64,
}

impl RetryPolicy {
    /// Account and market reads.
    pub fn reads() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            jitter_pct: 0.1,
        }
    }

    /// Aggregator quotes.
    pub fn quotes() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(800),
            jitter_pct: 0.1,
        }
    }

    /// Transaction submission. Two attempts only: a resubmitted swap
    /// that actually landed would double-charge the wallet.
    pub fn submits() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(2_000),
            jitter_pct: 0.1,
        }
    }

    /// Delay before the given 1-based attempt number retries.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay);
        let jitter = 1.0 + rand::rng().random_range(-self.jitter_pct..=self.jitter_pct);
        Duration::from_millis((exp.as_millis() as f64 * jitter).max(0.0) as u64)
    }
}

/// Run `op` under the policy. Retries only transient errors; breaker
/// rejections and policy errors pass straight through. Exhaustion is
/// reported as `MaxRetriesExceeded`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, SniperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SniperError>>,
{
    let mut last_error: Option<SniperError> = None;

    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                if attempt < policy.max_attempts {
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        "{op_name}: attempt {attempt}/{} failed ({e}), retrying in {:?}",
                        policy.max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
            Err(e) => {
                warn!("{op_name}: non-retryable failure: {e}");
                return Err(e);
            }
        }
    }

    Err(SniperError::MaxRetriesExceeded {
        attempts: policy.max_attempts,
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_first_try_without_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(RetryPolicy::reads(), "op", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SniperError>(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(RetryPolicy::quotes(), "quote", move || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SniperError::Network("reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_becomes_max_retries() {
        let result: Result<(), _> = retry_with_backoff(
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                jitter_pct: 0.0,
            },
            "op",
            || async { Err(SniperError::Timeout(10)) },
        )
        .await;
        assert!(matches!(
            result,
            Err(SniperError::MaxRetriesExceeded { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_policy_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::reads(), "op", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(SniperError::NoRoute { mint: "x".into() })
            }
        })
        .await;
        assert!(matches!(result, Err(SniperError::NoRoute { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_circuit_open_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::reads(), "op", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(SniperError::CircuitOpen {
                    operation: "read".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(SniperError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delays_double_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            jitter_pct: 0.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::quotes();
        for _ in 0..200 {
            let d = policy.delay_for_attempt(2).as_millis() as f64;
            assert!((360.0..=440.0).contains(&d), "delay {d} outside +/-10%");
        }
    }
}
