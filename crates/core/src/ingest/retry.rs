use crate::ingest::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
const DEFAULT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("FETCH_MAX_ATTEMPTS") {
            if let Ok(n) = s.parse::<u32>() {
                out.max_attempts = n.max(1);
            }
        }

        if let Ok(s) = std::env::var("FETCH_INITIAL_BACKOFF_MS") {
            if let Ok(n) = s.parse::<u64>() {
                out.initial_backoff = Duration::from_millis(n);
            }
        }

        out
    }

    /// Deterministic part of the wait before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as i32;
        self.initial_backoff
            .mul_f64(self.multiplier.max(1.0).powi(exp))
    }
}

/// `backoff + uniform(0, 0.5 * backoff)`.
pub fn with_jitter(backoff: Duration) -> Duration {
    let max_jitter = backoff.as_secs_f64() * 0.5;
    if max_jitter <= 0.0 {
        return backoff;
    }
    let jitter = rand::thread_rng().gen_range(0.0..max_jitter);
    backoff + Duration::from_secs_f64(jitter)
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the attempts
/// run out. The last error is returned as-is.
pub async fn execute_with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if !err.is_retryable() || attempt >= max_attempts {
                    return Err(err);
                }
                let backoff = with_jitter(policy.backoff_for(attempt));
                tracing::warn!(
                    operation,
                    attempt,
                    ?backoff,
                    http_status = ?err.status(),
                    error = %err,
                    "upstream call failed; retrying"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
        }
    }

    fn http(status: u16) -> FetchError {
        FetchError::Http {
            status,
            body: format!("status {status}"),
        }
    }

    #[tokio::test]
    async fn recovers_after_three_rate_limits() {
        let calls = AtomicU32::new(0);
        let res = execute_with_retries(&fast(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= 3 {
                    Err(http(429))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(res, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn not_found_propagates_without_retry() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = execute_with_retries(&fast(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(http(404)) }
        })
        .await;
        assert_eq!(res, Err(http(404)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quota_exhaustion_is_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = execute_with_retries(&fast(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::QuotaExceeded {
                    detail: "quotaExceeded".to_string(),
                })
            }
        })
        .await;
        assert!(res.unwrap_err().is_quota_exhausted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn returns_last_error_when_attempts_run_out() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = execute_with_retries(&fast(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(http(500 + n as u16)) }
        })
        .await;
        assert_eq!(res, Err(http(505)));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn backoff_doubles_and_jitter_stays_within_half() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_for(1), Duration::from_secs(1));
        assert_eq!(p.backoff_for(2), Duration::from_secs(2));
        assert_eq!(p.backoff_for(4), Duration::from_secs(8));

        for _ in 0..100 {
            let d = with_jitter(Duration::from_secs(2));
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_secs(3));
        }
        assert_eq!(with_jitter(Duration::ZERO), Duration::ZERO);
    }
}
