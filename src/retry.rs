use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::CatalogError;
use crate::config::RetrySettings;

/// Bounded retry with exponential backoff for remote catalog calls.
///
/// Only rate-limit and transient failures are retried. The default policy
/// never retries, so every failure is terminal for the step that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_secs(settings.max_delay_seconds),
        }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    /// A server-provided retry-after wins when it is within the cap.
    pub fn delay_for(&self, attempt: u32, err: &CatalogError) -> Duration {
        if let CatalogError::RateLimited {
            retry_after: Some(secs),
        } = err
        {
            return Duration::from_secs(*secs).min(self.max_delay);
        }
        let factor = 1_u32 << attempt.min(10);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation, attempt, "remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_retries && err.is_retryable() => {
                    let delay = self.delay_for(attempt, &err);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retryable remote failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy(5);
        let err = CatalogError::Transient("reset".into());
        assert_eq!(p.delay_for(0, &err), Duration::from_millis(100));
        assert_eq!(p.delay_for(2, &err), Duration::from_millis(400));
        assert_eq!(p.delay_for(8, &err), Duration::from_secs(1));

        let limited = CatalogError::RateLimited {
            retry_after: Some(30),
        };
        assert_eq!(p.delay_for(0, &limited), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);
        let value = policy(3)
            .run("search_track", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CatalogError::Transient("timeout".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_does_not_retry() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = RetryPolicy::default()
            .run("add_tracks", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CatalogError::Transient("503".into())) }
            })
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = policy(5)
            .run("create_playlist", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CatalogError::Unauthorized) }
            })
            .await;
        assert!(matches!(res, Err(CatalogError::Unauthorized)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
