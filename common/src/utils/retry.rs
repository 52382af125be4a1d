use std::future::Future;
use std::time::Duration;

use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use crate::{error::AppError, utils::config::RetrySettings};

/// Bounded retry policy passed explicitly to every retrying call site.
///
/// Only transient errors (see [`AppError::is_transient`]) are retried; a
/// non-transient error surfaces from the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            attempts: settings.attempts.max(1),
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay_ms,
            max_delay_ms,
        }
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.base_delay_ms.max(1))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .map(jitter)
            .take(self.attempts.saturating_sub(1))
    }

    pub async fn run<T, Fut, F>(&self, operation: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        RetryIf::spawn(self.strategy(), operation, |err: &AppError| {
            err.is_transient()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn quick_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, 1, 5)
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let result = quick_policy(5)
            .run(|| async {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(AppError::ServiceUnavailable("flaky".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.expect("third attempt succeeds"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), AppError> = quick_policy(3)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::ServiceUnavailable("still down".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), AppError> = quick_policy(5)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Validation("bad document".into()))
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
