//! Bounded retry with backoff, per operation class.

use crate::config::{HarvestConfig, OperationClass};
use crate::error::HarvestError;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Runs operations under the retry policy of their class, never sleeping
/// past the harvest deadline.
#[derive(Clone, Copy)]
pub struct Retrier<'a> {
    config: &'a HarvestConfig,
    deadline: Instant,
}

impl<'a> Retrier<'a> {
    pub fn new(config: &'a HarvestConfig, deadline: Instant) -> Self {
        Self { config, deadline }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Run `op`, retrying transient failures. Returns the final outcome and
    /// the number of attempts made.
    ///
    /// Only [`HarvestError::Transient`] is retried. Parse operations are run
    /// exactly once. A backoff that would cross the deadline ends the retries
    /// with the last error.
    pub async fn run_counted<T, F, Fut>(
        &self,
        class: OperationClass,
        what: &str,
        mut op: F,
    ) -> (Result<T, HarvestError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
    {
        let policy = self.config.retry.for_class(class);
        let max_attempts = policy.map(|p| p.attempts.max(1)).unwrap_or(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) => e,
            };

            let policy = match policy {
                Some(p) if err.is_retryable() && attempt < max_attempts => p,
                _ => {
                    if attempt > 1 {
                        warn!(what, attempts = attempt, "giving up: {err}");
                    }
                    return (Err(err), attempt);
                }
            };

            let delay = self.config.scale(policy.delay_after(attempt));
            if Instant::now() + delay >= self.deadline {
                warn!(what, attempts = attempt, "deadline leaves no room to retry: {err}");
                return (Err(err), attempt);
            }
            debug!(
                what,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure: {err}"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// [`run_counted`](Self::run_counted) without the attempt count.
    pub async fn run<T, F, Fut>(&self, class: OperationClass, what: &str, op: F) -> Result<T, HarvestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
    {
        self.run_counted(class, what, op).await.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn retrier(config: &HarvestConfig) -> Retrier<'_> {
        Retrier::new(config, Instant::now() + Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retried_with_backoff() {
        let config = HarvestConfig::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let (result, attempts) = retrier(&config)
            .run_counted(OperationClass::Navigation, "navigate", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(HarvestError::Transient("reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let config = HarvestConfig::default();
        let calls = AtomicU32::new(0);
        let (result, attempts): (Result<(), _>, _) = retrier(&config)
            .run_counted(OperationClass::LocateAndAct, "scroll", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HarvestError::Transient("detached".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_not_retried() {
        let config = HarvestConfig::default();
        for err in [
            HarvestError::NotFound("h1".into()),
            HarvestError::Unavailable("gone".into()),
        ] {
            let calls = AtomicU32::new(0);
            let (result, attempts): (Result<(), _>, _) = retrier(&config)
                .run_counted(OperationClass::LocateAndAct, "locate", || {
                    let err = err.clone();
                    let calls = &calls;
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(err)
                    }
                })
                .await;
            assert_eq!(result.unwrap_err().kind(), err.kind());
            assert_eq!(attempts, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_class_runs_once() {
        let config = HarvestConfig::default();
        let (result, attempts): (Result<(), _>, _) = retrier(&config)
            .run_counted(OperationClass::Parse, "price", || async {
                Err(HarvestError::Transient("odd".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_never_crosses_deadline() {
        let config = HarvestConfig::default();
        let start = Instant::now();
        let retrier = Retrier::new(&config, start + Duration::from_millis(1500));
        let (result, attempts): (Result<(), _>, _) = retrier
            .run_counted(OperationClass::Navigation, "navigate", || async {
                Err(HarvestError::Transient("reset".into()))
            })
            .await;
        assert!(result.is_err());
        // first backoff (1s) fits, second (2s) would cross the deadline
        assert_eq!(attempts, 2);
        assert!(start.elapsed() < Duration::from_millis(1500));
    }
}
