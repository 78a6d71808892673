// Store call timeout and retry protection
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use super::store::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryTimeout {
    /// Upper bound on a single store call
    pub timeout: Duration,
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for QueryTimeout {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
        }
    }
}

impl QueryTimeout {
    /// Default timeout for store calls (5 seconds)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    const MAX_BACKOFF: Duration = Duration::from_secs(2);

    pub fn new(timeout: Duration, max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from the base and capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(Self::MAX_BACKOFF)
    }

    /// Run a store call with a timeout, retrying transient failures with
    /// exponential backoff. Permanent failures return immediately.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = match timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.timeout)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        ?delay,
                        "transient store failure, retrying: {}",
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(operation, attempt, "store call gave up: {}", e);
                    }
                    return Err(e);
                }
                ok => return ok,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> QueryTimeout {
        QueryTimeout::new(Duration::from_millis(50), 3, Duration::from_millis(1))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = QueryTimeout::new(Duration::from_secs(1), 10, Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast()
            .execute("get", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StoreError::Unavailable("blip".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: StoreResult<()> = fast()
            .execute("get", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::PermissionDenied("rules".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(StoreError::PermissionDenied(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hung_calls_time_out_and_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: StoreResult<()> = fast()
            .execute("query", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    futures::future::pending::<StoreResult<()>>().await
                }
            })
            .await;

        assert!(matches!(result, Err(StoreError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
