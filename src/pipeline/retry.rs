// file: src/pipeline/retry.rs
// description: bounded retry with settle delay and fixed backoff for flaky external calls

use crate::config::RetryConfig;
use crate::error::{PipelineError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Every error is retried the same way; after `max_attempts` failures the
/// last one is surfaced inside `Exhausted`.
#[derive(Debug, Clone)]
pub struct RetryingInvoker {
    max_attempts: u32,
    backoff: Duration,
    settle: Duration,
}

impl RetryingInvoker {
    pub fn new(config: &RetryConfig) -> Self {
        Self::with_policy(config.max_attempts, config.backoff(), config.settle())
    }

    pub fn with_policy(max_attempts: u32, backoff: Duration, settle: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            settle,
        }
    }

    pub async fn invoke<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    debug!("{} succeeded on attempt {}", label, attempt);
                    return Ok(value);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        "{} failed on attempt {}/{}, giving up: {}",
                        label, attempt, self.max_attempts, e
                    );
                    return Err(PipelineError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        "{} failed on attempt {}/{}, retrying in {}s: {}",
                        label,
                        attempt,
                        self.max_attempts,
                        self.backoff.as_secs(),
                        e
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn invoker() -> RetryingInvoker {
        RetryingInvoker::new(&RetryConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = invoker()
            .invoke("describe", || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= 2 {
                        Err(PipelineError::Generation(format!("attempt {} failed", n)))
                    } else {
                        Ok("a cat on a sofa".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "a cat on a sofa");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_is_exhausted_after_three_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result: Result<String> = invoker()
            .invoke("describe", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(PipelineError::Generation("503".to_string()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(PipelineError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("503"));
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }

        // settle + two backoffs, no sleep after the final failure
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_waits_for_settle() {
        let start = Instant::now();
        let result = invoker().invoke("describe", || async { Ok(1) }).await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
