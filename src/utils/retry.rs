use std::{future::Future, time::Duration};

use anyhow::Result;
use tracing::warn;

use super::clock::Clock;

/// Bounded fixed-backoff retry. Favicon resolution and blocked-tab removal
/// both use this; they only differ in the operation passed in.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(750))
    }
}

/// Runs `operation` until it succeeds or the policy is exhausted. Failed
/// attempts are logged; only the final error reaches the caller.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    clock: &dyn Clock,
    what: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_attempts => {
                warn!("Attempt {attempt} of {what} failed: {e:?}");
                attempt += 1;
                clock.sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{anyhow, Result};

    use super::{run_with_retry, RetryPolicy};
    use crate::utils::clock::SystemClock;

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() -> Result<()> {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        let mut attempts = 0;

        let value = run_with_retry(policy, &SystemClock, "test operation", || {
            attempts += 1;
            let outcome = if attempts < 3 {
                Err(anyhow!("not yet"))
            } else {
                Ok(42)
            };
            async move { outcome }
        })
        .await?;

        assert_eq!(value, 42);
        assert_eq!(attempts, 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        let mut attempts = 0;

        let result = run_with_retry(policy, &SystemClock, "test operation", || {
            attempts += 1;
            async { Err::<(), _>(anyhow!("always broken")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }
}
