//! Bounded retry with exponential backoff for store operations.

use std::future::Future;
use std::time::Duration;

use crate::{StoreError, StoreResult};

/// Fixed backoff schedule; the last step repeats when attempts exceed it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: vec![100, 400, 1_600],
        }
    }
}

impl RetryPolicy {
    /// Delay before retry attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ms = self
            .backoff_ms
            .get(attempt as usize)
            .or(self.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}

/// Run `op` up to `policy.max_attempts` times, backing off between attempts.
///
/// Only `Unavailable` and `Conflict` are retried; other errors return
/// immediately. Conflicts are retried because the caller re-reads fresh
/// inputs inside `op`.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e @ (StoreError::Unavailable(_) | StoreError::Conflict(_))) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(e);
                }
                tracing::debug!(attempt, error = %e, "store op failed, retrying");
                tokio::time::sleep(policy.delay_for_attempt(attempt - 1)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_ms: vec![1],
        };
        let result = with_retries(&policy, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Unavailable("down".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_ms: vec![1],
        };
        let result: StoreResult<()> = with_retries(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".into()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn not_found_is_terminal() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = with_retries(&RetryPolicy::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound("targets/x".into()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_last_step_repeats() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_ms: vec![100, 400],
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(400));
    }
}
