//! Caller-side polling for asynchronous removals
//!
//! Deletion of permitted networks and linked zones completes in the
//! background; callers observe completion by fetching the entity until it
//! is gone. Not-found is the success condition here.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How long and how often to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

impl Default for PollPolicy {
    /// 30 attempts, 10 seconds apart
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(10),
        }
    }
}

/// Poll `fetch` until it reports not-found
///
/// - `Err(NotFound)` from `fetch`: removed, returns `Ok(attempt)`
/// - `Ok(_)` or a retryable error: sleep and try again
/// - any other error: returned unchanged
///
/// Gives up with [`Error::Timeout`] after `policy.attempts` fetches.
pub async fn wait_until_removed<T, F, Fut>(policy: PollPolicy, mut fetch: F) -> Result<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=policy.attempts {
        match fetch().await {
            Err(e) if e.is_not_found() => {
                debug!(attempt, "entity removed");
                return Ok(attempt);
            }
            Ok(_) => debug!(attempt, "entity still present"),
            Err(e) if e.is_retryable() => warn!("Poll attempt {} failed: {}", attempt, e),
            Err(e) => return Err(e),
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(Error::Timeout(format!(
        "entity still present after {} attempts",
        policy.attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(attempts: u32) -> PollPolicy {
        PollPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn not_found_ends_polling() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let attempt = wait_until_removed(quick(5), move || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok("present"),
                1 => Err(Error::store_unavailable("blip")),
                _ => Err(Error::not_found("gone")),
            }
        })
        .await
        .unwrap();
        assert_eq!(attempt, 3);
    }

    #[tokio::test]
    async fn exhaustion_is_a_timeout() {
        let err = wait_until_removed(quick(3), || async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn permanent_errors_abort() {
        let err = wait_until_removed(quick(3), || async {
            Err::<(), _>(Error::unauthorized("no"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[test]
    fn default_matches_reference_polling() {
        let policy = PollPolicy::default();
        assert_eq!(policy.attempts, 30);
        assert_eq!(policy.interval, Duration::from_secs(10));
    }
}
