//! Unbounded retry with a fixed backoff.
//!
//! Saga notifications and compensations must eventually succeed because the
//! local state has already diverged from the remote party. They are retried
//! without an attempt cap, sleeping a constant interval between attempts.
//!
//! # Example
//!
//! ```rust,ignore
//! use trading_engine::retry::{FixedBackoff, retry_forever};
//!
//! let backoff = FixedBackoff::from_millis(3_000);
//! retry_forever("rollback", backoff, || async { coordinator.rollback(&uid).await }).await;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::metrics;

/// Constant delay between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedBackoff {
    interval: Duration,
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::from_millis(3_000)
    }
}

impl FixedBackoff {
    /// Backoff of `interval` between attempts.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Backoff of `millis` milliseconds between attempts.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Delay before the next attempt.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

/// Run `operation` until it returns `Ok`, sleeping `backoff` after each error.
///
/// Returns the number of attempts that were needed.
pub async fn retry_forever<F, Fut, T, E>(label: &'static str, backoff: FixedBackoff, mut operation: F) -> (T, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 1;
    loop {
        match operation().await {
            Ok(value) => return (value, attempt),
            Err(error) => {
                tracing::warn!(
                    operation = label,
                    attempt,
                    backoff_ms = backoff.interval().as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );
                metrics::record_retry(label);
                tokio::time::sleep(backoff.interval()).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_interval_is_three_seconds() {
        assert_eq!(FixedBackoff::default().interval(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn returns_immediately_on_success() {
        let (value, attempts) =
            retry_forever("noop", FixedBackoff::from_millis(0), || async { Ok::<_, String>(7) }).await;
        assert_eq!(value, 7);
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_retrying_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let (_, attempts) = retry_forever("flaky", FixedBackoff::from_millis(3_000), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 4 {
                    Err("not yet")
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(attempts, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
