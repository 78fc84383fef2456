//! Retry wrapper for edits the browser refuses mid-gesture
//!
//! While the user drags a tab the browser rejects every tab and group edit
//! with [`BrowserError::Busy`]. The handler keeps retrying a refused call at a
//! fixed delay, optionally giving up when the caller's predicate says the edit
//! no longer makes sense. Any other error is returned immediately.
//!
//! The retries run inside the calling queue operation, so nothing else is
//! processed until the edit succeeds or is abandoned.

use log::debug;
use std::future::Future;
use std::time::Duration;

use crate::error::BrowserError;

/// Retries browser edits refused with [`BrowserError::Busy`]
#[derive(Debug, Clone, Copy)]
pub struct RetryHandler {
    delay: Duration,
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl RetryHandler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Run `op`, retrying until it succeeds or fails with a non-busy error
    pub async fn call<T, Op, Fut>(&self, op: Op) -> Result<T, BrowserError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        let result = self.call_while(op, || async { true }).await?;
        // An always-true predicate never abandons
        result.ok_or_else(|| BrowserError::Rejected("retry abandoned".to_string()))
    }

    /// Run `op`, retrying while `should_retry` holds.
    ///
    /// Returns `Ok(None)` when the call was abandoned because the predicate
    /// returned false after a refusal.
    pub async fn call_while<T, Op, Fut, Pred, PredFut>(
        &self,
        mut op: Op,
        mut should_retry: Pred,
    ) -> Result<Option<T>, BrowserError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
        Pred: FnMut() -> PredFut,
        PredFut: Future<Output = bool>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!("Browser edit succeeded after {} attempts", attempts);
                    }
                    return Ok(Some(value));
                }
                Err(BrowserError::Busy) => {
                    tokio::time::sleep(self.delay).await;
                    if !should_retry().await {
                        debug!("Abandoning browser edit after {} refusals", attempts);
                        return Ok(None);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn refuse_times(count: usize) -> (AtomicUsize, usize) {
        (AtomicUsize::new(0), count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_busy_until_success() {
        let (calls, refusals) = refuse_times(3);
        let retry = RetryHandler::default();
        let started = tokio::time::Instant::now();

        let value = retry
            .call(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < refusals {
                        Err(BrowserError::Busy)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandons_when_predicate_fails() {
        let calls = AtomicUsize::new(0);
        let checks = AtomicUsize::new(0);
        let retry = RetryHandler::new(Duration::from_millis(10));

        let result: Option<()> = retry
            .call_while(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(BrowserError::Busy) }
                },
                || {
                    let n = checks.fetch_add(1, Ordering::SeqCst);
                    async move { n < 1 }
                },
            )
            .await
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_propagate_immediately() {
        let calls = AtomicUsize::new(0);
        let retry = RetryHandler::default();

        let result: Result<(), _> = retry
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(BrowserError::NotFound {
                        kind: "tab",
                        id: 4,
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(BrowserError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_skips_predicate() {
        let checks = AtomicUsize::new(0);
        let result = RetryHandler::default()
            .call_while(
                || async { Ok::<_, BrowserError>("done") },
                || {
                    checks.fetch_add(1, Ordering::SeqCst);
                    async { false }
                },
            )
            .await;
        assert_eq!(result, Ok(Some("done")));
        assert_eq!(checks.load(Ordering::SeqCst), 0);
    }
}
