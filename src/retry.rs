//! Jittered exponential backoff shared by every network-facing call.
//!
//! ## Delay schedule
//!
//! Before retry `n` (`n` failed attempts so far) the policy sleeps for a
//! uniformly random duration in
//!
//! ```text
//! [floor, clamp(multiplier · 2^(n-1), floor, ceiling)]
//! ```
//!
//! With the defaults (0.5 s multiplier, 1 s floor, 10 s ceiling, 3 attempts)
//! both retries wait exactly 1 s, because the exponential term stays at or
//! below the floor. Jitter only widens the window from the third retry on
//! (1 to 2 s, then 1 to 4 s), so it matters for policies with a larger
//! attempt budget.
//!
//! ## Retry predicate
//!
//! Which errors are worth retrying is an explicit [`RetryOn`] value rather
//! than being baked into each call site. Acquisition uses
//! [`RetryOn::Retryable`]; model calls default to [`RetryOn::AnyError`]
//! because a hosted model's failure surface is not fully enumerable. See
//! [`crate::config::ExtractionConfigBuilder::model_retry_on`].

use crate::error::KycError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Which errors a [`RetryPolicy`] retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    /// Only errors for which [`KycError::is_retryable`] is true.
    #[default]
    Retryable,
    /// Every error, including ones the taxonomy marks permanent.
    AnyError,
}

impl RetryOn {
    pub fn should_retry(&self, err: &KycError) -> bool {
        match self {
            RetryOn::Retryable => err.is_retryable(),
            RetryOn::AnyError => true,
        }
    }
}

/// Wait/retry/stop policy: bounded attempts with randomized exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 3.
    pub max_attempts: u32,
    /// Exponential multiplier. Default: 500 ms.
    pub multiplier: Duration,
    /// Lower bound of every delay. Default: 1 s.
    pub min_delay: Duration,
    /// Upper bound of every delay. Default: 10 s.
    pub max_delay: Duration,
    /// Retry predicate.
    pub retry_on: RetryOn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_millis(500),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            retry_on: RetryOn::Retryable,
        }
    }
}

impl RetryPolicy {
    /// Same schedule with a different predicate.
    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Upper bound of the delay before retry `failures` (1-indexed).
    pub fn delay_ceiling(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 2f64.powi(failures.saturating_sub(1).min(62) as i32);
        let exp = self.multiplier.as_secs_f64() * factor;
        let floor = self.min_delay.as_secs_f64();
        let ceiling = self.max_delay.as_secs_f64().max(floor);
        Duration::from_secs_f64(exp.clamp(floor, ceiling))
    }

    /// Random delay before retry `failures`, in `[min_delay, delay_ceiling]`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let low = self.min_delay.as_millis() as u64;
        let high = (self.delay_ceiling(failures).as_millis() as u64).max(low);
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    /// Run `op` until it succeeds, the predicate rejects its error, or the
    /// attempt budget is spent. The last error is returned on failure.
    ///
    /// `label` names the operation in retry logs.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, KycError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, KycError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= max_attempts || !self.retry_on.should_retry(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelTier;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> KycError {
        KycError::TransientFetch {
            url: "https://example.com/id.jpg".into(),
            reason: "connection reset".into(),
        }
    }

    fn permanent() -> KycError {
        KycError::ContentType {
            source_ref: "https://example.com/id.jpg".into(),
            content_type: "text/html".into(),
        }
    }

    #[test]
    fn ceiling_grows_and_is_clamped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_ceiling(1), Duration::from_secs(1));
        assert_eq!(policy.delay_ceiling(2), Duration::from_secs(1));
        assert_eq!(policy.delay_ceiling(3), Duration::from_secs(2));
        assert_eq!(policy.delay_ceiling(4), Duration::from_secs(4));
        assert_eq!(policy.delay_ceiling(10), Duration::from_secs(10));
        assert_eq!(policy.delay_ceiling(1000), Duration::from_secs(10));
    }

    #[test]
    fn default_retries_wait_exactly_the_floor() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            assert_eq!(policy.delay_for(1), Duration::from_secs(1));
            assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        }
    }

    #[test]
    fn delays_stay_within_bounds() {
        let policy = RetryPolicy::default();
        for failures in 1..8 {
            for _ in 0..50 {
                let d = policy.delay_for(failures);
                assert!(d >= policy.min_delay, "{d:?} below floor");
                assert!(d <= policy.delay_ceiling(failures), "{d:?} above ceiling");
            }
        }
    }

    #[test]
    fn predicates() {
        assert!(RetryOn::Retryable.should_retry(&transient()));
        assert!(!RetryOn::Retryable.should_retry(&permanent()));
        assert!(RetryOn::AnyError.should_retry(&permanent()));
    }

    #[test]
    fn first_success_does_not_sleep() {
        let value = tokio_test::block_on(
            RetryPolicy::default().run("test", |_| async { Ok::<_, KycError>(7) }),
        );
        assert_eq!(tokio_test::assert_ok!(value), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = RetryPolicy::default()
            .run("test", move |_| async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::default()
            .run("test", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(KycError::model(ModelTier::Ocr, "503"))
            })
            .await;
        assert!(matches!(result, Err(KycError::ModelCall { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_rejected_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::default()
            .run("test", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(permanent())
            })
            .await;
        assert!(matches!(result, Err(KycError::ContentType { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn any_error_retries_permanent_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::default().with_retry_on(RetryOn::AnyError);
        let result: Result<(), _> = policy
            .run("test", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(permanent())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_numbers_are_one_indexed() {
        let seen = std::sync::Mutex::new(Vec::new());
        let _: Result<(), _> = RetryPolicy::default()
            .run("test", |attempt| {
                seen.lock().unwrap().push(attempt);
                async { Err(transient()) }
            })
            .await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
