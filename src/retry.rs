use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Fixed-count, fixed-delay retry policy: no backoff, no jitter.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy { max_attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(5, Duration::from_secs(60))
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping `policy.delay` after
/// every failed attempt except the last. A total failure therefore costs
/// `max_attempts - 1` delays before the final error is handed back.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    symbol: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts {
                    return Err(err);
                }
                warn!(
                    %err,
                    label,
                    symbol,
                    attempt,
                    delay_secs = policy.delay.as_secs(),
                    "provider call failed, retrying"
                );
                sleep(policy.delay).await;
                attempt += 1;
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

    fn failing_until(success_on: u32, calls: Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<Result<u32, &'static str>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= success_on {
                std::future::ready(Ok(n))
            } else {
                std::future::ready(Err("provider unavailable"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_sleeps_never() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = with_retry(RetryPolicy::default(), "test", "AAPL", failing_until(1, calls.clone())).await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn four_failures_then_success_sleeps_four_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = with_retry(RetryPolicy::default(), "test", "AAPL", failing_until(5, calls.clone())).await;

        assert_eq!(result, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_sleeps_between_attempts_only() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = with_retry(RetryPolicy::default(), "test", "AAPL", failing_until(u32::MAX, calls.clone())).await;

        assert_eq!(result, Err("provider unavailable"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // No sleep after the final failed attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(0, Duration::from_secs(60));

        let result = with_retry(policy, "test", "AAPL", failing_until(u32::MAX, calls.clone())).await;

        assert_eq!(result, Err("provider unavailable"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_comes_from_the_policy() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let started = Instant::now();

        let result = with_retry(policy, "test", "AAPL", failing_until(2, calls.clone())).await;

        assert_eq!(result, Ok(2));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }
}
