// src/retry.rs
// Per-service rate limiting, exponential backoff, and bounded concurrency

use crate::error::{CallError, ErrorCode, ToolError, service_error};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Requests per second for services without a configured limit
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 10.0;

/// Minimum-interval pacing for one service.
///
/// The lock is held across the wait so two callers can never both observe
/// the same stale timestamp and burst through together.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self::with_interval(min_interval)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request is allowed, then record the grant
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Lazily created limiters, one per service, shared for the process lifetime
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limits: HashMap<String, f64>,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(limits: HashMap<String, f64>) -> Self {
        Self {
            limits,
            limiters: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, service: &str) -> Arc<RateLimiter> {
        if let Ok(map) = self.limiters.read()
            && let Some(limiter) = map.get(service)
        {
            return limiter.clone();
        }

        let rps = self
            .limits
            .get(service)
            .copied()
            .unwrap_or(DEFAULT_REQUESTS_PER_SECOND);

        match self.limiters.write() {
            Ok(mut map) => map
                .entry(service.to_string())
                .or_insert_with(|| {
                    debug!(service = %service, rps, "Created rate limiter");
                    Arc::new(RateLimiter::new(rps))
                })
                .clone(),
            // A poisoned map still gets a working (unshared) limiter
            Err(_) => Arc::new(RateLimiter::new(rps)),
        }
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): `backoff_factor^attempt`, capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor.powi(attempt as i32);
        let cap = self.max_backoff.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Run `op`, retrying transient failures with exponential backoff.
///
/// Non-transient failures return immediately. When every attempt fails the
/// result is a `SERVICE_ERROR` carrying the last failure and the attempt count.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, service: &str, mut op: F) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                attempt += 1;
                if attempt >= max_attempts {
                    error!(service = %service, attempts = max_attempts, error = %e, "All attempts failed");
                    return Err(exhausted(service, max_attempts, &e).into());
                }
                let delay = policy.delay(attempt);
                warn!(
                    service = %service,
                    error = %e,
                    "Attempt {}/{} failed, retrying in {:?}",
                    attempt,
                    max_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn exhausted(service: &str, attempts: u32, last: &CallError) -> ToolError {
    service_error(
        format!("Operation failed after {} attempts: {}", attempts, last),
        service,
    )
    .detail("last_error", last.to_string())
    .detail("attempts", attempts)
}

/// Bounded pool for blocking work so it never stalls the async scheduler
#[derive(Debug, Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
}

impl BlockingPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    pub async fn run<F, T>(&self, f: F) -> Result<T, CallError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| internal(format!("Worker pool closed: {}", e)))?;

        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| internal(format!("Blocking task failed: {}", e)))
    }
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(4)
    }
}

fn internal(message: String) -> CallError {
    ToolError::new(ErrorCode::InternalError, message, "executor").into()
}

/// Run futures with at most `limit` in flight, preserving input order
pub async fn gather_with_concurrency<I, F, T>(limit: usize, futures: I) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T>,
{
    stream::iter(futures).buffered(limit.max(1)).collect().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionFailure;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connection_reset() -> CallError {
        CallError::Connection {
            kind: ConnectionFailure::Reset,
            message: "peer reset".into(),
        }
    }

    /// Fails with a transient error `k` times, then succeeds
    async fn flaky(calls: &AtomicUsize, k: usize) -> Result<&'static str, CallError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < k { Err(connection_reset()) } else { Ok("ok") }
    }

    // ============================================================================
    // RateLimiter
    // ============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_sequential_grants_are_spaced() {
        let limiter = RateLimiter::new(5.0);
        let m = limiter.min_interval();
        assert_eq!(m, Duration::from_millis(200));

        let mut grants = Vec::new();
        for _ in 0..5 {
            limiter.acquire().await;
            grants.push(Instant::now());
        }
        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= m, "grants too close: {:?}", pair[1] - pair[0]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(1.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_do_not_burst() {
        let limiter = Arc::new(RateLimiter::new(10.0));
        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let l = limiter.clone();
                tokio::spawn(async move {
                    l.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut grants = Vec::new();
        for h in handles {
            grants.push(h.await.unwrap());
        }
        grants.sort();
        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn test_zero_rate_means_no_pacing() {
        assert_eq!(RateLimiter::new(0.0).min_interval(), Duration::ZERO);
        assert_eq!(RateLimiter::new(f64::NAN).min_interval(), Duration::ZERO);
    }

    #[test]
    fn test_registry_shares_limiter_per_service() {
        let registry = RateLimiterRegistry::new(HashMap::from([("simbad".to_string(), 5.0)]));
        let a = registry.get("simbad");
        let b = registry.get("simbad");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.min_interval(), Duration::from_millis(200));
        assert_eq!(registry.get("gaia").min_interval(), Duration::from_millis(100));
        assert!(!Arc::ptr_eq(&a, &registry.get("gaia")));
    }

    // ============================================================================
    // RetryPolicy
    // ============================================================================

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(10),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(4), Duration::from_secs(10));
        assert_eq!(policy.delay(60), Duration::from_secs(10));
    }

    // ============================================================================
    // with_retry
    // ============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_k_transient_failures() {
        let policy = RetryPolicy::default();
        for k in 0..=3 {
            let calls = AtomicUsize::new(0);
            let result = with_retry(&policy, "simbad", || flaky(&calls, k)).await;
            assert_eq!(result.unwrap(), "ok");
            assert_eq!(calls.load(Ordering::SeqCst), k + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        let calls = AtomicUsize::new(0);
        let err = with_retry(&policy, "ned", || flaky(&calls, 5)).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let CallError::Domain(tool) = err else { panic!("expected structured error") };
        assert_eq!(tool.code, ErrorCode::ServiceError);
        assert!(tool.recoverable);
        assert_eq!(tool.service, "ned");
        assert_eq!(tool.details["attempts"], 3);
        assert!(tool.message.starts_with("Operation failed after 3 attempts"));
        assert!(tool.details["last_error"].as_str().unwrap().contains("peer reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_elapses_between_attempts() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(60),
        };
        let calls = AtomicUsize::new(0);
        let start = Instant::now();
        let _ = with_retry(&policy, "gaia", || flaky(&calls, 2)).await;
        // 2^1 + 2^2 seconds of backoff, none before the first attempt
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert!(start.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicUsize::new(0);
        let err = with_retry(&policy, "ads", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(CallError::Http { status: 500, body: "boom".into() })
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, CallError::Http { status: 500, .. }));
    }

    // ============================================================================
    // Concurrency helpers
    // ============================================================================

    #[tokio::test]
    async fn test_blocking_pool_runs_closure() {
        let pool = BlockingPool::new(2);
        let sum = pool.run(|| (1..=10).sum::<i32>()).await.unwrap();
        assert_eq!(sum, 55);
    }

    #[tokio::test]
    async fn test_gather_preserves_order_and_bounds_in_flight() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures = (0..10).map(|i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i * 2
            }
        });

        let results = gather_with_concurrency(3, futures).await;
        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
