//! Core rate limiter implementation.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::window::RateWindow;
use crate::error::{CrptError, Result};

/// Delay before the first re-check once the window is full.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
/// Lower bound for the backoff cap so short windows never spin.
const MIN_BACKOFF_CAP: Duration = Duration::from_millis(1);

/// Validated limiter settings: at most `max_requests` admissions per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    window: Duration,
    max_requests: u32,
}

impl LimiterConfig {
    /// Create a limiter configuration.
    ///
    /// Fails with [`CrptError::InvalidConfig`] if `max_requests` is zero or
    /// `window` is empty.
    pub fn new(window: Duration, max_requests: u32) -> Result<Self> {
        if max_requests == 0 {
            return Err(CrptError::InvalidConfig(format!(
                "max_requests must be positive: {}",
                max_requests
            )));
        }
        if window.is_zero() {
            return Err(CrptError::InvalidConfig(
                "rate limit window must be longer than zero".to_string(),
            ));
        }
        Ok(Self {
            window,
            max_requests,
        })
    }

    /// Length of the rolling window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Maximum admissions per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Upper bound for a single backoff sleep: the average spacing between
    /// admissions, never below one millisecond.
    pub fn backoff_cap(&self) -> Duration {
        (self.window / self.max_requests).max(MIN_BACKOFF_CAP)
    }
}

/// Doubling sleep schedule used while the window is full.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    cap: Duration,
}

impl Backoff {
    /// Create a schedule starting at `initial` and never exceeding `cap`.
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            current: initial.min(cap),
            cap,
        }
    }

    /// Return the next delay and double the one after it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.cap);
        delay
    }
}

/// A sliding window rate limiter.
///
/// This struct is thread-safe and can be shared across tasks. Prune,
/// decide and record happen under one lock, so concurrent callers can
/// never over-admit. Waiting callers are not queued: whichever re-checks
/// first after a slot frees up wins it.
pub struct RateLimiter {
    config: LimiterConfig,
    window: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            window: Mutex::new(RateWindow::with_capacity(config.max_requests as usize)),
        }
    }

    /// Get the limiter configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Take a slot if one is free right now.
    ///
    /// Returns the recorded admission instant, or `None` if the window is
    /// full.
    pub fn try_acquire(&self) -> Option<Instant> {
        let now = Instant::now();
        let mut window = self.window.lock();
        let pruned = window.prune(now, self.config.window);
        let admitted = window.try_record(now, self.config.max_requests as usize);

        trace!(
            pruned = pruned,
            in_window = window.len(),
            max_requests = self.config.max_requests,
            admitted = admitted,
            "Checking rate limit"
        );

        admitted.then_some(now)
    }

    /// Number of slots free right now.
    pub fn available(&self) -> usize {
        let mut window = self.window.lock();
        window.prune(Instant::now(), self.config.window);
        (self.config.max_requests as usize).saturating_sub(window.len())
    }

    /// Wait until a slot is free and take it.
    ///
    /// There is no bound on how long this waits. Drop the future to give
    /// up, or use [`acquire_with_cancel`](Self::acquire_with_cancel) /
    /// [`acquire_before`](Self::acquire_before).
    pub async fn acquire(&self) -> Instant {
        match self.wait_for_slot(&CancellationToken::new(), None).await {
            Ok(admitted) => admitted,
            Err(e) => unreachable!("wait without cancellation or deadline failed: {}", e),
        }
    }

    /// Wait until a slot is free and take it, unless `cancel` fires first.
    ///
    /// On cancellation no admission is recorded.
    pub async fn acquire_with_cancel(&self, cancel: &CancellationToken) -> Result<Instant> {
        self.wait_for_slot(cancel, None).await
    }

    /// Like [`acquire_with_cancel`](Self::acquire_with_cancel), but gives up
    /// with [`CrptError::DeadlineExceeded`] once `deadline` has passed.
    pub async fn acquire_before(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Instant> {
        self.wait_for_slot(cancel, Some(deadline)).await
    }

    /// Check, back off, re-check until admitted, cancelled or past `deadline`.
    async fn wait_for_slot(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Instant> {
        if let Some(admitted) = self.try_acquire() {
            return Ok(admitted);
        }

        debug!(window = ?self.config.window, "Rate limit reached, waiting for a free slot");
        let started = Instant::now();
        let mut backoff = self.backoff();
        loop {
            let now = Instant::now();
            let mut delay = backoff.next_delay();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    let waited = now.saturating_duration_since(started);
                    debug!(waited = ?waited, "Rate limit deadline passed without a free slot");
                    return Err(CrptError::DeadlineExceeded(waited));
                }
                delay = delay.min(deadline - now);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Cancelled while waiting for rate limit admission");
                    return Err(CrptError::Cancelled);
                }
                _ = sleep(delay) => {}
            }

            if let Some(admitted) = self.try_acquire() {
                return Ok(admitted);
            }
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(INITIAL_BACKOFF, self.config.backoff_cap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(window_ms: u64, max_requests: u32) -> RateLimiter {
        RateLimiter::new(LimiterConfig::new(Duration::from_millis(window_ms), max_requests).unwrap())
    }

    #[test]
    fn test_config_rejects_zero_max_requests() {
        let err = LimiterConfig::new(Duration::from_secs(1), 0).unwrap_err();
        assert!(matches!(err, CrptError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_zero_window() {
        let err = LimiterConfig::new(Duration::ZERO, 5).unwrap_err();
        assert!(matches!(err, CrptError::InvalidConfig(_)));
    }

    #[test]
    fn test_backoff_cap() {
        let config = LimiterConfig::new(Duration::from_secs(1), 4).unwrap();
        assert_eq!(config.backoff_cap(), Duration::from_millis(250));

        let config = LimiterConfig::new(Duration::from_millis(1), 100).unwrap();
        assert_eq!(config.backoff_cap(), Duration::from_millis(1));
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(50));
        let delays: Vec<u64> = (0..5)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 50, 50]);
    }

    #[test]
    fn test_backoff_initial_is_capped() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(4));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_within_limit() {
        let limiter = limiter(1000, 3);

        for _ in 0..3 {
            assert!(limiter.try_acquire().is_some());
        }
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_free_up_after_window() {
        let limiter = limiter(1000, 2);
        limiter.try_acquire().unwrap();
        limiter.try_acquire().unwrap();

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(limiter.available(), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_does_not_wait_below_limit() {
        let limiter = limiter(1000, 3);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_window_slack() {
        let limiter = limiter(1000, 2);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;

        let admitted = limiter.acquire().await;
        let waited = admitted - start;

        assert!(waited > Duration::from_millis(1000));
        assert!(waited <= Duration::from_millis(1000) + limiter.config().backoff_cap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_serializes() {
        let limiter = limiter(100, 1);

        let first = limiter.acquire().await;
        let second = limiter.acquire().await;
        let third = limiter.acquire().await;

        assert!(second - first > Duration::from_millis(100));
        assert!(third - second > Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_records_nothing() {
        let limiter = Arc::new(limiter(1000, 1));
        limiter.acquire().await;

        let cancel = CancellationToken::new();
        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire_with_cancel(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(CrptError::Cancelled)));
        assert_eq!(limiter.window.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_still_admits_free_slot() {
        let limiter = limiter(1000, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(limiter.acquire_with_cancel(&cancel).await.is_ok());
        assert!(matches!(
            limiter.acquire_with_cancel(&cancel).await,
            Err(CrptError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_before_deadline_exceeded() {
        let limiter = limiter(1000, 1);
        limiter.acquire().await;

        let start = Instant::now();
        let deadline = start + Duration::from_millis(100);
        let result = limiter
            .acquire_before(deadline, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(CrptError::DeadlineExceeded(_))));
        assert!(Instant::now() >= deadline);
        assert_eq!(limiter.window.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_before_admits_within_deadline() {
        let limiter = limiter(100, 1);
        limiter.acquire().await;

        let deadline = Instant::now() + Duration::from_secs(1);
        let admitted = limiter
            .acquire_before(deadline, &CancellationToken::new())
            .await
            .unwrap();

        assert!(admitted < deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_is_not_fifo() {
        let limiter = Arc::new(limiter(1000, 1));
        let start = limiter.acquire().await;

        // A starts waiting first and backs off further and further.
        let early = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };

        tokio::time::sleep_until(start + Duration::from_millis(990)).await;

        // B re-checks with short delays just as the slot frees up.
        let late = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };

        let late_grant = late.await.unwrap();
        let early_grant = early.await.unwrap();

        assert!(late_grant - start > Duration::from_millis(1000));
        assert!(late_grant < early_grant, "later waiter should win the freed slot");
        assert!(early_grant - late_grant > Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_never_over_admits() {
        let limiter = Arc::new(limiter(200, 3));
        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();

        let mut grants = Vec::new();
        for task in tasks {
            grants.push(task.await.unwrap());
        }
        grants.sort();

        let window = limiter.config().window();
        for &grant in &grants {
            let in_window = grants
                .iter()
                .filter(|&&other| other <= grant && grant - other <= window)
                .count();
            assert!(in_window <= 3, "window ending at {:?} held {} grants", grant, in_window);
        }
    }
}
