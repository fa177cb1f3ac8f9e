//! # Request Throttling
//!
//! Keeps outbound catalog calls inside per-second budgets. Each
//! [`RequestCategory`] has its own quota; all categories are counted inside
//! a one-second window that starts with the first request after a reset.
//!
//! ## Window Behaviour
//!
//! - When more than one second has passed since the window started, the
//!   counters reset before the request is counted.
//! - When a category has used its whole quota, the caller sleeps for the
//!   remainder of the window, then the counters reset.
//!
//! With [`WindowMode::Shared`] (the default) every category shares a single
//! window start, so a forced sleep for one category also clears the other
//! categories' counters. [`WindowMode::Independent`] gives each category its
//! own window instead.
//!
//! ## Concurrency
//!
//! The window lives behind one `Mutex` and the lock is held across the
//! forced sleep, so concurrent callers queue up behind the throttled one
//! rather than racing past an exhausted quota.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{RecError, Result};

/// Length of the quota window.
pub const WINDOW: Duration = Duration::from_secs(1);

/// Kind of remote request, each with its own per-second budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestCategory {
    /// Keyword search calls.
    Search,
    /// Everything else: playlist listing, track listing, audio features.
    Other,
}

impl RequestCategory {
    pub const ALL: [RequestCategory; 2] = [RequestCategory::Search, RequestCategory::Other];

    const fn index(self) -> usize {
        match self {
            Self::Search => 0,
            Self::Other => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests allowed per window, per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quotas {
    pub search: u32,
    pub other: u32,
}

impl Default for Quotas {
    fn default() -> Self {
        Self { search: 5, other: 10 }
    }
}

impl Quotas {
    #[must_use]
    pub const fn get(&self, category: RequestCategory) -> u32 {
        match category {
            RequestCategory::Search => self.search,
            RequestCategory::Other => self.other,
        }
    }
}

/// Whether categories share one window start or keep their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    #[default]
    Shared,
    Independent,
}

/// Source of time for the limiter.
///
/// `now` is a monotonic offset from an arbitrary origin. Tests drive the
/// limiter with [`ManualClock`] so no real sleeping happens.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when told to. Sleeping advances it instantly and
/// records the requested duration.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }

    /// Every sleep requested so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *lock(&self.now)
    }

    fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        self.advance(duration);
    }
}

/// Counters for the current window.
#[derive(Debug, Default)]
struct RateWindow {
    counts: [u32; 2],
    starts: [Duration; 2],
}

impl RateWindow {
    fn reset(&mut self, mode: WindowMode, category: RequestCategory, now: Duration) {
        match mode {
            WindowMode::Shared => {
                self.counts = [0; 2];
                self.starts = [now; 2];
            }
            WindowMode::Independent => {
                self.counts[category.index()] = 0;
                self.starts[category.index()] = now;
            }
        }
    }
}

/// Per-category request throttle.
///
/// Construct one per catalog session and pass it by reference to every
/// component that talks to the catalog.
pub struct RateLimiter {
    quotas: Quotas,
    mode: WindowMode,
    clock: Arc<dyn Clock>,
    max_wait: Option<Duration>,
    window: Mutex<RateWindow>,
    forced_waits: AtomicU64,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("quotas", &self.quotas)
            .field("mode", &self.mode)
            .field("max_wait", &self.max_wait)
            .field("forced_waits", &self.forced_waits())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Limiter on the system clock.
    #[must_use]
    pub fn new(quotas: Quotas, mode: WindowMode) -> Self {
        Self::with_clock(quotas, mode, Arc::new(SystemClock::new()))
    }

    #[must_use]
    pub fn with_clock(quotas: Quotas, mode: WindowMode, clock: Arc<dyn Clock>) -> Self {
        let start = clock.now();
        Self {
            quotas,
            mode,
            clock,
            max_wait: None,
            window: Mutex::new(RateWindow {
                counts: [0; 2],
                starts: [start; 2],
            }),
            forced_waits: AtomicU64::new(0),
        }
    }

    /// Bounds the wait taken by [`try_acquire`](Self::try_acquire).
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Blocks until one more `category` request fits in the quota, then
    /// counts it.
    ///
    /// Never fails: when the quota is used up the caller sleeps for the rest
    /// of the window, however long that is.
    ///
    /// # Examples
    ///
    /// ```
    /// use tunesift::rate_limiter::{Quotas, RateLimiter, RequestCategory, WindowMode};
    ///
    /// let limiter = RateLimiter::new(Quotas::default(), WindowMode::Shared);
    /// limiter.acquire(RequestCategory::Search);
    /// assert_eq!(limiter.count(RequestCategory::Search), 1);
    /// ```
    pub fn acquire(&self, category: RequestCategory) {
        let mut window = lock(&self.window);
        if let Some(wait) = self.pending_wait(&mut window, category) {
            self.sleep_and_reset(&mut window, category, wait);
        }
        window.counts[category.index()] += 1;
    }

    /// Like [`acquire`](Self::acquire) but refuses to sleep longer than
    /// `max_wait`. On refusal nothing is counted.
    ///
    /// # Errors
    ///
    /// Returns [`RecError::QuotaWaitTimeout`] when the quota is exhausted and
    /// the rest of the window is longer than `max_wait`.
    pub fn acquire_timeout(&self, category: RequestCategory, max_wait: Duration) -> Result<()> {
        self.acquire_within(category, max_wait)
    }

    /// Acquires under the limiter's own wait bound, if it has one. This is
    /// what the fetch components call.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The request was counted, possibly after a sleep
    /// * `Err(RecError)` - The wait was refused and nothing was counted
    ///
    /// # Errors
    ///
    /// Returns [`RecError::QuotaWaitTimeout`] as for
    /// [`acquire_timeout`](Self::acquire_timeout). A limiter built without
    /// [`with_max_wait`](Self::with_max_wait) never fails.
    ///
    /// # Design Notes
    ///
    /// - The window lock is held across the sleep, so callers are served
    ///   in the order they arrive
    /// - A refused wait leaves the counters untouched
    pub fn try_acquire(&self, category: RequestCategory) -> Result<()> {
        match self.max_wait {
            Some(limit) => self.acquire_within(category, limit),
            None => {
                self.acquire(category);
                Ok(())
            }
        }
    }

    fn acquire_within(&self, category: RequestCategory, limit: Duration) -> Result<()> {
        let mut window = lock(&self.window);
        if let Some(wait) = self.pending_wait(&mut window, category) {
            if wait > limit {
                return Err(RecError::QuotaWaitTimeout {
                    category,
                    needed: wait,
                    limit,
                });
            }
            self.sleep_and_reset(&mut window, category, wait);
        }
        window.counts[category.index()] += 1;
        Ok(())
    }

    /// Resets an expired window, then returns how long the caller must sleep
    /// before `category` has room again. `None` means it has room now.
    fn pending_wait(&self, window: &mut RateWindow, category: RequestCategory) -> Option<Duration> {
        let idx = category.index();
        let now = self.clock.now();

        if now.saturating_sub(window.starts[idx]) > WINDOW {
            trace!("Quota window expired, resetting counters");
            window.reset(self.mode, category, now);
        }

        (window.counts[idx] >= self.quotas.get(category))
            .then(|| WINDOW.saturating_sub(now.saturating_sub(window.starts[idx])))
    }

    fn sleep_and_reset(&self, window: &mut RateWindow, category: RequestCategory, wait: Duration) {
        debug!(
            "{category} quota of {}/s used up, sleeping {}ms",
            self.quotas.get(category),
            wait.as_millis()
        );
        self.clock.sleep(wait);
        self.forced_waits.fetch_add(1, Ordering::Relaxed);
        window.reset(self.mode, category, self.clock.now());
    }

    /// Requests of `category` counted in the current window.
    #[must_use]
    pub fn count(&self, category: RequestCategory) -> u32 {
        lock(&self.window).counts[category.index()]
    }

    /// How many times a caller was put to sleep.
    #[must_use]
    pub fn forced_waits(&self) -> u64 {
        self.forced_waits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn quotas(&self) -> Quotas {
        self.quotas
    }
}

/// Poisoning only means another caller panicked mid-update; the counters
/// are still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(mode: WindowMode) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(Quotas::default(), mode, clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_requests_within_quota_do_not_sleep() {
        let (clock, limiter) = manual(WindowMode::Shared);

        for _ in 0..5 {
            limiter.acquire(RequestCategory::Search);
        }
        for _ in 0..10 {
            limiter.acquire(RequestCategory::Other);
        }

        assert!(clock.sleeps().is_empty());
        assert_eq!(limiter.count(RequestCategory::Search), 5);
        assert_eq!(limiter.count(RequestCategory::Other), 10);
    }

    #[test]
    fn test_exhausted_quota_sleeps_for_rest_of_window() {
        let (clock, limiter) = manual(WindowMode::Shared);

        for _ in 0..5 {
            limiter.acquire(RequestCategory::Search);
        }
        clock.advance(Duration::from_millis(400));
        limiter.acquire(RequestCategory::Search);

        assert_eq!(clock.sleeps(), vec![Duration::from_millis(600)]);
        assert_eq!(limiter.count(RequestCategory::Search), 1);
        assert_eq!(limiter.forced_waits(), 1);
    }

    #[test]
    fn test_forced_sleep_resets_every_category_in_shared_mode() {
        let (clock, limiter) = manual(WindowMode::Shared);

        for _ in 0..3 {
            limiter.acquire(RequestCategory::Other);
        }
        for _ in 0..6 {
            limiter.acquire(RequestCategory::Search);
        }

        assert_eq!(clock.sleeps().len(), 1);
        assert_eq!(limiter.count(RequestCategory::Other), 0);
        assert_eq!(limiter.count(RequestCategory::Search), 1);
    }

    #[test]
    fn test_independent_mode_keeps_other_counters() {
        let (clock, limiter) = manual(WindowMode::Independent);

        for _ in 0..3 {
            limiter.acquire(RequestCategory::Other);
        }
        for _ in 0..6 {
            limiter.acquire(RequestCategory::Search);
        }

        assert_eq!(clock.sleeps().len(), 1);
        assert_eq!(limiter.count(RequestCategory::Other), 3);
        assert_eq!(limiter.count(RequestCategory::Search), 1);
    }

    #[test]
    fn test_expired_window_resets_without_sleep() {
        let (clock, limiter) = manual(WindowMode::Shared);

        for _ in 0..5 {
            limiter.acquire(RequestCategory::Search);
        }
        clock.advance(Duration::from_millis(1100));
        limiter.acquire(RequestCategory::Search);

        assert!(clock.sleeps().is_empty());
        assert_eq!(limiter.count(RequestCategory::Search), 1);
    }

    #[test]
    fn test_exactly_one_second_is_still_same_window() {
        let (clock, limiter) = manual(WindowMode::Shared);

        for _ in 0..5 {
            limiter.acquire(RequestCategory::Search);
        }
        clock.advance(WINDOW);
        limiter.acquire(RequestCategory::Search);

        // Window is only reset strictly after one second; the wait is zero.
        assert_eq!(clock.sleeps(), vec![Duration::ZERO]);
        assert_eq!(limiter.count(RequestCategory::Search), 1);
    }

    #[test]
    fn test_never_more_than_quota_per_window() {
        let (clock, limiter) = manual(WindowMode::Shared);
        let mut issued_since_sleep = 0;
        let mut sleeps_seen = 0;

        for i in 0..200 {
            limiter.acquire(RequestCategory::Search);
            let sleeps = clock.sleeps().len();
            if sleeps != sleeps_seen {
                sleeps_seen = sleeps;
                issued_since_sleep = 0;
            }
            issued_since_sleep += 1;
            assert!(issued_since_sleep <= 5, "request {i} exceeded the quota");
            clock.advance(Duration::from_millis(30));
        }
        assert!(sleeps_seen > 0);
    }

    #[test]
    fn test_timeout_refuses_long_wait_without_counting() {
        let (clock, limiter) = manual(WindowMode::Shared);

        for _ in 0..10 {
            limiter.acquire(RequestCategory::Other);
        }
        let result = limiter.acquire_timeout(RequestCategory::Other, Duration::from_millis(100));

        assert!(matches!(result, Err(RecError::QuotaWaitTimeout { .. })));
        assert_eq!(limiter.count(RequestCategory::Other), 10);
        assert!(clock.sleeps().is_empty());

        clock.advance(Duration::from_millis(950));
        limiter
            .acquire_timeout(RequestCategory::Other, Duration::from_millis(100))
            .expect("remaining wait fits the limit");
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(50)]);
    }

    #[test]
    fn test_try_acquire_uses_configured_bound() {
        let clock = Arc::new(ManualClock::new());
        let bounded = RateLimiter::with_clock(Quotas { search: 1, other: 1 }, WindowMode::Shared, clock.clone())
            .with_max_wait(Some(Duration::from_millis(10)));

        bounded.try_acquire(RequestCategory::Search).unwrap();
        assert!(bounded.try_acquire(RequestCategory::Search).is_err());

        let unbounded = RateLimiter::with_clock(Quotas { search: 1, other: 1 }, WindowMode::Shared, clock.clone());
        unbounded.try_acquire(RequestCategory::Search).unwrap();
        unbounded.try_acquire(RequestCategory::Search).unwrap();
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[test]
    fn test_acquire_ignores_wait_bound() {
        let (clock, limiter) = manual(WindowMode::Shared);
        let limiter = limiter.with_max_wait(Some(Duration::ZERO));

        for _ in 0..5 {
            limiter.try_acquire(RequestCategory::Search).unwrap();
        }
        clock.advance(Duration::from_millis(200));

        assert!(limiter.try_acquire(RequestCategory::Search).is_err());
        assert_eq!(limiter.forced_waits(), 0);

        limiter.acquire(RequestCategory::Search);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(800)]);
        assert_eq!(limiter.count(RequestCategory::Search), 1);
        assert_eq!(limiter.forced_waits(), 1);
    }

    #[test]
    fn test_system_clock_limiter_sleeps() {
        let limiter = RateLimiter::new(Quotas { search: 1, other: 1 }, WindowMode::Shared);
        let start = Instant::now();
        limiter.acquire(RequestCategory::Search);
        limiter.acquire(RequestCategory::Search);
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(900), "waited only {elapsed:?}");
        assert_eq!(limiter.forced_waits(), 1);
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&RequestCategory::Search).unwrap();
        assert_eq!(json, "\"search\"");
        let mode: WindowMode = serde_json::from_str("\"independent\"").unwrap();
        assert_eq!(mode, WindowMode::Independent);
    }
}
