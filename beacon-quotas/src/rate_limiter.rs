use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use beacon_common::UnixTimestamp;

/// Minimum interval between two vacuum runs of the [`FixedWindowRateLimiter`].
const VACUUM_INTERVAL: Duration = Duration::from_secs(60);

/// A fixed window quota: at most `limit` admissions per `window`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FixedWindow {
    /// The number of requests admitted per window.
    ///
    /// A limit of `0` rejects all requests.
    pub limit: u32,
    /// The length of the window.
    ///
    /// Windows are aligned to multiples of this length since the UNIX epoch.
    pub window: Duration,
}

impl FixedWindow {
    /// Returns the end of the window that contains `now`.
    fn window_end(&self, now: UnixTimestamp) -> UnixTimestamp {
        now.window_start(self.window) + self.window.max(Duration::from_secs(1))
    }
}

/// Returned by [`FixedWindowRateLimiter::check`] when the request exceeds the quota.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("rate limit exceeded, window resets at {reset_at}")]
pub struct RateLimited {
    /// The time at which the current window ends.
    pub reset_at: UnixTimestamp,
}

/// State of a single partition within its current window.
#[derive(Clone, Copy, Debug)]
struct WindowState {
    start: UnixTimestamp,
    count: u32,
    /// Whether the last update to this state admitted a request.
    admitted: bool,
}

impl WindowState {
    fn first(start: UnixTimestamp, limit: u32) -> Self {
        Self {
            start,
            count: limit.min(1),
            admitted: limit > 0,
        }
    }

    fn next(&self, start: UnixTimestamp, limit: u32) -> Self {
        if self.start != start {
            return Self::first(start, limit);
        }

        match self.count < limit {
            true => Self {
                start,
                count: self.count + 1,
                admitted: true,
            },
            false => Self {
                start,
                count: self.count,
                admitted: false,
            },
        }
    }
}

/// Fixed window admission control, partitioned by key.
///
/// Every key receives [`FixedWindow::limit`] permits per window. When the window rolls over, the
/// counter of a key starts from zero. Requests exceeding the permits are rejected immediately.
///
/// Checks for a key are an atomic read-modify-write on a concurrent map. Checks for different keys
/// never block each other.
#[derive(Debug)]
pub struct FixedWindowRateLimiter<K>
where
    K: Hash + Eq,
{
    quota: FixedWindow,
    windows: papaya::HashMap<K, WindowState>,
    /// Unix timestamp of the next time the vacuum should be run.
    next_vacuum: AtomicU64,
}

impl<K> FixedWindowRateLimiter<K>
where
    K: Hash + Eq,
{
    /// Creates a new rate limiter enforcing `quota` for every key.
    pub fn new(quota: FixedWindow) -> Self {
        Self {
            quota,
            windows: Default::default(),
            // Time is driven by the caller, so the first vacuum attempt always runs.
            next_vacuum: AtomicU64::new(0),
        }
    }

    /// Checks and consumes one permit for `key` at time `now`.
    ///
    /// Returns `Ok` if the request is admitted. The counter of a key never exceeds the limit, a
    /// rejected request does not consume anything.
    pub fn check(&self, key: K, now: UnixTimestamp) -> Result<(), RateLimited> {
        let start = now.window_start(self.quota.window);
        let limit = self.quota.limit;

        let windows = self.windows.pin();
        let state = windows.update_or_insert(
            key,
            |state| state.next(start, limit),
            WindowState::first(start, limit),
        );

        match state.admitted {
            true => Ok(()),
            false => Err(RateLimited {
                reset_at: self.quota.window_end(now),
            }),
        }
    }

    /// Returns the number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns `true` if no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Attempts to remove all windows that ended before `now`.
    ///
    /// The vacuum is internally debounced and may not run. Callers should attempt to vacuum
    /// periodically.
    ///
    /// Returns `true` if a vacuum was performed.
    pub fn try_vacuum(&self, now: UnixTimestamp) -> bool {
        let next_vacuum = self.next_vacuum.load(Ordering::Relaxed);

        if next_vacuum > now.as_secs() {
            return false;
        }

        let exchange = self.next_vacuum.compare_exchange(
            next_vacuum,
            now.as_secs() + VACUUM_INTERVAL.as_secs(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );

        if exchange.is_err() {
            // Another caller won the race and runs the vacuum.
            return false;
        }

        let current = now.window_start(self.quota.window);
        let windows = self.windows.pin();
        windows.retain(|_, state| state.start >= current);

        true
    }
}
