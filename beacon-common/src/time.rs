//! Utilities to deal with timestamps shared by the caches and rate limiters.

use std::fmt;
use std::time::{Duration, SystemTime};

/// A unix timestamp (full seconds elapsed since 1970-01-01 00:00 UTC).
///
/// Expiry bookkeeping of the gateway's process-wide state is done in full seconds. Time is passed
/// in explicitly by callers, which keeps the data structures independent of the system clock and
/// allows tests to drive time forward.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    /// Creates a unix timestamp from the given number of seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Creates a unix timestamp from the given system time.
    pub fn from_system(time: SystemTime) -> Self {
        let duration = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self(duration)
    }

    /// Returns the current timestamp.
    #[inline]
    pub fn now() -> Self {
        Self::from_system(SystemTime::now())
    }

    /// Returns the number of seconds since the UNIX epoch start.
    pub fn as_secs(self) -> u64 {
        self.0
    }

    /// Returns the start of the fixed window of length `window` that contains this timestamp.
    ///
    /// Windows are aligned to multiples of `window` since the UNIX epoch. A zero-length window is
    /// treated as one second.
    pub fn window_start(self, window: Duration) -> Self {
        let window = window.as_secs().max(1);
        Self(self.0 - self.0 % window)
    }
}

impl fmt::Debug for UnixTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnixTimestamp({})", self.as_secs())
    }
}

impl fmt::Display for UnixTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_secs().fmt(f)
    }
}

impl std::ops::Add<Duration> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(rhs.as_secs()))
    }
}
