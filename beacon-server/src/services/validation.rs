use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use beacon_common::UnixTimestamp;
use tokio::sync::OnceCell;

/// Minimum interval between vacuums of the [`ValidationCache`].
const VACUUM_INTERVAL: Duration = Duration::from_secs(300);

/// A cached outcome of an external check.
#[derive(Clone, Copy, Debug)]
struct CachedOutcome {
    outcome: bool,
    expires_at: UnixTimestamp,
}

impl CachedOutcome {
    fn is_valid(&self, now: UnixTimestamp) -> bool {
        now < self.expires_at
    }
}

/// A time-bounded cache of boolean outcomes of external existence checks.
///
/// Positive and negative outcomes are cached alike. Entries are never refreshed before they
/// expire. Expired entries are ignored on read and removed by [`try_vacuum`](Self::try_vacuum).
///
/// Concurrent misses for the same key are merged: one caller performs the check and all others
/// wait for its outcome.
#[derive(Debug)]
pub struct ValidationCache {
    entries: papaya::HashMap<String, CachedOutcome>,
    /// Checks currently running, by key.
    in_flight: papaya::HashMap<String, Arc<OnceCell<bool>>>,
    next_vacuum: AtomicU64,
}

impl ValidationCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: papaya::HashMap::new(),
            in_flight: papaya::HashMap::new(),
            next_vacuum: AtomicU64::new(0),
        }
    }

    /// Returns the cached outcome for `key`, unless it is missing or expired.
    pub fn get(&self, key: &str, now: UnixTimestamp) -> Option<bool> {
        let entries = self.entries.pin();

        entries
            .get(key)
            .filter(|entry| entry.is_valid(now))
            .map(|entry| entry.outcome)
    }

    /// Stores an outcome for `key` that expires after `ttl`.
    pub fn insert(&self, key: String, outcome: bool, ttl: Duration, now: UnixTimestamp) {
        let entry = CachedOutcome {
            outcome,
            expires_at: now + ttl,
        };

        self.entries.pin().insert(key, entry);
    }

    /// Returns the cached outcome for `key` or runs `check` and caches its result.
    ///
    /// While a check for `key` is running, further misses for `key` wait for it instead of
    /// running `check` again.
    pub async fn get_or_check<F, Fut>(
        &self,
        key: String,
        ttl: Duration,
        now: UnixTimestamp,
        check: F,
    ) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        if let Some(outcome) = self.get(&key, now) {
            beacon_log::trace!(%key, outcome, "validation cache hit");
            return outcome;
        }

        let cell = Arc::clone(
            self.in_flight
                .pin()
                .get_or_insert_with(key.clone(), || Arc::new(OnceCell::new())),
        );

        let mut ran_check = false;
        let leader = &mut ran_check;
        let key_ref = &key;

        let outcome = *cell
            .get_or_init(|| async move {
                *leader = true;

                // A previous check may have finished between the miss and joining.
                if let Some(outcome) = self.get(key_ref, now) {
                    return outcome;
                }

                let outcome = check().await;
                beacon_log::trace!(key = %key_ref, outcome, "validation cache miss");
                self.insert(key_ref.clone(), outcome, ttl, now);
                outcome
            })
            .await;

        if ran_check {
            self.in_flight.pin().remove(&key);
            self.try_vacuum(now);
        }

        outcome
    }

    /// Attempts to remove all expired entries.
    ///
    /// The vacuum is internally debounced and may not run. Returns `true` if a vacuum was
    /// performed.
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
            return false;
        }

        let entries = self.entries.pin();
        entries.retain(|_, entry| entry.is_valid(now));

        true
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new()
    }
}
