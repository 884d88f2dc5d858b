//! Admission control for the beacon gateway.
//!
//! The gateway exposes unauthenticated endpoints to the entire installed base of the desktop
//! client. To keep these endpoints safe from abuse, every client address is granted a fixed number
//! of requests per fixed time window. Requests beyond that are rejected immediately, they are
//! neither queued nor delayed.
//!
//! The [`FixedWindowRateLimiter`] keeps one counter per client address in a concurrent map.
//! Counters are updated atomically per key, so requests from different clients never contend on a
//! shared lock.

#![warn(missing_docs)]

mod rate_limiter;

pub use self::rate_limiter::*;
