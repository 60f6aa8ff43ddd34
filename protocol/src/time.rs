//! Wall-clock helpers.
//!
//! Expiration and receive times are whole seconds since the Unix epoch held in
//! a `u128`, wide enough for the [`NEVER_EXPIRES`](crate::config::NEVER_EXPIRES)
//! sentinel. Anything that compares against "now" takes the current time as a
//! parameter so tests can pin the clock.

/// Seconds since the Unix epoch.
pub type Timestamp = u128;

/// Current wall-clock time in whole seconds. Clocks set before 1970 read as 0.
pub fn now() -> Timestamp {
    chrono::Utc::now().timestamp().max(0) as Timestamp
}

/// Remaining lifetime of something expiring at `expiration_time`, or `None`
/// when it already lies in the past.
pub fn remaining_ttl(expiration_time: Timestamp, now: Timestamp) -> Option<u128> {
    expiration_time.checked_sub(now)
}
