//! Common types used throughout Lattice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp wrapper for consistent wall-clock handling.
///
/// Monotonic timers (heartbeats, dampening decay, hold-down) use
/// `std::time::Instant` internally; this type is for persisted records and
/// wire metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Get the current timestamp.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from a `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Seconds elapsed since this timestamp (zero if in the future).
    #[must_use]
    pub fn age_secs(&self) -> f64 {
        let delta = Utc::now().signed_duration_since(self.0);
        (delta.num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_age_of_past_timestamp() {
        let past = Timestamp::from_datetime(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert!(past.age_secs() > 0.0);
    }

    #[test]
    fn test_age_clamps_future_to_zero() {
        let future = Timestamp::from_datetime(Utc::now() + chrono::Duration::hours(1));
        assert!((future.age_secs() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serde_round_trip() {
        let ts = Timestamp::now();
        let json = serde_json::to_string(&ts).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, back);
    }
}
