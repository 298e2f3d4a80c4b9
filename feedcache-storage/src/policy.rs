//! Staleness policy for cached feeds.
//!
//! Decides whether a snapshot captured at some moment may still be served.
//! The policy is a pure function of the two timestamps, so it can be
//! exercised without a store.

use chrono::Duration;
use feedcache_core::Timestamp;

/// Age-based validity rule for cached feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedCachePolicy;

impl FeedCachePolicy {
    /// Number of days a snapshot stays valid.
    pub const MAX_CACHE_AGE_DAYS: i64 = 7;

    /// Maximum age of a servable snapshot.
    pub fn max_cache_age() -> Duration {
        Duration::days(Self::MAX_CACHE_AGE_DAYS)
    }

    /// Returns true if a snapshot captured at `timestamp` is still valid at
    /// `now`.
    ///
    /// Validity is strict: a snapshot exactly `MAX_CACHE_AGE_DAYS` old is
    /// already expired. Timestamps too far in the future to add the window
    /// to are treated as expired.
    pub fn validate(timestamp: Timestamp, against: Timestamp) -> bool {
        match timestamp.checked_add_signed(Self::max_cache_age()) {
            Some(max_age) => against < max_age,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 14, 9, 26, 53)
            .single()
            .expect("valid date")
    }

    #[test]
    fn test_valid_just_before_expiration() {
        let timestamp = fixed_now();
        let now = timestamp + Duration::days(7) - Duration::seconds(1);
        assert!(FeedCachePolicy::validate(timestamp, now));
    }

    #[test]
    fn test_invalid_on_expiration() {
        let timestamp = fixed_now();
        let now = timestamp + Duration::days(7);
        assert!(!FeedCachePolicy::validate(timestamp, now));
    }

    #[test]
    fn test_invalid_after_expiration() {
        let timestamp = fixed_now();
        let now = timestamp + Duration::days(7) + Duration::seconds(1);
        assert!(!FeedCachePolicy::validate(timestamp, now));
    }

    #[test]
    fn test_valid_when_fresh() {
        let now = fixed_now();
        assert!(FeedCachePolicy::validate(now, now));
    }

    #[test]
    fn test_overflowing_timestamp_is_invalid() {
        assert!(!FeedCachePolicy::validate(DateTime::<Utc>::MAX_UTC, fixed_now()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Any age below the window is valid, any age at or past it is not.
        #[test]
        fn prop_validity_matches_age(age_secs in 0i64..(14 * 24 * 60 * 60)) {
            let timestamp = fixed_now();
            let now = timestamp + Duration::seconds(age_secs);
            let expected = age_secs < FeedCachePolicy::MAX_CACHE_AGE_DAYS * 24 * 60 * 60;
            prop_assert_eq!(FeedCachePolicy::validate(timestamp, now), expected);
        }
    }
}
