//! Feedcache Test Utilities
//!
//! Shared test infrastructure for the feedcache crates:
//! - Proptest generators for feed images, feeds and timestamps
//! - Fixtures for images, dates and errors
//! - [`FeedStoreSpy`], a store double completed on demand
//! - Store contract assertions shared by every backend

pub mod contract;
pub mod spy;

pub use spy::{FeedStoreSpy, ReceivedMessage};

use std::sync::Once;

use chrono::{DateTime, Duration, TimeZone, Utc};
use feedcache_core::{FeedImage, LocalFeedImage, StoreError, Timestamp};
use proptest::prelude::*;
use url::Url;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache records.

    use super::*;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a timestamp in 2020..2030 with sub-second precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64, 0u32..1_000_000_000u32).prop_map(|(secs, nanos)| {
            DateTime::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
        })
    }

    /// Generate optional free text, including unicode and quotes.
    pub fn arb_optional_text() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[a-zA-Z0-9 ,.'\"éü日本-]{0,40}")
    }

    /// Generate an http(s) URL.
    pub fn arb_url() -> impl Strategy<Value = Url> {
        ("https?", "[a-z]{1,12}", "[a-z0-9/]{0,20}").prop_map(|(scheme, host, path)| {
            Url::parse(&format!("{}://{}.com/{}", scheme, host, path))
                .unwrap_or_else(|_| fixtures::any_url())
        })
    }

    /// Generate a cached feed image.
    pub fn arb_local_feed_image() -> impl Strategy<Value = LocalFeedImage> {
        (
            arb_uuid(),
            arb_optional_text(),
            arb_optional_text(),
            arb_url(),
        )
            .prop_map(|(id, description, location, url)| LocalFeedImage {
                id,
                description,
                location,
                url,
            })
    }

    /// Generate a feed of up to `max_len` images.
    pub fn arb_feed(max_len: usize) -> impl Strategy<Value = Vec<LocalFeedImage>> {
        prop::collection::vec(arb_local_feed_image(), 0..=max_len)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;
    use feedcache_storage::FeedCachePolicy;

    pub fn any_url() -> Url {
        Url::parse("https://any-url.com").unwrap_or_else(|e| panic!("fixture url: {}", e))
    }

    pub fn any_store_error() -> StoreError {
        StoreError::write_failed("any error")
    }

    /// A fresh image with a random id.
    pub fn unique_image() -> FeedImage {
        FeedImage::new(
            Uuid::new_v4(),
            Some("any".to_string()),
            Some("any".to_string()),
            any_url(),
        )
    }

    /// Two unique images, as domain models and as their cached form.
    pub fn unique_feed() -> (Vec<FeedImage>, Vec<LocalFeedImage>) {
        let models = vec![unique_image(), unique_image()];
        let local = models.iter().cloned().map(LocalFeedImage::from).collect();
        (models, local)
    }

    /// A fixed "now" so dated tests are deterministic.
    pub fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 14, 9, 26, 53)
            .single()
            .unwrap_or_else(|| panic!("fixture date is unambiguous"))
    }

    /// `now` minus the maximum cache age. A cache stamped here has just expired.
    pub fn minus_feed_cache_max_age(now: Timestamp) -> Timestamp {
        now - FeedCachePolicy::max_cache_age()
    }

    pub fn adding_days(date: Timestamp, days: i64) -> Timestamp {
        date + Duration::days(days)
    }

    pub fn adding_seconds(date: Timestamp, seconds: i64) -> Timestamp {
        date + Duration::seconds(seconds)
    }
}

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
