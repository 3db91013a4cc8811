//! Reusable test helpers for location service integration tests.
//!
//! Every service is wired to the in-memory providers from
//! `helpme_core::location::testing` and a manual clock, so tests control
//! permission answers, positioning fixes and time.

#![allow(dead_code)]

use std::time::Duration;

use helpme_core::location::testing::FakeProviders;
use helpme_core::location::{GeocodedAddress, LocationConfig, LocationService, PositionReading};

/// Clock start used by every helper-built service.
pub const START_MILLIS: i64 = 1_700_000_000_000;

/// Taksim Square.
pub const TAKSIM: PositionReading = PositionReading::new(41.0370, 28.9850, 6.0);

/// Kadikoy pier, ~5km from Taksim.
pub const KADIKOY: PositionReading = PositionReading::new(40.9923, 29.0244, 25.0);

/// A few meters from Taksim.
pub const TAKSIM_NUDGED: PositionReading = PositionReading::new(41.0371, 28.9851, 6.0);

/// A typical geocoder answer.
pub fn taksim_address() -> GeocodedAddress {
    GeocodedAddress {
        street_number: Some("1".to_string()),
        street: Some("Cumhuriyet Cd.".to_string()),
        district: Some("Beyoglu".to_string()),
        city: Some("Istanbul".to_string()),
        country: Some("Turkey".to_string()),
        ..GeocodedAddress::default()
    }
}

/// A service with default configuration over fresh fakes.
pub fn service() -> (LocationService, FakeProviders) {
    service_with_config(LocationConfig::default())
}

/// A service with `config` over fresh fakes.
pub fn service_with_config(config: LocationConfig) -> (LocationService, FakeProviders) {
    let fakes = FakeProviders::new(TAKSIM, taksim_address(), START_MILLIS);
    let service = LocationService::with_clock(fakes.providers(), config, fakes.clock());
    (service, fakes)
}

/// Polls `condition` until it holds. Panics after one second.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within one second");
}

/// Waits until the watch pump has received `count` readings.
pub async fn wait_for_received(service: &LocationService, count: u64) {
    wait_until(|| service.watch_stats().received >= count).await;
}
