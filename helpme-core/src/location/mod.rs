//! Device location for the emergency assistance app.
//!
//! Provides a single shared source of the device location with:
//! - A five minute TTL cache in front of the positioning provider
//! - Fallback to a recent stale fix or a configured default location
//! - Best-effort reverse geocoding into a display address
//! - One shared platform watch fanned out to any number of subscribers,
//!   throttled by time (30 s) and distance (100 m)
//!
//! # Guarantees
//!
//! - Lookups never fail; degraded results say why via [`LocationOutcome`]
//! - A failed lookup never overwrites a good cache entry
//! - A panicking subscriber does not stop delivery to the others
//! - Nothing is cached or broadcast after [`LocationService::cleanup`]
//!
//! # Example Usage
//!
//! ```
//! use helpme_core::location::{calculate_distance, AccuracyLevel, Coordinate};
//!
//! let galata = Coordinate::new(41.0256, 28.9742);
//! let sultanahmet = Coordinate::new(41.0054, 28.9768);
//! let distance = calculate_distance(galata, sultanahmet);
//! assert!(distance.formatted.ends_with("km"));
//!
//! assert_eq!(AccuracyLevel::from_meters(8.0), AccuracyLevel::High);
//! ```

pub mod address;
pub mod config;
pub mod distance;
pub mod error;
pub mod outcome;
pub mod policy;
pub mod provider;
pub mod service;
pub mod session;
pub mod subscription;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod types;

pub use address::{format_address, resolve_with_address, UNKNOWN_ADDRESS};
pub use config::{DefaultLocation, LocationConfig};
pub use distance::{calculate_distance, format_distance, haversine_meters};
pub use error::{LocationError, LocationResult};
pub use outcome::{FallbackSource, LocationOutcome};
pub use policy::{Admission, AdmissionPolicy};
pub use provider::{
    Clock, GeocodingProvider, LocationProviders, PermissionProvider, PositionProvider,
    SystemClock, WatchHandle,
};
pub use service::{LocationService, WatchStats};
pub use session::{LocationSession, PermissionState, RecentLocations, SessionSnapshot};
pub use subscription::{LocationCallback, SubscriptionHandle};
pub use types::{
    AccuracyHint, AccuracyLevel, CachedLocation, Coordinate, Distance, GeocodedAddress,
    LocationAccuracy, PermissionResult, PermissionStatus, PositionReading, PositionRequest,
    ResolvedLocation, WatchOptions,
};
