//! Platform collaborators consumed by the location service.
//!
//! The host application implements these traits on top of the platform's
//! permission, positioning and geocoding APIs. Methods return boxed futures
//! so the service can hold the providers as trait objects.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc::UnboundedSender;

use super::error::LocationResult;
use super::types::{
    GeocodedAddress, PermissionResult, PositionReading, PositionRequest, WatchOptions,
};

/// Grants or denies foreground location access.
pub trait PermissionProvider: Send + Sync + 'static {
    /// Returns whether location services are enabled on the device.
    fn has_services_enabled(&self) -> BoxFuture<'_, LocationResult<bool>>;

    /// Returns the current permission state without prompting.
    fn foreground_permission(&self) -> BoxFuture<'_, LocationResult<PermissionResult>>;

    /// Prompts the user for foreground location access.
    fn request_foreground_permission(&self) -> BoxFuture<'_, LocationResult<PermissionResult>>;
}

/// A registration for continuous position updates.
pub trait WatchHandle: Send + 'static {
    /// Cancels the watch. No readings are delivered afterwards.
    fn remove(self: Box<Self>);
}

/// Supplies raw coordinate readings.
pub trait PositionProvider: Send + Sync + 'static {
    /// Fetches a single reading.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Timeout`](super::LocationError::Timeout) or
    /// [`LocationError::Provider`](super::LocationError::Provider).
    fn current_position(
        &self,
        request: PositionRequest,
    ) -> BoxFuture<'_, LocationResult<PositionReading>>;

    /// Starts a continuous watch that pushes readings into `sink` until the
    /// returned handle is removed.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::WatchUnavailable`](super::LocationError::WatchUnavailable)
    /// if the platform cannot start the watch.
    fn watch_position(
        &self,
        options: WatchOptions,
        sink: UnboundedSender<PositionReading>,
    ) -> BoxFuture<'_, LocationResult<Box<dyn WatchHandle>>>;
}

/// Resolves coordinates to addresses.
pub trait GeocodingProvider: Send + Sync + 'static {
    /// Returns candidate addresses for a coordinate, best match first.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Geocoding`](super::LocationError::Geocoding).
    fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> BoxFuture<'_, LocationResult<Vec<GeocodedAddress>>>;
}

/// Source of wall-clock time in Unix milliseconds.
pub trait Clock: Send + Sync + 'static {
    /// The current time.
    fn now_millis(&self) -> i64;
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// The set of platform collaborators a location service is built from.
#[derive(Clone)]
pub struct LocationProviders {
    /// Permission gate
    pub permission: Arc<dyn PermissionProvider>,
    /// Positioning source
    pub position: Arc<dyn PositionProvider>,
    /// Reverse geocoder
    pub geocoder: Arc<dyn GeocodingProvider>,
}

impl LocationProviders {
    /// Bundles the three providers.
    pub fn new(
        permission: Arc<dyn PermissionProvider>,
        position: Arc<dyn PositionProvider>,
        geocoder: Arc<dyn GeocodingProvider>,
    ) -> Self {
        Self {
            permission,
            position,
            geocoder,
        }
    }
}

impl std::fmt::Debug for LocationProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationProviders").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_close_to_chrono_now() {
        let before = chrono::Utc::now().timestamp_millis();
        let now = SystemClock.now_millis();
        let after = chrono::Utc::now().timestamp_millis();

        assert!(before <= now && now <= after);
    }
}
