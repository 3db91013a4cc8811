//! Error types for location operations.
//!
//! These errors are produced by the permission, positioning and geocoding
//! collaborators. The location service absorbs every one of them and
//! degrades to a cached or default location, so they surface only through
//! [`LocationOutcome`](super::LocationOutcome) and logs.

use thiserror::Error;

/// Errors that can occur while acquiring a location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Foreground location permission was not granted.
    #[error("Location permission denied (can ask again: {can_ask_again})")]
    PermissionDenied {
        /// Whether the OS will prompt again.
        can_ask_again: bool,
    },

    /// Location services are switched off on the device.
    #[error("Location services are disabled")]
    ServicesDisabled,

    /// The positioning provider did not answer in time.
    #[error("Location request timed out after {after_ms}ms")]
    Timeout {
        /// The deadline that expired.
        after_ms: u64,
    },

    /// The positioning provider failed.
    #[error("Positioning provider error: {0}")]
    Provider(String),

    /// Reverse geocoding failed.
    #[error("Reverse geocoding failed: {0}")]
    Geocoding(String),

    /// A continuous watch could not be started.
    #[error("Location watch unavailable: {0}")]
    WatchUnavailable(String),
}

impl LocationError {
    /// Returns true for failures caused by permission or device settings
    /// rather than by the positioning hardware.
    #[must_use]
    pub const fn is_access_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. } | Self::ServicesDisabled)
    }
}

/// Result type for location collaborator operations.
pub type LocationResult<T> = Result<T, LocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_display() {
        let error = LocationError::PermissionDenied {
            can_ask_again: false,
        };
        assert_eq!(
            error.to_string(),
            "Location permission denied (can ask again: false)"
        );
    }

    #[test]
    fn services_disabled_display() {
        assert_eq!(
            LocationError::ServicesDisabled.to_string(),
            "Location services are disabled"
        );
    }

    #[test]
    fn timeout_display() {
        let error = LocationError::Timeout { after_ms: 15_000 };
        assert_eq!(
            error.to_string(),
            "Location request timed out after 15000ms"
        );
    }

    #[test]
    fn provider_display() {
        let error = LocationError::Provider("no fix".to_string());
        assert_eq!(error.to_string(), "Positioning provider error: no fix");
    }

    #[test]
    fn geocoding_display() {
        let error = LocationError::Geocoding("rate limited".to_string());
        assert_eq!(error.to_string(), "Reverse geocoding failed: rate limited");
    }

    #[test]
    fn watch_unavailable_display() {
        let error = LocationError::WatchUnavailable("no GPS".to_string());
        assert_eq!(error.to_string(), "Location watch unavailable: no GPS");
    }

    #[test]
    fn access_errors_are_classified() {
        assert!(LocationError::ServicesDisabled.is_access_error());
        assert!(LocationError::PermissionDenied {
            can_ask_again: true
        }
        .is_access_error());
        assert!(!LocationError::Timeout { after_ms: 1 }.is_access_error());
        assert!(!LocationError::Provider(String::new()).is_access_error());
    }
}
