//! Location service configuration.
//!
//! All timing values are in milliseconds to match the platform positioning
//! APIs they are handed to.

use serde::{Deserialize, Serialize};

use super::types::{AccuracyHint, Coordinate, ResolvedLocation};

/// How long a cached location is served without querying the provider.
pub const CACHE_TTL_MS: i64 = 5 * 60 * 1000;

/// Minimum time between two admitted watch readings.
pub const MIN_UPDATE_INTERVAL_MS: i64 = 30 * 1000;

/// Minimum movement for a watch reading to be admitted.
pub const SIGNIFICANT_DISTANCE_M: f64 = 100.0;

/// Deadline for a regular single-shot fetch.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 15_000;

/// Deadline for an explicit refresh.
pub const REFRESH_FETCH_TIMEOUT_MS: u64 = 10_000;

/// OS-level cached readings younger than this may answer a fetch.
pub const DEFAULT_MAX_AGE_MS: u64 = 5 * 60 * 1000;

/// A stale cache older than this is no longer used as a degraded fallback.
pub const MAX_STALE_FALLBACK_MS: i64 = 6 * 60 * 60 * 1000;

/// Allowed range for fetch deadlines.
const FETCH_TIMEOUT_RANGE_MS: (u64, u64) = (10_000, 15_000);

/// Environment variable overriding the default latitude.
pub const DEFAULT_LAT_ENV: &str = "HELPME_DEFAULT_LOCATION_LAT";

/// Environment variable overriding the default longitude.
pub const DEFAULT_LNG_ENV: &str = "HELPME_DEFAULT_LOCATION_LNG";

/// Fallback location used when the device location cannot be obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultLocation {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Descriptive address shown to the user
    pub address: String,
    /// City name
    pub city: String,
    /// Country name
    pub country: String,
}

impl DefaultLocation {
    /// Converts into the location handed to consumers.
    #[must_use]
    pub fn to_resolved(&self) -> ResolvedLocation {
        ResolvedLocation {
            latitude: self.latitude,
            longitude: self.longitude,
            address: Some(self.address.clone()),
            city: Some(self.city.clone()),
            country: Some(self.country.clone()),
        }
    }
}

impl Default for DefaultLocation {
    fn default() -> Self {
        Self {
            latitude: 41.0082,
            longitude: 28.9784,
            address: "Istanbul, Turkey".to_string(),
            city: "Istanbul".to_string(),
            country: "Turkey".to_string(),
        }
    }
}

/// Configuration for the location service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Cache time-to-live
    pub cache_ttl_ms: i64,

    /// Time throttle for watch readings
    pub min_update_interval_ms: i64,

    /// Distance throttle for watch readings
    pub significant_distance_m: f64,

    /// Deadline for `get_current_location` fetches (10-15 seconds)
    pub fetch_timeout_ms: u64,

    /// Deadline for `force_location_refresh` fetches (10-15 seconds)
    pub refresh_timeout_ms: u64,

    /// Maximum-age hint handed to the positioning provider
    pub max_age_ms: u64,

    /// Oldest stale cache entry still preferred over the default location
    pub max_stale_fallback_ms: i64,

    /// Accuracy requested from the provider
    pub accuracy: AccuracyHint,

    /// Location returned when nothing better is available
    pub default_location: DefaultLocation,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: CACHE_TTL_MS,
            min_update_interval_ms: MIN_UPDATE_INTERVAL_MS,
            significant_distance_m: SIGNIFICANT_DISTANCE_M,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            refresh_timeout_ms: REFRESH_FETCH_TIMEOUT_MS,
            max_age_ms: DEFAULT_MAX_AGE_MS,
            max_stale_fallback_ms: MAX_STALE_FALLBACK_MS,
            accuracy: AccuracyHint::default(),
            default_location: DefaultLocation::default(),
        }
    }
}

impl LocationConfig {
    /// Builds the default configuration, then applies environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(
            std::env::var(DEFAULT_LAT_ENV).ok().as_deref(),
            std::env::var(DEFAULT_LNG_ENV).ok().as_deref(),
        );
        config.validate()
    }

    /// Applies default-coordinate overrides, ignoring values that do not parse.
    fn apply_overrides(&mut self, lat: Option<&str>, lng: Option<&str>) {
        if let Some(raw) = lat {
            match raw.trim().parse::<f64>() {
                Ok(value) => self.default_location.latitude = value,
                Err(e) => tracing::warn!(
                    var = DEFAULT_LAT_ENV,
                    value = raw,
                    error = %e,
                    "ignoring default latitude override"
                ),
            }
        }
        if let Some(raw) = lng {
            match raw.trim().parse::<f64>() {
                Ok(value) => self.default_location.longitude = value,
                Err(e) => tracing::warn!(
                    var = DEFAULT_LNG_ENV,
                    value = raw,
                    error = %e,
                    "ignoring default longitude override"
                ),
            }
        }
    }

    /// Returns a copy with out-of-range values repaired.
    ///
    /// Fetch deadlines are clamped to 10-15 seconds and an invalid default
    /// coordinate is replaced by the built-in one.
    #[must_use]
    pub fn validate(mut self) -> Self {
        let (min, max) = FETCH_TIMEOUT_RANGE_MS;
        self.fetch_timeout_ms = self.fetch_timeout_ms.clamp(min, max);
        self.refresh_timeout_ms = self.refresh_timeout_ms.clamp(min, max);

        let coordinate = Coordinate::new(
            self.default_location.latitude,
            self.default_location.longitude,
        );
        if !coordinate.is_valid() {
            tracing::warn!(
                latitude = self.default_location.latitude,
                longitude = self.default_location.longitude,
                "invalid default location, using built-in default"
            );
            self.default_location = DefaultLocation::default();
        }

        if !self.significant_distance_m.is_finite() || self.significant_distance_m < 0.0 {
            self.significant_distance_m = SIGNIFICANT_DISTANCE_M;
        }
        self
    }

    /// The default location as handed to consumers.
    #[must_use]
    pub fn default_resolved(&self) -> ResolvedLocation {
        self.default_location.to_resolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = LocationConfig::default();

        assert_eq!(config.cache_ttl_ms, 300_000);
        assert_eq!(config.min_update_interval_ms, 30_000);
        assert!((config.significant_distance_m - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.fetch_timeout_ms, 15_000);
        assert_eq!(config.refresh_timeout_ms, 10_000);
        assert_eq!(config.max_age_ms, 300_000);
        assert_eq!(config.accuracy, AccuracyHint::Balanced);
    }

    #[test]
    fn default_location_is_istanbul() {
        let resolved = LocationConfig::default().default_resolved();

        assert!((resolved.latitude - 41.0082).abs() < f64::EPSILON);
        assert!((resolved.longitude - 28.9784).abs() < f64::EPSILON);
        assert_eq!(resolved.address.as_deref(), Some("Istanbul, Turkey"));
        assert_eq!(resolved.city.as_deref(), Some("Istanbul"));
        assert_eq!(resolved.country.as_deref(), Some("Turkey"));
    }

    #[test]
    fn overrides_replace_default_coordinate() {
        let mut config = LocationConfig::default();
        config.apply_overrides(Some("52.52"), Some(" 13.405 "));

        assert!((config.default_location.latitude - 52.52).abs() < f64::EPSILON);
        assert!((config.default_location.longitude - 13.405).abs() < f64::EPSILON);
    }

    #[test]
    fn unparseable_overrides_are_ignored() {
        let mut config = LocationConfig::default();
        config.apply_overrides(Some("north"), None);

        assert_eq!(config.default_location, DefaultLocation::default());
    }

    #[test]
    fn validate_clamps_fetch_timeouts() {
        let config = LocationConfig {
            fetch_timeout_ms: 60_000,
            refresh_timeout_ms: 1_000,
            ..LocationConfig::default()
        }
        .validate();

        assert_eq!(config.fetch_timeout_ms, 15_000);
        assert_eq!(config.refresh_timeout_ms, 10_000);
    }

    #[test]
    fn validate_replaces_invalid_default_location() {
        let mut config = LocationConfig::default();
        config.default_location.latitude = 123.0;

        let config = config.validate();
        assert_eq!(config.default_location, DefaultLocation::default());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: LocationConfig =
            serde_json::from_str(r#"{"cache_ttl_ms": 60000, "accuracy": "high"}"#).unwrap();

        assert_eq!(config.cache_ttl_ms, 60_000);
        assert_eq!(config.accuracy, AccuracyHint::High);
        assert_eq!(config.min_update_interval_ms, MIN_UPDATE_INTERVAL_MS);
        assert_eq!(config.default_location, DefaultLocation::default());
    }
}
