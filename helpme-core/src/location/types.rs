//! Location data types.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude (-90.0 to 90.0)
    pub latitude: f64,
    /// Longitude (-180.0 to 180.0)
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a new coordinate.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true if both components are finite and inside their valid range.
    ///
    /// # Examples
    ///
    /// ```
    /// use helpme_core::location::Coordinate;
    ///
    /// assert!(Coordinate::new(41.0082, 28.9784).is_valid());
    /// assert!(!Coordinate::new(91.0, 0.0).is_valid());
    /// assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    /// ```
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A coordinate plus best-effort reverse-geocoded address fields.
///
/// The address fields are `None` when reverse geocoding failed or was
/// skipped. They are omitted from serialized JSON in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    /// Latitude in decimal degrees
    pub latitude: f64,

    /// Longitude in decimal degrees
    pub longitude: f64,

    /// Human-readable address line, e.g. "12 Istiklal Cd., Beyoglu, Istanbul, Turkey"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// City name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    /// Country name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl ResolvedLocation {
    /// Creates a location with no address information.
    #[must_use]
    pub const fn from_coordinate(coordinate: Coordinate) -> Self {
        Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            address: None,
            city: None,
            country: None,
        }
    }

    /// Returns the bare coordinate of this location.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Returns true if reverse geocoding contributed any field.
    #[must_use]
    pub const fn has_address(&self) -> bool {
        self.address.is_some() || self.city.is_some() || self.country.is_some()
    }
}

/// The cache entry owned by the location service.
///
/// Consumers only ever receive copies of `location`; the entry itself is
/// replaced wholesale on each successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedLocation {
    /// The resolved location handed out to consumers.
    pub location: ResolvedLocation,
    /// When the reading was committed (Unix milliseconds).
    pub fetched_at_millis: i64,
    /// Reported horizontal accuracy in meters (0 when the provider gave none).
    pub accuracy_meters: f64,
}

impl CachedLocation {
    /// Age of this entry relative to `now_millis`, never negative.
    #[must_use]
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        (now_millis - self.fetched_at_millis).max(0)
    }
}

/// Coarse accuracy bucket derived from the cached reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyLevel {
    /// Accuracy of 10 m or better.
    High,
    /// Accuracy of 50 m or better.
    Medium,
    /// Accuracy worse than 50 m.
    Low,
    /// No cached reading exists.
    None,
}

impl AccuracyLevel {
    /// Buckets a reported accuracy radius.
    ///
    /// # Examples
    ///
    /// ```
    /// use helpme_core::location::AccuracyLevel;
    ///
    /// assert_eq!(AccuracyLevel::from_meters(8.0), AccuracyLevel::High);
    /// assert_eq!(AccuracyLevel::from_meters(50.0), AccuracyLevel::Medium);
    /// assert_eq!(AccuracyLevel::from_meters(50.1), AccuracyLevel::Low);
    /// ```
    #[must_use]
    pub fn from_meters(meters: f64) -> Self {
        if meters <= 10.0 {
            Self::High
        } else if meters <= 50.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Capitalized label used in status lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::None => "None",
        }
    }
}

/// Snapshot of the cache's accuracy state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationAccuracy {
    /// Accuracy bucket.
    pub level: AccuracyLevel,
    /// Reported accuracy radius in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meters: Option<f64>,
    /// Age of the cached reading in whole seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<i64>,
}

impl LocationAccuracy {
    /// The state reported when nothing is cached.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            level: AccuracyLevel::None,
            meters: None,
            age_secs: None,
        }
    }
}

impl Default for LocationAccuracy {
    fn default() -> Self {
        Self::none()
    }
}

/// Great-circle distance between two coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    /// Distance in meters.
    pub meters: f64,
    /// Distance in kilometers.
    pub kilometers: f64,
    /// Display form: "830m" below one kilometer, "1.2km" otherwise.
    pub formatted: String,
}

/// Outcome of a foreground permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// The user granted access.
    Granted,
    /// The user (or the OS) denied access.
    Denied,
    /// The user has not been asked yet.
    Undetermined,
}

/// Result of asking the permission provider for foreground access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResult {
    /// Whether location access is granted.
    pub granted: bool,
    /// Whether the OS will show the prompt again.
    pub can_ask_again: bool,
    /// Raw status reported by the platform.
    pub status: PermissionStatus,
}

impl PermissionResult {
    /// A granted result.
    #[must_use]
    pub const fn granted() -> Self {
        Self {
            granted: true,
            can_ask_again: true,
            status: PermissionStatus::Granted,
        }
    }

    /// A denied result.
    #[must_use]
    pub const fn denied(can_ask_again: bool) -> Self {
        Self {
            granted: false,
            can_ask_again,
            status: PermissionStatus::Denied,
        }
    }
}

/// Accuracy hint passed to the positioning provider.
///
/// Ordered from most to least precise (and most to least power hungry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyHint {
    /// Best the hardware can do
    Highest,
    /// GPS-grade
    High,
    /// Wi-Fi/cell assisted, the default for place discovery
    #[default]
    Balanced,
    /// City-level
    Low,
}

/// Parameters for a single-shot position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRequest {
    /// Desired accuracy.
    pub accuracy: AccuracyHint,
    /// Deadline the provider should honor.
    pub timeout_ms: u64,
    /// The provider may answer with an OS-level reading at most this old.
    pub max_age_ms: u64,
}

/// Parameters for a continuous positioning watch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Desired accuracy.
    pub accuracy: AccuracyHint,
    /// Minimum time between deliveries.
    pub min_interval_ms: u64,
    /// Minimum movement between deliveries.
    pub min_distance_m: f64,
}

/// A raw reading from the positioning provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Horizontal accuracy radius in meters, if the platform reports one
    pub accuracy_meters: Option<f64>,
}

impl PositionReading {
    /// Creates a reading with a known accuracy radius.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters: Some(accuracy_meters),
        }
    }

    /// The coordinate of this reading.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// One reverse-geocoding result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    /// House number
    #[serde(default)]
    pub street_number: Option<String>,
    /// Street name
    #[serde(default)]
    pub street: Option<String>,
    /// District or neighbourhood
    #[serde(default)]
    pub district: Option<String>,
    /// City
    #[serde(default)]
    pub city: Option<String>,
    /// County/province, used when `city` is missing
    #[serde(default)]
    pub sub_administrative_area: Option<String>,
    /// Country
    #[serde(default)]
    pub country: Option<String>,
}
