//! Tagged result of a location lookup.

use serde::Serialize;

use super::error::LocationError;
use super::types::ResolvedLocation;

/// Where a degraded lookup took its location from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSource {
    /// An expired but still usable cache entry.
    StaleCache,
    /// The configured default location.
    DefaultLocation,
}

/// How a lookup was satisfied.
///
/// Every variant carries a usable location; the variants only record why.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationOutcome {
    /// Served from a cache entry younger than the TTL.
    Cached(ResolvedLocation),
    /// Fetched from the positioning provider.
    Fresh(ResolvedLocation),
    /// The provider could not be used and a fallback was returned.
    Degraded {
        /// What went wrong.
        reason: LocationError,
        /// Which fallback was used.
        source: FallbackSource,
        /// The fallback location.
        location: ResolvedLocation,
    },
}

impl LocationOutcome {
    /// The location carried by this outcome.
    #[must_use]
    pub const fn location(&self) -> &ResolvedLocation {
        match self {
            Self::Cached(location) | Self::Fresh(location) | Self::Degraded { location, .. } => {
                location
            }
        }
    }

    /// Consumes the outcome, returning its location.
    #[must_use]
    pub fn into_location(self) -> ResolvedLocation {
        match self {
            Self::Cached(location) | Self::Fresh(location) | Self::Degraded { location, .. } => {
                location
            }
        }
    }

    /// The failure that caused a fallback, if any.
    #[must_use]
    pub const fn reason(&self) -> Option<&LocationError> {
        match self {
            Self::Degraded { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Returns true if a fallback was used.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}
