//! Admission policy for watch-delivered readings.
//!
//! A reading updates the cache only if enough time has passed since the
//! last admitted update AND the device moved far enough from the last
//! known location. The first reading is always admitted.

use super::config::LocationConfig;
use super::distance::haversine_meters;
use super::types::Coordinate;

/// Why a reading was or was not admitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// The reading should be cached and broadcast.
    Admit,
    /// Less than the minimum interval has passed since the last update.
    TooSoon {
        /// Milliseconds since the last admitted update.
        elapsed_ms: i64,
    },
    /// The device has not moved far enough.
    TooClose {
        /// Distance from the last known location.
        distance_m: f64,
    },
    /// The reading is not a valid coordinate.
    Invalid,
}

impl Admission {
    /// Returns true for [`Admission::Admit`].
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Time and distance throttle for watch readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionPolicy {
    /// Minimum time between admitted updates.
    pub min_update_interval_ms: i64,
    /// Minimum movement between admitted updates.
    pub significant_distance_m: f64,
}

impl AdmissionPolicy {
    /// Builds the policy from service configuration.
    #[must_use]
    pub const fn from_config(config: &LocationConfig) -> Self {
        Self {
            min_update_interval_ms: config.min_update_interval_ms,
            significant_distance_m: config.significant_distance_m,
        }
    }

    /// Evaluates a candidate reading.
    ///
    /// * `now_millis` - current time
    /// * `last_update_millis` - time of the last admitted update, if any
    /// * `previous` - last known coordinate, if any
    /// * `candidate` - the new reading
    ///
    /// # Examples
    ///
    /// ```
    /// use helpme_core::location::{Admission, AdmissionPolicy, Coordinate, LocationConfig};
    ///
    /// let policy = AdmissionPolicy::from_config(&LocationConfig::default());
    /// let here = Coordinate::new(41.0082, 28.9784);
    ///
    /// assert_eq!(policy.evaluate(0, None, None, here), Admission::Admit);
    /// assert!(!policy.evaluate(10_000, Some(0), Some(here), here).is_admitted());
    /// ```
    #[must_use]
    pub fn evaluate(
        &self,
        now_millis: i64,
        last_update_millis: Option<i64>,
        previous: Option<Coordinate>,
        candidate: Coordinate,
    ) -> Admission {
        if !candidate.is_valid() {
            return Admission::Invalid;
        }

        if let Some(last) = last_update_millis {
            let elapsed_ms = now_millis - last;
            if elapsed_ms < self.min_update_interval_ms {
                return Admission::TooSoon { elapsed_ms };
            }
        }

        if let Some(previous) = previous {
            let distance_m = haversine_meters(previous, candidate);
            if distance_m < self.significant_distance_m {
                return Admission::TooClose { distance_m };
            }
        }

        Admission::Admit
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::from_config(&LocationConfig::default())
    }
}
