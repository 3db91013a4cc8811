//! Great-circle distance between coordinates.

use super::types::{Coordinate, Distance};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Returns the haversine distance between two coordinates in meters.
#[must_use]
pub fn haversine_meters(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push h just past 1 for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Formats a distance for display.
///
/// Below one kilometer the value is rounded to whole meters ("830m"),
/// otherwise it is shown in kilometers with one decimal ("1.2km").
#[must_use]
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{}m", meters.round())
    } else {
        format!("{:.1}km", meters / 1000.0)
    }
}

/// Calculates the distance between two coordinates.
///
/// # Examples
///
/// ```
/// use helpme_core::location::{calculate_distance, Coordinate};
///
/// let istanbul = Coordinate::new(41.0082, 28.9784);
/// let east = Coordinate::new(41.0082, 28.9884);
///
/// let distance = calculate_distance(istanbul, east);
/// assert_eq!(distance.formatted, "839m");
///
/// let far = calculate_distance(istanbul, Coordinate::new(41.0082, 29.0784));
/// assert_eq!(far.formatted, "8.4km");
/// ```
#[must_use]
pub fn calculate_distance(a: Coordinate, b: Coordinate) -> Distance {
    let meters = haversine_meters(a, b);
    Distance {
        meters,
        kilometers: meters / 1000.0,
        formatted: format_distance(meters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISTANBUL: Coordinate = Coordinate::new(41.0082, 28.9784);

    #[test]
    fn identical_points_are_zero_meters() {
        let distance = calculate_distance(ISTANBUL, ISTANBUL);
        assert!(distance.meters.abs() < f64::EPSILON);
        assert_eq!(distance.formatted, "0m");
    }

    #[test]
    fn hundredth_of_a_degree_east_in_istanbul() {
        let east = Coordinate::new(41.0082, 28.9884);
        let distance = calculate_distance(ISTANBUL, east);

        // 0.01 degrees of longitude at ~41N is roughly 839m
        assert!((distance.meters - 839.1).abs() < 839.1 * 0.01);
        assert!((distance.kilometers - distance.meters / 1000.0).abs() < 1e-12);
        // Sub-kilometer distances stay in whole meters
        assert_eq!(distance.formatted, "839m");
    }

    #[test]
    fn short_distances_format_in_meters() {
        let nearby = Coordinate::new(41.0090, 28.9784);
        let distance = calculate_distance(ISTANBUL, nearby);

        assert!(distance.meters < 100.0);
        assert!(distance.formatted.ends_with('m'));
        assert!(!distance.formatted.ends_with("km"));
    }

    #[test]
    fn one_degree_of_latitude() {
        let north = Coordinate::new(42.0082, 28.9784);
        let distance = calculate_distance(ISTANBUL, north);

        // 2 * pi * R / 360
        assert!((distance.meters - 111_194.9).abs() < 1.0);
        assert_eq!(distance.formatted, "111.2km");
    }

    #[test]
    fn distance_is_symmetric() {
        let ankara = Coordinate::new(39.9334, 32.8597);
        let there = haversine_meters(ISTANBUL, ankara);
        let back = haversine_meters(ankara, ISTANBUL);
        assert!((there - back).abs() < 1e-6);
    }

    #[test]
    fn format_distance_switches_units_at_one_kilometer() {
        assert_eq!(format_distance(999.4), "999m");
        assert_eq!(format_distance(1000.0), "1.0km");
        assert_eq!(format_distance(12_345.0), "12.3km");
    }
}
