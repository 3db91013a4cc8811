//! Property-based tests for distance, accuracy and admission rules.
//!
//! These tests verify:
//! - D1: Haversine distance is symmetric, non-negative and bounded
//! - D2: Formatted distances switch units at one kilometer
//! - D3: Accuracy levels never improve as the radius grows
//! - D4: Admission never lets a reading through inside the throttle window

use helpme_core::location::{
    calculate_distance, format_distance, haversine_meters, AccuracyLevel, Admission,
    AdmissionPolicy, Coordinate, RecentLocations, ResolvedLocation,
};
use proptest::prelude::*;

/// Half the Earth's circumference, the longest great-circle distance.
const MAX_DISTANCE_M: f64 = std::f64::consts::PI * 6_371_000.0;

fn coordinate() -> impl Strategy<Value = Coordinate> {
    (-90.0_f64..=90.0, -180.0_f64..=180.0).prop_map(|(lat, lon)| Coordinate::new(lat, lon))
}

fn rank(level: AccuracyLevel) -> u8 {
    match level {
        AccuracyLevel::High => 0,
        AccuracyLevel::Medium => 1,
        AccuracyLevel::Low => 2,
        AccuracyLevel::None => 3,
    }
}

// ============================================================================
// D1: Haversine distance
// ============================================================================

proptest! {
    #[test]
    fn d1_distance_is_symmetric(a in coordinate(), b in coordinate()) {
        let ab = haversine_meters(a, b);
        let ba = haversine_meters(b, a);
        prop_assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
    }

    #[test]
    fn d1_distance_is_bounded(a in coordinate(), b in coordinate()) {
        let d = haversine_meters(a, b);
        prop_assert!(d >= 0.0);
        prop_assert!(d <= MAX_DISTANCE_M + 1.0, "{d} exceeds half circumference");
    }

    #[test]
    fn d1_distance_to_self_is_zero(a in coordinate()) {
        prop_assert!(haversine_meters(a, a).abs() < 1e-6);
    }
}

// ============================================================================
// D2: Distance formatting
// ============================================================================

proptest! {
    #[test]
    fn d2_unit_switches_at_one_kilometer(meters in 0.0_f64..20_000_000.0) {
        let formatted = format_distance(meters);
        if meters < 1000.0 {
            prop_assert!(formatted.ends_with('m') && !formatted.ends_with("km"), "{formatted}");
        } else {
            prop_assert!(formatted.ends_with("km"), "{formatted}");
        }
    }

    #[test]
    fn d2_kilometers_match_meters(a in coordinate(), b in coordinate()) {
        let distance = calculate_distance(a, b);
        prop_assert!((distance.kilometers * 1000.0 - distance.meters).abs() < 1e-6);
    }
}

// ============================================================================
// D3: Accuracy levels
// ============================================================================

proptest! {
    #[test]
    fn d3_accuracy_level_is_monotonic(a in 0.0_f64..10_000.0, b in 0.0_f64..10_000.0) {
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            rank(AccuracyLevel::from_meters(small)) <= rank(AccuracyLevel::from_meters(large))
        );
    }
}

// ============================================================================
// D4: Admission policy and recent list
// ============================================================================

proptest! {
    #[test]
    fn d4_readings_inside_interval_are_rejected(
        elapsed in 0_i64..30_000,
        a in coordinate(),
        b in coordinate(),
    ) {
        let policy = AdmissionPolicy::default();
        let admission = policy.evaluate(1_000_000 + elapsed, Some(1_000_000), Some(a), b);
        prop_assert_eq!(admission, Admission::TooSoon { elapsed_ms: elapsed });
    }

    #[test]
    fn d4_first_reading_is_admitted(now in 0_i64..i64::MAX / 2, a in coordinate()) {
        let policy = AdmissionPolicy::default();
        prop_assert_eq!(policy.evaluate(now, None, None, a), Admission::Admit);
    }

    #[test]
    fn d4_recent_list_never_exceeds_five(points in prop::collection::vec(coordinate(), 0..20)) {
        let mut recent = RecentLocations::default();
        for point in points {
            recent.record(ResolvedLocation::from_coordinate(point));
        }
        prop_assert!(recent.len() <= 5);
    }
}
