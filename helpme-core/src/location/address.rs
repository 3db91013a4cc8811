//! Turning reverse-geocoding results into display fields.

use super::types::{Coordinate, GeocodedAddress, ResolvedLocation};

/// Address line used when geocoding returned a result with no usable parts.
pub const UNKNOWN_ADDRESS: &str = "Unknown Address";

/// Builds a one-line address: street (with number), district, city, country.
///
/// # Examples
///
/// ```
/// use helpme_core::location::{format_address, GeocodedAddress};
///
/// let address = GeocodedAddress {
///     street_number: Some("12".to_string()),
///     street: Some("Istiklal Cd.".to_string()),
///     district: Some("Beyoglu".to_string()),
///     city: Some("Istanbul".to_string()),
///     country: Some("Turkey".to_string()),
///     ..GeocodedAddress::default()
/// };
/// assert_eq!(format_address(&address), "12 Istiklal Cd., Beyoglu, Istanbul, Turkey");
/// ```
#[must_use]
pub fn format_address(address: &GeocodedAddress) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(4);

    match (
        non_empty(address.street_number.as_deref()),
        non_empty(address.street.as_deref()),
    ) {
        (Some(number), Some(street)) => parts.push(format!("{number} {street}")),
        (None, Some(street)) => parts.push(street.to_string()),
        _ => {}
    }

    parts.extend(
        [&address.district, &address.city, &address.country]
            .into_iter()
            .filter_map(|field| non_empty(field.as_deref()))
            .map(str::to_string),
    );

    if parts.is_empty() {
        UNKNOWN_ADDRESS.to_string()
    } else {
        parts.join(", ")
    }
}

/// Combines a coordinate with the best geocoding candidate, if any.
#[must_use]
pub fn resolve_with_address(
    coordinate: Coordinate,
    candidates: &[GeocodedAddress],
) -> ResolvedLocation {
    let mut location = ResolvedLocation::from_coordinate(coordinate);
    if let Some(best) = candidates.first() {
        location.address = Some(format_address(best));
        location.city = non_empty(best.city.as_deref())
            .or_else(|| non_empty(best.sub_administrative_area.as_deref()))
            .map(str::to_string);
        location.country = non_empty(best.country.as_deref()).map(str::to_string);
    }
    location
}

fn non_empty(field: Option<&str>) -> Option<&str> {
    field.map(str::trim).filter(|s| !s.is_empty())
}
