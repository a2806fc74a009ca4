//! Geographic utilities shared across the crate.
//!
//! Distances use the haversine formula; local mini-map grids use an
//! equirectangular meters-offset model around each grid origin, which is
//! accurate to well under a meter at the grid sizes we allow (±30 km).
//!
//! Courses are compass-style: radians clockwise from true north.

use crate::GeoPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (spherical model).
pub const METERS_PER_DEG_LAT: f64 = 111_194.9;

/// Great-circle distance between two GPS points in meters.
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial course from `a` to `b` in radians clockwise from north, in [0, 2π).
pub fn initial_course(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    normalize_course(y.atan2(x))
}

/// Normalize an angle to [0, 2π).
pub fn normalize_course(course: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let mut c = course % two_pi;
    if c < 0.0 {
        c += two_pi;
    }
    c
}

/// Absolute difference between two courses, folded into [0, π].
///
/// This is the heading-mismatch measure used by the closest-segment
/// tie-break and the wrong-way test: 0 means identical heading, π means
/// exactly opposite.
pub fn course_difference(a: f64, b: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let mut d = (a - b).abs() % two_pi;
    if d > std::f64::consts::PI {
        d = two_pi - d;
    }
    d
}

/// Meters per degree of longitude at the given latitude.
pub fn meters_per_deg_lng(latitude_deg: f64) -> f64 {
    METERS_PER_DEG_LAT * latitude_deg.to_radians().cos()
}

/// Offset in meters (east, north) from `origin` to `p`, equirectangular.
pub fn local_offset_m(origin: &GeoPoint, p: &GeoPoint) -> (f64, f64) {
    let east = (p.longitude - origin.longitude) * meters_per_deg_lng(origin.latitude);
    let north = (p.latitude - origin.latitude) * METERS_PER_DEG_LAT;
    (east, north)
}

/// Geographic point at the given meters offset (east, north) from `origin`.
pub fn offset_to_geo(origin: &GeoPoint, east_m: f64, north_m: f64) -> GeoPoint {
    GeoPoint::new(
        origin.latitude + north_m / METERS_PER_DEG_LAT,
        origin.longitude + east_m / meters_per_deg_lng(origin.latitude),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // London to Paris, roughly 344 km
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);
        let d = haversine_distance(&london, &paris);
        assert!(d > 330_000.0 && d < 350_000.0, "got {}", d);
    }

    #[test]
    fn test_haversine_zero() {
        let p = GeoPoint::new(47.0, 8.0);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_initial_course_cardinal() {
        let origin = GeoPoint::new(47.0, 8.0);
        let north = GeoPoint::new(47.01, 8.0);
        let east = GeoPoint::new(47.0, 8.01);

        assert!(initial_course(&origin, &north).abs() < 0.01);
        let e = initial_course(&origin, &east);
        assert!((e - std::f64::consts::FRAC_PI_2).abs() < 0.01);
    }

    #[test]
    fn test_course_difference_folding() {
        let pi = std::f64::consts::PI;
        assert!(course_difference(0.1, 0.1) < 1e-12);
        assert!((course_difference(0.0, pi) - pi).abs() < 1e-12);
        // 350° vs 10° is 20°, not 340°
        let d = course_difference(350f64.to_radians(), 10f64.to_radians());
        assert!((d - 20f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn test_local_offset_round_trip() {
        let origin = GeoPoint::new(47.3769, 8.5417); // Zurich
        let p = offset_to_geo(&origin, 1500.0, -800.0);
        let (east, north) = local_offset_m(&origin, &p);
        assert!((east - 1500.0).abs() < 0.01);
        assert!((north + 800.0).abs() < 0.01);
    }

    #[test]
    fn test_offset_matches_haversine() {
        let origin = GeoPoint::new(47.0, 8.0);
        let p = offset_to_geo(&origin, 1000.0, 0.0);
        let d = haversine_distance(&origin, &p);
        assert!((d - 1000.0).abs() < 2.0, "got {}", d);
    }
}
