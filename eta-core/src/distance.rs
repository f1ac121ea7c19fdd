//! Great-circle distance between two coordinates.

use geo::Coord;

/// Mean radius of the Earth in miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine distance in miles between `a` and `b`.
///
/// Coordinates follow the `geo` convention: `x` is longitude and `y` is
/// latitude, both in degrees. Out-of-range values are not rejected; they
/// simply produce a meaningless distance.
///
/// # Examples
///
/// ```
/// use geo::Coord;
/// use eta_core::haversine_miles;
///
/// let origin = Coord { x: 0.0, y: 0.0 };
/// let east = Coord { x: 1.0, y: 0.0 };
/// let miles = haversine_miles(origin, east);
/// assert!((miles - 69.09).abs() < 0.01);
/// assert_eq!(haversine_miles(origin, origin), 0.0);
/// ```
#[must_use]
pub fn haversine_miles(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let half_dlat = (lat2 - lat1) * 0.5;
    let half_dlon = (b.x - a.x).to_radians() * 0.5;

    let h = half_dlat.sin().powi(2) + lat1.cos() * lat2.cos() * half_dlon.sin().powi(2);
    // Clamp guards against rounding pushing `h` past 1 for antipodal points.
    let central_angle = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());

    EARTH_RADIUS_MILES * central_angle
}
