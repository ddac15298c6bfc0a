//! Geographic coordinate type and the two distance primitives everything
//! else is built on.
//!
//! `GeoPoint` is double precision.  Shape distances are accumulated over
//! tens of thousands of points per pattern, and `f32` rounding would show up
//! as visible drift in `shape_dist_traveled`.

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 geographic coordinate.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Haversine great-circle distance in metres.
    pub fn distance_m(self, other: GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();

        let a = (d_lat * 0.5).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon * 0.5).sin().powi(2);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    /// Squared planar distance on raw degrees.  Only meaningful for
    /// comparisons at city/regional scale; this is the KD-tree metric.
    #[inline]
    pub fn planar_distance_2(self, other: GeoPoint) -> f64 {
        let d_lat = self.lat - other.lat;
        let d_lon = self.lon - other.lon;
        d_lat * d_lat + d_lon * d_lon
    }

    /// `true` if both coordinates are finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Sum of haversine distances between consecutive points, in metres.
///
/// Empty and single-point polylines have length zero.
pub fn polyline_length_m(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| w[0].distance_m(w[1]))
        .sum()
}

/// Perpendicular distance from `p` to the infinite line through `a` and `b`,
/// in degrees (longitude is x, latitude is y).
///
/// Two-point line form:
///
/// ```text
/// |Δy·x0 − Δx·y0 + x2·y1 − y2·x1| / sqrt(Δx² + Δy²)
/// ```
///
/// When `a == b` the line is undefined and the planar distance to `a` is
/// returned instead.
pub fn line_distance(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> f64 {
    let (x0, y0) = (p.lon, p.lat);
    let (x1, y1) = (a.lon, a.lat);
    let (x2, y2) = (b.lon, b.lat);

    let dx = x2 - x1;
    let dy = y2 - y1;
    let norm = (dx * dx + dy * dy).sqrt();
    if norm == 0.0 {
        return p.planar_distance_2(a).sqrt();
    }

    (dy * x0 - dx * y0 + x2 * y1 - y2 * x1).abs() / norm
}
