//! Plain data row types written by output backends.

use sg_core::{GeoPoint, ShapeId};

/// One point of a generated shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapePoint {
    /// Zero-based, strictly increasing within a shape.
    pub sequence: u32,
    /// Metres travelled from the first point; non-decreasing.
    pub dist_traveled_m: f64,
    pub lat: f64,
    pub lon: f64,
}

impl ShapePoint {
    pub fn new(sequence: u32, dist_traveled_m: f64, pos: GeoPoint) -> Self {
        Self { sequence, dist_traveled_m, lat: pos.lat, lon: pos.lon }
    }

    pub fn pos(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// A shape point together with the shape it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRow {
    pub shape_id: ShapeId,
    pub point:    ShapePoint,
}
