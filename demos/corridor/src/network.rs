//! Synthetic bus and tram graphs for the corridor demo.
//!
//! Loosely modelled on a city-centre grid: streets every ~220 m north-south
//! and ~215 m east-west, with a tram line running along the middle row and
//! one bus stop on a disconnected spur.

use sg_core::GeoPoint;
use sg_spatial::{RoadNetwork, RoadNetworkBuilder};

pub const ORIGIN_LAT: f64 = 50.0600;
pub const ORIGIN_LON: f64 = 19.9300;

/// Grid spacing in degrees.
pub const STEP_LAT: f64 = 0.002;
pub const STEP_LON: f64 = 0.003;

pub const GRID: usize = 5;

/// Position of grid intersection `(row, col)`; row grows northwards.
pub fn grid_pos(row: usize, col: usize) -> GeoPoint {
    GeoPoint::new(ORIGIN_LAT + row as f64 * STEP_LAT, ORIGIN_LON + col as f64 * STEP_LON)
}

/// A spur east of the grid, not connected to it.
pub fn spur_pos() -> GeoPoint {
    GeoPoint::new(ORIGIN_LAT + 2.0 * STEP_LAT, ORIGIN_LON + 7.0 * STEP_LON)
}

/// Two-way street grid plus the isolated spur.  Stop `1004` carries a
/// platform hint so it matches the far corner even though its published
/// position is slightly off.
pub fn bus_network() -> RoadNetwork {
    let mut b = RoadNetworkBuilder::new();

    let mut ids = [[sg_core::NodeId::INVALID; GRID]; GRID];
    for (row, line) in ids.iter_mut().enumerate() {
        for (col, id) in line.iter_mut().enumerate() {
            *id = b.add_node(grid_pos(row, col));
        }
    }
    for row in 0..GRID {
        for col in 0..GRID {
            if col + 1 < GRID {
                b.add_road(ids[row][col], ids[row][col + 1]);
            }
            if row + 1 < GRID {
                b.add_road(ids[row][col], ids[row + 1][col]);
            }
        }
    }

    let spur_a = b.add_node(spur_pos());
    let spur_b = b.add_node(GeoPoint::new(spur_pos().lat + STEP_LAT, spur_pos().lon));
    b.add_road(spur_a, spur_b);

    b.add_stop_hint("1004", ids[GRID - 1][GRID - 1]);
    b.build()
}

/// Tram line along grid row 2, with an extra node midway between each
/// intersection so the track is denser than the stops.
pub fn tram_network() -> RoadNetwork {
    let mut b = RoadNetworkBuilder::new();
    let mut prev = None;
    for half_step in 0..(2 * GRID - 1) {
        let pos = GeoPoint::new(
            ORIGIN_LAT + 2.0 * STEP_LAT,
            ORIGIN_LON + half_step as f64 * STEP_LON / 2.0,
        );
        let id = b.add_node(pos);
        if let Some(p) = prev {
            b.add_road(p, id);
        }
        prev = Some(id);
    }
    b.build()
}
