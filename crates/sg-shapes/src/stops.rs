//! Stop positions keyed by stop id.

use std::io::Read;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::info;

use sg_core::{GeoPoint, StopId};

use crate::{ShapeError, ShapeResult};

/// Immutable lookup from stop id to position.
///
/// Every stop referenced by a pattern must be present; a miss is a caller
/// error ([`ShapeError::UnknownStop`]), not a leg failure.
#[derive(Debug, Default, Clone)]
pub struct StopTable {
    positions: FxHashMap<StopId, GeoPoint>,
}

#[derive(Deserialize)]
struct StopRecord {
    stop_id:  String,
    stop_lat: f64,
    stop_lon: f64,
}

impl StopTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a stop's position.
    pub fn insert(&mut self, stop: impl Into<StopId>, pos: GeoPoint) {
        self.positions.insert(stop.into(), pos);
    }

    pub fn position(&self, stop: &StopId) -> ShapeResult<GeoPoint> {
        self.positions
            .get(stop)
            .copied()
            .ok_or_else(|| ShapeError::UnknownStop(stop.clone()))
    }

    pub fn contains(&self, stop: &StopId) -> bool {
        self.positions.contains_key(stop)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Load a GTFS `stops.txt`.  Only `stop_id`, `stop_lat` and `stop_lon`
    /// are read; other columns are ignored.
    pub fn load_csv(path: &Path) -> ShapeResult<Self> {
        let file = std::fs::File::open(path)?;
        let table = Self::load_reader(file)?;
        info!(path = %path.display(), stops = table.len(), "loaded stops");
        Ok(table)
    }

    pub fn load_reader<R: Read>(reader: R) -> ShapeResult<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut table = Self::new();
        for (i, record) in rdr.deserialize::<StopRecord>().enumerate() {
            let r = record.map_err(|e| ShapeError::Parse(format!("stops row {}: {e}", i + 1)))?;
            let pos = GeoPoint::new(r.stop_lat, r.stop_lon);
            if !pos.is_finite() {
                return Err(ShapeError::Parse(format!("stop {} has a non-finite position", r.stop_id)));
            }
            table.insert(r.stop_id, pos);
        }
        Ok(table)
    }
}

impl<S: Into<StopId>> FromIterator<(S, GeoPoint)> for StopTable {
    fn from_iter<I: IntoIterator<Item = (S, GeoPoint)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (stop, pos) in iter {
            table.insert(stop, pos);
        }
        table
    }
}
