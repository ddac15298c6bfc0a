//! Curated per-pair adjustments: via points and ratio limits.
//!
//! Both tables are keyed by the ordered pair `(from_stop, to_stop)`; the
//! reverse direction needs its own entry.

use std::io::Read;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::info;

use sg_core::{GeoPoint, StopId};

use crate::{ShapeError, ShapeResult};

pub const VIA_POINTS_FILE: &str = "via_points.csv";
pub const RATIO_OVERRIDES_FILE: &str = "ratio_overrides.csv";

type PairMap<V> = FxHashMap<StopId, FxHashMap<StopId, V>>;

#[derive(Debug, Default, Clone)]
pub struct Overrides {
    via:   PairMap<GeoPoint>,
    ratio: PairMap<f64>,
}

#[derive(Deserialize)]
struct ViaRecord {
    from_stop: String,
    to_stop:   String,
    lat:       f64,
    lon:       f64,
}

#[derive(Deserialize)]
struct RatioRecord {
    from_stop: String,
    to_stop:   String,
    ratio:     f64,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_via(mut self, from: impl Into<StopId>, to: impl Into<StopId>, point: GeoPoint) -> Self {
        self.insert_via(from, to, point);
        self
    }

    pub fn with_ratio(mut self, from: impl Into<StopId>, to: impl Into<StopId>, ratio: f64) -> Self {
        self.insert_ratio(from, to, ratio);
        self
    }

    pub fn insert_via(&mut self, from: impl Into<StopId>, to: impl Into<StopId>, point: GeoPoint) {
        self.via.entry(from.into()).or_default().insert(to.into(), point);
    }

    pub fn insert_ratio(&mut self, from: impl Into<StopId>, to: impl Into<StopId>, ratio: f64) {
        self.ratio.entry(from.into()).or_default().insert(to.into(), ratio);
    }

    /// Intermediate point the leg `from → to` must pass near.
    pub fn via(&self, from: &StopId, to: &StopId) -> Option<GeoPoint> {
        self.via.get(from)?.get(to).copied()
    }

    /// Ratio limit replacing the group-based default for `from → to`.
    pub fn ratio(&self, from: &StopId, to: &StopId) -> Option<f64> {
        self.ratio.get(from)?.get(to).copied()
    }

    pub fn via_count(&self) -> usize {
        self.via.values().map(FxHashMap::len).sum()
    }

    pub fn ratio_count(&self) -> usize {
        self.ratio.values().map(FxHashMap::len).sum()
    }

    /// Load whichever of `via_points.csv` and `ratio_overrides.csv` exist
    /// in `dir`.
    pub fn load_dir(dir: &Path) -> ShapeResult<Self> {
        let mut overrides = Self::new();

        let via_path = dir.join(VIA_POINTS_FILE);
        if via_path.exists() {
            overrides.load_via_reader(std::fs::File::open(&via_path)?)?;
        }
        let ratio_path = dir.join(RATIO_OVERRIDES_FILE);
        if ratio_path.exists() {
            overrides.load_ratio_reader(std::fs::File::open(&ratio_path)?)?;
        }

        info!(
            dir   = %dir.display(),
            via   = overrides.via_count(),
            ratio = overrides.ratio_count(),
            "loaded leg overrides"
        );
        Ok(overrides)
    }

    /// Merge `from_stop,to_stop,lat,lon` rows.
    pub fn load_via_reader<R: Read>(&mut self, reader: R) -> ShapeResult<()> {
        let mut rdr = csv::Reader::from_reader(reader);
        for (i, record) in rdr.deserialize::<ViaRecord>().enumerate() {
            let r = record.map_err(|e| ShapeError::Parse(format!("via row {}: {e}", i + 1)))?;
            let point = GeoPoint::new(r.lat, r.lon);
            if !point.is_finite() {
                return Err(ShapeError::Parse(format!("via row {}: non-finite point", i + 1)));
            }
            self.insert_via(r.from_stop, r.to_stop, point);
        }
        Ok(())
    }

    /// Merge `from_stop,to_stop,ratio` rows.
    pub fn load_ratio_reader<R: Read>(&mut self, reader: R) -> ShapeResult<()> {
        let mut rdr = csv::Reader::from_reader(reader);
        for (i, record) in rdr.deserialize::<RatioRecord>().enumerate() {
            let r = record.map_err(|e| ShapeError::Parse(format!("ratio row {}: {e}", i + 1)))?;
            if !(r.ratio > 0.0) {
                return Err(ShapeError::Parse(format!("ratio row {}: ratio must be positive", i + 1)));
            }
            self.insert_ratio(r.from_stop, r.to_stop, r.ratio);
        }
        Ok(())
    }
}
