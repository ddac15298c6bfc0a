//! Artifacts describing legs that fell back to a straight line.
//!
//! The assembler reports each failing `(from_stop, to_stop)` pair once per
//! run.  [`GeoJsonDiagnostics`] writes one small GeoJSON file per pair so a
//! curator can open it on a map and decide on a via point or a ratio
//! override.

use std::fs;
use std::path::{Path, PathBuf};

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use tracing::debug;

use sg_core::{GeoPoint, NodeId, StopId};

use crate::error::LegError;
use crate::ShapeResult;

/// Everything known about one failed leg.
#[derive(Debug, Clone, PartialEq)]
pub struct LegFailure {
    pub from_stop: StopId,
    pub to_stop:   StopId,
    pub from_node: Option<NodeId>,
    pub to_node:   Option<NodeId>,
    pub error:     LegError,
    /// The straight polyline substituted for the leg.
    pub polyline:  Vec<GeoPoint>,
}

/// Receives failed legs.  Shared across workers, so it takes `&self`.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, failure: &LegFailure) -> ShapeResult<()>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiagnostics;

impl DiagnosticsSink for NoDiagnostics {
    fn record(&self, _failure: &LegFailure) -> ShapeResult<()> {
        Ok(())
    }
}

/// Writes `<dir>/<from_stop>__<to_stop>.geojson` per failed leg.
///
/// Stop ids are percent-encoded in the file name.  `_` is always escaped,
/// so the `__` separator never occurs inside an encoded id and distinct
/// pairs never share a file.
#[derive(Debug, Clone)]
pub struct GeoJsonDiagnostics {
    dir: PathBuf,
}

impl GeoJsonDiagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> ShapeResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, from: &StopId, to: &StopId) -> PathBuf {
        self.dir.join(format!("{}__{}.geojson", encode(from.as_str()), encode(to.as_str())))
    }
}

impl DiagnosticsSink for GeoJsonDiagnostics {
    fn record(&self, failure: &LegFailure) -> ShapeResult<()> {
        let path = self.path_for(&failure.from_stop, &failure.to_stop);
        fs::write(&path, to_geojson(failure).to_string())?;
        debug!(path = %path.display(), status = %failure.error.status(), "leg diagnostics written");
        Ok(())
    }
}

/// The failure as a FeatureCollection: the substituted line followed by
/// the two stop positions.
pub fn to_geojson(failure: &LegFailure) -> GeoJson {
    let mut props = JsonObject::new();
    props.insert("from_stop".into(), JsonValue::from(failure.from_stop.as_str()));
    props.insert("to_stop".into(), JsonValue::from(failure.to_stop.as_str()));
    props.insert("from_node".into(), node_value(failure.from_node));
    props.insert("to_node".into(), node_value(failure.to_node));
    props.insert("status".into(), JsonValue::from(failure.error.status()));
    if let Some(ratio) = failure.error.ratio() {
        props.insert("ratio".into(), JsonValue::from(ratio));
    }

    let mut features = vec![feature(
        Value::LineString(failure.polyline.iter().map(|p| position(*p)).collect()),
        props,
    )];
    let endpoints = [
        (failure.polyline.first(), &failure.from_stop),
        (failure.polyline.last(), &failure.to_stop),
    ];
    for (pos, stop) in endpoints {
        if let Some(&pos) = pos {
            let mut p = JsonObject::new();
            p.insert("stop_id".into(), JsonValue::from(stop.as_str()));
            features.push(feature(Value::Point(position(pos)), p));
        }
    }

    GeoJson::FeatureCollection(FeatureCollection { bbox: None, features, foreign_members: None })
}

fn feature(value: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox:            None,
        geometry:        Some(Geometry::new(value)),
        id:              None,
        properties:      Some(properties),
        foreign_members: None,
    }
}

/// GeoJSON positions are `[lon, lat]`.
fn position(p: GeoPoint) -> Vec<f64> {
    vec![p.lon, p.lat]
}

/// Unmatched nodes are written as `-1`.
fn node_value(node: Option<NodeId>) -> JsonValue {
    match node {
        Some(n) => JsonValue::from(n.0),
        None => JsonValue::from(-1),
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9.-]`.
fn encode(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}
