//! OSM PBF loader, enabled with the `osm` Cargo feature.
//!
//! # Usage
//!
//! ```ignore
//! use std::path::Path;
//! use sg_core::Mode;
//! use sg_spatial::osm::{load_from_pbf, OsmOptions};
//!
//! let network = load_from_pbf(Path::new("poland.osm.pbf"), Mode::Tram, &OsmOptions::default())?;
//! ```
//!
//! # What is loaded
//!
//! Only ways usable by the requested [`Mode`] are included (see
//! [`way_filter`]).  One-way streets add a single directed edge for buses;
//! tracks are always bidirectional.
//!
//! Nodes carrying the configured reference tag become stop hints when they
//! lie on a loaded way.
//!
//! # Memory note
//!
//! All OSM node positions are buffered in a map during the single pass
//! (ways reference nodes by OSM id).  The map is freed before edges are
//! built.

use std::io::{Cursor, Read};
use std::path::Path;

use osmpbf::{Element, ElementReader};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use sg_core::{GeoPoint, Mode, NodeId};

use crate::network::{RoadNetwork, RoadNetworkBuilder};
use crate::SpatialError;

/// Loader knobs.
#[derive(Debug, Clone)]
pub struct OsmOptions {
    /// Node tag whose value is recorded as a stop hint.
    pub hint_tag: String,
}

impl Default for OsmOptions {
    fn default() -> Self {
        Self { hint_tag: "ref".to_owned() }
    }
}

// ── Public entry points ───────────────────────────────────────────────────────

/// Load the `mode` graph from an OSM PBF file.
///
/// # Errors
///
/// Returns [`SpatialError::Osm`] on parse or file errors.
pub fn load_from_pbf(path: &Path, mode: Mode, options: &OsmOptions) -> Result<RoadNetwork, SpatialError> {
    let reader = ElementReader::from_path(path).map_err(|e| SpatialError::Osm(e.to_string()))?;
    load(reader, mode, options)
}

/// Like [`load_from_pbf`] but reads an extract already held in memory (for
/// example one returned by a blob cache).
pub fn load_from_pbf_bytes(bytes: &[u8], mode: Mode, options: &OsmOptions) -> Result<RoadNetwork, SpatialError> {
    load(ElementReader::new(Cursor::new(bytes)), mode, options)
}

fn load<R: Read + Send>(
    reader:  ElementReader<R>,
    mode:    Mode,
    options: &OsmOptions,
) -> Result<RoadNetwork, SpatialError> {
    // ── Phase 1: collect all OSM nodes + mode ways in one sequential pass ──
    let mut all_nodes: FxHashMap<i64, GeoPoint> = FxHashMap::default();
    let mut tagged:    FxHashMap<i64, String>   = FxHashMap::default();
    let mut ways:      Vec<OsmWay>              = Vec::new();
    let hint_tag = options.hint_tag.as_str();

    reader
        .for_each(|elem| match elem {
            Element::Node(n) => {
                all_nodes.insert(n.id(), GeoPoint::new(n.lat(), n.lon()));
                if let Some((_, v)) = n.tags().find(|(k, _)| *k == hint_tag) {
                    tagged.insert(n.id(), v.to_owned());
                }
            }
            Element::DenseNode(n) => {
                all_nodes.insert(n.id(), GeoPoint::new(n.lat(), n.lon()));
                if let Some((_, v)) = n.tags().find(|(k, _)| *k == hint_tag) {
                    tagged.insert(n.id(), v.to_owned());
                }
            }
            Element::Way(w) => {
                // Collect tags eagerly so &str lifetimes don't escape the closure.
                let tags: Vec<(&str, &str)> = w.tags().collect();
                if let Some(direction) = way_filter(mode, &tags) {
                    let mut refs: Vec<i64> = w.refs().collect();
                    if direction == Direction::Backward {
                        refs.reverse();
                    }
                    ways.push(OsmWay { refs, oneway: direction != Direction::Both });
                }
            }
            _ => {}
        })
        .map_err(|e| SpatialError::Osm(e.to_string()))?;

    // ── Phase 2: identify way-referenced node IDs ─────────────────────────
    let way_node_ids: FxHashSet<i64> = ways
        .iter()
        .flat_map(|w| w.refs.iter().copied())
        .collect();

    // ── Phase 3: build network ────────────────────────────────────────────
    let mut builder = RoadNetworkBuilder::with_capacity(way_node_ids.len(), way_node_ids.len() * 2);

    // Sorted so NodeIds do not depend on hash iteration order.
    let mut ordered: Vec<i64> = way_node_ids.into_iter().collect();
    ordered.sort_unstable();

    let mut osm_to_sg: FxHashMap<i64, NodeId> =
        FxHashMap::with_capacity_and_hasher(ordered.len(), Default::default());
    for osm_id in ordered {
        if let Some(&pos) = all_nodes.get(&osm_id) {
            osm_to_sg.insert(osm_id, builder.add_node(pos));
        }
    }
    drop(all_nodes);

    for way in &ways {
        for window in way.refs.windows(2) {
            if let (Some(&from), Some(&to)) = (osm_to_sg.get(&window[0]), osm_to_sg.get(&window[1])) {
                builder.add_directed(from, to);
                if !way.oneway {
                    builder.add_directed(to, from);
                }
            }
        }
    }

    let mut hints = 0usize;
    for (osm_id, reference) in tagged {
        if let Some(&node) = osm_to_sg.get(&osm_id) {
            builder.add_stop_hint(reference, node);
            hints += 1;
        }
    }

    let network = builder.build();
    info!(
        mode = %mode,
        nodes = network.node_count(),
        edges = network.edge_count(),
        hints,
        "loaded OSM graph"
    );
    Ok(network)
}

// ── Internal types ────────────────────────────────────────────────────────────

struct OsmWay {
    refs:   Vec<i64>,
    oneway: bool,
}

/// Traversal direction of an accepted way, relative to its node order.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Direction {
    Both,
    Forward,
    Backward,
}

// ── Tag helpers ───────────────────────────────────────────────────────────────

fn tag<'a>(tags: &[(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    tags.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Decide whether a way belongs to the `mode` graph and in which direction
/// it may be travelled.  `None` means the way is not part of the graph.
pub fn way_filter(mode: Mode, tags: &[(&str, &str)]) -> Option<Direction> {
    match mode {
        Mode::Bus => {
            let highway = tag(tags, "highway")?;
            if !bus_accessible(highway) {
                return None;
            }
            Some(bus_direction(highway, tags))
        }
        Mode::Tram => match tag(tags, "railway")? {
            "tram" | "light_rail" => Some(Direction::Both),
            _ => None,
        },
        Mode::Train => match tag(tags, "railway")? {
            "rail" | "light_rail" | "narrow_gauge" | "subway" => Some(Direction::Both),
            _ => None,
        },
    }
}

fn bus_accessible(highway: &str) -> bool {
    !matches!(
        highway,
        "footway" | "path" | "cycleway" | "pedestrian" | "steps" | "track"
            | "bridleway" | "corridor" | "proposed" | "construction" | "platform"
    )
}

/// Motorways are implicitly one-way; `oneway:bus=no` and busways exempt
/// buses from a general one-way restriction.
fn bus_direction(highway: &str, tags: &[(&str, &str)]) -> Direction {
    if tag(tags, "oneway:bus") == Some("no") || highway == "busway" {
        return Direction::Both;
    }
    match tag(tags, "oneway") {
        Some("yes" | "1" | "true") => Direction::Forward,
        Some("-1" | "reverse") => Direction::Backward,
        Some(_) => Direction::Both,
        None if matches!(highway, "motorway" | "motorway_link") => Direction::Forward,
        None => Direction::Both,
    }
}
