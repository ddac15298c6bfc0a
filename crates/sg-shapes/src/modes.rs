//! Per-mode routing graphs, their spatial indexes, and stop-match memos.
//!
//! Graphs are loaded lazily on first use through a [`GraphSource`].  Each
//! loaded graph is wrapped in a [`ModeGraph`] that owns the KD-tree built
//! over its nodes and the memo of stop → node matches made against it.
//! Replacing a mode's graph drops that memo with it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sg_core::{GeoPoint, Mode, NodeId, StopId};
use sg_spatial::{KdTree, RoadNetwork, SpatialError};

use crate::cache::CacheManager;
use crate::{ShapeError, ShapeResult};

// ── GraphSource ───────────────────────────────────────────────────────────────

/// Produces the routing graph for a mode on demand.
pub trait GraphSource: Send + Sync {
    fn load(&self, mode: Mode) -> ShapeResult<RoadNetwork>;
}

impl<F> GraphSource for F
where
    F: Fn(Mode) -> ShapeResult<RoadNetwork> + Send + Sync,
{
    fn load(&self, mode: Mode) -> ShapeResult<RoadNetwork> {
        self(mode)
    }
}

/// A source with nothing to offer; used when all graphs are preinstalled.
pub struct NoGraphSource;

impl GraphSource for NoGraphSource {
    fn load(&self, mode: Mode) -> ShapeResult<RoadNetwork> {
        Err(ShapeError::NoGraph(mode))
    }
}

// ── ModeGraph ─────────────────────────────────────────────────────────────────

/// One mode's graph plus everything derived from it.
pub struct ModeGraph {
    mode:    Mode,
    network: Arc<RoadNetwork>,
    index:   KdTree<NodeId>,
    matches: Mutex<FxHashMap<StopId, NodeId>>,
}

#[derive(Serialize, Deserialize)]
struct PersistedMatches {
    fingerprint: u64,
    matches:     BTreeMap<String, u32>,
}

impl ModeGraph {
    pub fn new(mode: Mode, network: Arc<RoadNetwork>, leaf_size: usize) -> Self {
        let index = network.build_index(leaf_size);
        Self { mode, network, index, matches: Mutex::new(FxHashMap::default()) }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    /// Nearest graph node to `pos`.
    pub fn nearest_node(&self, pos: GeoPoint) -> ShapeResult<(NodeId, GeoPoint)> {
        self.index.nearest(pos).map_err(|e| match e {
            SpatialError::EmptyIndex => ShapeError::NoGraphNodes(self.mode),
            other => ShapeError::Spatial(other),
        })
    }

    pub(crate) fn cached_match(&self, stop: &StopId) -> Option<NodeId> {
        self.lock_matches().get(stop).copied()
    }

    pub(crate) fn remember_match(&self, stop: &StopId, node: NodeId) {
        self.lock_matches().insert(stop.clone(), node);
    }

    pub fn match_count(&self) -> usize {
        self.lock_matches().len()
    }

    /// Serialise the match memo, tagged with the graph fingerprint.
    pub fn export_matches(&self) -> ShapeResult<Vec<u8>> {
        let matches = self
            .lock_matches()
            .iter()
            .map(|(stop, node)| (stop.as_str().to_owned(), node.0))
            .collect();
        let persisted = PersistedMatches { fingerprint: self.network.fingerprint(), matches };
        Ok(serde_json::to_vec(&persisted)?)
    }

    /// Merge matches exported by [`export_matches`](Self::export_matches).
    ///
    /// A table made against a different graph is ignored, as is any entry
    /// naming a node this graph does not have.  Returns the number of
    /// matches imported.
    pub fn import_matches(&self, bytes: &[u8]) -> ShapeResult<usize> {
        let persisted: PersistedMatches = serde_json::from_slice(bytes)?;
        if persisted.fingerprint != self.network.fingerprint() {
            info!(mode = %self.mode, "persisted stop matches belong to another graph; ignored");
            return Ok(0);
        }

        let mut memo = self.lock_matches();
        let mut imported = 0;
        for (stop, raw) in persisted.matches {
            let node = NodeId(raw);
            if self.network.contains(node) {
                memo.insert(StopId::new(stop), node);
                imported += 1;
            }
        }
        Ok(imported)
    }

    fn lock_matches(&self) -> std::sync::MutexGuard<'_, FxHashMap<StopId, NodeId>> {
        self.matches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── ModeTable ─────────────────────────────────────────────────────────────────

/// Registry of the graphs for every mode.
pub struct ModeTable {
    source:    Box<dyn GraphSource>,
    leaf_size: usize,
    slots:     [RwLock<Option<Arc<ModeGraph>>>; Mode::ALL.len()],
}

impl ModeTable {
    pub fn new(source: impl GraphSource + 'static, leaf_size: usize) -> Self {
        Self {
            source: Box::new(source),
            leaf_size,
            slots: std::array::from_fn(|_| RwLock::new(None)),
        }
    }

    /// A table with fixed graphs.  Modes not listed report
    /// [`ShapeError::NoGraph`].
    pub fn from_networks(networks: impl IntoIterator<Item = (Mode, RoadNetwork)>, leaf_size: usize) -> Self {
        let table = Self::new(NoGraphSource, leaf_size);
        for (mode, network) in networks {
            table.replace(mode, network);
        }
        table
    }

    /// The graph for `mode`, loading it on first use.
    pub fn graph(&self, mode: Mode) -> ShapeResult<Arc<ModeGraph>> {
        if let Some(graph) = self.loaded(mode) {
            return Ok(graph);
        }

        let mut slot = self.slots[mode.index()].write().unwrap_or_else(|e| e.into_inner());
        if let Some(graph) = slot.as_ref() {
            return Ok(Arc::clone(graph));
        }

        let network = self.source.load(mode)?;
        info!(
            %mode,
            nodes = network.node_count(),
            edges = network.edge_count(),
            hints = network.stop_hint_count(),
            "graph loaded"
        );
        let graph = Arc::new(ModeGraph::new(mode, Arc::new(network), self.leaf_size));
        *slot = Some(Arc::clone(&graph));
        Ok(graph)
    }

    /// The graph for `mode` if it has already been loaded.
    pub fn loaded(&self, mode: Mode) -> Option<Arc<ModeGraph>> {
        self.slots[mode.index()]
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Install a new graph for `mode`, discarding the old one together with
    /// its index and stop matches.
    ///
    /// Callers holding the previous `Arc<ModeGraph>` keep a consistent view
    /// of the old graph until they drop it.
    pub fn replace(&self, mode: Mode, network: RoadNetwork) -> Arc<ModeGraph> {
        let graph = Arc::new(ModeGraph::new(mode, Arc::new(network), self.leaf_size));
        let previous = self.slots[mode.index()]
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Arc::clone(&graph));
        if previous.is_some() {
            debug!(%mode, "graph replaced; stop matches invalidated");
        }
        graph
    }

    /// Write each loaded graph's match memo to `cache` as
    /// `matches-<mode>.json`.
    pub fn persist_matches(&self, cache: &CacheManager) {
        for mode in Mode::ALL {
            let Some(graph) = self.loaded(mode) else { continue };
            match graph.export_matches() {
                Ok(bytes) => {
                    cache.save(&matches_entry(mode), &bytes);
                }
                Err(e) => warn!(%mode, error = %e, "could not serialise stop matches"),
            }
        }
    }

    /// Seed each loaded graph's match memo from `cache`.  Entries older
    /// than `ttl`, unreadable, or made against another graph are skipped.
    pub fn restore_matches(&self, cache: &CacheManager, ttl: std::time::Duration) -> usize {
        let mut total = 0;
        for mode in Mode::ALL {
            let Some(graph) = self.loaded(mode) else { continue };
            let Some(bytes) = cache.retrieve(&matches_entry(mode), ttl) else { continue };
            match graph.import_matches(&bytes) {
                Ok(n) => total += n,
                Err(e) => warn!(%mode, error = %e, "ignoring unreadable stop-match cache"),
            }
        }
        total
    }
}

fn matches_entry(mode: Mode) -> String {
    format!("matches-{mode}.json")
}

// ── OSM extracts through the cache ────────────────────────────────────────────

/// Loads mode graphs from OSM PBF extracts, fetching each extract through
/// a caller-supplied function and keeping it in a [`CacheManager`].
#[cfg(feature = "osm")]
pub struct OsmGraphSource<F> {
    cache:   CacheManager,
    ttl:     std::time::Duration,
    options: sg_spatial::osm::OsmOptions,
    fetch:   F,
}

#[cfg(feature = "osm")]
impl<F> OsmGraphSource<F>
where
    F: Fn(Mode) -> std::io::Result<Vec<u8>> + Send + Sync,
{
    pub fn new(cache: CacheManager, ttl: std::time::Duration, fetch: F) -> Self {
        Self { cache, ttl, options: sg_spatial::osm::OsmOptions::default(), fetch }
    }

    pub fn with_options(mut self, options: sg_spatial::osm::OsmOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(feature = "osm")]
impl<F> GraphSource for OsmGraphSource<F>
where
    F: Fn(Mode) -> std::io::Result<Vec<u8>> + Send + Sync,
{
    fn load(&self, mode: Mode) -> ShapeResult<RoadNetwork> {
        let entry = format!("{mode}.osm.pbf");
        let bytes = match self.cache.retrieve(&entry, self.ttl) {
            Some(bytes) => bytes,
            None => {
                let bytes = (self.fetch)(mode)?;
                self.cache.save(&entry, &bytes);
                bytes
            }
        };
        Ok(sg_spatial::osm::load_from_pbf_bytes(&bytes, mode, &self.options)?)
    }
}
