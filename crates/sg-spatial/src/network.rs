//! Routing graph representation and builder.
//!
//! # Data layout
//!
//! The graph uses **Compressed Sparse Row (CSR)** format for outgoing edges.
//! Given a `NodeId n`, its outgoing edges occupy the slice:
//!
//! ```text
//! edge_to[ node_out_start[n] .. node_out_start[n+1] ]
//! ```
//!
//! Edge arrays are sorted by source node and indexed by `EdgeId`, so a
//! node's outgoing edges are a contiguous scan in Dijkstra's inner loop.
//!
//! # Stop hints
//!
//! Source extracts often tag transit stop positions with an external
//! reference.  The builder records those as `reference -> NodeId` hints so
//! the stop matcher can skip the nearest-node search for tagged stops.
//!
//! A network is immutable once built and is shared behind an `Arc` by every
//! shape worker.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use sg_core::{EdgeId, GeoPoint, NodeId};

use crate::kdtree::KdTree;

// ── RoadNetwork ───────────────────────────────────────────────────────────────

/// Directed routing graph in CSR format.
///
/// Do not construct directly; use [`RoadNetworkBuilder`].
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    /// Geographic position of each node.  Indexed by `NodeId`.
    pub node_pos: Vec<GeoPoint>,

    /// CSR row pointer.  Length = `node_count + 1`.
    pub node_out_start: Vec<u32>,

    /// Source node of each edge.  Needed to trace `prev_edge` back to the
    /// source during path reconstruction.
    pub edge_from: Vec<NodeId>,

    /// Destination node of each edge.
    pub edge_to: Vec<NodeId>,

    /// Length of each edge in metres.  Used as the search cost.
    pub edge_length_m: Vec<f32>,

    stop_hints:  FxHashMap<String, NodeId>,
    fingerprint: u64,
}

impl RoadNetwork {
    // ── Graph dimensions ──────────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.node_pos.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_to.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_pos.is_empty()
    }

    /// `true` if `node` is a valid id in this network.
    #[inline]
    pub fn contains(&self, node: NodeId) -> bool {
        node.index() < self.node_pos.len()
    }

    /// Position of `node`, or `None` for ids outside this network.
    #[inline]
    pub fn node_pos(&self, node: NodeId) -> Option<GeoPoint> {
        self.node_pos.get(node.index()).copied()
    }

    // ── Graph traversal ───────────────────────────────────────────────────

    /// Iterator over the `EdgeId`s of all outgoing edges from `node`.
    #[inline]
    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        let start = self.node_out_start[node.index()] as usize;
        let end   = self.node_out_start[node.index() + 1] as usize;
        (start..end).map(|i| EdgeId(i as u32))
    }

    /// Out-degree of `node`.
    #[inline]
    pub fn out_degree(&self, node: NodeId) -> usize {
        let start = self.node_out_start[node.index()] as usize;
        let end   = self.node_out_start[node.index() + 1] as usize;
        end - start
    }

    // ── Stop hints ────────────────────────────────────────────────────────

    /// Node tagged with the external stop reference `reference`, if any.
    pub fn stop_hint(&self, reference: &str) -> Option<NodeId> {
        self.stop_hints.get(reference).copied()
    }

    pub fn stop_hint_count(&self) -> usize {
        self.stop_hints.len()
    }

    // ── Identity & indexing ───────────────────────────────────────────────

    /// Content hash of nodes and edges.
    ///
    /// Two networks built from the same source snapshot share a fingerprint;
    /// anything keyed by `NodeId` is only reusable across runs when the
    /// fingerprints match.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Build a nearest-node index over every node in the network.
    pub fn build_index(&self, leaf_size: usize) -> KdTree<NodeId> {
        KdTree::build(
            self.node_pos
                .iter()
                .enumerate()
                .map(|(i, &pos)| (NodeId(i as u32), pos)),
            leaf_size,
        )
    }
}

// ── RoadNetworkBuilder ────────────────────────────────────────────────────────

/// Construct a [`RoadNetwork`] incrementally, then call [`build`](Self::build).
///
/// # Example
///
/// ```
/// use sg_core::GeoPoint;
/// use sg_spatial::RoadNetworkBuilder;
///
/// let mut b = RoadNetworkBuilder::new();
/// let a = b.add_node(GeoPoint::new(52.23, 21.01));
/// let c = b.add_node(GeoPoint::new(52.24, 21.01));
/// b.add_road(a, c);
/// let net = b.build();
/// assert_eq!(net.node_count(), 2);
/// assert_eq!(net.edge_count(), 2); // bidirectional
/// ```
pub struct RoadNetworkBuilder {
    nodes:      Vec<GeoPoint>,
    raw_edges:  Vec<RawEdge>,
    stop_hints: FxHashMap<String, NodeId>,
}

struct RawEdge {
    from:     NodeId,
    to:       NodeId,
    length_m: f32,
}

impl RoadNetworkBuilder {
    pub fn new() -> Self {
        Self {
            nodes:      Vec::new(),
            raw_edges:  Vec::new(),
            stop_hints: FxHashMap::default(),
        }
    }

    /// Pre-allocate for the expected number of nodes and edges.
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            nodes:      Vec::with_capacity(nodes),
            raw_edges:  Vec::with_capacity(edges),
            stop_hints: FxHashMap::default(),
        }
    }

    /// Add a node and return its `NodeId` (sequential from 0).
    pub fn add_node(&mut self, pos: GeoPoint) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(pos);
        id
    }

    /// Add a **directed** edge with an explicit length.
    pub fn add_directed_edge(&mut self, from: NodeId, to: NodeId, length_m: f32) {
        self.raw_edges.push(RawEdge { from, to, length_m });
    }

    /// Add a directed edge whose length is the haversine distance between
    /// its endpoints.
    pub fn add_directed(&mut self, from: NodeId, to: NodeId) {
        let len = self.nodes[from.index()].distance_m(self.nodes[to.index()]) as f32;
        self.add_directed_edge(from, to, len);
    }

    /// Add edges in **both directions** with haversine length.
    pub fn add_road(&mut self, a: NodeId, b: NodeId) {
        self.add_directed(a, b);
        self.add_directed(b, a);
    }

    /// Record that the external stop reference `reference` sits on `node`.
    /// Later calls for the same reference overwrite earlier ones.
    pub fn add_stop_hint(&mut self, reference: impl Into<String>, node: NodeId) {
        self.stop_hints.insert(reference.into(), node);
    }

    /// Look up the position of a node added earlier.
    pub fn node_pos(&self, id: NodeId) -> GeoPoint {
        self.nodes[id.index()]
    }

    pub fn node_count(&self) -> usize { self.nodes.len() }
    pub fn edge_count(&self) -> usize { self.raw_edges.len() }

    /// Consume the builder and produce a [`RoadNetwork`].
    ///
    /// Time complexity: O(E log E) for the edge sort.
    pub fn build(self) -> RoadNetwork {
        let node_count = self.nodes.len();
        let edge_count = self.raw_edges.len();

        // Stable sort keeps insertion order among a node's edges, so the
        // fingerprint and tie-breaking in search are reproducible.
        let mut raw = self.raw_edges;
        raw.sort_by_key(|e| e.from.0);

        let edge_from:     Vec<NodeId> = raw.iter().map(|e| e.from).collect();
        let edge_to:       Vec<NodeId> = raw.iter().map(|e| e.to).collect();
        let edge_length_m: Vec<f32>    = raw.iter().map(|e| e.length_m).collect();

        let mut node_out_start = vec![0u32; node_count + 1];
        for e in &raw {
            node_out_start[e.from.index() + 1] += 1;
        }
        for i in 1..=node_count {
            node_out_start[i] += node_out_start[i - 1];
        }
        debug_assert_eq!(node_out_start[node_count] as usize, edge_count);

        let fingerprint = fingerprint(&self.nodes, &edge_from, &edge_to);

        RoadNetwork {
            node_pos: self.nodes,
            node_out_start,
            edge_from,
            edge_to,
            edge_length_m,
            stop_hints: self.stop_hints,
            fingerprint,
        }
    }
}

impl Default for RoadNetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn fingerprint(nodes: &[GeoPoint], edge_from: &[NodeId], edge_to: &[NodeId]) -> u64 {
    let mut h = FxHasher::default();
    nodes.len().hash(&mut h);
    edge_to.len().hash(&mut h);
    for p in nodes {
        p.lat.to_bits().hash(&mut h);
        p.lon.to_bits().hash(&mut h);
    }
    for (from, to) in edge_from.iter().zip(edge_to) {
        from.hash(&mut h);
        to.hash(&mut h);
    }
    h.finish()
}
