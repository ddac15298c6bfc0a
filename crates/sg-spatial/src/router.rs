//! Path-search trait and the default deadline-bounded Dijkstra.
//!
//! # Pluggability
//!
//! Shape generation calls the graph through the [`Router`] trait, so an
//! application can swap in A*, contraction hierarchies, or an external
//! engine without touching the leg logic.
//!
//! # Deadlines
//!
//! Every search receives an absolute `Instant`.  Implementations must give
//! up with [`SpatialError::Timeout`] once it has passed.  The network is
//! only read during a search, so an abandoned search leaves nothing behind.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use sg_core::{EdgeId, NodeId};

use crate::network::RoadNetwork;
use crate::SpatialError;

/// Heap pops between two deadline checks.  `Instant::now()` is cheap but
/// not free; 256 keeps the overshoot well under a millisecond.
const DEADLINE_CHECK_INTERVAL: u32 = 256;

// ── Route ─────────────────────────────────────────────────────────────────────

/// The result of a path search: the visited nodes in order, endpoints
/// included.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub nodes: Vec<NodeId>,
    /// Sum of edge lengths in metres.
    pub length_m: f64,
}

impl Route {
    /// `true` if source and destination are the same node.
    pub fn is_trivial(&self) -> bool {
        self.nodes.len() <= 1
    }
}

// ── Router trait ──────────────────────────────────────────────────────────────

/// Pluggable shortest-path search.
///
/// Implementations must be `Send + Sync` so one instance can serve every
/// worker of a parallel run.
pub trait Router: Send + Sync {
    /// Find a path from `from` to `to`, giving up at `deadline`.
    ///
    /// `from == to` yields a single-node route rather than an error.
    fn route(
        &self,
        network:  &RoadNetwork,
        from:     NodeId,
        to:       NodeId,
        deadline: Instant,
    ) -> Result<Route, SpatialError>;
}

// ── DijkstraRouter ────────────────────────────────────────────────────────────

/// Dijkstra over the CSR graph with edge length as cost.
///
/// Costs are integral millimetres so the heap stays on `Ord` keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct DijkstraRouter;

impl Router for DijkstraRouter {
    fn route(
        &self,
        network:  &RoadNetwork,
        from:     NodeId,
        to:       NodeId,
        deadline: Instant,
    ) -> Result<Route, SpatialError> {
        dijkstra(network, from, to, deadline)
    }
}

#[inline]
fn edge_cost_mm(network: &RoadNetwork, edge: EdgeId) -> u64 {
    (network.edge_length_m[edge.index()].max(0.0) as f64 * 1000.0).round() as u64
}

fn dijkstra(
    network:  &RoadNetwork,
    from:     NodeId,
    to:       NodeId,
    deadline: Instant,
) -> Result<Route, SpatialError> {
    for node in [from, to] {
        if !network.contains(node) {
            return Err(SpatialError::NodeNotFound(node));
        }
    }
    if from == to {
        return Ok(Route { nodes: vec![from], length_m: 0.0 });
    }

    let n = network.node_count();
    let mut dist      = vec![u64::MAX; n];
    let mut prev_edge = vec![EdgeId::INVALID; n];

    dist[from.index()] = 0;

    // Secondary key NodeId ensures deterministic tie-breaking.
    let mut heap: BinaryHeap<Reverse<(u64, NodeId)>> = BinaryHeap::new();
    heap.push(Reverse((0, from)));

    let mut pops = 0u32;
    while let Some(Reverse((cost, node))) = heap.pop() {
        if pops % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
            return Err(SpatialError::Timeout { from, to });
        }
        pops = pops.wrapping_add(1);

        if node == to {
            return Ok(reconstruct(network, &prev_edge, from, to, cost));
        }

        // Skip stale heap entries.
        if cost > dist[node.index()] {
            continue;
        }

        for edge in network.out_edges(node) {
            let neighbor = network.edge_to[edge.index()];
            let new_cost = cost.saturating_add(edge_cost_mm(network, edge));

            if new_cost < dist[neighbor.index()] {
                dist[neighbor.index()] = new_cost;
                prev_edge[neighbor.index()] = edge;
                heap.push(Reverse((new_cost, neighbor)));
            }
        }
    }

    Err(SpatialError::NoRoute { from, to })
}

fn reconstruct(
    network:   &RoadNetwork,
    prev_edge: &[EdgeId],
    from:      NodeId,
    to:        NodeId,
    total_mm:  u64,
) -> Route {
    let mut nodes = vec![to];
    let mut cur = to;
    while cur != from {
        let e = prev_edge[cur.index()];
        if e == EdgeId::INVALID {
            break;
        }
        cur = network.edge_from[e.index()];
        nodes.push(cur);
    }
    nodes.reverse();
    Route {
        nodes,
        length_m: total_mm as f64 / 1000.0,
    }
}
