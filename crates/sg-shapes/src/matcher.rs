//! Stop → graph node matching.

use tracing::trace;

use sg_core::{GeoPoint, NodeId, StopId};

use crate::modes::ModeGraph;
use crate::ShapeResult;

/// The graph node `stop` should be routed from or to.
///
/// Resolution order:
///
/// 1. a match memoised on `graph` earlier;
/// 2. the graph's stop-reference hint for `stop`, if it names a node the
///    graph actually has;
/// 3. the nearest node to `pos`.
///
/// A nearest node farther than `max_snap_distance_m` yields `Ok(None)` and
/// is not memoised.  An empty graph is a hard error.
pub fn node_for(
    graph:               &ModeGraph,
    stop:                &StopId,
    pos:                 GeoPoint,
    max_snap_distance_m: Option<f64>,
) -> ShapeResult<Option<NodeId>> {
    if let Some(node) = graph.cached_match(stop) {
        return Ok(Some(node));
    }

    if let Some(node) = graph.network().stop_hint(stop.as_str()) {
        if graph.network().contains(node) {
            trace!(%stop, %node, "matched by hint");
            graph.remember_match(stop, node);
            return Ok(Some(node));
        }
    }

    let (node, node_pos) = graph.nearest_node(pos)?;
    if let Some(limit) = max_snap_distance_m {
        if pos.distance_m(node_pos) > limit {
            trace!(%stop, %node, limit, "nearest node out of reach");
            return Ok(None);
        }
    }
    graph.remember_match(stop, node);
    Ok(Some(node))
}
