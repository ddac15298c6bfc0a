//! Time-bounded routing of a single stop-to-stop leg.

use std::time::{Duration, Instant};

use tracing::trace;

use sg_core::{GeoPoint, NodeId};
use sg_spatial::{DijkstraRouter, RoadNetwork, Router};

use crate::error::{LegError, ViaHalf};

/// Routes one leg between two matched nodes, optionally through a via node.
///
/// Implementations are shared by every worker of a parallel run, hence
/// `Send + Sync`.
pub trait LegRouter: Send + Sync {
    /// The routed polyline from `from` to `to`, endpoints included.
    ///
    /// Each path search is bounded by `timeout`; a via leg runs two
    /// searches with that budget each.
    fn route(
        &self,
        network: &RoadNetwork,
        from:    NodeId,
        to:      NodeId,
        via:     Option<NodeId>,
        timeout: Duration,
    ) -> Result<Vec<GeoPoint>, LegError>;
}

/// [`LegRouter`] over any graph [`Router`].
#[derive(Debug, Default)]
pub struct GraphLegRouter<R = DijkstraRouter> {
    router: R,
}

impl<R: Router> GraphLegRouter<R> {
    pub fn new(router: R) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    fn search(
        &self,
        network: &RoadNetwork,
        from:    NodeId,
        to:      NodeId,
        timeout: Duration,
    ) -> Result<Vec<NodeId>, LegError> {
        let deadline = Instant::now() + timeout;
        let route = self.router.route(network, from, to, deadline)?;
        trace!(%from, %to, nodes = route.nodes.len(), length_m = route.length_m, "search done");
        Ok(route.nodes)
    }
}

impl<R: Router> LegRouter for GraphLegRouter<R> {
    fn route(
        &self,
        network: &RoadNetwork,
        from:    NodeId,
        to:      NodeId,
        via:     Option<NodeId>,
        timeout: Duration,
    ) -> Result<Vec<GeoPoint>, LegError> {
        let nodes = match via {
            None => self.search(network, from, to, timeout)?,
            Some(via) => {
                let mut first = self
                    .search(network, from, via, timeout)
                    .map_err(|e| LegError::via(ViaHalf::First, e))?;
                let second = self
                    .search(network, via, to, timeout)
                    .map_err(|e| LegError::via(ViaHalf::Second, e))?;
                // The via node ends the first half and starts the second.
                first.extend(second.into_iter().skip(1));
                first
            }
        };

        if nodes.len() <= 1 {
            return Err(LegError::TooFewNodes(nodes.len()));
        }
        Ok(nodes.into_iter().filter_map(|n| network.node_pos(n)).collect())
    }
}
