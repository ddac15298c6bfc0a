//! Spatial-subsystem error type.

use thiserror::Error;

use sg_core::{GeoPoint, NodeId};

/// Errors produced by `sg-spatial`.
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("no route from {from} to {to}")]
    NoRoute { from: NodeId, to: NodeId },

    #[error("search from {from} to {to} exceeded its deadline")]
    Timeout { from: NodeId, to: NodeId },

    #[error("node {0} not found in network")]
    NodeNotFound(NodeId),

    #[error("spatial index is empty")]
    EmptyIndex,

    #[error("cannot query the spatial index at {0}")]
    InvalidQuery(GeoPoint),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "osm")]
    #[error("OSM parse error: {0}")]
    Osm(String),
}

pub type SpatialResult<T> = Result<T, SpatialError>;
