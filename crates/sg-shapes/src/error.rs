//! Error types for shape generation.
//!
//! Two tiers:
//!
//! * [`LegError`]: a single leg could not be routed plausibly.  Always
//!   recovered by substituting the straight line; never aborts a run.
//! * [`ShapeError`]: a caller precondition was violated (unknown stop,
//!   empty graph for a mode in use) or an output/graph I/O failed.  Aborts
//!   the current shape.

use std::fmt;

use thiserror::Error;

use sg_core::{CoreError, Mode, ShapeId, StopId};
use sg_output::OutputError;
use sg_spatial::SpatialError;

/// Which half of a via-constrained leg failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ViaHalf {
    /// `from → via`
    First,
    /// `via → to`
    Second,
}

impl ViaHalf {
    pub fn as_str(self) -> &'static str {
        match self {
            ViaHalf::First  => "first_half",
            ViaHalf::Second => "second_half",
        }
    }
}

impl fmt::Display for ViaHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a leg fell back to the straight line.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LegError {
    #[error("no graph node matched one or both stops")]
    NoNodesFound,

    #[error("path search timed out")]
    SearchTimeout,

    #[error("path search found no path")]
    SearchFailed,

    #[error("path search returned only {0} node(s)")]
    TooFewNodes(usize),

    #[error("route is {ratio:.2}x the straight line, allowed {expected:.2}x")]
    RouteTooLong { ratio: f64, expected: f64 },

    #[error("{half} of via leg failed: {cause}")]
    ViaLegFailed { half: ViaHalf, cause: Box<LegError> },
}

impl LegError {
    /// Stable machine-readable status, as written to diagnostics.
    pub fn status(&self) -> String {
        match self {
            LegError::NoNodesFound          => "no_nodes_found".to_owned(),
            LegError::SearchTimeout         => "timeout".to_owned(),
            LegError::SearchFailed          => "search_failed".to_owned(),
            LegError::TooFewNodes(_)        => "too_few_nodes".to_owned(),
            LegError::RouteTooLong { .. }   => "route_too_long".to_owned(),
            LegError::ViaLegFailed { half, cause } => format!("via_{half}:{}", cause.status()),
        }
    }

    /// The measured ratio, for length-validation failures.
    pub fn ratio(&self) -> Option<f64> {
        match self {
            LegError::RouteTooLong { ratio, .. } => Some(*ratio),
            LegError::ViaLegFailed { cause, .. } => cause.ratio(),
            _ => None,
        }
    }

    pub(crate) fn via(half: ViaHalf, cause: LegError) -> LegError {
        LegError::ViaLegFailed { half, cause: Box::new(cause) }
    }
}

impl From<SpatialError> for LegError {
    fn from(e: SpatialError) -> Self {
        match e {
            SpatialError::Timeout { .. } => LegError::SearchTimeout,
            SpatialError::NodeNotFound(_) => LegError::NoNodesFound,
            _ => LegError::SearchFailed,
        }
    }
}

/// Run-level errors.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("stop {0} has no known position")]
    UnknownStop(StopId),

    #[error("shape {0} has no stops")]
    EmptyPattern(ShapeId),

    #[error("{0} graph has no nodes to match stops against")]
    NoGraphNodes(Mode),

    #[error("no {0} graph is available")]
    NoGraph(Mode),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("spatial error: {0}")]
    Spatial(#[from] SpatialError),

    #[error("output error: {0}")]
    Output(#[from] OutputError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ShapeResult<T> = Result<T, ShapeError>;
