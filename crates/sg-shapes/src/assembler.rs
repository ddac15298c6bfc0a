//! Whole-pattern shape assembly.
//!
//! [`ShapeAssembler::get_shape`] turns an ordered stop list into a stitched
//! polyline, writes its points to a [`ShapeSink`] one batch per leg, and
//! returns the cumulative distance at every stop.  Results are memoised per
//! `(route_id, pattern_id)`; a repeated request emits nothing and returns
//! the same `Arc`.
//!
//! A shape is memoised only once all of its points have reached the sink.
//! If assembly or the sink fails, the next request for the shape starts
//! over at sequence `0`.
//!
//! # Leg pipeline
//!
//! ```text
//!  stop A ─┐                                  ┌─ ok ──────────► routed points
//!          ├─ match ─► via? ─► LegRouter ─► ratio check
//!  stop B ─┘                                  └─ LegError ─► straight A→B
//!                                                             + diagnostics
//! ```
//!
//! Either branch is optionally simplified, then appended to the shape with
//! the leg's first point dropped (it repeats the previous leg's last).

use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use sg_core::{GeoPoint, Mode, NodeId, ShapeId, StopId};
use sg_output::{ShapePoint, ShapeSink};

use crate::config::ShapeConfig;
use crate::diagnostics::{DiagnosticsSink, LegFailure, NoDiagnostics};
use crate::error::LegError;
use crate::leg::{GraphLegRouter, LegRouter};
use crate::matcher;
use crate::modes::{ModeGraph, ModeTable};
use crate::overrides::Overrides;
use crate::ratio::RatioValidator;
use crate::simplify::simplify;
use crate::stops::StopTable;
use crate::{ShapeError, ShapeResult};

// ── Request / result types ────────────────────────────────────────────────────

/// One trip pattern to be shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRequest {
    pub mode:       Mode,
    pub route_id:   String,
    pub pattern_id: String,
    pub stops:      Vec<StopId>,
}

impl ShapeRequest {
    pub fn new(
        mode:       Mode,
        route_id:   impl Into<String>,
        pattern_id: impl Into<String>,
        stops:      impl IntoIterator<Item = impl Into<StopId>>,
    ) -> Self {
        Self {
            mode,
            route_id:   route_id.into(),
            pattern_id: pattern_id.into(),
            stops:      stops.into_iter().map(Into::into).collect(),
        }
    }

    pub fn shape_id(&self) -> ShapeId {
        ShapeId::new(&self.route_id, &self.pattern_id)
    }
}

/// Per-stop cumulative distances of an assembled shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDistances {
    pub shape_id:    ShapeId,
    /// `distances[i]` is the distance along the shape, in metres, at which
    /// stop `i` is reached.  Same length as the stop list; starts at `0.0`
    /// and never decreases.
    pub distances:   Vec<f64>,
    /// Number of points emitted for the shape.
    pub point_count: u32,
    /// Legs that fell back to a straight line.
    pub failed_legs: usize,
}

impl ShapeDistances {
    pub fn total_m(&self) -> f64 {
        self.distances.last().copied().unwrap_or(0.0)
    }
}

/// Resolved once per shape; concurrent requests for the same shape wait on
/// the slot instead of assembling it twice.
type ShapeSlot = Arc<Mutex<Option<Arc<ShapeDistances>>>>;

// ── ShapeAssembler ────────────────────────────────────────────────────────────

pub struct ShapeAssembler<L = GraphLegRouter, D = NoDiagnostics> {
    modes:        ModeTable,
    stops:        StopTable,
    overrides:    Overrides,
    config:       ShapeConfig,
    leg_router:   L,
    diagnostics:  D,
    shapes:       Mutex<FxHashMap<ShapeId, ShapeSlot>>,
    failed_pairs: Mutex<FxHashSet<(StopId, StopId)>>,
}

impl ShapeAssembler {
    /// An assembler routing with Dijkstra and discarding diagnostics.
    pub fn new(modes: ModeTable, stops: StopTable, overrides: Overrides, config: ShapeConfig) -> Self {
        Self::with_parts(modes, stops, overrides, config, GraphLegRouter::default(), NoDiagnostics)
    }
}

impl<L: LegRouter, D: DiagnosticsSink> ShapeAssembler<L, D> {
    pub fn with_parts(
        modes:       ModeTable,
        stops:       StopTable,
        overrides:   Overrides,
        config:      ShapeConfig,
        leg_router:  L,
        diagnostics: D,
    ) -> Self {
        Self {
            modes,
            stops,
            overrides,
            config,
            leg_router,
            diagnostics,
            shapes:       Mutex::new(FxHashMap::default()),
            failed_pairs: Mutex::new(FxHashSet::default()),
        }
    }

    /// Swap the diagnostics sink, keeping everything else.
    pub fn with_diagnostics<D2: DiagnosticsSink>(self, diagnostics: D2) -> ShapeAssembler<L, D2> {
        ShapeAssembler::with_parts(self.modes, self.stops, self.overrides, self.config, self.leg_router, diagnostics)
    }

    pub fn modes(&self) -> &ModeTable { &self.modes }
    pub fn config(&self) -> &ShapeConfig { &self.config }
    pub fn leg_router(&self) -> &L { &self.leg_router }
    pub fn diagnostics(&self) -> &D { &self.diagnostics }

    /// Number of distinct stop pairs that have failed so far.
    pub fn failed_pair_count(&self) -> usize {
        lock(&self.failed_pairs).len()
    }

    /// Assemble (or recall) the shape of one pattern.
    ///
    /// Points are written to `sink` only the first time a shape is
    /// assembled.  A failed leg never fails the shape; unknown stops, an
    /// empty stop list, a missing graph and sink errors do.
    pub fn get_shape(
        &self,
        mode:       Mode,
        route_id:   &str,
        pattern_id: &str,
        stops:      &[StopId],
        sink:       &mut dyn ShapeSink,
    ) -> ShapeResult<Arc<ShapeDistances>> {
        let shape_id = ShapeId::new(route_id, pattern_id);
        let slot = self.slot(&shape_id);

        let mut cached = lock(&*slot);
        if let Some(shape) = cached.as_ref() {
            debug!(%shape_id, "shape cache hit");
            return Ok(Arc::clone(shape));
        }

        let (shape, legs) = self.assemble(mode, shape_id, stops)?;
        emit(&shape.shape_id, &legs, sink)?;
        let shape = Arc::new(shape);
        *cached = Some(Arc::clone(&shape));
        Ok(shape)
    }

    fn slot(&self, shape_id: &ShapeId) -> ShapeSlot {
        Arc::clone(lock(&self.shapes).entry(shape_id.clone()).or_default())
    }

    /// Assemble every request, writing points to `sink` in request order.
    ///
    /// Requests sharing a shape id are assembled once.  The result has one
    /// entry per request.
    pub fn generate_all(
        &self,
        requests: &[ShapeRequest],
        sink:     &mut dyn ShapeSink,
    ) -> ShapeResult<Vec<Arc<ShapeDistances>>> {
        let started = std::time::Instant::now();
        let shapes = self.resolve_all(requests, sink)?;
        let failed: usize = shapes.iter().map(|s| s.failed_legs).sum();
        info!(
            requests = requests.len(),
            failed_legs = failed,
            failed_pairs = self.failed_pair_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "shape generation done"
        );
        Ok(shapes)
    }

    #[cfg(not(feature = "parallel"))]
    fn resolve_all(
        &self,
        requests: &[ShapeRequest],
        sink:     &mut dyn ShapeSink,
    ) -> ShapeResult<Vec<Arc<ShapeDistances>>> {
        requests
            .iter()
            .map(|r| self.get_shape(r.mode, &r.route_id, &r.pattern_id, &r.stops, sink))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn resolve_all(
        &self,
        requests: &[ShapeRequest],
        sink:     &mut dyn ShapeSink,
    ) -> ShapeResult<Vec<Arc<ShapeDistances>>> {
        use rayon::prelude::*;

        let mut seen = FxHashSet::default();
        let unique: Vec<&ShapeRequest> = requests.iter().filter(|r| seen.insert(r.shape_id())).collect();

        // Workers only assemble.  Shapes are committed in request order, so
        // the sink sees the same rows as a sequential run, and everything
        // after the first error stays uncached.
        let prepared: Vec<ShapeResult<Prepared>> = unique.par_iter().map(|r| self.prepare(r)).collect();

        let mut by_id = FxHashMap::default();
        for p in prepared {
            let shape = self.commit(p?, sink)?;
            by_id.insert(shape.shape_id.clone(), shape);
        }
        Ok(requests.iter().filter_map(|r| by_id.get(&r.shape_id()).cloned()).collect())
    }

    #[cfg(feature = "parallel")]
    fn prepare(&self, r: &ShapeRequest) -> ShapeResult<Prepared> {
        let shape_id = r.shape_id();
        let slot = self.slot(&shape_id);
        let cached = lock(&*slot).clone();
        match cached {
            Some(shape) => Ok(Prepared { slot, shape, legs: None }),
            None => {
                let (shape, legs) = self.assemble(r.mode, shape_id, &r.stops)?;
                Ok(Prepared { slot, shape: Arc::new(shape), legs: Some(legs) })
            }
        }
    }

    /// Write a prepared shape and memoise it, unless another caller got
    /// there first.
    #[cfg(feature = "parallel")]
    fn commit(&self, prepared: Prepared, sink: &mut dyn ShapeSink) -> ShapeResult<Arc<ShapeDistances>> {
        let Prepared { slot, shape, legs } = prepared;
        let Some(legs) = legs else { return Ok(shape) };

        let mut cached = lock(&*slot);
        if let Some(existing) = cached.as_ref() {
            return Ok(Arc::clone(existing));
        }
        emit(&shape.shape_id, &legs, sink)?;
        *cached = Some(Arc::clone(&shape));
        Ok(shape)
    }

    // ── Assembly ──────────────────────────────────────────────────────────

    fn assemble(
        &self,
        mode:     Mode,
        shape_id: ShapeId,
        stops:    &[StopId],
    ) -> ShapeResult<(ShapeDistances, Vec<Vec<ShapePoint>>)> {
        if stops.is_empty() {
            return Err(ShapeError::EmptyPattern(shape_id));
        }
        let positions = stops
            .iter()
            .map(|s| self.stops.position(s))
            .collect::<ShapeResult<Vec<GeoPoint>>>()?;

        let mut out = PointStream::default();
        let mut distances = Vec::with_capacity(stops.len());
        let mut failed_legs = 0;

        if stops.len() == 1 {
            out.push_leg(&positions, true);
            distances.push(0.0);
        } else {
            let graph = self.modes.graph(mode)?;
            let validator = RatioValidator::new(&self.config, mode, &self.overrides);
            distances.push(0.0);

            for (i, pair) in stops.windows(2).enumerate() {
                let (from, to) = (&pair[0], &pair[1]);
                let leg = self.resolve_leg(&graph, &validator, from, to, positions[i], positions[i + 1])?;
                let points = match (leg, self.config.simplify_epsilon) {
                    (Ok(points), Some(eps)) => simplify(&points, eps),
                    (Ok(points), None) => points,
                    (Err(straight), _) => {
                        failed_legs += 1;
                        straight
                    }
                };
                out.push_leg(&points, i == 0);
                distances.push(out.distance_m());
            }
        }

        debug!(
            %shape_id,
            stops = stops.len(),
            points = out.count(),
            failed_legs,
            length_m = out.distance_m(),
            "shape assembled"
        );
        let shape = ShapeDistances { point_count: out.count(), shape_id, distances, failed_legs };
        Ok((shape, out.into_legs()))
    }

    /// `Ok(points)` for a routed leg, `Err(straight)` for a fallback.
    fn resolve_leg(
        &self,
        graph:     &ModeGraph,
        validator: &RatioValidator<'_>,
        from:      &StopId,
        to:        &StopId,
        from_pos:  GeoPoint,
        to_pos:    GeoPoint,
    ) -> ShapeResult<Result<Vec<GeoPoint>, Vec<GeoPoint>>> {
        let max_snap = self.config.max_snap_distance_m;
        let from_node = matcher::node_for(graph, from, from_pos, max_snap)?;
        let to_node = matcher::node_for(graph, to, to_pos, max_snap)?;
        let straight = vec![from_pos, to_pos];

        let routed = match (from_node, to_node) {
            (Some(a), Some(b)) => {
                let via = match self.overrides.via(from, to) {
                    Some(p) => Some(graph.nearest_node(p)?.0),
                    None => None,
                };
                self.leg_router
                    .route(graph.network(), a, b, via, self.config.search_timeout(graph.mode()))
                    .and_then(|points| validator.validate(&points, &straight, from, to).map(|()| points))
            }
            _ => Err(LegError::NoNodesFound),
        };

        match routed {
            Ok(points) => Ok(Ok(points)),
            Err(error) => {
                self.report_failure(from, to, from_node, to_node, error, &straight);
                Ok(Err(straight))
            }
        }
    }

    /// Log and record a failure the first time its stop pair fails.
    fn report_failure(
        &self,
        from:      &StopId,
        to:        &StopId,
        from_node: Option<NodeId>,
        to_node:   Option<NodeId>,
        error:     LegError,
        straight:  &[GeoPoint],
    ) {
        let first = lock(&self.failed_pairs).insert((from.clone(), to.clone()));
        if !first {
            debug!(%from, %to, status = %error.status(), "leg failed again");
            return;
        }

        warn!(%from, %to, status = %error.status(), "leg replaced by straight line: {error}");
        let failure = LegFailure {
            from_stop: from.clone(),
            to_stop:   to.clone(),
            from_node,
            to_node,
            error,
            polyline:  straight.to_vec(),
        };
        if let Err(e) = self.diagnostics.record(&failure) {
            warn!(%from, %to, error = %e, "could not record leg diagnostics");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// One `write_points` call per non-empty leg.
fn emit(shape_id: &ShapeId, legs: &[Vec<ShapePoint>], sink: &mut dyn ShapeSink) -> ShapeResult<()> {
    for leg in legs.iter().filter(|l| !l.is_empty()) {
        sink.write_points(shape_id, leg)?;
    }
    Ok(())
}

/// An assembled shape that has not been written yet.  `legs` is `None`
/// when the shape was already memoised.
#[cfg(feature = "parallel")]
struct Prepared {
    slot:  ShapeSlot,
    shape: Arc<ShapeDistances>,
    legs:  Option<Vec<Vec<ShapePoint>>>,
}

// ── PointStream ───────────────────────────────────────────────────────────────

/// Numbers points, accumulates distance, and keeps one batch per leg.
#[derive(Default)]
struct PointStream {
    sequence: u32,
    dist_m:   f64,
    last:     Option<GeoPoint>,
    legs:     Vec<Vec<ShapePoint>>,
}

impl PointStream {
    /// Append a leg; every leg but the first drops its leading point.
    fn push_leg(&mut self, points: &[GeoPoint], first: bool) {
        let skip = if first { 0 } else { 1 };
        let mut batch = Vec::with_capacity(points.len());
        for &p in points.iter().skip(skip) {
            if let Some(prev) = self.last {
                self.dist_m += prev.distance_m(p);
            }
            batch.push(ShapePoint::new(self.sequence, self.dist_m, p));
            self.sequence += 1;
            self.last = Some(p);
        }
        self.legs.push(batch);
    }

    fn into_legs(self) -> Vec<Vec<ShapePoint>> {
        self.legs
    }

    fn distance_m(&self) -> f64 {
        self.dist_m
    }

    fn count(&self) -> u32 {
        self.sequence
    }
}
