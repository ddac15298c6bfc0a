//! Two-dimensional KD-tree for nearest-node snapping.
//!
//! # Layout
//!
//! Entries live in one `Vec`, permuted during construction so every tree
//! node owns a contiguous range.  Interior nodes split their range at the
//! median of the current axis (latitude at even depths, longitude at odd
//! depths).  Ranges of at most `leaf_size` entries become leaves and are
//! scanned brute-force at query time.
//!
//! # Metric
//!
//! Planar Euclidean distance on raw degrees.  Not geodesic, but the nearest
//! node at city/regional scale is the same under both metrics for all
//! practical purposes.
//!
//! # Ties
//!
//! Among equidistant entries the one inserted first wins.  The search visits
//! the far branch when the splitting plane is *at most* the best distance
//! away, so an earlier-inserted tie on the far side is never skipped.

use tracing::warn;

use sg_core::GeoPoint;

use crate::{SpatialError, SpatialResult};

/// Default leaf size; a good balance of build and query time for graphs of
/// 10⁵–10⁷ nodes.
pub const DEFAULT_LEAF_SIZE: usize = 32;

#[derive(Clone)]
struct Entry<T> {
    pos:   GeoPoint,
    item:  T,
    order: u32,
}

#[derive(Copy, Clone, Debug)]
enum Axis {
    Lat,
    Lon,
}

impl Axis {
    #[inline]
    fn for_depth(depth: usize) -> Axis {
        if depth % 2 == 0 { Axis::Lat } else { Axis::Lon }
    }

    #[inline]
    fn coord(self, p: GeoPoint) -> f64 {
        match self {
            Axis::Lat => p.lat,
            Axis::Lon => p.lon,
        }
    }
}

enum KdNode {
    Leaf { start: u32, end: u32 },
    Split { axis: Axis, value: f64, left: u32, right: u32 },
}

struct Best {
    dist_2: f64,
    order:  u32,
    slot:   usize,
}

/// Immutable nearest-neighbour index over `(item, position)` pairs.
pub struct KdTree<T> {
    entries:   Vec<Entry<T>>,
    nodes:     Vec<KdNode>,
    leaf_size: usize,
}

impl<T: Copy> KdTree<T> {
    /// Build an index.  `leaf_size` is clamped to at least 1.
    ///
    /// Entries with non-finite coordinates cannot be ordered and are left
    /// out of the index.
    pub fn build(items: impl IntoIterator<Item = (T, GeoPoint)>, leaf_size: usize) -> Self {
        let leaf_size = leaf_size.max(1);

        let mut skipped = 0usize;
        let mut entries: Vec<Entry<T>> = Vec::new();
        for (order, (item, pos)) in items.into_iter().enumerate() {
            if !pos.is_finite() {
                skipped += 1;
                continue;
            }
            entries.push(Entry { pos, item, order: order as u32 });
        }
        if skipped > 0 {
            warn!(skipped, "dropped non-finite points from KD-tree");
        }

        let mut nodes = Vec::with_capacity(2 * entries.len() / leaf_size + 1);
        if !entries.is_empty() {
            build_range(&mut entries, 0, 0, leaf_size, &mut nodes);
        }

        Self { entries, nodes, leaf_size }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// The indexed entry closest to `query`, with its position.
    ///
    /// # Errors
    ///
    /// [`SpatialError::EmptyIndex`] if nothing was indexed,
    /// [`SpatialError::InvalidQuery`] for a non-finite query point.
    pub fn nearest(&self, query: GeoPoint) -> SpatialResult<(T, GeoPoint)> {
        if self.entries.is_empty() {
            return Err(SpatialError::EmptyIndex);
        }
        if !query.is_finite() {
            return Err(SpatialError::InvalidQuery(query));
        }

        let mut best = Best { dist_2: f64::INFINITY, order: u32::MAX, slot: 0 };
        self.search(0, query, &mut best);

        let e = &self.entries[best.slot];
        Ok((e.item, e.pos))
    }

    fn search(&self, node: usize, query: GeoPoint, best: &mut Best) {
        match self.nodes[node] {
            KdNode::Leaf { start, end } => {
                for slot in start as usize..end as usize {
                    let e = &self.entries[slot];
                    let d = e.pos.planar_distance_2(query);
                    if d < best.dist_2 || (d == best.dist_2 && e.order < best.order) {
                        *best = Best { dist_2: d, order: e.order, slot };
                    }
                }
            }
            KdNode::Split { axis, value, left, right } => {
                let diff = axis.coord(query) - value;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };

                self.search(near as usize, query, best);
                if diff * diff <= best.dist_2 {
                    self.search(far as usize, query, best);
                }
            }
        }
    }
}

/// Recursively build the subtree for `entries` (which start at `offset` in
/// the full entry array) and return its node index.
fn build_range<T>(
    entries:   &mut [Entry<T>],
    offset:    usize,
    depth:     usize,
    leaf_size: usize,
    nodes:     &mut Vec<KdNode>,
) -> u32 {
    let idx = nodes.len() as u32;

    if entries.len() <= leaf_size {
        nodes.push(KdNode::Leaf {
            start: offset as u32,
            end:   (offset + entries.len()) as u32,
        });
        return idx;
    }

    let axis = Axis::for_depth(depth);
    let mid = entries.len() / 2;
    entries.select_nth_unstable_by(mid, |a, b| {
        axis.coord(a.pos)
            .total_cmp(&axis.coord(b.pos))
            .then(a.order.cmp(&b.order))
    });
    let value = axis.coord(entries[mid].pos);

    // Placeholder, patched once both children exist.
    nodes.push(KdNode::Leaf { start: 0, end: 0 });

    let (lo, hi) = entries.split_at_mut(mid);
    let left  = build_range(lo, offset, depth + 1, leaf_size, nodes);
    let right = build_range(hi, offset + mid, depth + 1, leaf_size, nodes);

    nodes[idx as usize] = KdNode::Split { axis, value, left, right };
    idx
}
