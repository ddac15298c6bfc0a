//! Ramer–Douglas–Peucker polyline simplification.

use sg_core::{line_distance, GeoPoint};

/// Drop points of `points` that lie within `epsilon` (in degrees, planar
/// lon/lat) of the chord they would be replaced by.
///
/// * The first and last points are always kept, and kept points stay in
///   their original order.
/// * Inputs of two or fewer points are returned unchanged.
/// * A non-positive `epsilon` is lossless and returns the input as is.
/// * `f64::INFINITY` reduces any input to its two endpoints.
///
/// The split point of each span is the first point of maximum distance, so
/// the result is deterministic, and simplifying a simplified polyline again
/// with the same `epsilon` changes nothing.
pub fn simplify(points: &[GeoPoint], epsilon: f64) -> Vec<GeoPoint> {
    if points.len() <= 2 || !(epsilon > 0.0) {
        return points.to_vec();
    }

    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    // Spans still to examine; explicit so long routes cannot exhaust the stack.
    let mut spans = vec![(0usize, last)];
    while let Some((start, end)) = spans.pop() {
        if end - start < 2 {
            continue;
        }
        let (a, b) = (points[start], points[end]);

        let mut split = start;
        let mut max_d = 0.0f64;
        for (i, &p) in points.iter().enumerate().take(end).skip(start + 1) {
            let d = line_distance(p, a, b);
            if d > max_d {
                max_d = d;
                split = i;
            }
        }

        if split != start && max_d > epsilon {
            keep[split] = true;
            spans.push((split, end));
            spans.push((start, split));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}
