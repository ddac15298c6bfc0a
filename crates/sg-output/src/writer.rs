//! The `ShapeSink` trait implemented by all backend writers.

use std::collections::HashMap;

use sg_core::ShapeId;

use crate::{OutputError, OutputResult, ShapePoint};

/// Row-oriented consumer of shape points.
///
/// Points for one shape arrive in strictly increasing `sequence` order,
/// possibly split over several calls.
pub trait ShapeSink {
    /// Write a batch of points belonging to `shape_id`.
    fn write_points(&mut self, shape_id: &ShapeId, points: &[ShapePoint]) -> OutputResult<()>;

    /// Flush and close all underlying handles.
    ///
    /// Idempotent; safe to call more than once.
    fn finish(&mut self) -> OutputResult<()>;
}

impl<S: ShapeSink + ?Sized> ShapeSink for &mut S {
    fn write_points(&mut self, shape_id: &ShapeId, points: &[ShapePoint]) -> OutputResult<()> {
        (**self).write_points(shape_id, points)
    }

    fn finish(&mut self) -> OutputResult<()> {
        (**self).finish()
    }
}

/// Rejects batches that would break per-shape sequence ordering.
///
/// File backends run every batch through a guard before writing, so a
/// malformed `shapes.txt` is never produced silently.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    last: HashMap<ShapeId, u32>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `points` against everything seen so far for `shape_id` and
    /// record the new high-water mark.
    pub fn check(&mut self, shape_id: &ShapeId, points: &[ShapePoint]) -> OutputResult<()> {
        let Some(last_point) = points.last() else {
            return Ok(());
        };

        let mut previous = self.last.get(shape_id).copied();
        for p in points {
            if let Some(prev) = previous {
                if p.sequence <= prev {
                    return Err(OutputError::SequenceOrder {
                        shape_id: shape_id.to_string(),
                        previous: prev,
                        got:      p.sequence,
                    });
                }
            }
            previous = Some(p.sequence);
        }

        self.last.insert(shape_id.clone(), last_point.sequence);
        Ok(())
    }
}
