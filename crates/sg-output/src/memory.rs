//! In-memory sink.

use sg_core::ShapeId;

use crate::writer::ShapeSink;
use crate::{OutputResult, ShapePoint, ShapeRow};

/// Buffers every row.  Used to resolve shapes on worker threads before
/// handing them to a file sink in a fixed order.
#[derive(Debug, Default)]
pub struct VecSink {
    rows: Vec<ShapeRow>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ShapeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All points written for `shape_id`, in write order.
    pub fn points_for(&self, shape_id: &ShapeId) -> Vec<ShapePoint> {
        self.rows
            .iter()
            .filter(|r| &r.shape_id == shape_id)
            .map(|r| r.point)
            .collect()
    }

    /// Forward every buffered row to `sink`, one batch per run of
    /// consecutive rows with the same shape, and empty the buffer.
    pub fn drain_into(&mut self, sink: &mut dyn ShapeSink) -> OutputResult<()> {
        let rows = std::mem::take(&mut self.rows);
        let mut batch: Vec<ShapePoint> = Vec::new();
        let mut current: Option<ShapeId> = None;

        for row in rows {
            if current.as_ref() != Some(&row.shape_id) {
                if let Some(id) = current.take() {
                    sink.write_points(&id, &batch)?;
                    batch.clear();
                }
                current = Some(row.shape_id);
            }
            batch.push(row.point);
        }
        if let Some(id) = current {
            sink.write_points(&id, &batch)?;
        }
        Ok(())
    }
}

impl ShapeSink for VecSink {
    fn write_points(&mut self, shape_id: &ShapeId, points: &[ShapePoint]) -> OutputResult<()> {
        self.rows.extend(points.iter().map(|&point| ShapeRow {
            shape_id: shape_id.clone(),
            point,
        }));
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        Ok(())
    }
}
