//! CSV output backend.
//!
//! Writes GTFS `shapes.txt` in the configured output directory.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::Writer;

use sg_core::ShapeId;

use crate::writer::{SequenceGuard, ShapeSink};
use crate::{OutputResult, ShapePoint};

pub const SHAPES_HEADER: [&str; 5] = [
    "shape_id",
    "shape_pt_sequence",
    "shape_dist_traveled",
    "shape_pt_lat",
    "shape_pt_lon",
];

/// Writes shape points as GTFS `shapes.txt` rows.
pub struct CsvShapeWriter<W: Write = File> {
    out:      Writer<W>,
    guard:    SequenceGuard,
    finished: bool,
}

impl CsvShapeWriter<File> {
    /// Create `shapes.txt` in `dir` and write the header row.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        Self::from_writer(File::create(dir.join("shapes.txt"))?)
    }
}

impl<W: Write> CsvShapeWriter<W> {
    /// Write `shapes.txt` rows to any `Write` target.
    pub fn from_writer(inner: W) -> OutputResult<Self> {
        let mut out = Writer::from_writer(inner);
        out.write_record(SHAPES_HEADER)?;
        Ok(Self { out, guard: SequenceGuard::new(), finished: false })
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> OutputResult<W> {
        self.out.flush()?;
        self.out
            .into_inner()
            .map_err(|e| crate::OutputError::Io(e.into_error()))
    }
}

impl<W: Write> ShapeSink for CsvShapeWriter<W> {
    fn write_points(&mut self, shape_id: &ShapeId, points: &[ShapePoint]) -> OutputResult<()> {
        self.guard.check(shape_id, points)?;
        for p in points {
            self.out.write_record(&[
                shape_id.as_str().to_owned(),
                p.sequence.to_string(),
                format!("{:.2}", p.dist_traveled_m),
                format!("{:.6}", p.lat),
                format!("{:.6}", p.lon),
            ])?;
        }
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.out.flush()?;
        Ok(())
    }
}
