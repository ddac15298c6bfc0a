//! SQLite output backend (feature `sqlite`).
//!
//! Creates `shapes.db` in the configured output directory with a single
//! `shapes` table laid out like GTFS `shapes.txt`.

use std::path::Path;

use rusqlite::Connection;

use sg_core::ShapeId;

use crate::writer::{SequenceGuard, ShapeSink};
use crate::{OutputResult, ShapePoint};

/// Writes shape points to an SQLite database.
pub struct SqliteShapeWriter {
    conn:     Connection,
    guard:    SequenceGuard,
    finished: bool,
}

impl SqliteShapeWriter {
    /// Open (or create) `shapes.db` in `dir` and initialise the schema.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        let conn = Connection::open(dir.join("shapes.db"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE IF NOT EXISTS shapes (
                 shape_id            TEXT    NOT NULL,
                 shape_pt_sequence   INTEGER NOT NULL,
                 shape_dist_traveled REAL    NOT NULL,
                 shape_pt_lat        REAL    NOT NULL,
                 shape_pt_lon        REAL    NOT NULL,
                 PRIMARY KEY (shape_id, shape_pt_sequence)
             );",
        )?;

        Ok(Self { conn, guard: SequenceGuard::new(), finished: false })
    }
}

impl ShapeSink for SqliteShapeWriter {
    fn write_points(&mut self, shape_id: &ShapeId, points: &[ShapePoint]) -> OutputResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        self.guard.check(shape_id, points)?;

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO shapes \
                 (shape_id, shape_pt_sequence, shape_dist_traveled, shape_pt_lat, shape_pt_lon) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for p in points {
                stmt.execute(rusqlite::params![
                    shape_id.as_str(),
                    p.sequence,
                    p.dist_traveled_m,
                    p.lat,
                    p.lon,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
