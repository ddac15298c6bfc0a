//! `sg-output`: shape point writers.
//!
//! | Feature   | Backend  | Files created   |
//! |-----------|----------|-----------------|
//! | *(none)*  | CSV      | `shapes.txt`    |
//! | *(none)*  | Memory   | n/a             |
//! | `sqlite`  | SQLite   | `shapes.db`     |
//!
//! All backends implement [`ShapeSink`].  The shape assembler writes one
//! batch per leg, so a sink never has to hold a whole country's shapes.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sg_output::{CsvShapeWriter, ShapeSink};
//!
//! let mut sink = CsvShapeWriter::new(Path::new("./gtfs"))?;
//! assembler.get_shape(Mode::Bus, "R1", "0", &stops, &mut sink)?;
//! sink.finish()?;
//! ```

pub mod csv;
pub mod error;
pub mod memory;
pub mod row;
pub mod writer;

#[cfg(feature = "sqlite")]
pub mod sqlite;


pub use self::csv::CsvShapeWriter;
pub use error::{OutputError, OutputResult};
pub use memory::VecSink;
pub use row::{ShapePoint, ShapeRow};
pub use writer::{SequenceGuard, ShapeSink};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteShapeWriter;
