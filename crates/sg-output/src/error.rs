//! Error types for sg-output.

use thiserror::Error;

/// Errors that can occur when writing shape points.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("shape {shape_id}: sequence {got} written after {previous}")]
    SequenceOrder { shape_id: String, previous: u32, got: u32 },

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Alias for `Result<T, OutputError>`.
pub type OutputResult<T> = Result<T, OutputError>;
