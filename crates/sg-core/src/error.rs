//! Workspace base error type.
//!
//! Sub-crates define their own error enums and wrap `CoreError` where they
//! need to surface one.

use thiserror::Error;

/// The error type for `sg-core` and a common base for sub-crates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown transport mode {0:?}")]
    UnknownMode(String),
}

/// Shorthand result type for `sg-core`.
pub type CoreResult<T> = Result<T, CoreError>;
