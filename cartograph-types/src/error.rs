//! Error type used by the crate.

use thiserror::Error;

/// Error enum.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    /// Geometry conversion error.
    #[error("invalid input geometry: {0}")]
    Conversion(String),
    /// A spatial reference system definition could not be recognized.
    #[error("unsupported spatial reference system: {0}")]
    UnknownSrs(String),
}
