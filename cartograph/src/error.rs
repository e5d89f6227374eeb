//! Error types used by the crate.

use cartograph_types::error::TypesError;
use thiserror::Error;

use crate::datasource::DatasourceError;
use crate::expression::ExpressionError;
use crate::text::FontError;

/// Cartograph error type.
#[derive(Debug, Error)]
pub enum CartographError {
    /// Invalid configuration of a map, a style or a symbolizer, or a missing resource (font face,
    /// marker image) referenced by the configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Datasource failed while a layer was being rendered.
    #[error("datasource error in layer '{layer}': {source}")]
    Datasource {
        /// Name of the layer.
        layer: String,
        /// Original error.
        source: DatasourceError,
    },
    /// Coordinates cannot be transformed between spatial reference systems.
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
    /// Expression parsing or evaluation error.
    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),
    /// Image encoding or decoding error.
    #[error("image error: {0}")]
    Image(String),
    /// Font loading or shaping error.
    #[error("font error: {0}")]
    Font(FontError),
    /// Error reading/writing data to the FS.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error of a coordinate transformation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// No known projection between the two systems.
    #[error("cannot transform coordinates from '{from}' to '{to}'")]
    Unsupported {
        /// Source system.
        from: String,
        /// Target system.
        to: String,
    },
    /// The point is outside of the projection domain.
    #[error("point ({0}, {1}) is outside of the projection domain")]
    OutOfDomain(f64, f64),
    /// Invalid spatial reference system definition.
    #[error(transparent)]
    Srs(#[from] TypesError),
}

impl From<FontError> for CartographError {
    fn from(value: FontError) -> Self {
        match value {
            FontError::FaceNotFound(_) | FontError::FontsetNotFound(_) | FontError::NoFace => {
                Self::Config(value.to_string())
            }
            other => Self::Font(other),
        }
    }
}

#[cfg(feature = "image")]
impl From<image::ImageError> for CartographError {
    fn from(value: image::ImageError) -> Self {
        Self::Image(value.to_string())
    }
}
