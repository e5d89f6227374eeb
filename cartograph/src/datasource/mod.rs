//! Datasources provide features for map layers.
//!
//! A datasource is queried with a [`Query`] and returns a [`Featureset`]: a lazy, single pass
//! sequence of features. To read the same data again the query has to be issued again.

use std::collections::BTreeSet;

use cartograph_types::{Box2d, Point2d};
use thiserror::Error;

use crate::feature::{Feature, Variables};

mod memory;
mod registry;

pub use memory::MemoryDatasource;
pub use registry::{DatasourceFactory, DatasourceParams, DatasourceRegistry};

/// Error returned by a datasource.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DatasourceError {
    /// Invalid datasource parameters or data that cannot be parsed.
    #[error("datasource configuration error: {0}")]
    Config(String),
    /// Failure to read the data.
    #[error("datasource i/o error: {0}")]
    Io(String),
    /// Any other failure.
    #[error("datasource error: {0}")]
    Other(String),
}

/// Lazy sequence of features returned by a datasource query.
pub type Featureset<'a> = Box<dyn Iterator<Item = Result<Feature, DatasourceError>> + 'a>;

/// Kind of data a datasource provides.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DatasourceKind {
    /// Features with geometries.
    Vector,
    /// Features with raster payloads.
    Raster,
}

/// Parameters of a datasource query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Area of interest in the layer spatial reference system.
    pub bbox: Box2d,
    /// Size of an output pixel in layer units (`x`, `y`).
    pub resolution: (f64, f64),
    /// Scale denominator of the render.
    pub scale_denominator: f64,
    /// Names of the attributes used by the styles. Datasources may skip loading other attributes.
    pub property_names: BTreeSet<String>,
    /// Map variables.
    pub variables: Variables,
}

impl Query {
    /// Creates a query for the given area with unit resolution.
    pub fn new(bbox: Box2d) -> Self {
        Self {
            bbox,
            resolution: (1.0, 1.0),
            scale_denominator: 0.0,
            property_names: BTreeSet::new(),
            variables: Variables::new(),
        }
    }

    /// Sets resolution.
    pub fn with_resolution(mut self, resolution: (f64, f64)) -> Self {
        self.resolution = resolution;
        self
    }

    /// Sets scale denominator.
    pub fn with_scale_denominator(mut self, scale_denominator: f64) -> Self {
        self.scale_denominator = scale_denominator;
        self
    }

    /// Adds a property name.
    pub fn add_property_name(&mut self, name: impl Into<String>) {
        self.property_names.insert(name.into());
    }
}

/// Provider of features.
///
/// Implementations must be shareable between threads: a single datasource instance can be used by
/// several render requests running in parallel.
pub trait Datasource: Send + Sync {
    /// Returns features intersecting the query bounding box.
    fn features(&self, query: &Query) -> Result<Featureset<'_>, DatasourceError>;

    /// Returns features within `tolerance` from the point.
    fn features_at_point(
        &self,
        point: Point2d,
        tolerance: f64,
    ) -> Result<Featureset<'_>, DatasourceError>;

    /// Extent of all the data of the datasource.
    fn envelope(&self) -> Box2d;

    /// Kind of the datasource.
    fn kind(&self) -> DatasourceKind {
        DatasourceKind::Vector
    }
}
