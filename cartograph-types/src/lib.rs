//! Geometric building blocks of the `cartograph` renderer.
//!
//! This crate contains everything the rendering pipeline needs to know about geometries, and nothing
//! about styling:
//!
//! * [`Geometry`] - a closed set of geometry variants (points, lines, polygons, their multi-variants
//!   and collections), generic over the coordinate number type;
//! * [`Box2d`] - axis-aligned rectangle with a distinguishable *invalid* (empty) state;
//! * [`Vertex`] and [`Command`] - the path representation every geometry can be traversed as. The
//!   traversal is done through an external cursor ([`Geometry::vertices`]), so geometries are never
//!   mutated while being read;
//! * [`algorithms`] - label anchor computations (centroid, interior point, middle of a line);
//! * [`projection`] - spatial reference systems and the projections between them.

pub mod algorithms;
mod box2d;
pub mod error;
mod geometry;
pub mod orient;
pub mod projection;
mod ring;
pub mod segment;
mod vertex;

#[cfg(feature = "geo-types")]
mod geo_types;

pub use box2d::Box2d;
pub use geometry::{
    CoordinateType, Geometry, GeometryType, LineString, LinearRing, Polygon, Vertices,
};
pub use ring::{ring_area, ring_orientation};
pub use vertex::{Command, Vertex, VertexPath};

/// Point with `f64` coordinates. Used for all computations in the data, map and screen spaces.
pub type Point2d = nalgebra::Point2<f64>;

/// Vector with `f64` coordinates.
pub type Vector2d = nalgebra::Vector2<f64>;
