use nalgebra::{Point2, Scalar};
use num_traits::{AsPrimitive, Bounded, Num, NumCast};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Box2d, Vertex};

/// Numeric type that can be used as a coordinate of a geometry.
pub trait CoordinateType:
    Scalar + Copy + PartialOrd + Num + NumCast + Bounded + AsPrimitive<f64>
{
}

impl<T> CoordinateType for T where
    T: Scalar + Copy + PartialOrd + Num + NumCast + Bounded + AsPrimitive<f64>
{
}

/// Sequence of points connected with straight segments.
pub type LineString<T = f64> = Vec<Point2<T>>;

/// Closed line string. The last point may or may not repeat the first one, both forms are
/// accepted everywhere.
pub type LinearRing<T = f64> = Vec<Point2<T>>;

/// Polygon with optional holes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon<T: Scalar = f64> {
    /// Outer boundary of the polygon.
    pub exterior: LinearRing<T>,
    /// Holes.
    pub interiors: Vec<LinearRing<T>>,
}

impl<T: CoordinateType> Polygon<T> {
    /// Creates a new polygon.
    pub fn new(exterior: LinearRing<T>, interiors: Vec<LinearRing<T>>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    /// Iterates over all rings of the polygon, exterior first.
    pub fn rings(&self) -> impl Iterator<Item = &LinearRing<T>> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }
}

/// Kind of a geometry as exposed to style expressions (`[mapnik::geometry_type]`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GeometryType {
    /// Empty geometry.
    Unknown = 0,
    /// Point or multipoint.
    Point = 1,
    /// Line string or multi line string.
    LineString = 2,
    /// Polygon, multipolygon or a linear ring.
    Polygon = 3,
    /// Geometry collection.
    Collection = 4,
}

/// Geometry of a feature.
///
/// Geometries are immutable during rendering. To read the geometry as a path use
/// [`Geometry::vertices`], which returns an independent cursor, so any number of traversals can run
/// over the same geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Geometry<T: Scalar = f64> {
    /// Geometry with no points.
    #[default]
    Empty,
    /// Single point.
    Point(Point2<T>),
    /// Line string.
    LineString(LineString<T>),
    /// Standalone closed ring.
    LinearRing(LinearRing<T>),
    /// Polygon.
    Polygon(Polygon<T>),
    /// Set of points.
    MultiPoint(Vec<Point2<T>>),
    /// Set of line strings.
    MultiLineString(Vec<LineString<T>>),
    /// Set of polygons.
    MultiPolygon(Vec<Polygon<T>>),
    /// Heterogeneous set of geometries.
    Collection(Vec<Geometry<T>>),
}

impl<T: CoordinateType> Geometry<T> {
    /// Type of the geometry.
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Empty => GeometryType::Unknown,
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryType::Point,
            Geometry::LineString(_) | Geometry::MultiLineString(_) => GeometryType::LineString,
            Geometry::LinearRing(_) | Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
                GeometryType::Polygon
            }
            Geometry::Collection(_) => GeometryType::Collection,
        }
    }

    /// Returns true if the geometry doesn't contain any points.
    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Empty => true,
            Geometry::Point(_) => false,
            Geometry::LineString(points)
            | Geometry::LinearRing(points)
            | Geometry::MultiPoint(points) => points.is_empty(),
            Geometry::Polygon(polygon) => polygon.exterior.is_empty(),
            Geometry::MultiLineString(lines) => lines.iter().all(|l| l.is_empty()),
            Geometry::MultiPolygon(polygons) => polygons.iter().all(|p| p.exterior.is_empty()),
            Geometry::Collection(items) => items.iter().all(|g| g.is_empty()),
        }
    }

    /// Bounding box of the geometry. Invalid box for empty geometries.
    pub fn envelope(&self) -> Box2d<T> {
        let mut bbox = Box2d::invalid();
        self.for_each_part(&mut |part| {
            for p in part.points() {
                bbox.expand_to_include_point(p.x, p.y);
            }
        });

        bbox
    }

    /// Number of points in the geometry.
    pub fn num_points(&self) -> usize {
        let mut count = 0;
        self.for_each_part(&mut |part| count += part.points().len());
        count
    }

    /// Returns a cursor over the path representation of the geometry.
    ///
    /// * every point of a point geometry is a separate [`MoveTo`](crate::Command::MoveTo);
    /// * a line string is a `MoveTo` followed by `LineTo` commands;
    /// * every ring (standalone, exterior or a hole) is a `MoveTo`, `LineTo`s and a closing
    ///   [`Close`](crate::Command::Close) vertex carrying the first point coordinates. A trailing
    ///   point that duplicates the first one is not emitted.
    pub fn vertices(&self) -> Vertices<'_, T> {
        let mut parts = vec![];
        self.for_each_part(&mut |part| parts.push(part));
        Vertices {
            parts,
            part: 0,
            index: 0,
        }
    }

    /// Converts coordinates of the geometry into `f64`.
    pub fn to_f64(&self) -> Geometry<f64> {
        self.map_points(&|p| Point2::new(p.x.as_(), p.y.as_()))
    }

    /// Creates a new geometry by applying `f` to every point.
    pub fn map_points<U: CoordinateType>(
        &self,
        f: &impl Fn(&Point2<T>) -> Point2<U>,
    ) -> Geometry<U> {
        let map_line = |line: &Vec<Point2<T>>| line.iter().map(f).collect::<Vec<_>>();
        let map_polygon = |polygon: &Polygon<T>| Polygon {
            exterior: map_line(&polygon.exterior),
            interiors: polygon.interiors.iter().map(map_line).collect(),
        };

        match self {
            Geometry::Empty => Geometry::Empty,
            Geometry::Point(p) => Geometry::Point(f(p)),
            Geometry::LineString(line) => Geometry::LineString(map_line(line)),
            Geometry::LinearRing(ring) => Geometry::LinearRing(map_line(ring)),
            Geometry::Polygon(polygon) => Geometry::Polygon(map_polygon(polygon)),
            Geometry::MultiPoint(points) => Geometry::MultiPoint(map_line(points)),
            Geometry::MultiLineString(lines) => {
                Geometry::MultiLineString(lines.iter().map(map_line).collect())
            }
            Geometry::MultiPolygon(polygons) => {
                Geometry::MultiPolygon(polygons.iter().map(map_polygon).collect())
            }
            Geometry::Collection(items) => {
                Geometry::Collection(items.iter().map(|g| g.map_points(f)).collect())
            }
        }
    }

    fn for_each_part<'a>(&'a self, f: &mut impl FnMut(Part<'a, T>)) {
        match self {
            Geometry::Empty => {}
            Geometry::Point(p) => f(Part::Points(std::slice::from_ref(p))),
            Geometry::MultiPoint(points) => f(Part::Points(points)),
            Geometry::LineString(line) => f(Part::Line(line)),
            Geometry::MultiLineString(lines) => lines.iter().for_each(|l| f(Part::Line(l))),
            Geometry::LinearRing(ring) => f(Part::Ring(trim_closing_point(ring))),
            Geometry::Polygon(polygon) => polygon_parts(polygon, f),
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().for_each(|polygon| polygon_parts(polygon, f))
            }
            Geometry::Collection(items) => items.iter().for_each(|g| g.for_each_part(f)),
        }
    }
}

impl<T: CoordinateType> From<Point2<T>> for Geometry<T> {
    fn from(value: Point2<T>) -> Self {
        Geometry::Point(value)
    }
}

impl<T: CoordinateType> From<Polygon<T>> for Geometry<T> {
    fn from(value: Polygon<T>) -> Self {
        Geometry::Polygon(value)
    }
}

fn polygon_parts<'a, T: CoordinateType>(polygon: &'a Polygon<T>, f: &mut impl FnMut(Part<'a, T>)) {
    for ring in polygon.rings() {
        f(Part::Ring(trim_closing_point(ring)));
    }
}

fn trim_closing_point<T: CoordinateType>(ring: &[Point2<T>]) -> &[Point2<T>] {
    match ring {
        [first, .., last] if first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

#[derive(Debug, Copy, Clone)]
enum Part<'a, T: Scalar> {
    Points(&'a [Point2<T>]),
    Line(&'a [Point2<T>]),
    Ring(&'a [Point2<T>]),
}

impl<'a, T: Scalar> Part<'a, T> {
    fn points(&self) -> &'a [Point2<T>] {
        match self {
            Part::Points(p) | Part::Line(p) | Part::Ring(p) => p,
        }
    }
}

/// Cursor over the vertices of a [`Geometry`]. See [`Geometry::vertices`].
///
/// The cursor borrows the geometry and never modifies it. To restart the traversal create a new
/// cursor or clone this one before iterating.
#[derive(Debug, Clone)]
pub struct Vertices<'a, T: Scalar> {
    parts: Vec<Part<'a, T>>,
    part: usize,
    index: usize,
}

impl<T: CoordinateType> Iterator for Vertices<'_, T> {
    type Item = Vertex;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let part = *self.parts.get(self.part)?;
            let points = part.points();
            let index = self.index;
            self.index += 1;

            if let Some(p) = points.get(index) {
                let (x, y) = (p.x.as_(), p.y.as_());
                let vertex = match part {
                    Part::Points(_) => Vertex::move_to(x, y),
                    _ if index == 0 => Vertex::move_to(x, y),
                    _ => Vertex::line_to(x, y),
                };

                return Some(vertex);
            }

            if let (Part::Ring(_), true, Some(first)) =
                (part, index == points.len(), points.first())
            {
                return Some(Vertex::close(first.x.as_(), first.y.as_()));
            }

            self.part += 1;
            self.index = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;

    fn square() -> Polygon {
        Polygon::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(0.0, 1.0),
                Point2::new(0.0, 0.0),
            ],
            vec![],
        )
    }

    #[test]
    fn polygon_vertices_are_closed_once() {
        let geometry = Geometry::Polygon(square());
        let vertices: Vec<_> = geometry.vertices().collect();
        let commands: Vec<_> = vertices.iter().map(|v| v.cmd).collect();
        assert_eq!(
            commands,
            vec![
                Command::MoveTo,
                Command::LineTo,
                Command::LineTo,
                Command::LineTo,
                Command::Close
            ]
        );
        assert_eq!(vertices[4], Vertex::close(0.0, 0.0));
    }

    #[test]
    fn vertices_traversal_is_repeatable() {
        let geometry = Geometry::MultiLineString(vec![
            vec![Point2::new(0, 0), Point2::new(1, 1)],
            vec![Point2::new(2, 2), Point2::new(3, 3), Point2::new(4, 4)],
        ]);

        let first: Vec<_> = geometry.vertices().collect();
        let second: Vec<_> = geometry.vertices().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
        assert_eq!(first[2], Vertex::move_to(2.0, 2.0));
    }

    #[test]
    fn multipoint_is_move_to_only() {
        let geometry = Geometry::MultiPoint(vec![Point2::new(1.0, 2.0), Point2::new(3.0, 4.0)]);
        assert!(geometry.vertices().all(|v| v.cmd == Command::MoveTo));
        assert_eq!(geometry.num_points(), 2);
    }

    #[test]
    fn empty_parts_are_skipped() {
        let geometry: Geometry = Geometry::Collection(vec![
            Geometry::Empty,
            Geometry::LineString(vec![]),
            Geometry::Point(Point2::new(1.0, 1.0)),
        ]);
        assert!(!geometry.is_empty());
        assert_eq!(geometry.vertices().count(), 1);
        assert_eq!(geometry.geometry_type(), GeometryType::Collection);
    }

    #[test]
    fn envelope() {
        let geometry = Geometry::Polygon(square());
        assert_eq!(geometry.envelope(), Box2d::new(0.0, 0.0, 1.0, 1.0));
        assert!(!Geometry::<f64>::Empty.envelope().is_valid());
    }
}
