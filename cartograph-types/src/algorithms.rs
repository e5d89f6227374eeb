//! Algorithms that compute label anchor points of geometries.

use nalgebra::Point2;

use crate::geometry::CoordinateType;
use crate::{ring_area, Geometry, Point2d, Polygon};

/// Center of mass of the geometry.
///
/// The highest dimension present in the geometry defines the result: if the geometry has polygons
/// with non-zero area, the area-weighted centroid of them is returned (holes are subtracted). If there
/// are no polygons, the length-weighted center of all lines is used, and only if the geometry
/// contains nothing but points, the mean of the points.
///
/// Returns `None` for empty geometries.
pub fn centroid<T: CoordinateType>(geometry: &Geometry<T>) -> Option<Point2d> {
    let mut acc = CentroidAccumulator::default();
    acc.add_geometry(geometry);
    acc.result()
}

/// A point guaranteed to be inside the polygon area (if the polygon is not degenerate).
///
/// The polygon is intersected with a horizontal scanline going through its centroid and the middle of
/// the widest inner interval is taken. For multipolygons the polygon with the largest area is used.
/// For non-areal geometries the centroid is returned.
pub fn interior_point<T: CoordinateType>(geometry: &Geometry<T>) -> Option<Point2d> {
    match geometry {
        Geometry::Polygon(polygon) => polygon_interior(polygon),
        Geometry::LinearRing(ring) => polygon_interior(&Polygon::new(ring.clone(), vec![])),
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .max_by(|a, b| {
                ring_area(&a.exterior)
                    .abs()
                    .total_cmp(&ring_area(&b.exterior).abs())
            })
            .and_then(polygon_interior),
        Geometry::Collection(items) => items
            .iter()
            .find(|g| !g.is_empty())
            .and_then(interior_point),
        _ => centroid(geometry),
    }
}

/// Point in the middle of a line (by the arc length).
///
/// For multi line strings the longest line is used; for polygons the exterior ring. For other
/// geometries the centroid is returned.
pub fn middle_point<T: CoordinateType>(geometry: &Geometry<T>) -> Option<Point2d> {
    match geometry {
        Geometry::LineString(line) => line_middle(line),
        Geometry::LinearRing(ring) => line_middle(ring),
        Geometry::Polygon(polygon) => line_middle(&polygon.exterior),
        Geometry::MultiLineString(lines) => lines
            .iter()
            .max_by(|a, b| line_length(a).total_cmp(&line_length(b)))
            .and_then(|line| line_middle(line)),
        _ => centroid(geometry),
    }
}

/// Returns true if the point is inside the polygon (even-odd rule over all rings).
pub fn point_in_polygon<T: CoordinateType>(polygon: &Polygon<T>, point: &Point2d) -> bool {
    let mut inside = false;
    for ring in polygon.rings() {
        for (a, b) in ring_edges(ring) {
            if (a.y > point.y) != (b.y > point.y) {
                let x = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if point.x < x {
                    inside = !inside;
                }
            }
        }
    }

    inside
}

/// Total length of a line.
pub fn line_length<T: CoordinateType>(line: &[Point2<T>]) -> f64 {
    line.windows(2)
        .map(|w| (to_f64(&w[1]) - to_f64(&w[0])).norm())
        .sum()
}

fn to_f64<T: CoordinateType>(p: &Point2<T>) -> Point2d {
    Point2d::new(p.x.as_(), p.y.as_())
}

fn ring_edges<T: CoordinateType>(ring: &[Point2<T>]) -> impl Iterator<Item = (Point2d, Point2d)> + '_ {
    let last = ring.last().map(to_f64);
    ring.iter().scan(last, |prev, p| {
        let p = to_f64(p);
        let edge = (prev.unwrap_or(p), p);
        *prev = Some(p);
        Some(edge)
    })
}

fn line_middle<T: CoordinateType>(line: &[Point2<T>]) -> Option<Point2d> {
    let half = line_length(line) / 2.0;
    let mut travelled = 0.0;
    for w in line.windows(2) {
        let (a, b) = (to_f64(&w[0]), to_f64(&w[1]));
        let len = (b - a).norm();
        if len > 0.0 && travelled + len >= half {
            return Some(a + (b - a) * ((half - travelled) / len));
        }
        travelled += len;
    }

    line.first().map(to_f64)
}

fn polygon_interior<T: CoordinateType>(polygon: &Polygon<T>) -> Option<Point2d> {
    let center = centroid(&Geometry::Polygon(polygon.clone()))?;
    let bbox = Geometry::LineString(polygon.exterior.clone()).envelope();
    let bbox_center = bbox.center();

    for y in [center.y, bbox_center.y] {
        let mut crossings: Vec<f64> = polygon
            .rings()
            .flat_map(|ring| ring_edges(ring))
            .filter(|(a, b)| (a.y > y) != (b.y > y))
            .map(|(a, b)| a.x + (y - a.y) / (b.y - a.y) * (b.x - a.x))
            .collect();
        crossings.sort_by(f64::total_cmp);

        let widest = crossings
            .chunks_exact(2)
            .max_by(|a, b| (a[1] - a[0]).total_cmp(&(b[1] - b[0])));
        if let Some(interval) = widest {
            if interval[1] > interval[0] {
                return Some(Point2d::new((interval[0] + interval[1]) / 2.0, y));
            }
        }
    }

    Some(center)
}

#[derive(Default)]
struct CentroidAccumulator {
    area: f64,
    area_x: f64,
    area_y: f64,
    length: f64,
    length_x: f64,
    length_y: f64,
    points: usize,
    points_x: f64,
    points_y: f64,
}

impl CentroidAccumulator {
    fn add_geometry<T: CoordinateType>(&mut self, geometry: &Geometry<T>) {
        match geometry {
            Geometry::Empty => {}
            Geometry::Point(p) => self.add_point(to_f64(p)),
            Geometry::MultiPoint(points) => points.iter().for_each(|p| self.add_point(to_f64(p))),
            Geometry::LineString(line) => self.add_line(line),
            Geometry::MultiLineString(lines) => lines.iter().for_each(|l| self.add_line(l)),
            Geometry::LinearRing(ring) => self.add_polygon(&Polygon::new(ring.clone(), vec![])),
            Geometry::Polygon(polygon) => self.add_polygon(polygon),
            Geometry::MultiPolygon(polygons) => polygons.iter().for_each(|p| self.add_polygon(p)),
            Geometry::Collection(items) => items.iter().for_each(|g| self.add_geometry(g)),
        }
    }

    fn add_point(&mut self, p: Point2d) {
        self.points += 1;
        self.points_x += p.x;
        self.points_y += p.y;
    }

    fn add_line<T: CoordinateType>(&mut self, line: &[Point2<T>]) {
        for w in line.windows(2) {
            let (a, b) = (to_f64(&w[0]), to_f64(&w[1]));
            let len = (b - a).norm();
            self.length += len;
            self.length_x += (a.x + b.x) / 2.0 * len;
            self.length_y += (a.y + b.y) / 2.0 * len;
        }

        line.iter().for_each(|p| self.add_point(to_f64(p)));
    }

    fn add_polygon<T: CoordinateType>(&mut self, polygon: &Polygon<T>) {
        let exterior_sign = ring_area(&polygon.exterior).signum();
        for (index, ring) in polygon.rings().enumerate() {
            let ring_sign = ring_area(ring).signum();
            let sign = if index == 0 {
                exterior_sign
            } else {
                -ring_sign * exterior_sign.abs()
            };

            for (a, b) in ring_edges(ring) {
                let cross = a.x * b.y - b.x * a.y;
                self.area += sign * cross / 2.0;
                self.area_x += sign * (a.x + b.x) * cross;
                self.area_y += sign * (a.y + b.y) * cross;
            }
        }

        let mut outline = polygon.exterior.clone();
        if let Some(first) = outline.first().copied() {
            outline.push(first);
        }
        self.add_line(&outline);
    }

    fn result(&self) -> Option<Point2d> {
        if self.area.abs() > f64::EPSILON {
            Some(Point2d::new(
                self.area_x / (6.0 * self.area),
                self.area_y / (6.0 * self.area),
            ))
        } else if self.length > 0.0 {
            Some(Point2d::new(
                self.length_x / self.length,
                self.length_y / self.length,
            ))
        } else if self.points > 0 {
            Some(Point2d::new(
                self.points_x / self.points as f64,
                self.points_y / self.points as f64,
            ))
        } else {
            None
        }
    }
}
