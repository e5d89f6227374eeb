use geo_types::{Coord, CoordNum, LineString as GeoLineString, Polygon as GeoPolygon};
use nalgebra::Point2;

use crate::error::TypesError;
use crate::geometry::CoordinateType;
use crate::{Geometry, Polygon};

fn point<T: CoordinateType + CoordNum>(coord: &Coord<T>) -> Point2<T> {
    Point2::new(coord.x, coord.y)
}

fn line<T: CoordinateType + CoordNum>(line: &GeoLineString<T>) -> Vec<Point2<T>> {
    line.0.iter().map(point).collect()
}

fn polygon<T: CoordinateType + CoordNum>(polygon: &GeoPolygon<T>) -> Polygon<T> {
    Polygon::new(
        line(polygon.exterior()),
        polygon.interiors().iter().map(line).collect(),
    )
}

impl<T: CoordinateType + CoordNum> From<geo_types::Geometry<T>> for Geometry<T> {
    fn from(value: geo_types::Geometry<T>) -> Self {
        match value {
            geo_types::Geometry::Point(p) => Geometry::Point(point(&p.0)),
            geo_types::Geometry::Line(l) => {
                Geometry::LineString(vec![point(&l.start), point(&l.end)])
            }
            geo_types::Geometry::LineString(l) => Geometry::LineString(line(&l)),
            geo_types::Geometry::Polygon(p) => Geometry::Polygon(polygon(&p)),
            geo_types::Geometry::MultiPoint(mp) => {
                Geometry::MultiPoint(mp.0.iter().map(|p| point(&p.0)).collect())
            }
            geo_types::Geometry::MultiLineString(ml) => {
                Geometry::MultiLineString(ml.0.iter().map(line).collect())
            }
            geo_types::Geometry::MultiPolygon(mp) => {
                Geometry::MultiPolygon(mp.0.iter().map(polygon).collect())
            }
            geo_types::Geometry::GeometryCollection(gc) => {
                Geometry::Collection(gc.0.into_iter().map(Geometry::from).collect())
            }
            geo_types::Geometry::Rect(r) => Geometry::Polygon(polygon(&r.to_polygon())),
            geo_types::Geometry::Triangle(t) => Geometry::Polygon(polygon(&t.to_polygon())),
        }
    }
}

impl<T: CoordinateType + CoordNum> TryFrom<Geometry<T>> for geo_types::Geometry<T> {
    type Error = TypesError;

    fn try_from(value: Geometry<T>) -> Result<Self, Self::Error> {
        fn to_line<T: CoordinateType + CoordNum>(points: &[Point2<T>]) -> GeoLineString<T> {
            GeoLineString::new(points.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
        }

        fn to_polygon<T: CoordinateType + CoordNum>(p: &Polygon<T>) -> GeoPolygon<T> {
            GeoPolygon::new(
                to_line(&p.exterior),
                p.interiors.iter().map(|r| to_line(r)).collect(),
            )
        }

        Ok(match value {
            Geometry::Empty => {
                return Err(TypesError::Conversion(
                    "empty geometry has no geo-types counterpart".into(),
                ))
            }
            Geometry::Point(p) => geo_types::Geometry::Point(geo_types::Point::new(p.x, p.y)),
            Geometry::LineString(l) => geo_types::Geometry::LineString(to_line(&l)),
            Geometry::LinearRing(r) => {
                geo_types::Geometry::Polygon(GeoPolygon::new(to_line(&r), vec![]))
            }
            Geometry::Polygon(p) => geo_types::Geometry::Polygon(to_polygon(&p)),
            Geometry::MultiPoint(points) => geo_types::Geometry::MultiPoint(
                points
                    .iter()
                    .map(|p| geo_types::Point::new(p.x, p.y))
                    .collect(),
            ),
            Geometry::MultiLineString(lines) => geo_types::Geometry::MultiLineString(
                geo_types::MultiLineString::new(lines.iter().map(|l| to_line(l)).collect()),
            ),
            Geometry::MultiPolygon(polygons) => geo_types::Geometry::MultiPolygon(
                geo_types::MultiPolygon::new(polygons.iter().map(to_polygon).collect()),
            ),
            Geometry::Collection(items) => {
                geo_types::Geometry::GeometryCollection(geo_types::GeometryCollection::new_from(
                    items
                        .into_iter()
                        .filter(|g| !matches!(g, Geometry::Empty))
                        .map(geo_types::Geometry::try_from)
                        .collect::<Result<Vec<_>, _>>()?,
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;

    #[test]
    fn closed_geo_polygon_is_closed_once() {
        let polygon = geo_types::Polygon::new(
            geo_types::LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        let geometry = Geometry::from(geo_types::Geometry::Polygon(polygon));
        let commands: Vec<_> = geometry.vertices().map(|v| v.cmd).collect();
        assert_eq!(
            commands,
            vec![
                Command::MoveTo,
                Command::LineTo,
                Command::LineTo,
                Command::Close
            ]
        );
    }

    #[test]
    fn back_conversion() {
        let geometry = Geometry::MultiPoint(vec![Point2::new(1.0, 2.0)]);
        let geo: geo_types::Geometry<f64> = geometry.try_into().expect("convertible");
        assert_eq!(geo, geo_types::Geometry::MultiPoint(vec![(1.0, 2.0)].into()));

        assert!(geo_types::Geometry::<f64>::try_from(Geometry::<f64>::Empty).is_err());
    }
}
