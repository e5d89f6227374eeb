//! Coordinate transformation between the layer and the map spatial reference systems.

use cartograph_types::projection::{Projection, Srs, WebMercator};
use cartograph_types::{Box2d, Point2d};

use crate::error::TransformError;

const BOX_EDGE_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Identity,
    GeographicToMercator(WebMercator),
    MercatorToGeographic(WebMercator),
}

/// Transformation from the `source` (layer) to the `dest` (map) spatial reference system.
///
/// `forward` converts layer coordinates into map coordinates, `backward` does the opposite. Failures are
/// reported per call: the renderer drops the vertices that cannot be transformed.
#[derive(Debug, Clone)]
pub struct ProjTransform {
    source: Srs,
    dest: Srs,
    kind: Kind,
}

impl ProjTransform {
    /// Creates a new transform. Returns an error if the transformation between the systems is not known.
    pub fn new(source: &Srs, dest: &Srs) -> Result<Self, TransformError> {
        let kind = match (source, dest) {
            (a, b) if a == b => Kind::Identity,
            (Srs::Wgs84, Srs::WebMercator) => Kind::GeographicToMercator(WebMercator::default()),
            (Srs::WebMercator, Srs::Wgs84) => Kind::MercatorToGeographic(WebMercator::default()),
            _ => {
                return Err(TransformError::Unsupported {
                    from: source.to_string(),
                    to: dest.to_string(),
                })
            }
        };

        Ok(Self {
            source: source.clone(),
            dest: dest.clone(),
            kind,
        })
    }

    /// Transform that doesn't change coordinates.
    pub fn identity(srs: &Srs) -> Self {
        Self {
            source: srs.clone(),
            dest: srs.clone(),
            kind: Kind::Identity,
        }
    }

    /// Returns true if the source and the destination systems are equal.
    pub fn is_identity(&self) -> bool {
        matches!(self.kind, Kind::Identity)
    }

    /// Source (layer) system.
    pub fn source(&self) -> &Srs {
        &self.source
    }

    /// Destination (map) system.
    pub fn dest(&self) -> &Srs {
        &self.dest
    }

    /// Converts a point from the source system into the destination one.
    pub fn forward(&self, point: &Point2d) -> Result<Point2d, TransformError> {
        let result = match self.kind {
            Kind::Identity => Some(*point),
            Kind::GeographicToMercator(projection) => projection.project(point),
            Kind::MercatorToGeographic(projection) => projection.unproject(point),
        };

        result.ok_or(TransformError::OutOfDomain(point.x, point.y))
    }

    /// Converts a point from the destination system into the source one.
    pub fn backward(&self, point: &Point2d) -> Result<Point2d, TransformError> {
        let result = match self.kind {
            Kind::Identity => Some(*point),
            Kind::GeographicToMercator(projection) => projection.unproject(point),
            Kind::MercatorToGeographic(projection) => projection.project(point),
        };

        result.ok_or(TransformError::OutOfDomain(point.x, point.y))
    }

    /// Converts a box from the source system into the destination one. Box edges are sampled, so the
    /// result contains the whole transformed area even if the edges become curved.
    pub fn forward_box(&self, bbox: &Box2d) -> Result<Box2d, TransformError> {
        self.transform_box(bbox, |p| self.forward(p))
    }

    /// Converts a box from the destination system into the source one.
    pub fn backward_box(&self, bbox: &Box2d) -> Result<Box2d, TransformError> {
        self.transform_box(bbox, |p| self.backward(p))
    }

    fn transform_box(
        &self,
        bbox: &Box2d,
        transform: impl Fn(&Point2d) -> Result<Point2d, TransformError>,
    ) -> Result<Box2d, TransformError> {
        if self.is_identity() || !bbox.is_valid() {
            return Ok(*bbox);
        }

        let mut result = Box2d::invalid();
        for i in 0..=BOX_EDGE_SAMPLES {
            let t = i as f64 / BOX_EDGE_SAMPLES as f64;
            let x = bbox.min_x() + bbox.width() * t;
            let y = bbox.min_y() + bbox.height() * t;
            for p in [
                Point2d::new(x, bbox.min_y()),
                Point2d::new(x, bbox.max_y()),
                Point2d::new(bbox.min_x(), y),
                Point2d::new(bbox.max_x(), y),
            ] {
                let projected = transform(&p)?;
                result.expand_to_include_point(projected.x, projected.y);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;

    #[test]
    fn geographic_layer_on_mercator_map() {
        let transform = ProjTransform::new(&Srs::Wgs84, &Srs::WebMercator).unwrap();
        let projected = transform.forward(&Point2d::new(180.0, 0.0)).unwrap();
        assert_abs_diff_eq!(projected.x, 20037508.342789244, epsilon = 1e-6);

        let back = transform.backward(&projected).unwrap();
        assert_abs_diff_eq!(back.x, 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(back.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn box_transform() {
        let transform = ProjTransform::new(&Srs::WebMercator, &Srs::Wgs84).unwrap();
        let world = Box2d::new(
            -20037508.342789244,
            -20037508.342789244,
            20037508.342789244,
            20037508.342789244,
        );
        let geographic = transform.forward_box(&world).unwrap();
        assert_abs_diff_eq!(geographic.min_x(), -180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(geographic.max_y(), 85.0511287798, epsilon = 1e-6);
    }

    #[test]
    fn unsupported_pair() {
        let other = Srs::Other("+proj=lcc".into());
        assert_matches!(
            ProjTransform::new(&other, &Srs::Wgs84),
            Err(TransformError::Unsupported { .. })
        );
        assert!(ProjTransform::new(&other, &other).unwrap().is_identity());
    }
}
