use cartograph_types::{Box2d, Point2d};

use super::{Datasource, DatasourceError, DatasourceKind, Featureset, Query};
use crate::feature::Feature;

/// Datasource that keeps all its features in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatasource {
    features: Vec<Feature>,
    extent: Box2d,
    kind: Option<DatasourceKind>,
}

impl MemoryDatasource {
    /// Creates an empty datasource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a feature.
    pub fn push(&mut self, feature: Feature) {
        self.extent.expand_to_include(&feature.envelope());
        self.features.push(feature);
    }

    /// Builder-style version of [`MemoryDatasource::push`].
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.push(feature);
        self
    }

    /// Overrides the reported datasource kind. By default the kind is [`DatasourceKind::Raster`] if any
    /// of the features has a raster payload.
    pub fn with_kind(mut self, kind: DatasourceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if there are no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FromIterator<Feature> for MemoryDatasource {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        let mut ds = Self::new();
        for feature in iter {
            ds.push(feature);
        }

        ds
    }
}

impl Datasource for MemoryDatasource {
    fn features(&self, query: &Query) -> Result<Featureset<'_>, DatasourceError> {
        let bbox = query.bbox;
        Ok(Box::new(
            self.features
                .iter()
                .filter(move |f| f.envelope().intersects(&bbox))
                .cloned()
                .map(Ok),
        ))
    }

    fn features_at_point(
        &self,
        point: Point2d,
        tolerance: f64,
    ) -> Result<Featureset<'_>, DatasourceError> {
        let bbox = Box2d::from_point(point.x, point.y).pad(tolerance);
        self.features(&Query::new(bbox))
    }

    fn envelope(&self) -> Box2d {
        self.extent
    }

    fn kind(&self) -> DatasourceKind {
        self.kind.unwrap_or_else(|| {
            if self.features.iter().any(|f| f.raster().is_some()) {
                DatasourceKind::Raster
            } else {
                DatasourceKind::Vector
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::feature::Context;

    fn datasource() -> MemoryDatasource {
        let context = Arc::new(Context::new(["name"]));
        (0..10)
            .map(|i| {
                Feature::new(i, context.clone())
                    .with("name", format!("f{i}"))
                    .with_geometry(Point2d::new(i as f64, i as f64))
            })
            .collect()
    }

    #[test]
    fn query_by_bbox() {
        let ds = datasource();
        assert_eq!(ds.envelope(), Box2d::new(0.0, 0.0, 9.0, 9.0));

        let ids: Vec<i64> = ds
            .features(&Query::new(Box2d::new(2.0, 2.0, 4.5, 4.5)))
            .unwrap()
            .map(|f| f.unwrap().id())
            .collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn query_at_point() {
        let ds = datasource();
        let ids: Vec<i64> = ds
            .features_at_point(Point2d::new(5.2, 5.0), 0.5)
            .unwrap()
            .map(|f| f.unwrap().id())
            .collect();
        assert_eq!(ids, vec![5]);
        assert_eq!(ds.kind(), DatasourceKind::Vector);
    }
}
