use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use cartograph_types::projection::Srs;
use cartograph_types::Box2d;

use crate::datasource::Datasource;

/// A datasource and the names of the styles its features are drawn with.
#[derive(Clone)]
pub struct Layer {
    name: String,
    datasource: Option<Arc<dyn Datasource>>,
    styles: Vec<String>,
    srs: Srs,
    min_scale: f64,
    max_scale: f64,
    active: bool,
    clear_label_cache: bool,
    cache_features: bool,
    buffer_size: Option<u32>,
    maximum_extent: Option<Box2d>,
}

impl Debug for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("has_datasource", &self.datasource.is_some())
            .field("styles", &self.styles)
            .field("srs", &self.srs)
            .field("min_scale", &self.min_scale)
            .field("max_scale", &self.max_scale)
            .field("active", &self.active)
            .finish()
    }
}

impl Layer {
    /// Creates an active layer in WGS84 without styles.
    pub fn new(name: impl Into<String>, datasource: Arc<dyn Datasource>) -> Self {
        Self {
            name: name.into(),
            datasource: Some(datasource),
            styles: vec![],
            srs: Srs::Wgs84,
            min_scale: 0.0,
            max_scale: f64::MAX,
            active: true,
            clear_label_cache: false,
            cache_features: false,
            buffer_size: None,
            maximum_extent: None,
        }
    }

    /// Creates a layer without a datasource. Such layers are skipped by the renderer.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            datasource: None,
            ..Self::new(name, Arc::new(crate::datasource::MemoryDatasource::new()))
        }
    }

    /// Adds a style name.
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.styles.push(style.into());
        self
    }

    /// Replaces style names.
    pub fn with_styles<S: Into<String>>(mut self, styles: impl IntoIterator<Item = S>) -> Self {
        self.styles = styles.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the spatial reference system of the layer data.
    pub fn with_srs(mut self, srs: Srs) -> Self {
        self.srs = srs;
        self
    }

    /// Sets the scale denominator range the layer is visible in: `[min, max)`.
    pub fn with_scale_range(mut self, min_scale: f64, max_scale: f64) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    /// Sets the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Requests clearing of the label collision state before the layer is rendered.
    pub fn with_clear_label_cache(mut self, clear: bool) -> Self {
        self.clear_label_cache = clear;
        self
    }

    /// Requests to read features once and keep them in memory for all styles of the layer.
    pub fn with_cache_features(mut self, cache: bool) -> Self {
        self.cache_features = cache;
        self
    }

    /// Sets the buffer around the map extent (pixels), overriding the map buffer size.
    pub fn with_buffer_size(mut self, buffer_size: u32) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Limits queries of the layer to the extent (in layer coordinates).
    pub fn with_maximum_extent(mut self, extent: Box2d) -> Self {
        self.maximum_extent = Some(extent);
        self
    }

    /// Name of the layer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Datasource of the layer.
    pub fn datasource(&self) -> Option<&Arc<dyn Datasource>> {
        self.datasource.as_ref()
    }

    /// Style names.
    pub fn styles(&self) -> &[String] {
        &self.styles
    }

    /// Spatial reference system of the data.
    pub fn srs(&self) -> &Srs {
        &self.srs
    }

    /// Returns true if the layer is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sets active flag.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Returns true if the layer is active and the scale denominator is in the layer range.
    pub fn is_visible(&self, scale_denominator: f64) -> bool {
        self.active && self.min_scale <= scale_denominator && scale_denominator < self.max_scale
    }

    /// Returns true if the label collision state is cleared before the layer.
    pub fn clear_label_cache(&self) -> bool {
        self.clear_label_cache
    }

    /// Returns true if features are cached for all styles.
    pub fn cache_features(&self) -> bool {
        self.cache_features
    }

    /// Buffer size of the layer.
    pub fn buffer_size(&self) -> Option<u32> {
        self.buffer_size
    }

    /// Maximum extent of the layer.
    pub fn maximum_extent(&self) -> Option<Box2d> {
        self.maximum_extent
    }

    /// Extent of the layer data.
    pub fn envelope(&self) -> Box2d {
        self.datasource
            .as_ref()
            .map(|ds| ds.envelope())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility() {
        let layer = Layer::empty("roads").with_scale_range(1000.0, 50000.0);
        assert!(!layer.is_visible(999.0));
        assert!(layer.is_visible(1000.0));
        assert!(!layer.is_visible(50000.0));
        assert!(!layer.clone().with_active(false).is_visible(2000.0));
        assert!(layer.datasource().is_none());
        assert!(!layer.envelope().is_valid());
    }
}
