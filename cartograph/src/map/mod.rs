//! [`Map`] is a set of layers and styles together with the output size and the extent to render.

use std::collections::BTreeMap;

use cartograph_types::projection::Srs;
use cartograph_types::Box2d;

use crate::error::CartographError;
use crate::feature::{Value, Variables};
use crate::projection::ProjTransform;
use crate::style::FeatureTypeStyle;
use crate::view::ViewTransform;
use crate::Color;

mod layer;

pub use layer::Layer;

/// Size of a pixel in meters assumed by scale denominator computations (0.28 mm).
pub const PIXEL_SIZE: f64 = 0.00028;

const METERS_PER_DEGREE: f64 = 6_378_137.0 * 2.0 * std::f64::consts::PI / 360.0;

/// Scale denominator for the given map scale (map units per pixel).
pub fn scale_denominator(scale: f64, geographic: bool) -> f64 {
    let denominator = scale / PIXEL_SIZE;
    if geographic {
        denominator * METERS_PER_DEGREE
    } else {
        denominator
    }
}

/// Map definition: output size, spatial reference system, styles and layers.
#[derive(Debug, Clone)]
pub struct Map {
    width: u32,
    height: u32,
    srs: Srs,
    background: Option<Color>,
    styles: BTreeMap<String, FeatureTypeStyle>,
    layers: Vec<Layer>,
    buffer_size: u32,
    maximum_extent: Option<Box2d>,
    current_extent: Box2d,
    variables: Variables,
}

impl Map {
    /// Creates an empty map of the given size in pixels.
    pub fn new(width: u32, height: u32, srs: Srs) -> Self {
        Self {
            width,
            height,
            srs,
            background: None,
            styles: BTreeMap::new(),
            layers: vec![],
            buffer_size: 0,
            maximum_extent: None,
            current_extent: Box2d::invalid(),
            variables: Variables::new(),
        }
    }

    /// Sets background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background = Some(color);
        self
    }

    /// Adds a style. A style with the same name is replaced.
    pub fn with_style(mut self, name: impl Into<String>, style: FeatureTypeStyle) -> Self {
        self.insert_style(name, style);
        self
    }

    /// Adds a layer.
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Sets the buffer around the rendered extent (pixels) used to query features.
    pub fn with_buffer_size(mut self, buffer_size: u32) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Limits the extent the map can be zoomed to.
    pub fn with_maximum_extent(mut self, extent: Box2d) -> Self {
        self.maximum_extent = Some(extent);
        self
    }

    /// Sets a map variable available in expressions as `@name`.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Adds or replaces a style.
    pub fn insert_style(&mut self, name: impl Into<String>, style: FeatureTypeStyle) {
        let name = name.into();
        if self.styles.insert(name.clone(), style).is_some() {
            log::debug!("Style '{name}' is replaced");
        }
    }

    /// Adds a layer.
    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Spatial reference system of the map.
    pub fn srs(&self) -> &Srs {
        &self.srs
    }

    /// Background color.
    pub fn background(&self) -> Option<Color> {
        self.background
    }

    /// Style by name.
    pub fn style(&self, name: &str) -> Option<&FeatureTypeStyle> {
        self.styles.get(name)
    }

    /// All styles.
    pub fn styles(&self) -> &BTreeMap<String, FeatureTypeStyle> {
        &self.styles
    }

    /// Layers in drawing order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Mutable access to the layers.
    pub fn layers_mut(&mut self) -> &mut Vec<Layer> {
        &mut self.layers
    }

    /// Buffer size in pixels.
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Maximum extent.
    pub fn maximum_extent(&self) -> Option<Box2d> {
        self.maximum_extent
    }

    /// Map variables.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Extent that will be rendered.
    pub fn current_extent(&self) -> Box2d {
        self.current_extent
    }

    /// Changes the output size. The extent is adjusted to keep the aspect ratio.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        if self.current_extent.is_valid() {
            self.zoom_to_box(self.current_extent);
        }
    }

    /// Sets the rendered extent. The box is grown in one dimension to match the aspect ratio of the
    /// output and clipped to the maximum extent.
    pub fn zoom_to_box(&mut self, bbox: Box2d) {
        let mut bbox = bbox;
        if let Some(max) = self.maximum_extent {
            let clipped = bbox.intersect(&max);
            if clipped.is_valid() {
                bbox = clipped;
            }
        }

        self.current_extent = self.fix_aspect_ratio(bbox);
    }

    fn fix_aspect_ratio(&self, bbox: Box2d) -> Box2d {
        if !bbox.is_valid() || self.width == 0 || self.height == 0 {
            return bbox;
        }

        let ratio_map = self.width as f64 / self.height as f64;
        let (width, height) = (bbox.width(), bbox.height());
        if height <= 0.0 || width <= 0.0 {
            return bbox;
        }

        if width / height > ratio_map {
            bbox.with_size(width, width / ratio_map)
        } else {
            bbox.with_size(height * ratio_map, height)
        }
    }

    /// Zooms to the extent of all layers.
    pub fn zoom_all(&mut self) -> Result<(), CartographError> {
        let mut extent = Box2d::invalid();
        for layer in self.layers.iter().filter(|l| l.is_active()) {
            let envelope = layer.envelope();
            if !envelope.is_valid() {
                continue;
            }

            let transform = ProjTransform::new(layer.srs(), &self.srs)?;
            match transform.forward_box(&envelope) {
                Ok(projected) => extent.expand_to_include(&projected),
                Err(err) => log::warn!("Extent of layer '{}' is ignored: {err}", layer.name()),
            }
        }

        if !extent.is_valid() {
            return Err(CartographError::Config(
                "cannot zoom to the map extent: no layer has data".into(),
            ));
        }

        self.zoom_to_box(extent);
        Ok(())
    }

    /// Map units per pixel.
    pub fn scale(&self) -> f64 {
        if self.width == 0 {
            return 0.0;
        }

        self.current_extent.width() / self.width as f64
    }

    /// Scale denominator of the current extent.
    pub fn scale_denominator(&self) -> f64 {
        scale_denominator(self.scale(), self.srs.is_geographic())
    }

    /// Transform between the map coordinates and pixels of the output.
    pub fn view_transform(&self) -> ViewTransform {
        ViewTransform::new(self.width, self.height, self.current_extent)
    }

    /// Checks that the map can be rendered.
    pub fn validate(&self) -> Result<(), CartographError> {
        if self.width == 0 || self.height == 0 {
            return Err(CartographError::Config(format!(
                "invalid map size {}x{}",
                self.width, self.height
            )));
        }
        if !self.current_extent.is_valid() {
            return Err(CartographError::Config("map extent is not set".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use cartograph_types::Point2d;

    use super::*;
    use crate::datasource::MemoryDatasource;
    use crate::feature::{Context, Feature};

    #[test]
    fn zoom_keeps_aspect_ratio() {
        let mut map = Map::new(200, 100, Srs::WebMercator);
        map.zoom_to_box(Box2d::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(map.current_extent(), Box2d::new(-50.0, 0.0, 150.0, 100.0));

        map.zoom_to_box(Box2d::new(0.0, 0.0, 400.0, 100.0));
        assert_eq!(map.current_extent(), Box2d::new(0.0, -50.0, 400.0, 150.0));

        map.resize(100, 100);
        assert_eq!(map.current_extent(), Box2d::new(0.0, -150.0, 400.0, 250.0));
    }

    #[test]
    fn maximum_extent_clips() {
        let mut map =
            Map::new(100, 100, Srs::WebMercator).with_maximum_extent(Box2d::new(0.0, 0.0, 10.0, 10.0));
        map.zoom_to_box(Box2d::new(-100.0, -100.0, 5.0, 5.0));
        assert_eq!(map.current_extent(), Box2d::new(0.0, 0.0, 5.0, 5.0));
    }

    #[test]
    fn scale_denominators() {
        let mut map = Map::new(256, 256, Srs::WebMercator);
        map.zoom_to_box(Box2d::new(-20037508.34, -20037508.34, 20037508.34, 20037508.34));
        assert_abs_diff_eq!(map.scale_denominator(), 559_082_264.0, epsilon = 1.0);

        let mut map = Map::new(360, 180, Srs::Wgs84);
        map.zoom_to_box(Box2d::new(-180.0, -90.0, 180.0, 90.0));
        assert_abs_diff_eq!(map.scale(), 1.0);
        assert_abs_diff_eq!(
            map.scale_denominator(),
            METERS_PER_DEGREE / PIXEL_SIZE,
            epsilon = 1e-3
        );
    }

    #[test]
    fn zoom_all_projects_layer_extents() {
        let context = Arc::new(Context::default());
        let datasource: MemoryDatasource = [
            Feature::new(1, context.clone()).with_geometry(Point2d::new(-10.0, -10.0)),
            Feature::new(2, context).with_geometry(Point2d::new(10.0, 10.0)),
        ]
        .into_iter()
        .collect();

        let mut map =
            Map::new(100, 100, Srs::WebMercator).with_layer(Layer::new("points", Arc::new(datasource)));
        map.zoom_all().unwrap();
        let extent = map.current_extent();
        assert_abs_diff_eq!(extent.max_y(), 1_118_889.97, epsilon = 0.1);
        assert_abs_diff_eq!(extent.max_x(), extent.max_y(), epsilon = 1e-6);
        assert_abs_diff_eq!(extent.min_x(), -extent.max_x(), epsilon = 1e-6);

        let mut empty = Map::new(100, 100, Srs::WebMercator);
        assert!(empty.zoom_all().is_err());
        assert!(empty.validate().is_err());
    }
}
