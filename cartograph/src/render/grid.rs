//! Hit grid backend.
//!
//! Instead of colors every pixel of a [`Grid`] stores the key of the feature drawn on top of it.
//! The grid is encoded into the [UTFGrid](https://github.com/mapbox/utfgrid-spec) JSON format.

use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use cartograph_types::{Box2d, Geometry, Point2d};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use super::common::{
    marker_size, text_finder, LineStyle, MarkerStyle, RenderOptions, RendererCommon,
};
use super::group;
use super::marker::{centered_box, Marker, MarkerCache};
use super::raster::{FillRule, Rasterizer, Stroke};
use super::{RenderResult, Renderer};
use crate::converter::{collect_sub_paths, Clip, SubPath};
use crate::feature::{Feature, Value};
use crate::map::{Layer, Map};
use crate::placement::{placement_matrix, MarkersPlacementFinder, PlacementParams};
use crate::projection::ProjTransform;
use crate::style::{
    BuildingSymbolizer, FeatureTypeStyle, GroupSymbolizer, Key, LinePatternSymbolizer,
    LineSymbolizer, MarkersSymbolizer, PointSymbolizer, PolygonPatternSymbolizer,
    PolygonSymbolizer, Properties, SymbolizerKind, TextSymbolizer,
};
use crate::text::TextShaper;

/// Name of the key field that uses feature ids as keys.
pub const ID_KEY: &str = "__id__";

/// Minimum coverage of a pixel to be assigned to a feature.
const COVERAGE_THRESHOLD: f32 = 0.5;

/// Feature keys of every pixel of a map image.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: u32,
    height: u32,
    key_field: String,
    /// Index into `keys` plus one, zero for empty pixels.
    pixels: Vec<u32>,
    keys: Vec<String>,
    data: Vec<JsonMap<String, JsonValue>>,
    index: HashMap<String, u32>,
}

impl Grid {
    /// Creates an empty grid. Features are identified by the value of the `key_field` attribute,
    /// or by their ids if the field is [`ID_KEY`].
    pub fn new(width: u32, height: u32, key_field: impl Into<String>) -> Self {
        Self {
            width,
            height,
            key_field: key_field.into(),
            pixels: vec![0; width as usize * height as usize],
            keys: vec![],
            data: vec![],
            index: HashMap::new(),
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Attribute used as the feature key.
    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Number of distinct features in the grid.
    pub fn feature_count(&self) -> usize {
        self.keys.len()
    }

    /// Key of the feature at the pixel.
    pub fn key_at(&self, x: u32, y: u32) -> Option<&str> {
        if x >= self.width || y >= self.height {
            return None;
        }

        match self.pixels[(y * self.width + x) as usize] {
            0 => None,
            id => self.keys.get(id as usize - 1).map(String::as_str),
        }
    }

    /// Attributes stored for the feature key.
    pub fn attributes(&self, key: &str) -> Option<&JsonMap<String, JsonValue>> {
        let id = self.index.get(key)?;
        self.data.get(*id as usize - 1)
    }

    /// Registers a feature and returns its pixel id. Features with the same key share the id, the
    /// attributes of the first one are kept.
    fn add_feature(&mut self, key: String, attributes: JsonMap<String, JsonValue>) -> u32 {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }

        self.keys.push(key.clone());
        self.data.push(attributes);
        let id = self.keys.len() as u32;
        self.index.insert(key, id);
        id
    }

    fn set_span(&mut self, y: u32, x: u32, len: u32, id: u32) {
        let start = (y * self.width + x) as usize;
        for pixel in &mut self.pixels[start..start + len as usize] {
            *pixel = id;
        }
    }

    /// Encodes the grid as UTFGrid JSON sampling every `resolution`-th pixel.
    ///
    /// Keys are numbered in the order they first appear scanning the rows top to bottom, the
    /// empty key `""` is always the first one.
    pub fn encode_utf(&self, resolution: u32) -> JsonValue {
        let resolution = resolution.max(1) as usize;
        let mut codes: HashMap<u32, char> = HashMap::new();
        let mut keys = vec![JsonValue::String(String::new())];
        let mut data = JsonMap::new();
        codes.insert(0, utf_code(0));

        let mut rows = vec![];
        for y in (0..self.height).step_by(resolution) {
            let mut row = String::new();
            for x in (0..self.width).step_by(resolution) {
                let id = self.pixels[(y * self.width + x) as usize];
                let code = match codes.get(&id) {
                    Some(code) => *code,
                    None => {
                        let code = utf_code(keys.len());
                        codes.insert(id, code);

                        let key = &self.keys[id as usize - 1];
                        keys.push(JsonValue::String(key.clone()));
                        let attributes = &self.data[id as usize - 1];
                        if !attributes.is_empty() {
                            data.insert(key.clone(), JsonValue::Object(attributes.clone()));
                        }
                        code
                    }
                };
                row.push(code);
            }
            rows.push(JsonValue::String(row));
        }

        json!({
            "grid": rows,
            "keys": keys,
            "data": data,
        })
    }
}

/// UTFGrid character of the key index: `32 + index`, skipping `"`, `\` and the surrogate block.
///
/// Indices past the last code point all share `char::MAX`.
fn utf_code(index: usize) -> char {
    let mut code = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(32);
    if code >= 34 {
        code = code.saturating_add(1);
    }
    if code >= 92 {
        code = code.saturating_add(1);
    }
    if code >= 0xD800 {
        code = code.saturating_add(0x800);
    }
    char::from_u32(code).unwrap_or(char::MAX)
}

fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::Integer(v) => JsonValue::from(*v),
        Value::Double(v) => JsonValue::from(*v),
        Value::String(v) => JsonValue::String(v.clone()),
    }
}

/// Renders the map into a hit [`Grid`].
///
/// Areas drawn by polygon, line, building, marker, point and label symbolizers are assigned to the
/// feature. Labels and markers take part in the collision detection the same way they do in the
/// raster backend.
pub struct GridRenderer {
    common: RendererCommon,
    grid: Grid,
    attributes: Vec<String>,
    rasterizer: Rasterizer,
}

impl GridRenderer {
    /// Creates a renderer producing a grid of the map size keyed by `key_field`.
    pub fn new(map: &Map, key_field: impl Into<String>, options: RenderOptions) -> Self {
        Self {
            common: RendererCommon::new(map, options),
            grid: Grid::new(map.width(), map.height(), key_field),
            attributes: vec![],
            rasterizer: Rasterizer::new(map.width(), map.height()),
        }
    }

    /// Sets the attributes stored in the grid for every feature.
    pub fn with_attributes(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.attributes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Uses the given text shaper instead of the global font registry.
    pub fn with_shaper(mut self, shaper: Arc<dyn TextShaper>) -> Self {
        self.common.set_shaper(shaper);
        self
    }

    /// Uses the given marker cache instead of the global one.
    pub fn with_markers(mut self, markers: Arc<MarkerCache>) -> Self {
        self.common.set_markers(markers);
        self
    }

    /// State shared with the other backends.
    pub fn common(&self) -> &RendererCommon {
        &self.common
    }

    /// Grid rendered so far.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Takes the rendered grid.
    pub fn into_grid(self) -> Grid {
        self.grid
    }

    fn feature_key(&self, feature: &Feature) -> Option<String> {
        if self.grid.key_field == ID_KEY {
            return Some(feature.id().to_string());
        }

        match feature.get(&self.grid.key_field) {
            Value::Null => None,
            value => Some(value.to_string()),
        }
    }

    /// Assigns the pixels accumulated in the rasterizer to the feature.
    fn mark(&mut self, feature: &Feature) {
        let mut spans = vec![];
        self.rasterizer.sweep(|y, x, len, coverage| {
            if coverage >= COVERAGE_THRESHOLD {
                spans.push((y, x, len));
            }
        });
        if spans.is_empty() {
            return;
        }

        let Some(key) = self.feature_key(feature) else {
            log::debug!(
                "Feature {} has no '{}' attribute and is not added to the grid",
                feature.id(),
                self.grid.key_field
            );
            return;
        };

        let attributes = self
            .attributes
            .iter()
            .map(|name| (name.clone(), to_json(feature.get(name))))
            .collect();
        let id = self.grid.add_feature(key, attributes);
        for (y, x, len) in spans {
            self.grid.set_span(y, x, len, id);
        }
    }

    fn mark_boxes(&mut self, boxes: impl IntoIterator<Item = Box2d>, feature: &Feature) {
        self.rasterizer.reset();
        for bbox in boxes {
            let corners = bbox.corners();
            self.rasterizer.move_to(corners[0]);
            for corner in &corners[1..] {
                self.rasterizer.line_to(*corner);
            }
            self.rasterizer.close();
        }
        self.mark(feature);
    }

    fn polygons(
        &mut self,
        kind: SymbolizerKind,
        properties: &Properties,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let resolver = self.common.resolver(kind, properties, feature);
        let config = self
            .common
            .converter(&resolver, prj_trans, Some(Clip::Polygon), 1.0);
        let paths: Vec<SubPath> = feature
            .geometries()
            .iter()
            .filter(|geometry| is_polygonal(geometry))
            .flat_map(|geometry| collect_sub_paths(config.apply(geometry.vertices())))
            .collect();

        self.rasterizer.reset();
        self.rasterizer.set_fill_rule(FillRule::EvenOdd);
        self.rasterizer.add_sub_paths(&paths);
        self.mark(feature);
        Ok(())
    }

    fn lines(
        &mut self,
        kind: SymbolizerKind,
        properties: &Properties,
        feature: &Feature,
        prj_trans: &ProjTransform,
        width: Option<f64>,
    ) -> RenderResult {
        let resolver = self.common.resolver(kind, properties, feature);
        let style = LineStyle::from_resolver(&resolver, self.common.options.scale_factor);
        let width = width.unwrap_or(style.width);
        let paths = self.common.paths(
            feature,
            &self
                .common
                .converter(&resolver, prj_trans, Some(Clip::Line), width),
        );

        self.rasterizer.reset();
        Stroke {
            width,
            ..Stroke::from(&style)
        }
        .add_sub_paths(&paths, &mut self.rasterizer);
        self.mark(feature);
        Ok(())
    }

    fn marker_boxes(
        &mut self,
        kind: SymbolizerKind,
        properties: &Properties,
        feature: &Feature,
        prj_trans: &ProjTransform,
        default_file: Option<&str>,
    ) -> RenderResult {
        let scale_factor = self.common.options.scale_factor;
        let resolver = self.common.resolver(kind, properties, feature);
        let (size, transform) = match resolver.string(Key::File).as_deref().or(default_file) {
            Some(file) => {
                let marker = self.common.markers.get(file)?;
                let size = marker_size(&resolver, &marker, scale_factor);
                let style = MarkerStyle::from_resolver(&resolver, scale_factor);
                (size, style.transform)
            }
            None => ((4.0 * scale_factor, 4.0 * scale_factor), None),
        };
        let params = PlacementParams::from_resolver(&resolver, scale_factor);
        let geometry =
            self.common
                .placement_geometry(feature, &resolver, prj_trans, params.placement);

        let mut marker_box = centered_box(size.0, size.1);
        if let Some(transform) = &transform {
            marker_box = marker_box.transform(transform);
        }

        let mut boxes = vec![];
        let mut finder = MarkersPlacementFinder::new(&geometry, marker_box, params);
        while let Some(placement) = finder.next(&mut self.common.detector) {
            boxes.push(
                marker_box.transform(&placement_matrix(placement.position, placement.angle)),
            );
        }

        self.mark_boxes(boxes, feature);
        Ok(())
    }
}

fn is_polygonal(geometry: &Geometry) -> bool {
    match geometry {
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::LinearRing(_) => true,
        Geometry::Collection(items) => items.iter().any(is_polygonal),
        _ => false,
    }
}

impl Renderer for GridRenderer {
    fn start_map_processing(&mut self, map: &Map) -> RenderResult {
        self.common.start_map(map);
        if self.grid.width != map.width() || self.grid.height != map.height() {
            let key_field = std::mem::take(&mut self.grid.key_field);
            self.grid = Grid::new(map.width(), map.height(), key_field);
            self.rasterizer = Rasterizer::new(map.width(), map.height());
        }
        Ok(())
    }

    fn start_layer_processing(&mut self, layer: &Layer, query_extent: Box2d) {
        self.common.start_layer(layer, query_extent);
    }

    fn start_style_processing(&mut self, style: &FeatureTypeStyle) {
        self.common.start_style(style);
    }

    fn process_point(
        &mut self,
        symbolizer: &PointSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.marker_boxes(
            SymbolizerKind::Point,
            &symbolizer.properties,
            feature,
            prj_trans,
            None,
        )
    }

    fn process_line(
        &mut self,
        symbolizer: &LineSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.lines(
            SymbolizerKind::Line,
            &symbolizer.properties,
            feature,
            prj_trans,
            None,
        )
    }

    fn process_line_pattern(
        &mut self,
        symbolizer: &LinePatternSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let resolver =
            self.common
                .resolver(SymbolizerKind::LinePattern, &symbolizer.properties, feature);
        let width = match resolver.string(Key::File) {
            Some(file) => match self.common.markers.get(&file)?.as_ref() {
                Marker::Image(image) => image.height() as f64,
                Marker::Shape(_) => 1.0,
            },
            None => 1.0,
        };
        self.lines(
            SymbolizerKind::LinePattern,
            &symbolizer.properties,
            feature,
            prj_trans,
            Some(width),
        )
    }

    fn process_polygon(
        &mut self,
        symbolizer: &PolygonSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.polygons(
            SymbolizerKind::Polygon,
            &symbolizer.properties,
            feature,
            prj_trans,
        )
    }

    fn process_polygon_pattern(
        &mut self,
        symbolizer: &PolygonPatternSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.polygons(
            SymbolizerKind::PolygonPattern,
            &symbolizer.properties,
            feature,
            prj_trans,
        )
    }

    fn process_shield(
        &mut self,
        symbolizer: &TextSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.process_text(symbolizer, feature, prj_trans)
    }

    fn process_text(
        &mut self,
        symbolizer: &TextSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let shaper = self.common.shaper.clone();
        let resolver = self
            .common
            .resolver(SymbolizerKind::Text, &symbolizer.properties, feature);
        let Some(finder) = text_finder(
            shaper.as_ref(),
            &resolver,
            &symbolizer.placements,
            &self.common.options,
        )?
        else {
            return Ok(());
        };

        let geometry = self.common.placement_geometry(
            feature,
            &resolver,
            prj_trans,
            finder.params().placement,
        );
        let placements = finder.find(&geometry, &mut self.common.detector)?;
        let boxes: Vec<Box2d> = placements
            .into_iter()
            .flat_map(|p| p.bboxes.into_iter().chain(p.shield))
            .collect();
        self.mark_boxes(boxes, feature);
        Ok(())
    }

    fn process_building(
        &mut self,
        symbolizer: &BuildingSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.polygons(
            SymbolizerKind::Building,
            &symbolizer.properties,
            feature,
            prj_trans,
        )
    }

    fn process_markers(
        &mut self,
        symbolizer: &MarkersSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.marker_boxes(
            SymbolizerKind::Markers,
            &symbolizer.properties,
            feature,
            prj_trans,
            Some("shape://ellipse"),
        )
    }

    fn process_group(
        &mut self,
        symbolizer: &GroupSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let (layout, anchors) =
            group::render_group(&mut self.common, symbolizer, feature, prj_trans)?;
        let boxes: Vec<Box2d> = anchors
            .iter()
            .map(|anchor: &Point2d| layout.bbox.translate(anchor.x, anchor.y))
            .collect();
        self.mark_boxes(boxes, feature);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cartograph_types::projection::Srs;
    use cartograph_types::Polygon;

    use super::*;
    use crate::datasource::MemoryDatasource;
    use crate::feature::Context;
    use crate::style::Symbolizer;
    use crate::text::testing::BoxShaper;

    fn map(width: u32, height: u32) -> Map {
        let mut map = Map::new(width, height, Srs::WebMercator);
        map.zoom_to_box(Box2d::new(0.0, 0.0, width as f64, height as f64));
        map
    }

    fn rect(id: i64, name: &str, min_x: f64, max_x: f64, height: f64) -> Feature {
        Feature::new(id, Arc::new(Context::new(["name"])))
            .with("name", name)
            .with_geometry(Geometry::Polygon(Polygon::new(
                vec![
                    Point2d::new(min_x, 0.0),
                    Point2d::new(max_x, 0.0),
                    Point2d::new(max_x, height),
                    Point2d::new(min_x, height),
                ],
                vec![],
            )))
    }

    fn render(
        map: &Map,
        renderer: &mut GridRenderer,
        symbolizer: impl Into<Symbolizer>,
        features: &[Feature],
    ) {
        let layer = Layer::new("test", Arc::new(MemoryDatasource::new()));
        let style = FeatureTypeStyle::default();
        let symbolizer = symbolizer.into();
        let prj_trans = ProjTransform::identity(&Srs::WebMercator);

        renderer.start_map_processing(map).unwrap();
        renderer.start_layer_processing(&layer, map.current_extent());
        renderer.start_style_processing(&style);
        for feature in features {
            renderer.process(&symbolizer, feature, &prj_trans).unwrap();
        }
        renderer.end_style_processing(&style);
        renderer.end_layer_processing(&layer);
        renderer.end_map_processing(map).unwrap();
    }

    #[test]
    fn utf_codes_skip_quote_and_backslash() {
        assert_eq!(utf_code(0), ' ');
        assert_eq!(utf_code(1), '!');
        assert_eq!(utf_code(2), '#');
        assert_eq!(utf_code(58), '[');
        assert_eq!(utf_code(59), ']');
    }

    #[test]
    fn utf_codes_skip_surrogates() {
        assert_eq!(utf_code(55_261), '\u{D7FF}');
        assert_eq!(utf_code(55_262), '\u{E000}');
        assert_eq!(utf_code(2_000_000), char::MAX);

        let codes: std::collections::HashSet<char> = (0..70_000).map(utf_code).collect();
        assert_eq!(codes.len(), 70_000);
    }

    #[test]
    fn polygons_in_grid() {
        let map = map(4, 2);
        let mut renderer = GridRenderer::new(&map, "name", RenderOptions::default())
            .with_attributes(["name"]);
        render(
            &map,
            &mut renderer,
            PolygonSymbolizer::new(),
            &[rect(1, "left", 0.0, 2.0, 2.0), rect(2, "right", 3.0, 4.0, 2.0)],
        );

        let grid = renderer.grid();
        assert_eq!(grid.key_at(0, 0), Some("left"));
        assert_eq!(grid.key_at(2, 1), None);
        assert_eq!(grid.key_at(3, 1), Some("right"));
        assert_eq!(grid.feature_count(), 2);

        assert_eq!(
            grid.encode_utf(1),
            json!({
                "grid": ["!! #", "!! #"],
                "keys": ["", "left", "right"],
                "data": {
                    "left": {"name": "left"},
                    "right": {"name": "right"},
                },
            })
        );
    }

    #[test]
    fn resolution_and_ids() {
        let map = map(4, 2);
        let mut renderer = GridRenderer::new(&map, ID_KEY, RenderOptions::default());
        render(
            &map,
            &mut renderer,
            PolygonSymbolizer::new(),
            &[rect(42, "a", 2.0, 4.0, 2.0)],
        );

        assert_eq!(
            renderer.grid().encode_utf(2),
            json!({
                "grid": [" !"],
                "keys": ["", "42"],
                "data": {},
            })
        );
    }

    #[test]
    fn later_features_are_on_top() {
        let map = map(4, 2);
        let mut renderer = GridRenderer::new(&map, "name", RenderOptions::default());
        render(
            &map,
            &mut renderer,
            PolygonSymbolizer::new(),
            &[rect(1, "bottom", 0.0, 4.0, 2.0), rect(2, "top", 1.0, 2.0, 2.0)],
        );

        let grid = renderer.grid();
        assert_eq!(grid.key_at(0, 0), Some("bottom"));
        assert_eq!(grid.key_at(1, 0), Some("top"));
        assert_eq!(grid.key_at(2, 0), Some("bottom"));
    }

    #[test]
    fn features_without_key_are_skipped() {
        let map = map(4, 2);
        let mut renderer = GridRenderer::new(&map, "missing", RenderOptions::default());
        render(
            &map,
            &mut renderer,
            PolygonSymbolizer::new(),
            &[rect(1, "a", 0.0, 4.0, 2.0)],
        );
        assert_eq!(renderer.grid().feature_count(), 0);
    }

    #[test]
    fn text_label_boxes() {
        let map = map(100, 100);
        let mut renderer = GridRenderer::new(&map, "name", RenderOptions::default())
            .with_shaper(Arc::new(BoxShaper));
        let feature = Feature::new(1, Arc::new(Context::new(["name"])))
            .with("name", "ab")
            .with_geometry(Geometry::Point(Point2d::new(50.0, 50.0)));
        let symbolizer = TextSymbolizer::new("[name]".parse().unwrap()).with(Key::FaceName, "Box");
        render(&map, &mut renderer, symbolizer, &[feature]);

        assert_eq!(renderer.grid().key_at(50, 50), Some("ab"));
        assert_eq!(renderer.grid().key_at(10, 10), None);
        assert_eq!(renderer.common().detector().len(), 1);
    }
}
