//! State and helpers shared by the renderer backends.

use std::sync::Arc;

use cartograph_types::algorithms::{centroid, interior_point, middle_point};
use cartograph_types::{Box2d, Geometry, Point2d, Vector2d};
use lyon::math::Transform;
use nalgebra::Matrix3;

use super::marker::{Marker, MarkerCache};
use crate::converter::{
    collect_sub_paths, Clip, ConverterConfig, Simplify, Smooth, SubPath, UserTransform,
};
use crate::feature::{Feature, Variables};
use crate::label::LabelCollisionDetector;
use crate::map::{Layer, Map};
use crate::placement::{PlacementGeometry, PlacementParams, TextPlacementFinder};
use crate::projection::ProjTransform;
use crate::style::{
    CompOp, FeatureTypeStyle, GammaMethod, HaloRasterizer, Key, LabelPlacement, LineCap, LineJoin,
    Properties, PropertyResolver, SymbolizerKind, TextPlacements,
};
use crate::text::{
    FontError, FontRegistry, FontSelector, LayoutOptions, TextShaper,
};
use crate::view::ViewTransform;
use crate::Color;

/// Parameters of a render request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "kebab-case"))]
pub struct RenderOptions {
    /// Multiplier of all pixel sizes of the style (line widths, font sizes, distances).
    pub scale_factor: f64,
    /// Buffer around the image in pixels. Overrides the buffer size of the map.
    pub buffer_size: Option<u32>,
    /// Multiplier of the gamma of every symbolizer.
    pub gamma: f64,
    /// Overrides the halo rasterizer of all text symbolizers.
    pub halo_rasterizer: Option<HaloRasterizer>,
    /// Variables added to the map variables.
    pub variables: Variables,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            buffer_size: None,
            gamma: 1.0,
            halo_rasterizer: None,
            variables: Variables::new(),
        }
    }
}

/// State every backend keeps during a render request: the view, the label collision detector and
/// the resources symbolizers refer to.
pub struct RendererCommon {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) options: RenderOptions,
    pub(crate) view: ViewTransform,
    pub(crate) query_extent: Box2d,
    pub(crate) detector: LabelCollisionDetector,
    pub(crate) shaper: Arc<dyn TextShaper>,
    pub(crate) markers: Arc<MarkerCache>,
    pub(crate) variables: Variables,
    pub(crate) style_defaults: Properties,
}

impl RendererCommon {
    /// Creates the state for rendering the map with the given options.
    pub fn new(map: &Map, options: RenderOptions) -> Self {
        let buffer_size = options.buffer_size.unwrap_or(map.buffer_size());
        let detector_extent = Box2d::new(0.0, 0.0, map.width() as f64, map.height() as f64)
            .pad(buffer_size as f64 * options.scale_factor);

        let mut variables = map.variables().clone();
        variables.extend(options.variables.clone());

        Self {
            width: map.width(),
            height: map.height(),
            view: map.view_transform(),
            query_extent: map.current_extent(),
            detector: LabelCollisionDetector::new(detector_extent),
            shaper: FontRegistry::global(),
            markers: MarkerCache::global(),
            variables,
            style_defaults: Properties::new(),
            options,
        }
    }

    /// Replaces the text shaper (the global font registry by default).
    pub fn set_shaper(&mut self, shaper: Arc<dyn TextShaper>) {
        self.shaper = shaper;
    }

    /// Replaces the marker cache (the global cache by default).
    pub fn set_markers(&mut self, markers: Arc<MarkerCache>) {
        self.markers = markers;
    }

    /// Label collision detector of the request.
    pub fn detector(&self) -> &LabelCollisionDetector {
        &self.detector
    }

    /// Map to pixels transformation.
    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    /// Render options.
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Scale factor of the request.
    pub fn scale_factor(&self) -> f64 {
        self.options.scale_factor
    }

    pub(crate) fn start_map(&mut self, map: &Map) {
        self.width = map.width();
        self.height = map.height();
        self.view = map.view_transform();
        self.query_extent = map.current_extent();

        let mut variables = map.variables().clone();
        variables.extend(self.options.variables.clone());
        self.variables = variables;
    }

    pub(crate) fn start_layer(&mut self, layer: &Layer, query_extent: Box2d) {
        self.query_extent = query_extent;
        if layer.clear_label_cache() {
            log::debug!("Clearing label cache before layer {}", layer.name());
            self.detector.clear();
        }
    }

    pub(crate) fn start_style(&mut self, style: &FeatureTypeStyle) {
        self.style_defaults = style.defaults.clone();
    }

    pub(crate) fn resolver<'a>(
        &'a self,
        kind: SymbolizerKind,
        properties: &'a Properties,
        feature: &'a Feature,
    ) -> PropertyResolver<'a> {
        PropertyResolver::new(
            kind,
            properties,
            Some(&self.style_defaults),
            feature,
            &self.variables,
        )
    }

    /// Converter chain of a symbolizer: optional clipping to the query extent padded by
    /// `padding` pixels, projection into the map SRS, conversion into pixels, the geometry
    /// transform, simplification and smoothing.
    pub(crate) fn converter(
        &self,
        resolver: &PropertyResolver,
        prj_trans: &ProjTransform,
        clip: Option<fn(Box2d) -> Clip>,
        padding: f64,
    ) -> ConverterConfig {
        let mut config = ConverterConfig::new();

        if let Some(clip) = clip {
            if resolver.bool(Key::Clip) && self.query_extent.is_valid() {
                let padding = padding * self.query_extent.width() / self.width.max(1) as f64;
                config = config.with_clip(clip(self.query_extent.pad(padding)));
            }
        }

        if !prj_trans.is_identity() {
            let prj_trans = prj_trans.clone();
            config = config
                .with_user_transform(UserTransform::new(move |p| prj_trans.forward(&p).ok()));
        }

        config = config.with_view(self.view);

        let scale_factor = self.options.scale_factor;
        if let Some(matrix) = resolver.transform(Key::GeometryTransform, scale_factor) {
            config = config.with_affine(matrix);
        }

        let algorithm = resolver
            .enumeration(Key::SimplifyAlgorithm)
            .unwrap_or(crate::style::SimplifyAlgorithm::RadialDistance);
        config = config.with_simplify(Simplify::new(
            algorithm,
            resolver.f64_or(Key::Simplify, 0.0) * scale_factor,
        ));
        config.with_smooth(Smooth::new(resolver.f64_or(Key::Smooth, 0.0)))
    }

    /// Paths of all feature geometries passed through the converter.
    pub(crate) fn paths(&self, feature: &Feature, config: &ConverterConfig) -> Vec<SubPath> {
        feature
            .geometries()
            .iter()
            .flat_map(|geometry| collect_sub_paths(config.apply(geometry.vertices())))
            .collect()
    }

    /// Pixel space geometry for label and marker placement.
    pub(crate) fn placement_geometry(
        &self,
        feature: &Feature,
        resolver: &PropertyResolver,
        prj_trans: &ProjTransform,
        placement: LabelPlacement,
    ) -> PlacementGeometry {
        let config = self.converter(resolver, prj_trans, Some(Clip::Line), 0.0);
        let affine = resolver.transform(Key::GeometryTransform, self.options.scale_factor);

        let mut anchors = vec![];
        for geometry in feature.geometries() {
            collect_anchors(geometry, placement, &mut anchors);
        }

        let anchors = anchors
            .into_iter()
            .filter_map(|p| prj_trans.forward(&p).ok())
            .map(|p| self.view.forward(&p))
            .map(|p| match &affine {
                Some(matrix) => matrix.transform_point(&p),
                None => p,
            })
            .collect();

        PlacementGeometry {
            anchors,
            paths: self.paths(feature, &config),
        }
    }
}

/// Polygonal and linear geometries of the feature, collections flattened.
pub(crate) fn split_geometries(feature: &Feature) -> (Vec<&Geometry>, Vec<&Geometry>) {
    fn split<'a>(
        geometry: &'a Geometry,
        polygons: &mut Vec<&'a Geometry>,
        lines: &mut Vec<&'a Geometry>,
    ) {
        match geometry {
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::LinearRing(_) => {
                polygons.push(geometry)
            }
            Geometry::LineString(_) | Geometry::MultiLineString(_) => lines.push(geometry),
            Geometry::Collection(items) => {
                for item in items {
                    split(item, polygons, lines);
                }
            }
            Geometry::Empty | Geometry::Point(_) | Geometry::MultiPoint(_) => {}
        }
    }

    let mut polygons = vec![];
    let mut lines = vec![];
    for geometry in feature.geometries() {
        split(geometry, &mut polygons, &mut lines);
    }
    (polygons, lines)
}

fn collect_anchors(geometry: &Geometry, placement: LabelPlacement, anchors: &mut Vec<Point2d>) {
    match geometry {
        Geometry::Empty => {}
        Geometry::Point(p) => anchors.push(*p),
        Geometry::MultiPoint(points) => anchors.extend(points.iter().copied()),
        Geometry::LineString(_) => anchors.extend(middle_point(geometry)),
        Geometry::MultiLineString(lines) => anchors.extend(
            lines
                .iter()
                .filter_map(|line| middle_point(&Geometry::LineString(line.clone()))),
        ),
        Geometry::LinearRing(_) | Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
            let point = if placement == LabelPlacement::Interior {
                interior_point(geometry)
            } else {
                centroid(geometry)
            };
            anchors.extend(point);
        }
        Geometry::Collection(items) => {
            for item in items {
                collect_anchors(item, placement, anchors);
            }
        }
    }
}

/// Converts an affine matrix into the lyon transform.
pub fn to_lyon_transform(matrix: &Matrix3<f64>) -> Transform {
    Transform::new(
        matrix[(0, 0)] as f32,
        matrix[(1, 0)] as f32,
        matrix[(0, 1)] as f32,
        matrix[(1, 1)] as f32,
        matrix[(0, 2)] as f32,
        matrix[(1, 2)] as f32,
    )
}

/// Dash pattern of the stroke in pixels. A pattern of an odd length is repeated twice, invalid or
/// all-zero patterns disable dashing.
pub fn dash_array(resolver: &PropertyResolver, scale_factor: f64) -> Option<Vec<f64>> {
    let text = resolver.string(Key::StrokeDasharray)?;
    let mut values = vec![];
    for part in text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
    {
        match part.parse::<f64>() {
            Ok(v) if v >= 0.0 => values.push(v * scale_factor),
            _ => {
                log::warn!("Invalid dash array '{text}'");
                return None;
            }
        }
    }

    if values.len() % 2 == 1 {
        values.extend_from_within(..);
    }

    values.iter().any(|v| *v > 0.0).then_some(values)
}

/// Resolved parameters of a line symbolizer.
#[derive(Debug, Clone, PartialEq)]
pub struct LineStyle {
    /// Stroke color with the stroke opacity applied.
    pub color: Color,
    /// Width in pixels.
    pub width: f64,
    /// Join shape.
    pub join: LineJoin,
    /// End shape.
    pub cap: LineCap,
    /// Miter limit.
    pub miter_limit: f64,
    /// Dash pattern in pixels.
    pub dash: Option<Vec<f64>>,
    /// Offset of the dash pattern in pixels.
    pub dash_offset: f64,
    /// Parallel offset of the line in pixels.
    pub offset: f64,
    /// Gamma function.
    pub gamma_method: GammaMethod,
    /// Gamma value.
    pub gamma: f64,
    /// Compositing operation.
    pub comp_op: CompOp,
}

impl LineStyle {
    /// Reads the line properties. Sizes are multiplied by `scale_factor`.
    pub fn from_resolver(resolver: &PropertyResolver, scale_factor: f64) -> Self {
        let opacity = resolver.f64_or(Key::StrokeOpacity, 1.0);
        Self {
            color: resolver
                .color(Key::Stroke)
                .unwrap_or(Color::BLACK)
                .with_opacity(opacity),
            width: resolver.f64_or(Key::StrokeWidth, 1.0) * scale_factor,
            join: resolver.enumeration(Key::StrokeLinejoin).unwrap_or(LineJoin::Miter),
            cap: resolver.enumeration(Key::StrokeLinecap).unwrap_or(LineCap::Butt),
            miter_limit: resolver.f64_or(Key::StrokeMiterlimit, 4.0),
            dash: dash_array(resolver, scale_factor),
            dash_offset: resolver.f64_or(Key::StrokeDashoffset, 0.0) * scale_factor,
            offset: resolver.f64_or(Key::Offset, 0.0) * scale_factor,
            gamma_method: resolver.enumeration(Key::StrokeGammaMethod).unwrap_or_default(),
            gamma: resolver.f64_or(Key::StrokeGamma, 1.0),
            comp_op: resolver.enumeration(Key::CompOp).unwrap_or_default(),
        }
    }
}

/// Resolved parameters of a polygon symbolizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonStyle {
    /// Fill color with the fill opacity applied.
    pub color: Color,
    /// Gamma function.
    pub gamma_method: GammaMethod,
    /// Gamma value.
    pub gamma: f64,
    /// Compositing operation.
    pub comp_op: CompOp,
}

impl PolygonStyle {
    /// Reads the polygon properties.
    pub fn from_resolver(resolver: &PropertyResolver) -> Self {
        Self {
            color: resolver
                .color(Key::Fill)
                .unwrap_or(Color::GRAY)
                .with_opacity(resolver.f64_or(Key::FillOpacity, 1.0)),
            gamma_method: resolver.enumeration(Key::GammaMethod).unwrap_or_default(),
            gamma: resolver.f64_or(Key::Gamma, 1.0),
            comp_op: resolver.enumeration(Key::CompOp).unwrap_or_default(),
        }
    }
}

/// Resolved colors of a text or shield symbolizer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    /// Text color with the opacity applied.
    pub fill: Color,
    /// Halo color with the halo opacity applied.
    pub halo_fill: Color,
    /// Halo radius in pixels.
    pub halo_radius: f64,
    /// How the halo is drawn.
    pub halo_rasterizer: HaloRasterizer,
    /// Compositing operation.
    pub comp_op: CompOp,
}

impl TextStyle {
    /// Reads the text properties. The halo radius is multiplied by the scale factor of the options,
    /// and the halo rasterizer of the options overrides the symbolizer one.
    pub fn from_resolver(resolver: &PropertyResolver, options: &RenderOptions) -> Self {
        let opacity = resolver.f64_or(Key::Opacity, 1.0);
        Self {
            fill: resolver
                .color(Key::Fill)
                .unwrap_or(Color::BLACK)
                .with_opacity(opacity),
            halo_fill: resolver
                .color(Key::HaloFill)
                .unwrap_or(Color::WHITE)
                .with_opacity(resolver.f64_or(Key::HaloOpacity, 1.0) * opacity),
            halo_radius: resolver.f64_or(Key::HaloRadius, 0.0).max(0.0) * options.scale_factor,
            halo_rasterizer: options
                .halo_rasterizer
                .or_else(|| resolver.enumeration(Key::HaloRasterizer))
                .unwrap_or_default(),
            comp_op: resolver.enumeration(Key::CompOp).unwrap_or_default(),
        }
    }

    /// Returns true if the halo has to be drawn.
    pub fn has_halo(&self) -> bool {
        self.halo_radius > 0.0 && !self.halo_fill.is_transparent()
    }
}

/// Resolved parameters of a markers symbolizer.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    /// Fill of vector markers with the fill opacity applied.
    pub fill: Color,
    /// Outline of vector markers with the stroke opacity applied.
    pub stroke: Color,
    /// Outline width in pixels.
    pub stroke_width: f64,
    /// Opacity of the whole marker.
    pub opacity: f64,
    /// Transform of the marker around its center.
    pub transform: Option<Matrix3<f64>>,
    /// Compositing operation.
    pub comp_op: CompOp,
}

impl MarkerStyle {
    /// Reads the marker properties.
    pub fn from_resolver(resolver: &PropertyResolver, scale_factor: f64) -> Self {
        Self {
            fill: resolver
                .color(Key::Fill)
                .unwrap_or(Color::BLUE)
                .with_opacity(resolver.f64_or(Key::FillOpacity, 1.0)),
            stroke: resolver
                .color(Key::Stroke)
                .unwrap_or(Color::WHITE)
                .with_opacity(resolver.f64_or(Key::StrokeOpacity, 1.0)),
            stroke_width: resolver.f64_or(Key::StrokeWidth, 0.5) * scale_factor,
            opacity: resolver.f64_or(Key::Opacity, 1.0).clamp(0.0, 1.0),
            transform: resolver.transform(Key::Transform, scale_factor),
            comp_op: resolver.enumeration(Key::CompOp).unwrap_or_default(),
        }
    }
}

/// Size of a marker in pixels.
///
/// Vector markers use `width` and `height` (a missing one takes the value of the other). Images
/// keep their own size unless the symbolizer sets one of the dimensions explicitly, in which case
/// the aspect ratio of the image is kept.
pub fn marker_size(resolver: &PropertyResolver, marker: &Marker, scale_factor: f64) -> (f64, f64) {
    let explicit = |key| resolver.is_set(key).then(|| resolver.f64(key)).flatten();
    let width = explicit(Key::Width);
    let height = explicit(Key::Height);

    let (w, h) = match (marker.image_size(), width, height) {
        (Some(size), None, None) => size,
        (Some((iw, ih)), Some(w), None) if iw > 0.0 => (w, w * ih / iw),
        (Some((iw, ih)), None, Some(h)) if ih > 0.0 => (h * iw / ih, h),
        (_, Some(w), Some(h)) => (w, h),
        (_, Some(w), None) => (w, w),
        (_, None, Some(h)) => (h, h),
        (None, None, None) => {
            let w = resolver.f64_or(Key::Width, 10.0);
            (w, resolver.f64_or(Key::Height, w))
        }
    };

    (w.max(0.0) * scale_factor, h.max(0.0) * scale_factor)
}

/// Font of a text symbolizer: the face name takes precedence over the fontset.
pub fn font_selector(resolver: &PropertyResolver) -> Result<FontSelector, FontError> {
    if let Some(face) = resolver.string(Key::FaceName).filter(|s| !s.is_empty()) {
        return Ok(FontSelector::Face(face));
    }
    if let Some(fontset) = resolver.string(Key::FontsetName).filter(|s| !s.is_empty()) {
        return Ok(FontSelector::Fontset(fontset));
    }

    Err(FontError::NoFace)
}

/// Layout parameters of a text symbolizer. Sizes are multiplied by `scale_factor`.
pub fn layout_options(resolver: &PropertyResolver, scale_factor: f64) -> LayoutOptions {
    let defaults = LayoutOptions::default();
    LayoutOptions {
        size: resolver.f64_or(Key::Size, defaults.size) * scale_factor,
        wrap_width: resolver.f64_or(Key::WrapWidth, 0.0) * scale_factor,
        character_spacing: resolver.f64_or(Key::CharacterSpacing, 0.0) * scale_factor,
        line_spacing: resolver.f64_or(Key::LineSpacing, 0.0) * scale_factor,
        text_transform: resolver
            .enumeration(Key::TextTransform)
            .unwrap_or(defaults.text_transform),
        horizontal_alignment: resolver
            .enumeration(Key::HorizontalAlignment)
            .unwrap_or(defaults.horizontal_alignment),
        vertical_alignment: resolver
            .enumeration(Key::VerticalAlignment)
            .unwrap_or(defaults.vertical_alignment),
        displacement: Vector2d::new(
            resolver.f64_or(Key::Dx, 0.0) * scale_factor,
            resolver.f64_or(Key::Dy, 0.0) * scale_factor,
        ),
    }
}

/// Placement finder for the label of a text or shield symbolizer. Returns `Ok(None)` if the label
/// text is empty.
pub fn text_finder<'a>(
    shaper: &'a dyn TextShaper,
    resolver: &PropertyResolver,
    placements: &TextPlacements,
    options: &RenderOptions,
) -> Result<Option<TextPlacementFinder<'a>>, FontError> {
    let Some(text) = resolver.string(Key::Name).filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    let scale_factor = options.scale_factor;
    let font = font_selector(resolver)?;
    let layout = layout_options(resolver, scale_factor);
    let attempts = placements
        .attempts(
            resolver.f64_or(Key::Dx, 0.0),
            resolver.f64_or(Key::Dy, 0.0),
            resolver.f64_or(Key::Size, 10.0),
        )
        .into_iter()
        .map(|mut attempt| {
            attempt.dx *= scale_factor;
            attempt.dy *= scale_factor;
            attempt.size *= scale_factor;
            attempt
        })
        .collect();
    let params = PlacementParams::from_resolver(resolver, scale_factor);
    let halo_radius = resolver.f64_or(Key::HaloRadius, 0.0) * scale_factor;

    Ok(Some(
        TextPlacementFinder::new(shaper, text, font, layout, params)
            .with_attempts(attempts)
            .with_halo_radius(halo_radius),
    ))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use cartograph_types::projection::Srs;

    use super::*;
    use crate::datasource::MemoryDatasource;
    use crate::feature::Context;
    use crate::style::{LineSymbolizer, Symbolizer, TextSymbolizer};

    fn map() -> Map {
        let mut map = Map::new(100, 100, Srs::WebMercator).with_buffer_size(10);
        map.zoom_to_box(Box2d::new(0.0, 0.0, 1000.0, 1000.0));
        map
    }

    fn feature() -> Feature {
        Feature::new(1, Arc::new(Context::new(["name"])))
            .with("name", "Main street")
            .with_geometry(Geometry::LineString(vec![
                Point2d::new(100.0, 500.0),
                Point2d::new(900.0, 500.0),
            ]))
    }

    #[test]
    fn detector_extent_includes_buffer() {
        let common = RendererCommon::new(&map(), RenderOptions::default());
        assert_eq!(common.detector().extent(), Box2d::new(-10.0, -10.0, 110.0, 110.0));

        let scaled = RendererCommon::new(
            &map(),
            RenderOptions {
                scale_factor: 2.0,
                buffer_size: Some(5),
                ..Default::default()
            },
        );
        assert_eq!(scaled.detector().extent(), Box2d::new(-10.0, -10.0, 110.0, 110.0));
    }

    #[test]
    fn layer_clears_label_cache() {
        let mut common = RendererCommon::new(&map(), RenderOptions::default());
        common.detector.insert(Box2d::new(0.0, 0.0, 10.0, 10.0));

        let layer = Layer::new("roads", Arc::new(MemoryDatasource::new()));
        common.start_layer(&layer, Box2d::new(0.0, 0.0, 1000.0, 1000.0));
        assert_eq!(common.detector().len(), 1);

        let layer = layer.with_clear_label_cache(true);
        common.start_layer(&layer, Box2d::new(0.0, 0.0, 1000.0, 1000.0));
        assert!(common.detector().is_empty());
    }

    #[test]
    fn converter_projects_into_pixels() {
        let common = RendererCommon::new(&map(), RenderOptions::default());
        let feature = feature();
        let symbolizer = Symbolizer::from(LineSymbolizer::new());
        let resolver = common.resolver(symbolizer.kind(), symbolizer.properties(), &feature);
        let prj = ProjTransform::identity(&Srs::WebMercator);

        let config = common.converter(&resolver, &prj, Some(Clip::Line), 0.0);
        assert!(config.clip().is_some());
        let paths = common.paths(&feature, &config);
        assert_eq!(paths.len(), 1);
        assert_abs_diff_eq!(paths[0].points[0], Point2d::new(10.0, 50.0), epsilon = 1e-9);
        assert_abs_diff_eq!(paths[0].points[1], Point2d::new(90.0, 50.0), epsilon = 1e-9);

        let symbolizer = Symbolizer::from(LineSymbolizer::new().with(Key::Clip, false));
        let resolver = common.resolver(symbolizer.kind(), symbolizer.properties(), &feature);
        assert!(common.converter(&resolver, &prj, Some(Clip::Line), 0.0).clip().is_none());
    }

    #[test]
    fn placement_anchors() {
        let common = RendererCommon::new(&map(), RenderOptions::default());
        let feature = feature();
        let symbolizer = Symbolizer::from(TextSymbolizer::default());
        let resolver = common.resolver(symbolizer.kind(), symbolizer.properties(), &feature);
        let prj = ProjTransform::identity(&Srs::WebMercator);

        let geometry = common.placement_geometry(&feature, &resolver, &prj, LabelPlacement::Point);
        assert_eq!(geometry.anchors.len(), 1);
        assert_abs_diff_eq!(geometry.anchors[0], Point2d::new(50.0, 50.0), epsilon = 1e-9);
        assert_eq!(geometry.paths.len(), 1);
    }

    #[test]
    fn marker_sizes_follow_style_defaults() {
        let feature = feature();
        let variables = Variables::new();
        let image = Marker::Image(crate::image::ImageRgba8::new(20, 10));
        let shape = Marker::Shape(crate::render::marker::Shape::Square);
        let size = |properties: &Properties, defaults: Option<&Properties>, marker: &Marker| {
            let resolver = PropertyResolver::new(
                SymbolizerKind::Markers,
                properties,
                defaults,
                &feature,
                &variables,
            );
            marker_size(&resolver, marker, 2.0)
        };

        let none = Properties::new();
        let width = Properties::new().with(Key::Width, 8.0);
        let height = Properties::new().with(Key::Height, 5.0);

        assert_eq!(size(&width, None, &shape), (16.0, 16.0));
        assert_eq!(size(&none, None, &image), (40.0, 20.0));
        assert_eq!(size(&height, None, &image), (20.0, 10.0));
        assert_eq!(size(&none, Some(&width), &image), (16.0, 8.0));
        assert_eq!(size(&height, Some(&width), &image), (16.0, 10.0));
    }

    #[test]
    fn dash_arrays() {
        let feature = feature();
        let variables = Variables::new();
        let dash = |text: &str| {
            let symbolizer =
                Symbolizer::from(LineSymbolizer::new().with(Key::StrokeDasharray, text));
            let resolver = symbolizer.resolver(None, &feature, &variables);
            dash_array(&resolver, 2.0)
        };

        assert_eq!(dash("4, 2"), Some(vec![8.0, 4.0]));
        assert_eq!(dash("3"), Some(vec![6.0, 6.0]));
        assert_eq!(dash("1 2 3"), Some(vec![2.0, 4.0, 6.0, 2.0, 4.0, 6.0]));
        assert_eq!(dash("0,0"), None);
        assert_eq!(dash("a,b"), None);
    }

    #[test]
    fn text_without_font_is_an_error() {
        let feature = feature();
        let variables = Variables::new();
        let shaper = crate::text::testing::BoxShaper;
        let options = RenderOptions::default();

        let symbolizer = TextSymbolizer::new("[name]".parse().unwrap());
        let resolver = PropertyResolver::new(
            SymbolizerKind::Text,
            &symbolizer.properties,
            None,
            &feature,
            &variables,
        );
        assert!(matches!(
            text_finder(&shaper, &resolver, &symbolizer.placements, &options),
            Err(FontError::NoFace)
        ));

        let symbolizer = symbolizer.with(Key::FaceName, "DejaVu Sans Book");
        let resolver = PropertyResolver::new(
            SymbolizerKind::Text,
            &symbolizer.properties,
            None,
            &feature,
            &variables,
        );
        assert!(matches!(
            text_finder(&shaper, &resolver, &symbolizer.placements, &options),
            Ok(Some(_))
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn options_from_json() {
        let options: RenderOptions =
            serde_json::from_str(r#"{"scale-factor": 2.0, "halo-rasterizer": "fast"}"#).unwrap();
        assert_eq!(options.scale_factor, 2.0);
        assert_eq!(options.halo_rasterizer, Some(HaloRasterizer::Fast));
        assert_eq!(options.gamma, 1.0);
    }
}
