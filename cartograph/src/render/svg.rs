//! SVG backend.
//!
//! Writes polygons and lines as `<path>` elements, markers as `<ellipse>` or `<path>` elements and
//! labels as `<text>` elements, one per glyph.

use std::fmt::Write;
use std::sync::Arc;

use cartograph_types::{Box2d, Point2d};
use lyon::path::{Event, Path};
use nalgebra::{Matrix3, Vector2};

use super::common::{
    font_selector, layout_options, marker_size, split_geometries, text_finder, to_lyon_transform,
    LineStyle, MarkerStyle, PolygonStyle, RenderOptions, RendererCommon, TextStyle,
};
use super::group::{self, DrawIntent};
use super::marker::{centered_box, Marker, MarkerCache, Shape};
use super::{RenderResult, Renderer};
use crate::converter::{Clip, PathGenerator};
use crate::feature::Feature;
use crate::map::{Layer, Map};
use crate::placement::{place_box, placement_matrix, MarkersPlacementFinder, PlacementParams};
use crate::projection::ProjTransform;
use crate::style::{
    FeatureTypeStyle, GlyphSymbolizer, GroupSymbolizer, Key, LineCap, LineJoin, LineSymbolizer,
    MarkersSymbolizer, PointSymbolizer, PolygonSymbolizer, Properties, SymbolizerKind,
    TextSymbolizer,
};
use crate::text::{FontSelector, TextLayout, TextShaper};
use crate::Color;

/// Side of the square drawn by a point symbolizer without an image.
const DEFAULT_POINT_SIZE: f64 = 4.0;

/// Renders the map into an SVG document.
pub struct SvgRenderer {
    common: RendererCommon,
    body: String,
}

fn hex(color: Color) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b())
}

fn opacity(color: Color) -> f64 {
    (color.a() as f64 / 255.0 * 1000.0).round() / 1000.0
}

fn num(v: f64) -> f64 {
    let rounded = (v * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn escape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            c => result.push(c),
        }
    }
    result
}

fn font_family(font: &FontSelector) -> &str {
    match font {
        FontSelector::Face(name) | FontSelector::Fontset(name) => name,
    }
}

/// Path data of a lyon path.
fn lyon_path_data(path: &Path) -> String {
    let mut data = String::new();
    for event in path.iter() {
        if !data.is_empty() {
            data.push(' ');
        }
        let _ = match event {
            Event::Begin { at } => write!(data, "M{} {}", num(at.x as f64), num(at.y as f64)),
            Event::Line { to, .. } => write!(data, "L{} {}", num(to.x as f64), num(to.y as f64)),
            Event::Quadratic { ctrl, to, .. } => write!(
                data,
                "Q{} {} {} {}",
                num(ctrl.x as f64),
                num(ctrl.y as f64),
                num(to.x as f64),
                num(to.y as f64)
            ),
            Event::Cubic {
                ctrl1, ctrl2, to, ..
            } => write!(
                data,
                "C{} {} {} {} {} {}",
                num(ctrl1.x as f64),
                num(ctrl1.y as f64),
                num(ctrl2.x as f64),
                num(ctrl2.y as f64),
                num(to.x as f64),
                num(to.y as f64)
            ),
            Event::End { close: true, .. } => write!(data, "Z"),
            Event::End { close: false, .. } => {
                data.pop();
                Ok(())
            }
        };
    }
    data
}

impl SvgRenderer {
    /// Creates a renderer for the map.
    pub fn new(map: &Map, options: RenderOptions) -> Self {
        Self {
            common: RendererCommon::new(map, options),
            body: String::new(),
        }
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

    /// Complete SVG document.
    pub fn document(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n\
             {body}</svg>\n",
            w = self.common.width,
            h = self.common.height,
            body = self.body
        )
    }

    fn line(&mut self, element: impl AsRef<str>) {
        self.body.push_str(element.as_ref());
        self.body.push('\n');
    }

    fn write_stroke(attrs: &mut String, style: &LineStyle) {
        let _ = write!(
            attrs,
            " fill=\"none\" stroke=\"{}\" stroke-opacity=\"{}\" stroke-width=\"{}\" stroke-linejoin=\"{}\" stroke-linecap=\"{}\"",
            hex(style.color),
            opacity(style.color),
            num(style.width),
            match style.join {
                LineJoin::Miter | LineJoin::MiterRevert => "miter",
                LineJoin::Round => "round",
                LineJoin::Bevel => "bevel",
            },
            match style.cap {
                LineCap::Butt => "butt",
                LineCap::Round => "round",
                LineCap::Square => "square",
            },
        );
        if let Some(dash) = &style.dash {
            let values: Vec<String> = dash.iter().map(|v| num(*v).to_string()).collect();
            let _ = write!(attrs, " stroke-dasharray=\"{}\"", values.join(","));
            if style.dash_offset != 0.0 {
                let _ = write!(attrs, " stroke-dashoffset=\"{}\"", num(style.dash_offset));
            }
        }
    }

    fn marker(
        &mut self,
        marker: &Marker,
        position: Point2d,
        angle: f64,
        size: (f64, f64),
        style: &MarkerStyle,
    ) {
        let (w, h) = size;
        if w <= 0.0 || h <= 0.0 {
            return;
        }

        let mut transform = placement_matrix(position, angle);
        if let Some(marker_transform) = &style.transform {
            transform *= marker_transform;
        }

        let paint = format!(
            "fill=\"{}\" fill-opacity=\"{}\" stroke=\"{}\" stroke-opacity=\"{}\" stroke-width=\"{}\"",
            hex(style.fill),
            num(opacity(style.fill) * style.opacity),
            hex(style.stroke),
            num(opacity(style.stroke) * style.opacity),
            num(style.stroke_width),
        );

        match marker {
            Marker::Shape(Shape::Ellipse) if angle == 0.0 && style.transform.is_none() => {
                self.line(format!(
                    "<ellipse cx=\"{}\" cy=\"{}\" rx=\"{}\" ry=\"{}\" {paint}/>",
                    num(position.x),
                    num(position.y),
                    num(w / 2.0),
                    num(h / 2.0),
                ));
            }
            Marker::Shape(shape) => {
                let matrix = transform * Matrix3::new_nonuniform_scaling(&Vector2::new(w, h));
                let path = shape.path().transformed(&to_lyon_transform(&matrix));
                self.line(format!("<path {paint} d=\"{}\"/>", lyon_path_data(&path)));
            }
            Marker::Image(_) => {
                let bbox = centered_box(w, h).transform(&transform);
                self.line(format!(
                    "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"none\" stroke=\"{}\" stroke-opacity=\"{}\"/>",
                    num(bbox.min_x()),
                    num(bbox.min_y()),
                    num(bbox.width()),
                    num(bbox.height()),
                    hex(style.stroke),
                    num(style.opacity),
                ));
            }
        }
    }

    fn glyph_text(
        &mut self,
        character: char,
        position: Point2d,
        angle: f64,
        size: f64,
        font: &str,
        style: &TextStyle,
    ) {
        if character.is_whitespace() {
            return;
        }

        let mut attrs = format!(
            "x=\"{}\" y=\"{}\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\" fill-opacity=\"{}\"",
            num(position.x),
            num(position.y),
            escape(font),
            num(size),
            hex(style.fill),
            opacity(style.fill),
        );
        if style.has_halo() {
            let _ = write!(
                attrs,
                " stroke=\"{}\" stroke-opacity=\"{}\" stroke-width=\"{}\" paint-order=\"stroke\"",
                hex(style.halo_fill),
                opacity(style.halo_fill),
                num(style.halo_radius * 2.0),
            );
        }
        if angle != 0.0 {
            let _ = write!(
                attrs,
                " transform=\"rotate({} {} {})\"",
                num(angle.to_degrees()),
                num(position.x),
                num(position.y)
            );
        }

        self.line(format!(
            "<text {attrs}>{}</text>",
            escape(&character.to_string())
        ));
    }

    fn layout_text(&mut self, layout: &TextLayout, origin: Point2d, font: &str, style: &TextStyle) {
        for glyph in layout.glyphs() {
            let position = origin + glyph.position.coords + glyph.glyph.offset;
            self.glyph_text(glyph.glyph.character, position, 0.0, layout.size(), font, style);
        }
    }

    fn markers(
        &mut self,
        kind: SymbolizerKind,
        properties: &Properties,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let scale_factor = self.common.options.scale_factor;
        let resolver = self.common.resolver(kind, properties, feature);
        let (marker, size, style) = match resolver.string(Key::File) {
            Some(file) => {
                let marker = self.common.markers.get(&file)?;
                let size = marker_size(&resolver, &marker, scale_factor);
                (marker, size, MarkerStyle::from_resolver(&resolver, scale_factor))
            }
            None if kind == SymbolizerKind::Point => {
                let side = DEFAULT_POINT_SIZE * scale_factor;
                let style = MarkerStyle {
                    fill: Color::BLACK,
                    stroke_width: 0.0,
                    ..MarkerStyle::from_resolver(&resolver, scale_factor)
                };
                (Arc::new(Marker::Shape(Shape::Square)), (side, side), style)
            }
            None => {
                let marker = self.common.markers.get("shape://ellipse")?;
                let size = marker_size(&resolver, &marker, scale_factor);
                (marker, size, MarkerStyle::from_resolver(&resolver, scale_factor))
            }
        };
        let params = PlacementParams::from_resolver(&resolver, scale_factor);
        let geometry =
            self.common
                .placement_geometry(feature, &resolver, prj_trans, params.placement);

        let mut marker_box = centered_box(size.0, size.1);
        if let Some(transform) = &style.transform {
            marker_box = marker_box.transform(transform);
        }

        let mut finder = MarkersPlacementFinder::new(&geometry, marker_box, params);
        while let Some(placement) = finder.next(&mut self.common.detector) {
            self.marker(&marker, placement.position, placement.angle, size, &style);
        }
        Ok(())
    }

    fn label(
        &mut self,
        symbolizer: &TextSymbolizer,
        kind: SymbolizerKind,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let scale_factor = self.common.options.scale_factor;
        let shaper = self.common.shaper.clone();
        let resolver = self.common.resolver(kind, &symbolizer.properties, feature);
        let Some(mut finder) = text_finder(
            shaper.as_ref(),
            &resolver,
            &symbolizer.placements,
            &self.common.options,
        )?
        else {
            return Ok(());
        };
        let font = font_selector(&resolver)?;
        let style = TextStyle::from_resolver(&resolver, &self.common.options);

        let shield = if kind == SymbolizerKind::Shield {
            let file = resolver.string(Key::File).ok_or_else(|| {
                crate::error::CartographError::Config("shield symbolizer requires a file".into())
            })?;
            let marker = self.common.markers.get(&file)?;
            let size = marker_size(&resolver, &marker, scale_factor);
            let dx = resolver.f64_or(Key::ShieldDx, 0.0) * scale_factor;
            let dy = resolver.f64_or(Key::ShieldDy, 0.0) * scale_factor;
            finder = finder.with_shield(centered_box(size.0, size.1).translate(dx, dy));
            Some((marker, size, MarkerStyle::from_resolver(&resolver, scale_factor)))
        } else {
            None
        };

        let geometry = self.common.placement_geometry(
            feature,
            &resolver,
            prj_trans,
            finder.params().placement,
        );
        let placements = finder.find(&geometry, &mut self.common.detector)?;

        for positions in &placements {
            if let (Some((marker, size, marker_style)), Some(bbox)) = (&shield, positions.shield) {
                self.marker(marker, bbox.center(), 0.0, *size, marker_style);
            }
            for glyph in &positions.glyphs {
                self.glyph_text(
                    glyph.glyph.character,
                    glyph.position,
                    glyph.angle,
                    positions.size,
                    font_family(&font),
                    &style,
                );
            }
        }
        Ok(())
    }
}

impl Renderer for SvgRenderer {
    fn start_map_processing(&mut self, map: &Map) -> RenderResult {
        self.common.start_map(map);
        self.body.clear();
        if let Some(background) = map.background() {
            self.line(format!(
                "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"{}\" fill-opacity=\"{}\"/>",
                map.width(),
                map.height(),
                hex(background),
                opacity(background)
            ));
        }
        Ok(())
    }

    fn start_layer_processing(&mut self, layer: &Layer, query_extent: Box2d) {
        self.common.start_layer(layer, query_extent);
        self.line(format!("<g id=\"{}\">", escape(layer.name())));
    }

    fn end_layer_processing(&mut self, _layer: &Layer) {
        self.line("</g>");
    }

    fn start_style_processing(&mut self, style: &FeatureTypeStyle) {
        self.common.start_style(style);
        if style.opacity < 1.0 {
            self.line(format!("<g opacity=\"{}\">", num(style.opacity)));
        }
    }

    fn end_style_processing(&mut self, style: &FeatureTypeStyle) {
        if style.opacity < 1.0 {
            self.line("</g>");
        }
    }

    fn process_point(
        &mut self,
        symbolizer: &PointSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.markers(
            SymbolizerKind::Point,
            &symbolizer.properties,
            feature,
            prj_trans,
        )
    }

    fn process_line(
        &mut self,
        symbolizer: &LineSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let resolver = self
            .common
            .resolver(SymbolizerKind::Line, &symbolizer.properties, feature);
        let style = LineStyle::from_resolver(&resolver, self.common.options.scale_factor);
        let line_config =
            self.common
                .converter(&resolver, prj_trans, Some(Clip::Line), style.width);
        let polygon_config =
            self.common
                .converter(&resolver, prj_trans, Some(Clip::Polygon), style.width);

        let (polygons, lines) = split_geometries(feature);
        let mut generator = PathGenerator::new();
        for geometry in lines {
            generator.add_path(line_config.apply(geometry.vertices()));
        }
        for geometry in polygons {
            generator.add_path(polygon_config.apply(geometry.vertices()));
        }
        if generator.is_empty() {
            return Ok(());
        }

        let mut attrs = String::new();
        Self::write_stroke(&mut attrs, &style);
        self.line(format!("<path{attrs} d=\"{}\"/>", generator.finish()));
        Ok(())
    }

    fn process_polygon(
        &mut self,
        symbolizer: &PolygonSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let resolver =
            self.common
                .resolver(SymbolizerKind::Polygon, &symbolizer.properties, feature);
        let style = PolygonStyle::from_resolver(&resolver);
        let config = self
            .common
            .converter(&resolver, prj_trans, Some(Clip::Polygon), 1.0);

        let (polygons, _) = split_geometries(feature);
        let mut generator = PathGenerator::new();
        for geometry in polygons {
            generator.add_path(config.apply(geometry.vertices()));
        }
        if generator.is_empty() {
            return Ok(());
        }

        self.line(format!(
            "<path fill=\"{}\" fill-opacity=\"{}\" fill-rule=\"evenodd\" d=\"{}\"/>",
            hex(style.color),
            opacity(style.color),
            generator.finish()
        ));
        Ok(())
    }

    fn process_shield(
        &mut self,
        symbolizer: &TextSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.label(symbolizer, SymbolizerKind::Shield, feature, prj_trans)
    }

    fn process_text(
        &mut self,
        symbolizer: &TextSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.label(symbolizer, SymbolizerKind::Text, feature, prj_trans)
    }

    fn process_markers(
        &mut self,
        symbolizer: &MarkersSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.markers(
            SymbolizerKind::Markers,
            &symbolizer.properties,
            feature,
            prj_trans,
        )
    }

    fn process_glyph(
        &mut self,
        symbolizer: &GlyphSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let scale_factor = self.common.options.scale_factor;
        let shaper = self.common.shaper.clone();
        let resolver = self
            .common
            .resolver(SymbolizerKind::Glyph, &symbolizer.properties, feature);
        let Some(character) = resolver.string(Key::Char).filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        let font = font_selector(&resolver)?;
        let layout = TextLayout::new(
            shaper.as_ref(),
            &character,
            &font,
            &layout_options(&resolver, scale_factor),
        )?;
        let angle = resolver.f64_or(Key::Angle, 0.0).to_radians();
        let style = TextStyle::from_resolver(&resolver, &self.common.options);
        let params = PlacementParams::from_resolver(&resolver, scale_factor);
        let geometry =
            self.common
                .placement_geometry(feature, &resolver, prj_trans, params.placement);

        for anchor in geometry.anchors {
            let bbox = place_box(&layout.bbox(), anchor, angle);
            if !params.allow_overlap && !self.common.detector.has_placement(&bbox) {
                continue;
            }
            if !params.ignore_placement {
                self.common.detector.insert(bbox);
            }

            let matrix = placement_matrix(anchor, angle);
            for glyph in layout.glyphs() {
                let position =
                    matrix.transform_point(&(glyph.position + glyph.glyph.offset));
                self.glyph_text(
                    glyph.glyph.character,
                    position,
                    angle,
                    layout.size(),
                    font_family(&font),
                    &style,
                );
            }
        }
        Ok(())
    }

    fn process_group(
        &mut self,
        symbolizer: &GroupSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let (layout, anchors) =
            group::render_group(&mut self.common, symbolizer, feature, prj_trans)?;

        for anchor in anchors {
            for intent in &layout.intents {
                match intent {
                    DrawIntent::Text {
                        layout,
                        style,
                        offset,
                    } => self.layout_text(layout, anchor + offset, "sans-serif", style),
                    DrawIntent::Marker {
                        marker,
                        size,
                        style,
                        offset,
                    } => self.marker(marker, anchor + offset, 0.0, *size, style),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cartograph_types::projection::Srs;
    use cartograph_types::{Geometry, Polygon};

    use super::*;
    use crate::datasource::MemoryDatasource;
    use crate::feature::Context;
    use crate::style::Symbolizer;
    use crate::text::testing::BoxShaper;

    fn map() -> Map {
        let mut map = Map::new(100, 50, Srs::WebMercator).with_background(Color::WHITE);
        map.zoom_to_box(Box2d::new(0.0, 0.0, 100.0, 50.0));
        map
    }

    fn render(symbolizer: impl Into<Symbolizer>, geometry: Geometry) -> String {
        let map = map();
        let mut renderer =
            SvgRenderer::new(&map, RenderOptions::default()).with_shaper(Arc::new(BoxShaper));
        let layer = Layer::new("roads & rails", Arc::new(MemoryDatasource::new()));
        let style = FeatureTypeStyle::default();
        let feature = Feature::new(1, Arc::new(Context::new(["name"])))
            .with("name", "a<b")
            .with_geometry(geometry);
        let prj_trans = ProjTransform::identity(&Srs::WebMercator);

        renderer.start_map_processing(&map).unwrap();
        renderer.start_layer_processing(&layer, map.current_extent());
        renderer.start_style_processing(&style);
        renderer
            .process(&symbolizer.into(), &feature, &prj_trans)
            .unwrap();
        renderer.end_style_processing(&style);
        renderer.end_layer_processing(&layer);
        renderer.end_map_processing(&map).unwrap();
        renderer.document()
    }

    #[test]
    fn polygon_document() {
        let square = Geometry::Polygon(Polygon::new(
            vec![
                Point2d::new(10.0, 10.0),
                Point2d::new(20.0, 10.0),
                Point2d::new(20.0, 20.0),
                Point2d::new(10.0, 10.0),
            ],
            vec![],
        ));
        let svg = render(PolygonSymbolizer::new().with(Key::Fill, Color::RED), square);

        insta::assert_snapshot!(svg, @r###"
        <?xml version="1.0" encoding="utf-8"?>
        <svg xmlns="http://www.w3.org/2000/svg" version="1.1" width="100" height="50" viewBox="0 0 100 50">
        <rect x="0" y="0" width="100" height="50" fill="#ffffff" fill-opacity="1"/>
        <g id="roads &amp; rails">
        <path fill="#ff0000" fill-opacity="1" fill-rule="evenodd" d="M10 40 L20 40 L20 30 Z"/>
        </g>
        </svg>
        "###);
    }

    #[test]
    fn dashed_line() {
        let line = Geometry::LineString(vec![Point2d::new(0.0, 25.0), Point2d::new(50.0, 25.0)]);
        let svg = render(
            LineSymbolizer::new()
                .with(Key::Stroke, Color::BLUE)
                .with(Key::StrokeWidth, 2.0)
                .with(Key::StrokeDasharray, "4 2"),
            line,
        );

        assert!(svg.contains(
            "<path fill=\"none\" stroke=\"#0000ff\" stroke-opacity=\"1\" stroke-width=\"2\""
        ));
        assert!(svg.contains("stroke-dasharray=\"4,2\""));
        assert!(svg.contains("d=\"M0 25 L50 25\""));
    }

    #[test]
    fn ellipse_marker() {
        let svg = render(
            MarkersSymbolizer::new().with(Key::Width, 6.0),
            Geometry::Point(Point2d::new(50.0, 25.0)),
        );
        assert!(svg.contains("<ellipse cx=\"50\" cy=\"25\" rx=\"3\" ry=\"3\" fill=\"#0000ff\""));
    }

    #[test]
    fn text_is_escaped_per_glyph() {
        let svg = render(
            TextSymbolizer::new("[name]".parse().unwrap())
                .with(Key::FaceName, "Box")
                .with(Key::Size, 10.0),
            Geometry::Point(Point2d::new(50.0, 25.0)),
        );

        assert_eq!(svg.matches("<text ").count(), 3);
        assert!(svg.contains(">&lt;</text>"));
        assert!(svg.contains("font-family=\"Box\""));
    }

    #[test]
    fn lyon_path_to_data() {
        let path = Shape::Square.path();
        assert_eq!(
            lyon_path_data(&path),
            "M-0.5 -0.5 L0.5 -0.5 L0.5 0.5 L-0.5 0.5 Z"
        );
    }
}
