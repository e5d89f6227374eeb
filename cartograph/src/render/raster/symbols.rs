use std::sync::Arc;

use cartograph_types::{Box2d, Point2d};
use lyon::path::Path;
use nalgebra::{Matrix3, Vector2};

use super::gamma::Gamma;
use super::sampler::draw_image;
use super::stroke::Stroke;
use super::{current_target, RasterRenderer};
use crate::error::CartographError;
use crate::feature::Feature;
use crate::placement::{place_box, placement_matrix, MarkersPlacementFinder, PlacementParams};
use crate::projection::ProjTransform;
use crate::render::common::{
    font_selector, layout_options, marker_size, text_finder, to_lyon_transform, MarkerStyle,
    TextStyle,
};
use crate::render::group::{self, DrawIntent};
use crate::render::marker::{centered_box, Marker, Shape};
use crate::render::RenderResult;
use crate::style::{
    GlyphSymbolizer, GroupSymbolizer, HaloRasterizer, Key, LineCap, LineJoin, MarkersSymbolizer,
    PointSymbolizer, Scaling, SymbolizerKind, TextSymbolizer,
};
use crate::text::{ShapedGlyph, TextLayout, TextShaper};
use crate::Color;

/// Side of the square drawn by a point symbolizer without an image.
const DEFAULT_POINT_SIZE: f64 = 4.0;

const GLYPH_TOLERANCE: f32 = 0.1;

/// Glyph outline with its transformation into the image.
type GlyphOutline = (Path, Matrix3<f64>);

fn glyph_outlines<'a>(
    shaper: &dyn TextShaper,
    size: f64,
    glyphs: impl IntoIterator<Item = (&'a ShapedGlyph, Matrix3<f64>)>,
) -> Vec<GlyphOutline> {
    glyphs
        .into_iter()
        .filter_map(|(glyph, matrix)| {
            shaper
                .glyph_path(glyph.face, glyph.glyph_id, size)
                .map(|path| (path, matrix))
        })
        .collect()
}

/// Outlines of a laid out text drawn at `origin` rotated by `angle`.
fn layout_outlines(
    shaper: &dyn TextShaper,
    layout: &TextLayout,
    origin: Point2d,
    angle: f64,
) -> Vec<GlyphOutline> {
    let base = placement_matrix(origin, angle);
    glyph_outlines(
        shaper,
        layout.size(),
        layout.glyphs().iter().map(|g| {
            let position = g.position.coords + g.glyph.offset;
            (&g.glyph, base * Matrix3::new_translation(&position))
        }),
    )
}

impl RasterRenderer {
    /// Draws the marker centered at `position` and rotated by `angle`.
    pub(super) fn draw_marker(
        &mut self,
        marker: &Marker,
        position: Point2d,
        angle: f64,
        size: (f64, f64),
        style: &MarkerStyle,
    ) {
        let (w, h) = size;
        if w <= 0.0 || h <= 0.0 || style.opacity <= 0.0 {
            return;
        }

        let mut transform = placement_matrix(position, angle);
        if let Some(marker_transform) = &style.transform {
            transform *= marker_transform;
        }

        match marker {
            Marker::Shape(shape) => {
                let matrix = transform * Matrix3::new_nonuniform_scaling(&Vector2::new(w, h));
                let path = shape.path();
                let gamma = Gamma::default();

                self.rasterizer.reset();
                self.rasterizer.add_path(&path, &matrix, GLYPH_TOLERANCE);
                self.fill(style.fill.with_opacity(style.opacity), &gamma, style.comp_op);

                if style.stroke_width > 0.0 {
                    let outline = path.transformed(&to_lyon_transform(&matrix));
                    let stroke = Stroke {
                        width: style.stroke_width,
                        ..Stroke::default()
                    };
                    self.rasterizer.reset();
                    stroke.add_path(&outline, &mut self.rasterizer);
                    self.fill(style.stroke.with_opacity(style.opacity), &gamma, style.comp_op);
                }
            }
            Marker::Image(image) => {
                let (iw, ih) = (image.width() as f64, image.height() as f64);
                if iw == 0.0 || ih == 0.0 {
                    return;
                }

                let scaling = if angle == 0.0 && style.transform.is_none() && w == iw && h == ih {
                    Scaling::Near
                } else {
                    Scaling::Bilinear
                };
                let matrix = transform
                    * Matrix3::new_nonuniform_scaling(&Vector2::new(w / iw, h / ih))
                    * Matrix3::new_translation(&Vector2::new(-iw / 2.0, -ih / 2.0));
                let target = current_target(&mut self.image, &mut self.layers);
                draw_image(target, image, &matrix, scaling, style.opacity, style.comp_op);
            }
        }
    }

    /// Fills the glyph outlines, drawing the halo under them first.
    fn draw_text(&mut self, outlines: &[GlyphOutline], style: &TextStyle) {
        if outlines.is_empty() {
            return;
        }

        let gamma = Gamma::default();
        if style.has_halo() {
            self.rasterizer.reset();
            match style.halo_rasterizer {
                HaloRasterizer::Full => {
                    let stroke = Stroke {
                        width: style.halo_radius * 2.0,
                        join: LineJoin::Round,
                        cap: LineCap::Round,
                        miter_limit: 4.0,
                    };
                    for (path, matrix) in outlines {
                        let outline = path.clone().transformed(&to_lyon_transform(matrix));
                        stroke.add_path(&outline, &mut self.rasterizer);
                    }
                    self.fill(style.halo_fill, &gamma, style.comp_op);
                }
                HaloRasterizer::Fast => {
                    for (path, matrix) in outlines {
                        self.rasterizer.add_path(path, matrix, GLYPH_TOLERANCE);
                    }
                    let radius = style.halo_radius.round().max(1.0) as u32;
                    let mask = self.rasterizer.mask().dilate(radius);
                    self.fill_mask(&mask, style.halo_fill, style.comp_op);
                }
            }
        }

        self.rasterizer.reset();
        for (path, matrix) in outlines {
            self.rasterizer.add_path(path, matrix, GLYPH_TOLERANCE);
        }
        self.fill(style.fill, &gamma, style.comp_op);
    }

    /// Checks the box against the detector and the extent, and registers it if it is accepted.
    fn try_place(&mut self, bbox: Box2d, params: &PlacementParams) -> bool {
        let detector = &mut self.common.detector;
        if !params.fits_extent(&bbox, &detector.extent()) {
            return false;
        }
        if !params.allow_overlap && !detector.has_placement_with_margin(&bbox, params.margin) {
            return false;
        }
        if !params.ignore_placement {
            detector.insert(bbox);
        }
        true
    }

    pub(super) fn render_point(
        &mut self,
        symbolizer: &PointSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let scale_factor = self.common.options.scale_factor;
        let resolver = self
            .common
            .resolver(SymbolizerKind::Point, &symbolizer.properties, feature);

        let (marker, size, style) = match resolver.string(Key::File) {
            Some(file) => {
                let marker = self.common.markers.get(&file)?;
                let size = marker_size(&resolver, &marker, scale_factor);
                (marker, size, MarkerStyle::from_resolver(&resolver, scale_factor))
            }
            None => {
                let side = DEFAULT_POINT_SIZE * scale_factor;
                let style = MarkerStyle {
                    fill: Color::BLACK,
                    stroke_width: 0.0,
                    ..MarkerStyle::from_resolver(&resolver, scale_factor)
                };
                (Arc::new(Marker::Shape(Shape::Square)), (side, side), style)
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

        for anchor in geometry.anchors {
            if self.try_place(marker_box.translate(anchor.x, anchor.y), &params) {
                self.draw_marker(&marker, anchor, 0.0, size, &style);
            }
        }

        Ok(())
    }

    pub(super) fn render_markers(
        &mut self,
        symbolizer: &MarkersSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let scale_factor = self.common.options.scale_factor;
        let resolver =
            self.common
                .resolver(SymbolizerKind::Markers, &symbolizer.properties, feature);
        let file = resolver
            .string(Key::File)
            .unwrap_or_else(|| "shape://ellipse".to_string());
        let marker = self.common.markers.get(&file)?;
        let size = marker_size(&resolver, &marker, scale_factor);
        let style = MarkerStyle::from_resolver(&resolver, scale_factor);
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
            self.draw_marker(&marker, placement.position, placement.angle, size, &style);
        }

        Ok(())
    }

    /// Text and shield symbolizers.
    pub(super) fn render_label(
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
        let style = TextStyle::from_resolver(&resolver, &self.common.options);

        let shield = if kind == SymbolizerKind::Shield {
            let file = resolver.string(Key::File).ok_or_else(|| {
                CartographError::Config("shield symbolizer requires a file".into())
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
                self.draw_marker(marker, bbox.center(), 0.0, *size, marker_style);
            }

            let outlines = glyph_outlines(
                shaper.as_ref(),
                positions.size,
                positions
                    .glyphs
                    .iter()
                    .map(|g| (&g.glyph, placement_matrix(g.position, g.angle))),
            );
            self.draw_text(&outlines, &style);
        }

        Ok(())
    }

    pub(super) fn render_glyph(
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
            if self.try_place(bbox, &params) {
                let outlines = layout_outlines(shaper.as_ref(), &layout, anchor, angle);
                self.draw_text(&outlines, &style);
            }
        }

        Ok(())
    }

    pub(super) fn render_group(
        &mut self,
        symbolizer: &GroupSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let (layout, anchors) =
            group::render_group(&mut self.common, symbolizer, feature, prj_trans)?;
        let shaper = self.common.shaper.clone();

        for anchor in anchors {
            for intent in &layout.intents {
                match intent {
                    DrawIntent::Text {
                        layout,
                        style,
                        offset,
                    } => {
                        let outlines =
                            layout_outlines(shaper.as_ref(), layout, anchor + offset, 0.0);
                        self.draw_text(&outlines, style);
                    }
                    DrawIntent::Marker {
                        marker,
                        size,
                        style,
                        offset,
                    } => self.draw_marker(marker, anchor + offset, 0.0, *size, style),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use cartograph_types::projection::Srs;
    use cartograph_types::Geometry;

    use super::*;
    use crate::expression::Expr;
    use crate::render::raster::tests::{feature, map, render};
    use crate::render::{MarkerCache, RenderOptions};
    use crate::style::{GroupRule, Symbolizer};
    use crate::text::testing::BoxShaper;

    fn point(x: f64, y: f64) -> Feature {
        feature(Geometry::Point(Point2d::new(x, y)))
    }

    fn name() -> Expr {
        "[name]".parse().unwrap()
    }

    #[test]
    fn default_point_is_black_square() {
        let map = map(10);
        let renderer = render(&map, PointSymbolizer::new(), &[point(5.0, 5.0)], 1.0);
        let image = renderer.image();

        assert_eq!(image.pixel(4, 4), Some([0, 0, 0, 255]));
        assert_eq!(image.pixel(5, 5), Some([0, 0, 0, 255]));
        assert_eq!(image.pixel(2, 5), Some([0, 0, 0, 0]));
        assert_eq!(renderer.common().detector().len(), 1);
    }

    #[test]
    fn overlapping_points_are_skipped() {
        let map = map(20);
        let renderer = render(
            &map,
            PointSymbolizer::new(),
            &[point(10.0, 10.0), point(11.0, 10.0), point(16.0, 10.0)],
            1.0,
        );
        assert_eq!(renderer.common().detector().len(), 2);
        assert_eq!(renderer.image().pixel(11, 9), Some([0, 0, 0, 255]));
        assert_eq!(renderer.image().pixel(12, 9), Some([0, 0, 0, 0]));
    }

    #[test]
    fn point_image() {
        let markers = Arc::new(MarkerCache::new(4));
        markers.insert_image(
            "dot",
            crate::image::ImageRgba8::filled(2, 2, Color::GREEN),
        );

        let map = map(10);
        let mut renderer =
            RasterRenderer::new(&map, RenderOptions::default()).with_markers(markers);
        let symbolizer = PointSymbolizer::new().with(Key::File, "dot");
        let prj_trans = ProjTransform::identity(&Srs::WebMercator);
        renderer
            .render_point(&symbolizer, &point(5.0, 5.0), &prj_trans)
            .unwrap();

        let image = renderer.image();
        assert_eq!(image.pixel(4, 4), Some(Color::GREEN.to_premultiplied()));
        assert_eq!(image.pixel(5, 5), Some(Color::GREEN.to_premultiplied()));
        assert_eq!(image.pixel(6, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn default_marker_is_blue_ellipse() {
        let map = map(20);
        let renderer = render(&map, MarkersSymbolizer::new(), &[point(10.0, 10.0)], 1.0);
        let image = renderer.image();

        assert_eq!(image.pixel(9, 9), Some([0, 0, 255, 255]));
        assert_eq!(image.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(renderer.common().detector().len(), 1);
    }

    #[test]
    fn missing_marker_file_is_config_error() {
        let map = map(10);
        let mut renderer = RasterRenderer::new(&map, RenderOptions::default());
        let symbolizer = MarkersSymbolizer::new().with(Key::File, "/no/such/marker.png");
        let prj_trans = ProjTransform::identity(&Srs::WebMercator);

        assert_matches!(
            renderer.render_markers(&symbolizer, &point(5.0, 5.0), &prj_trans),
            Err(CartographError::Config(_))
        );
    }

    #[test]
    fn text_label() {
        let map = map(100);
        let symbolizer = TextSymbolizer::new(name())
            .with(Key::FaceName, "Box")
            .with(Key::Size, 10.0)
            .with(Key::Fill, Color::BLACK);
        let renderer = render(&map, symbolizer, &[point(50.0, 50.0)], 1.0);
        let image = renderer.image();

        // First glyph box spans x 44..49 and y 46..53.
        assert_eq!(image.pixel(46, 50), Some([0, 0, 0, 255]));
        assert_eq!(image.pixel(49, 50), Some([0, 0, 0, 0]));
        assert_eq!(image.pixel(46, 40), Some([0, 0, 0, 0]));
        assert_eq!(renderer.common().detector().len(), 1);
    }

    #[test]
    fn text_halo() {
        let map = map(100);
        let symbolizer = TextSymbolizer::new(name())
            .with(Key::FaceName, "Box")
            .with(Key::Size, 10.0)
            .with(Key::Fill, Color::BLACK)
            .with(Key::HaloFill, Color::WHITE)
            .with(Key::HaloRadius, 2.0);
        let renderer = render(&map, symbolizer, &[point(50.0, 50.0)], 1.0);
        let image = renderer.image();

        assert_eq!(image.pixel(46, 50), Some([0, 0, 0, 255]));
        assert_eq!(image.pixel(42, 50), Some([255, 255, 255, 255]));
    }

    #[test]
    fn text_without_font_fails() {
        let map = map(100);
        let mut renderer = RasterRenderer::new(&map, RenderOptions::default())
            .with_shaper(Arc::new(BoxShaper));
        let symbolizer = TextSymbolizer::new(name());
        let prj_trans = ProjTransform::identity(&Srs::WebMercator);

        assert_matches!(
            renderer.render_label(
                &symbolizer,
                SymbolizerKind::Text,
                &point(50.0, 50.0),
                &prj_trans
            ),
            Err(CartographError::Config(_))
        );
    }

    #[test]
    fn shield_requires_file() {
        let map = map(100);
        let mut renderer = RasterRenderer::new(&map, RenderOptions::default())
            .with_shaper(Arc::new(BoxShaper));
        let symbolizer = TextSymbolizer::new(name()).with(Key::FaceName, "Box");
        let prj_trans = ProjTransform::identity(&Srs::WebMercator);

        assert_matches!(
            renderer.render_label(
                &symbolizer,
                SymbolizerKind::Shield,
                &point(50.0, 50.0),
                &prj_trans
            ),
            Err(CartographError::Config(_))
        );
    }

    #[test]
    fn glyph_symbolizer() {
        let map = map(100);
        let symbolizer = GlyphSymbolizer::new()
            .with(Key::Char, "x")
            .with(Key::FaceName, "Box")
            .with(Key::Size, 10.0)
            .with(Key::Fill, Color::RED);
        let renderer = render(&map, symbolizer, &[point(50.0, 50.0)], 1.0);

        // Single glyph of the box shaper: x 47..52, y 46..53.
        assert_eq!(renderer.image().pixel(49, 50), Some([255, 0, 0, 255]));
        assert_eq!(renderer.common().detector().len(), 1);
    }

    #[test]
    fn group_replays_items() {
        let map = map(100);
        let text = TextSymbolizer::new("[ref%]".parse().unwrap())
            .with(Key::FaceName, "Box")
            .with(Key::Size, 10.0)
            .with(Key::Fill, Color::BLACK);
        let symbolizer = GroupSymbolizer::new()
            .with(Key::NumColumns, 1.0)
            .with_rule(GroupRule {
                filter: None,
                symbolizers: vec![Symbolizer::Text(text)],
            });
        let feature = Feature::new(1, Arc::new(crate::feature::Context::new(["ref1"])))
            .with("ref1", "ab")
            .with_geometry(Geometry::Point(Point2d::new(50.0, 50.0)));
        let renderer = render(&map, symbolizer, &[feature], 1.0);

        assert_eq!(renderer.image().pixel(46, 50), Some([0, 0, 0, 255]));
        assert_eq!(renderer.common().detector().len(), 1);
    }
}
