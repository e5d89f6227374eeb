use cartograph_types::Box2d;
use nalgebra::{Matrix3, Vector2};

use super::colorizer::Colorizer;
use super::gamma::Gamma;
use super::rasterizer::FillRule;
use super::sampler::draw_image;
use super::stroke::Stroke;
use super::{current_target, RasterRenderer};
use crate::converter::{collect_sub_paths, dash_path, offset_path, Clip, SubPath};
use crate::error::CartographError;
use crate::feature::{Feature, RasterData};
use crate::image::ImageRgba8;
use crate::placement::{placement_matrix, PathWalker};
use crate::projection::ProjTransform;
use crate::render::building::BuildingFaces;
use crate::render::common::{split_geometries, LineStyle, PolygonStyle};
use crate::render::marker::Marker;
use crate::render::RenderResult;
use crate::style::{
    BuildingSymbolizer, CompOp, DebugMode, DebugSymbolizer, Key, LinePatternSymbolizer,
    LineSymbolizer, PatternAlignment, PolygonPatternSymbolizer, PolygonSymbolizer,
    PropertyResolver, RasterSymbolizer, Scaling, SymbolizerKind,
};
use crate::Color;

impl From<&LineStyle> for Stroke {
    fn from(style: &LineStyle) -> Self {
        Self {
            width: style.width,
            join: style.join,
            cap: style.cap,
            miter_limit: style.miter_limit,
        }
    }
}

/// Polygonal and linear parts of the feature geometries. Points are skipped.
fn shade(color: Color, factor: f64) -> Color {
    let channel = |c: u8| (c as f64 * factor).round().clamp(0.0, 255.0) as u8;
    Color::rgba(channel(color.r()), channel(color.g()), channel(color.b()), color.a())
}

fn bounds(paths: &[SubPath]) -> Box2d {
    Box2d::from_points(
        paths
            .iter()
            .flat_map(|path| path.points.iter().map(|p| (p.x, p.y))),
    )
}

/// Grayscale image of a band without a colorizer. Values are clamped to `0..=255`.
fn grayscale(width: u32, height: u32, values: &[f32], nodata: Option<f64>) -> ImageRgba8 {
    let mut image = ImageRgba8::new(width, height);
    image.set_premultiplied(true);
    for (pixel, value) in image.data_mut().iter_mut().zip(values) {
        if nodata.is_some_and(|nodata| nodata == *value as f64) || value.is_nan() {
            continue;
        }
        let v = value.clamp(0.0, 255.0).round() as u8;
        *pixel = [v, v, v, 255];
    }
    image
}

impl RasterRenderer {
    /// Line and polygon outlines of the feature converted into pixels.
    fn outline_paths(
        &self,
        resolver: &PropertyResolver,
        feature: &Feature,
        prj_trans: &ProjTransform,
        padding: f64,
    ) -> Vec<SubPath> {
        let line_config = self
            .common
            .converter(resolver, prj_trans, Some(Clip::Line), padding);
        let polygon_config = self
            .common
            .converter(resolver, prj_trans, Some(Clip::Polygon), padding);

        let (polygons, lines) = split_geometries(feature);
        let mut paths = vec![];
        for geometry in lines {
            paths.extend(collect_sub_paths(line_config.apply(geometry.vertices())));
        }
        for geometry in polygons {
            paths.extend(collect_sub_paths(polygon_config.apply(geometry.vertices())));
        }
        paths
    }

    /// Rings of the polygonal geometries converted into pixels.
    fn polygon_paths(
        &self,
        resolver: &PropertyResolver,
        feature: &Feature,
        prj_trans: &ProjTransform,
        padding: f64,
    ) -> Vec<SubPath> {
        let config = self
            .common
            .converter(resolver, prj_trans, Some(Clip::Polygon), padding);
        let (polygons, _) = split_geometries(feature);
        polygons
            .into_iter()
            .flat_map(|geometry| collect_sub_paths(config.apply(geometry.vertices())))
            .collect()
    }

    pub(super) fn render_polygon(
        &mut self,
        symbolizer: &PolygonSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let resolver =
            self.common
                .resolver(SymbolizerKind::Polygon, &symbolizer.properties, feature);
        let style = PolygonStyle::from_resolver(&resolver);
        let paths = self.polygon_paths(&resolver, feature, prj_trans, 1.0);
        if paths.is_empty() {
            return Ok(());
        }

        self.rasterizer.reset();
        self.rasterizer.set_fill_rule(FillRule::EvenOdd);
        self.rasterizer.add_sub_paths(&paths);
        let gamma = self.gamma(style.gamma_method, style.gamma);
        self.fill(style.color, &gamma, style.comp_op);
        Ok(())
    }

    pub(super) fn render_line(
        &mut self,
        symbolizer: &LineSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let resolver = self
            .common
            .resolver(SymbolizerKind::Line, &symbolizer.properties, feature);
        let style = LineStyle::from_resolver(&resolver, self.common.options.scale_factor);
        if style.width <= 0.0 || style.color.is_transparent() {
            return Ok(());
        }

        let padding = style.width + style.offset.abs();
        let paths = self.outline_paths(&resolver, feature, prj_trans, padding);
        self.stroke_paths(paths, &style);
        Ok(())
    }

    fn stroke_paths(&mut self, paths: Vec<SubPath>, style: &LineStyle) {
        let paths: Vec<SubPath> = if style.offset != 0.0 {
            paths
                .iter()
                .map(|path| offset_path(path, style.offset))
                .collect()
        } else {
            paths
        };
        let paths: Vec<SubPath> = match &style.dash {
            Some(dash) => paths
                .iter()
                .flat_map(|path| dash_path(path, dash, style.dash_offset))
                .collect(),
            None => paths,
        };
        if paths.is_empty() {
            return;
        }

        self.rasterizer.reset();
        Stroke::from(style).add_sub_paths(&paths, &mut self.rasterizer);
        let gamma = self.gamma(style.gamma_method, style.gamma);
        self.fill(style.color, &gamma, style.comp_op);
    }

    pub(super) fn render_line_pattern(
        &mut self,
        symbolizer: &LinePatternSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let resolver =
            self.common
                .resolver(SymbolizerKind::LinePattern, &symbolizer.properties, feature);
        let file = resolver.string(Key::File).ok_or_else(|| {
            CartographError::Config("line pattern symbolizer requires a file".into())
        })?;
        let marker = self.common.markers.get(&file)?;
        let Marker::Image(pattern) = marker.as_ref() else {
            return Err(CartographError::Config(format!(
                "line pattern '{file}' is not an image"
            )));
        };
        if pattern.is_empty() {
            return Ok(());
        }

        let opacity = resolver.f64_or(Key::Opacity, 1.0);
        let comp_op: CompOp = resolver.enumeration(Key::CompOp).unwrap_or_default();
        let (width, height) = (pattern.width() as f64, pattern.height() as f64);
        let paths = self.outline_paths(&resolver, feature, prj_trans, height);

        let to_center = Matrix3::new_translation(&Vector2::new(0.0, -height / 2.0));
        let target = current_target(&mut self.image, &mut self.layers);
        for path in &paths {
            let walker = PathWalker::new(path);
            let mut distance = 0.0;
            while distance < walker.length() {
                if let Some((position, angle)) = walker.point_at(distance) {
                    let transform = placement_matrix(position, angle) * to_center;
                    draw_image(target, pattern, &transform, Scaling::Bilinear, opacity, comp_op);
                }
                distance += width;
            }
        }

        Ok(())
    }

    pub(super) fn render_polygon_pattern(
        &mut self,
        symbolizer: &PolygonPatternSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let resolver = self.common.resolver(
            SymbolizerKind::PolygonPattern,
            &symbolizer.properties,
            feature,
        );
        let file = resolver.string(Key::File).ok_or_else(|| {
            CartographError::Config("polygon pattern symbolizer requires a file".into())
        })?;
        let marker = self.common.markers.get(&file)?;
        let Marker::Image(pattern) = marker.as_ref() else {
            return Err(CartographError::Config(format!(
                "polygon pattern '{file}' is not an image"
            )));
        };
        if pattern.is_empty() {
            return Ok(());
        }

        let alignment = resolver
            .enumeration(Key::Alignment)
            .unwrap_or(PatternAlignment::Global);
        let opacity = resolver.f64_or(Key::Opacity, 1.0).clamp(0.0, 1.0);
        let comp_op: CompOp = resolver.enumeration(Key::CompOp).unwrap_or_default();
        let gamma = self.gamma(
            resolver.enumeration(Key::GammaMethod).unwrap_or_default(),
            resolver.f64_or(Key::Gamma, 1.0),
        );

        let paths = self.polygon_paths(&resolver, feature, prj_trans, 1.0);
        if paths.is_empty() {
            return Ok(());
        }

        let (ox, oy) = match alignment {
            PatternAlignment::Global => (0, 0),
            PatternAlignment::Local => {
                let bbox = bounds(&paths);
                (bbox.min_x().floor() as i64, bbox.min_y().floor() as i64)
            }
        };

        self.rasterizer.reset();
        self.rasterizer.set_fill_rule(FillRule::EvenOdd);
        self.rasterizer.add_sub_paths(&paths);

        let (w, h) = (pattern.width() as i64, pattern.height() as i64);
        self.fill_with(&gamma, comp_op, |x, y| {
            let px = (x as i64 - ox).rem_euclid(w) as u32;
            let py = (y as i64 - oy).rem_euclid(h) as u32;
            let pixel = pattern.pixel(px, py).unwrap_or_default();
            if opacity < 1.0 {
                pixel.map(|c| (c as f64 * opacity).round() as u8)
            } else {
                pixel
            }
        });

        Ok(())
    }

    pub(super) fn render_building(
        &mut self,
        symbolizer: &BuildingSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let scale_factor = self.common.options.scale_factor;
        let resolver =
            self.common
                .resolver(SymbolizerKind::Building, &symbolizer.properties, feature);
        let height = resolver.f64_or(Key::Height, 0.0) * scale_factor;
        let fill = resolver
            .color(Key::Fill)
            .unwrap_or(Color::GRAY)
            .with_opacity(resolver.f64_or(Key::FillOpacity, 1.0));
        let comp_op: CompOp = resolver.enumeration(Key::CompOp).unwrap_or_default();

        let config = self
            .common
            .converter(&resolver, prj_trans, Some(Clip::Polygon), height.abs());
        let (polygons, _) = split_geometries(feature);
        let rings: Vec<Vec<SubPath>> = polygons
            .into_iter()
            .map(|geometry| collect_sub_paths(config.apply(geometry.vertices())))
            .collect();

        let wall_color = shade(fill, 0.8);
        let gamma = Gamma::default();
        let frame = Stroke {
            width: scale_factor,
            ..Stroke::default()
        };

        for rings in rings {
            // Y axis of the image points down, so the roof goes up with the negative height.
            let faces = BuildingFaces::extrude(&rings, -height);

            for wall in &faces.walls {
                self.rasterizer.reset();
                self.rasterizer.move_to(wall[0]);
                for point in &wall[1..] {
                    self.rasterizer.line_to(*point);
                }
                self.rasterizer.close();
                self.fill(wall_color, &gamma, comp_op);
            }

            self.rasterizer.reset();
            frame.add_sub_paths(&faces.frame, &mut self.rasterizer);
            self.fill(wall_color, &gamma, comp_op);

            self.rasterizer.reset();
            self.rasterizer.set_fill_rule(FillRule::EvenOdd);
            self.rasterizer.add_sub_paths(&faces.roof);
            self.fill(fill, &gamma, comp_op);
        }

        Ok(())
    }

    pub(super) fn render_debug(
        &mut self,
        symbolizer: &DebugSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let scale_factor = self.common.options.scale_factor;
        let resolver = self
            .common
            .resolver(SymbolizerKind::Debug, &symbolizer.properties, feature);
        let mode = resolver.enumeration(Key::Mode).unwrap_or(DebugMode::Collision);

        let outlines: Vec<SubPath> = match mode {
            DebugMode::Collision => self
                .common
                .detector
                .boxes()
                .map(|label| SubPath::new(label.bbox.corners().to_vec(), true))
                .collect(),
            DebugMode::Vertex => {
                let config = self.common.converter(&resolver, prj_trans, None, 0.0);
                let half = 1.5 * scale_factor;
                self.common
                    .paths(feature, &config)
                    .iter()
                    .flat_map(|path| path.points.iter())
                    .map(|p| {
                        let bbox = Box2d::from_point(p.x, p.y).pad(half);
                        SubPath::new(bbox.corners().to_vec(), true)
                    })
                    .collect()
            }
        };
        if outlines.is_empty() {
            return Ok(());
        }

        self.rasterizer.reset();
        Stroke {
            width: scale_factor,
            ..Stroke::default()
        }
        .add_sub_paths(&outlines, &mut self.rasterizer);
        self.fill(Color::RED, &Gamma::default(), CompOp::SrcOver);
        Ok(())
    }

    pub(super) fn render_raster(
        &mut self,
        symbolizer: &RasterSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        let Some(raster) = feature.raster() else {
            return Ok(());
        };

        let resolver = self
            .common
            .resolver(SymbolizerKind::Raster, &symbolizer.properties, feature);
        let opacity = resolver.f64_or(Key::Opacity, 1.0);
        let comp_op: CompOp = resolver.enumeration(Key::CompOp).unwrap_or_default();
        let scaling = resolver.enumeration(Key::Scaling).unwrap_or(Scaling::Near);
        let colorizer = resolver.string(Key::Colorizer);

        let extent = match prj_trans.forward_box(&raster.extent) {
            Ok(extent) => extent,
            Err(err) => {
                log::debug!("Raster of feature {} is skipped: {err}", feature.id());
                return Ok(());
            }
        };
        let pixel_box = self.common.view.forward_box(&extent);

        let image = match &raster.data {
            RasterData::Rgba(image) => {
                let mut image = image.clone();
                image.premultiply();
                image
            }
            RasterData::Band {
                width,
                height,
                values,
            } => match colorizer {
                Some(stops) => {
                    stops
                        .parse::<Colorizer>()?
                        .apply(*width, *height, values, raster.nodata)
                }
                None => grayscale(*width, *height, values, raster.nodata),
            },
        };
        if image.is_empty() {
            return Ok(());
        }

        let transform = Matrix3::new_translation(&Vector2::new(pixel_box.min_x(), pixel_box.min_y()))
            * Matrix3::new_nonuniform_scaling(&Vector2::new(
                pixel_box.width() / image.width() as f64,
                pixel_box.height() / image.height() as f64,
            ));
        draw_image(self.target(), &image, &transform, scaling, opacity, comp_op);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cartograph_types::projection::Srs;
    use cartograph_types::{Geometry, Point2d};

    use super::*;
    use crate::render::raster::tests::{feature, map, render, square};
    use crate::render::MarkerCache;
    use crate::style::LinePatternSymbolizer;

    #[test]
    fn split_skips_points() {
        let feature = feature(Geometry::Collection(vec![
            Geometry::Point(Point2d::new(0.0, 0.0)),
            square(0.0, 1.0),
            Geometry::LineString(vec![Point2d::new(0.0, 0.0), Point2d::new(1.0, 1.0)]),
        ]));
        let (polygons, lines) = split_geometries(&feature);
        assert_eq!(polygons.len(), 1);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn dashed_line_has_gaps() {
        let map = map(20);
        let symbolizer = LineSymbolizer::new()
            .with(Key::Stroke, Color::BLACK)
            .with(Key::StrokeWidth, 2.0)
            .with(Key::StrokeDasharray, "4,4");
        let line = Geometry::LineString(vec![Point2d::new(0.0, 10.0), Point2d::new(20.0, 10.0)]);
        let renderer = render(&map, symbolizer, &[feature(line)], 1.0);
        let image = renderer.image();

        assert_eq!(image.pixel(1, 10), Some([0, 0, 0, 255]));
        assert_eq!(image.pixel(6, 10), Some([0, 0, 0, 0]));
        assert_eq!(image.pixel(9, 10), Some([0, 0, 0, 255]));
    }

    #[test]
    fn polygon_outline_with_line_symbolizer() {
        let map = map(20);
        let symbolizer = LineSymbolizer::new()
            .with(Key::Stroke, Color::BLACK)
            .with(Key::StrokeWidth, 2.0);
        let renderer = render(&map, symbolizer, &[feature(square(5.0, 15.0))], 1.0);
        let image = renderer.image();

        assert_eq!(image.pixel(10, 4), Some([0, 0, 0, 255]));
        assert_eq!(image.pixel(10, 10), Some([0, 0, 0, 0]));
    }

    #[test]
    fn building_is_drawn() {
        let map = map(20);
        let symbolizer = BuildingSymbolizer::new()
            .with(Key::Fill, Color::rgb(100, 200, 250))
            .with(Key::Height, 4.0);
        let renderer = render(&map, symbolizer, &[feature(square(5.0, 10.0))], 1.0);
        let image = renderer.image();

        // Roof is shifted up by the height.
        assert_eq!(image.pixel(7, 8), Some([100, 200, 250, 255]));
        assert!(image.painted());
    }

    #[test]
    fn line_pattern_requires_image() {
        let map = map(10);
        let mut renderer = crate::render::RasterRenderer::new(&map, Default::default());
        let symbolizer = LinePatternSymbolizer::new().with(Key::File, "shape://square");
        let prj_trans = ProjTransform::identity(&Srs::WebMercator);
        let line = Geometry::LineString(vec![Point2d::new(0.0, 5.0), Point2d::new(10.0, 5.0)]);

        let result = renderer.render_line_pattern(&symbolizer, &feature(line), &prj_trans);
        assert!(matches!(result, Err(CartographError::Config(_))));
    }

    #[test]
    fn polygon_pattern_tiles() {
        let markers = Arc::new(MarkerCache::new(4));
        let mut tile = ImageRgba8::new(2, 1);
        tile.set_pixel(0, 0, [255, 0, 0, 255]);
        tile.set_pixel(1, 0, [0, 0, 255, 255]);
        markers.insert_image("tile", tile);

        let map = map(6);
        let mut renderer =
            crate::render::RasterRenderer::new(&map, Default::default()).with_markers(markers);
        let symbolizer = PolygonPatternSymbolizer::new().with(Key::File, "tile");
        let prj_trans = ProjTransform::identity(&Srs::WebMercator);
        renderer
            .render_polygon_pattern(&symbolizer, &feature(square(0.0, 6.0)), &prj_trans)
            .unwrap();

        let image = renderer.image();
        assert_eq!(image.pixel(0, 3), Some([255, 0, 0, 255]));
        assert_eq!(image.pixel(1, 3), Some([0, 0, 255, 255]));
        assert_eq!(image.pixel(4, 5), Some([255, 0, 0, 255]));
    }
}
