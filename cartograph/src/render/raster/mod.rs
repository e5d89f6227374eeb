//! Anti-aliased raster backend.
//!
//! Geometries are accumulated in a scanline [`Rasterizer`] as signed area cells and swept into
//! coverage spans, which are blended into a premultiplied RGBA image with the compositing operation
//! of the symbolizer.

use std::sync::Arc;

use cartograph_types::Box2d;

use super::common::{RenderOptions, RendererCommon};
use super::marker::MarkerCache;
use super::{RenderResult, Renderer};
use crate::feature::Feature;
use crate::image::ImageRgba8;
use crate::map::{Layer, Map};
use crate::projection::ProjTransform;
use crate::style::{
    BuildingSymbolizer, CompOp, DebugSymbolizer, FeatureTypeStyle, GammaMethod, GlyphSymbolizer,
    GroupSymbolizer, LinePatternSymbolizer, LineSymbolizer, MarkersSymbolizer, PointSymbolizer,
    PolygonPatternSymbolizer, PolygonSymbolizer, RasterSymbolizer, SymbolizerKind, TextSymbolizer,
};
use crate::text::TextShaper;
use crate::Color;

mod blend;
mod colorizer;
mod gamma;
mod rasterizer;
mod sampler;
mod stroke;
mod symbols;
mod vector;

pub use blend::{blend_image, blend_pixel};
pub use colorizer::Colorizer;
pub use gamma::Gamma;
pub use rasterizer::{FillRule, Mask, Rasterizer};
pub use stroke::Stroke;

/// Renders maps into an RGBA image.
///
/// The image is kept premultiplied while rendering. Styles with a compositing operation or an
/// opacity are rendered into an offscreen layer first and composited into the image at the end of
/// the style.
pub struct RasterRenderer {
    common: RendererCommon,
    image: ImageRgba8,
    layers: Vec<ImageRgba8>,
    rasterizer: Rasterizer,
}

impl RasterRenderer {
    /// Creates a renderer for the map. The image has the size of the map.
    pub fn new(map: &Map, options: RenderOptions) -> Self {
        let common = RendererCommon::new(map, options);
        Self {
            image: transparent_image(map.width(), map.height()),
            layers: vec![],
            rasterizer: Rasterizer::new(map.width(), map.height()),
            common,
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

    /// Rendered image (premultiplied).
    pub fn image(&self) -> &ImageRgba8 {
        &self.image
    }

    /// Takes the rendered image. The image is premultiplied, call
    /// [`ImageRgba8::demultiply`] to get straight alpha.
    pub fn into_image(self) -> ImageRgba8 {
        self.image
    }

    fn gamma(&self, method: GammaMethod, value: f64) -> Gamma {
        Gamma::new(method, value * self.common.options.gamma)
    }

    /// Blends the accumulated rasterizer cells with a solid color.
    fn fill(&mut self, color: Color, gamma: &Gamma, op: CompOp) {
        if color.is_transparent() && op == CompOp::SrcOver {
            self.rasterizer.reset();
            return;
        }

        let source = color.to_premultiplied();
        self.fill_with(gamma, op, |_, _| source);
    }

    /// Blends the accumulated rasterizer cells with the per-pixel premultiplied `source`.
    fn fill_with(
        &mut self,
        gamma: &Gamma,
        op: CompOp,
        mut source: impl FnMut(u32, u32) -> [u8; 4],
    ) {
        let target = current_target(&mut self.image, &mut self.layers);
        let mut painted = false;
        self.rasterizer.sweep(|y, x, len, coverage| {
            let alpha = gamma.apply_f32(coverage);
            if alpha == 0 {
                return;
            }

            let row = target.row_mut(y);
            for px in x..x + len {
                blend_pixel(op, &mut row[px as usize], source(px, y), alpha);
            }
            painted = true;
        });

        if painted {
            target.set_painted(true);
        }
    }

    /// Blends a coverage mask with a solid color.
    fn fill_mask(&mut self, mask: &Mask, color: Color, op: CompOp) {
        let source = color.to_premultiplied();
        let target = current_target(&mut self.image, &mut self.layers);
        let mut painted = false;
        mask.spans(|y, x, len, coverage| {
            let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
            if alpha == 0 {
                return;
            }

            let row = target.row_mut(y);
            for pixel in &mut row[x as usize..(x + len) as usize] {
                blend_pixel(op, pixel, source, alpha);
            }
            painted = true;
        });

        if painted {
            target.set_painted(true);
        }
    }

    fn target(&mut self) -> &mut ImageRgba8 {
        current_target(&mut self.image, &mut self.layers)
    }
}

fn transparent_image(width: u32, height: u32) -> ImageRgba8 {
    let mut image = ImageRgba8::new(width, height);
    image.set_premultiplied(true);
    image
}

/// Topmost offscreen layer, or the main image if no style is rendered offscreen.
fn current_target<'a>(
    image: &'a mut ImageRgba8,
    layers: &'a mut [ImageRgba8],
) -> &'a mut ImageRgba8 {
    match layers.last_mut() {
        Some(layer) => layer,
        None => image,
    }
}

impl Renderer for RasterRenderer {
    fn start_map_processing(&mut self, map: &Map) -> RenderResult {
        log::debug!(
            "Start raster rendering of {}x{} map at scale 1:{:.0}",
            map.width(),
            map.height(),
            map.scale_denominator()
        );

        if self.image.width() != map.width() || self.image.height() != map.height() {
            self.image = transparent_image(map.width(), map.height());
            self.rasterizer = Rasterizer::new(map.width(), map.height());
        }

        self.common.start_map(map);
        if let Some(background) = map.background() {
            self.image.set_background(background);
        }

        Ok(())
    }

    fn end_map_processing(&mut self, _map: &Map) -> RenderResult {
        if !self.layers.is_empty() {
            log::warn!("{} offscreen layers were not composited", self.layers.len());
            self.layers.clear();
        }

        log::debug!("Raster rendering finished");
        Ok(())
    }

    fn start_layer_processing(&mut self, layer: &Layer, query_extent: Box2d) {
        log::trace!("Start layer {}", layer.name());
        self.common.start_layer(layer, query_extent);
    }

    fn start_style_processing(&mut self, style: &FeatureTypeStyle) {
        self.common.start_style(style);
        if style.needs_offscreen() {
            self.layers
                .push(transparent_image(self.image.width(), self.image.height()));
        }
    }

    fn end_style_processing(&mut self, style: &FeatureTypeStyle) {
        if !style.needs_offscreen() {
            return;
        }

        let Some(layer) = self.layers.pop() else {
            return;
        };
        if !layer.painted() {
            return;
        }

        let target = self.target();
        blend_image(target, &layer, style.comp_op.unwrap_or_default(), style.opacity);
        target.set_painted(true);
    }

    fn process_point(
        &mut self,
        symbolizer: &PointSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_point(symbolizer, feature, prj_trans)
    }

    fn process_line(
        &mut self,
        symbolizer: &LineSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_line(symbolizer, feature, prj_trans)
    }

    fn process_line_pattern(
        &mut self,
        symbolizer: &LinePatternSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_line_pattern(symbolizer, feature, prj_trans)
    }

    fn process_polygon(
        &mut self,
        symbolizer: &PolygonSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_polygon(symbolizer, feature, prj_trans)
    }

    fn process_polygon_pattern(
        &mut self,
        symbolizer: &PolygonPatternSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_polygon_pattern(symbolizer, feature, prj_trans)
    }

    fn process_raster(
        &mut self,
        symbolizer: &RasterSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_raster(symbolizer, feature, prj_trans)
    }

    fn process_shield(
        &mut self,
        symbolizer: &TextSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_label(symbolizer, SymbolizerKind::Shield, feature, prj_trans)
    }

    fn process_text(
        &mut self,
        symbolizer: &TextSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_label(symbolizer, SymbolizerKind::Text, feature, prj_trans)
    }

    fn process_building(
        &mut self,
        symbolizer: &BuildingSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_building(symbolizer, feature, prj_trans)
    }

    fn process_markers(
        &mut self,
        symbolizer: &MarkersSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_markers(symbolizer, feature, prj_trans)
    }

    fn process_glyph(
        &mut self,
        symbolizer: &GlyphSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_glyph(symbolizer, feature, prj_trans)
    }

    fn process_debug(
        &mut self,
        symbolizer: &DebugSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_debug(symbolizer, feature, prj_trans)
    }

    fn process_group(
        &mut self,
        symbolizer: &GroupSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        self.render_group(symbolizer, feature, prj_trans)
    }
}
