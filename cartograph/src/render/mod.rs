//! Renderer backends.
//!
//! A backend implements [`Renderer`]. The
//! [`FeatureStyleProcessor`](crate::processor::FeatureStyleProcessor) walks the layers of the map
//! and calls the hooks of the backend in this order:
//!
//! ```text
//! start_map_processing
//!     start_layer_processing
//!         start_style_processing
//!             process (for every matched symbolizer of every feature)
//!         end_style_processing
//!     end_layer_processing
//! end_map_processing
//! ```
//!
//! [`Renderer::process`] dispatches the symbolizer to the method of its kind. Backends implement
//! only the symbolizers they support, the others are silently skipped.

use cartograph_types::Box2d;

use crate::error::CartographError;
use crate::feature::Feature;
use crate::map::{Layer, Map};
use crate::projection::ProjTransform;
use crate::style::{
    BuildingSymbolizer, DebugSymbolizer, FeatureTypeStyle, GlyphSymbolizer, GroupSymbolizer,
    LinePatternSymbolizer, LineSymbolizer, MarkersSymbolizer, PointSymbolizer,
    PolygonPatternSymbolizer, PolygonSymbolizer, RasterSymbolizer, Symbolizer, TextSymbolizer,
};

mod building;
mod common;
mod grid;
mod group;
mod marker;
mod raster;
mod svg;

pub use building::BuildingFaces;
pub use common::{
    dash_array, font_selector, layout_options, marker_size, text_finder, to_lyon_transform,
    LineStyle, MarkerStyle, PolygonStyle, RenderOptions, RendererCommon, TextStyle,
};
pub use grid::{Grid, GridRenderer, ID_KEY};
pub use group::DrawIntent;
pub use marker::{centered_box, Marker, MarkerCache, Shape, SHAPE_PREFIX};
pub use raster::{
    blend_image, blend_pixel, Colorizer, FillRule, Gamma, Mask, RasterRenderer, Rasterizer, Stroke,
};
pub use svg::SvgRenderer;

/// Result of a symbolizer processing.
pub type RenderResult = Result<(), CartographError>;

/// Output backend of the feature style processor.
///
/// All methods have empty default implementations.
#[allow(unused_variables)]
pub trait Renderer {
    /// Called once before any layer is processed.
    fn start_map_processing(&mut self, map: &Map) -> RenderResult {
        Ok(())
    }

    /// Called once after all layers are processed.
    fn end_map_processing(&mut self, map: &Map) -> RenderResult {
        Ok(())
    }

    /// Called before features of the layer are processed. `query_extent` is the extent of the
    /// datasource query in the layer SRS.
    fn start_layer_processing(&mut self, layer: &Layer, query_extent: Box2d) {}

    /// Called after all styles of the layer are processed.
    fn end_layer_processing(&mut self, layer: &Layer) {}

    /// Called before features are rendered with the style.
    fn start_style_processing(&mut self, style: &FeatureTypeStyle) {}

    /// Called after all features are rendered with the style.
    fn end_style_processing(&mut self, style: &FeatureTypeStyle) {}

    /// Renders the feature with the symbolizer. `prj_trans` converts the feature coordinates
    /// into the map SRS.
    fn process(
        &mut self,
        symbolizer: &Symbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        match symbolizer {
            Symbolizer::Point(s) => self.process_point(s, feature, prj_trans),
            Symbolizer::Line(s) => self.process_line(s, feature, prj_trans),
            Symbolizer::LinePattern(s) => self.process_line_pattern(s, feature, prj_trans),
            Symbolizer::Polygon(s) => self.process_polygon(s, feature, prj_trans),
            Symbolizer::PolygonPattern(s) => self.process_polygon_pattern(s, feature, prj_trans),
            Symbolizer::Raster(s) => self.process_raster(s, feature, prj_trans),
            Symbolizer::Shield(s) => self.process_shield(s, feature, prj_trans),
            Symbolizer::Text(s) => self.process_text(s, feature, prj_trans),
            Symbolizer::Building(s) => self.process_building(s, feature, prj_trans),
            Symbolizer::Markers(s) => self.process_markers(s, feature, prj_trans),
            Symbolizer::Glyph(s) => self.process_glyph(s, feature, prj_trans),
            Symbolizer::Debug(s) => self.process_debug(s, feature, prj_trans),
            Symbolizer::Group(s) => self.process_group(s, feature, prj_trans),
        }
    }

    /// Point symbolizer.
    fn process_point(
        &mut self,
        symbolizer: &PointSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Line symbolizer.
    fn process_line(
        &mut self,
        symbolizer: &LineSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Line pattern symbolizer.
    fn process_line_pattern(
        &mut self,
        symbolizer: &LinePatternSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Polygon symbolizer.
    fn process_polygon(
        &mut self,
        symbolizer: &PolygonSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Polygon pattern symbolizer.
    fn process_polygon_pattern(
        &mut self,
        symbolizer: &PolygonPatternSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Raster symbolizer.
    fn process_raster(
        &mut self,
        symbolizer: &RasterSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Shield symbolizer.
    fn process_shield(
        &mut self,
        symbolizer: &TextSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Text symbolizer.
    fn process_text(
        &mut self,
        symbolizer: &TextSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Building symbolizer.
    fn process_building(
        &mut self,
        symbolizer: &BuildingSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Markers symbolizer.
    fn process_markers(
        &mut self,
        symbolizer: &MarkersSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Glyph symbolizer.
    fn process_glyph(
        &mut self,
        symbolizer: &GlyphSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Debug symbolizer.
    fn process_debug(
        &mut self,
        symbolizer: &DebugSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }

    /// Group symbolizer.
    fn process_group(
        &mut self,
        symbolizer: &GroupSymbolizer,
        feature: &Feature,
        prj_trans: &ProjTransform,
    ) -> RenderResult {
        Ok(())
    }
}
