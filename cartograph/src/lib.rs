//! Cartograph is a style driven 2D map renderer. It reads features from datasources, matches them
//! against the rules of feature type styles and draws them with symbolizers into a raster image, a
//! hit grid or an SVG document.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cartograph::cartograph_types::projection::Srs;
//! use cartograph::cartograph_types::{Box2d, Point2d};
//! use cartograph::datasource::MemoryDatasource;
//! use cartograph::feature::{Context, Feature};
//! use cartograph::processor::FeatureStyleProcessor;
//! use cartograph::render::{RasterRenderer, RenderOptions};
//! use cartograph::style::{FeatureTypeStyle, Key, MarkersSymbolizer, Rule};
//! use cartograph::{Color, Layer, Map};
//!
//! let context = Arc::new(Context::new(["name"]));
//! let datasource = MemoryDatasource::new().with_feature(
//!     Feature::new(1, context)
//!         .with("name", "Seoul")
//!         .with_geometry(Point2d::new(14_128_000.0, 4_512_000.0)),
//! );
//!
//! let style = FeatureTypeStyle::new().with_rule(
//!     Rule::new().with_symbolizer(MarkersSymbolizer::new().with(Key::Fill, Color::RED)),
//! );
//!
//! let mut map = Map::new(256, 256, Srs::WebMercator)
//!     .with_background(Color::WHITE)
//!     .with_style("cities", style)
//!     .with_layer(Layer::new("cities", Arc::new(datasource)).with_style("cities"));
//! map.zoom_to_box(Box2d::new(14_000_000.0, 4_400_000.0, 14_300_000.0, 4_700_000.0));
//!
//! let mut renderer = RasterRenderer::new(&map, RenderOptions::default());
//! let report = FeatureStyleProcessor::new(&map, &mut renderer).apply(None)?;
//! assert!(report.is_complete());
//!
//! let png = renderer.image().encode("png")?;
//! # Ok::<(), cartograph::error::CartographError>(())
//! ```
//!
//! # Main components
//!
//! * [`Map`] holds the output size, the current extent, named [`styles`](style) and an ordered
//!   list of [`Layer`]s. Every layer reads its features from a [`datasource`].
//! * [`FeatureStyleProcessor`](processor::FeatureStyleProcessor) walks the layers, queries the
//!   datasources and hands every matched symbolizer to a [`Renderer`](render::Renderer).
//! * Renderers pass feature geometries through the [`converter`] chain (clipping, projection,
//!   simplification, smoothing, offsets and dashes), place labels and markers with the
//!   [`placement`] finders and avoid overlaps through the [`label`] collision detector.
//! * [`RasterRenderer`](render::RasterRenderer) produces an RGBA [`image`],
//!   [`GridRenderer`](render::GridRenderer) a UTF hit grid and [`SvgRenderer`](render::SvgRenderer)
//!   an SVG document.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

mod color;
pub mod converter;
pub mod datasource;
pub mod error;
pub mod expression;
pub mod feature;
pub mod image;
pub mod label;
mod map;
pub mod placement;
pub mod processor;
pub mod projection;
pub mod render;
pub mod style;
pub mod text;
pub mod view;

pub use color::Color;
pub use map::{scale_denominator, Layer, Map};

// Reexport cartograph_types
pub use cartograph_types;
