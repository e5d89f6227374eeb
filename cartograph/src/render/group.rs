//! Group symbolizers are rendered in two phases. First every column of the group is laid out into a
//! list of [`DrawIntent`]s, and the whole list is placed as a single label. Then the backend replays
//! the intents at every accepted position.

use std::sync::Arc;

use cartograph_types::{Box2d, Point2d, Vector2d};

use super::common::{
    font_selector, layout_options, marker_size, MarkerStyle, RendererCommon, TextStyle,
};
use super::marker::{centered_box, Marker};
use crate::error::CartographError;
use crate::feature::{Context, Feature};
use crate::placement::PlacementParams;
use crate::projection::ProjTransform;
use crate::style::{GroupSymbolizer, Key, Properties, Symbolizer, SymbolizerKind};
use crate::text::TextLayout;

/// Deferred drawing operation of a group item.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawIntent {
    /// Text block. Glyph positions of the layout are relative to `offset`.
    Text {
        /// Laid out text.
        layout: TextLayout,
        /// Colors.
        style: TextStyle,
        /// Position of the layout anchor relative to the group anchor.
        offset: Vector2d,
    },
    /// Marker or point image centered at `offset`.
    Marker {
        /// Marker symbol.
        marker: Arc<Marker>,
        /// Width and height in pixels.
        size: (f64, f64),
        /// Colors of vector markers.
        style: MarkerStyle,
        /// Center of the marker relative to the group anchor.
        offset: Vector2d,
    },
}

impl DrawIntent {
    /// Position of the item relative to the group anchor.
    pub fn offset(&self) -> Vector2d {
        match self {
            DrawIntent::Text { offset, .. } | DrawIntent::Marker { offset, .. } => *offset,
        }
    }

    /// Box of the item relative to the group anchor.
    pub fn bbox(&self) -> Box2d {
        let offset = self.offset();
        let bbox = match self {
            DrawIntent::Text { layout, .. } => layout.bbox(),
            DrawIntent::Marker { size, .. } => centered_box(size.0, size.1),
        };
        bbox.translate(offset.x, offset.y)
    }

    fn shift(&mut self, dx: f64) {
        match self {
            DrawIntent::Text { offset, .. } | DrawIntent::Marker { offset, .. } => offset.x += dx,
        }
    }
}

/// Items of a group laid out in a row centered at the group anchor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupLayout {
    /// Items in drawing order.
    pub intents: Vec<DrawIntent>,
    /// Box of all items relative to the group anchor.
    pub bbox: Box2d,
}

/// Feature of one group column: attributes `name{column}` are also available as `name%`.
pub(crate) fn column_feature(feature: &Feature, column: usize) -> Feature {
    let suffix = column.to_string();
    let aliases: Vec<(String, _)> = feature
        .attributes()
        .filter_map(|(name, value)| {
            let prefix = name.strip_suffix(suffix.as_str())?;
            (!prefix.is_empty()).then(|| (format!("{prefix}%"), value.clone()))
        })
        .collect();

    let names = feature
        .context()
        .names()
        .iter()
        .cloned()
        .chain(aliases.iter().map(|(name, _)| name.clone()));
    let mut column_feature = Feature::new(feature.id(), Arc::new(Context::new(names)));
    for (name, value) in feature.attributes() {
        column_feature.set(name, value.clone());
    }
    for (name, value) in aliases {
        column_feature.set(&name, value);
    }
    for geometry in feature.geometries() {
        column_feature = column_feature.with_geometry(geometry.clone());
    }

    column_feature
}

/// First phase: lays out the items of all columns.
pub(crate) fn layout_group(
    common: &RendererCommon,
    symbolizer: &GroupSymbolizer,
    feature: &Feature,
) -> Result<GroupLayout, CartographError> {
    let resolver = common.resolver(SymbolizerKind::Group, &symbolizer.properties, feature);
    let margin = resolver.f64_or(Key::ItemMargin, 0.0) * common.options.scale_factor;

    let mut intents: Vec<DrawIntent> = vec![];
    let mut cursor = 0.0;
    for column in symbolizer.columns(&resolver) {
        let column_feature = column_feature(feature, column);
        for rule in &symbolizer.rules {
            if !rule.matches(&column_feature, &common.variables) {
                continue;
            }

            for item in &rule.symbolizers {
                let Some(mut intent) = item_intent(common, item, &column_feature)? else {
                    continue;
                };
                let bbox = intent.bbox();
                if !bbox.is_valid() {
                    continue;
                }

                if !intents.is_empty() {
                    cursor += margin;
                }
                intent.shift(cursor - bbox.min_x());
                cursor += bbox.width();
                intents.push(intent);
            }
        }
    }

    let mut bbox = Box2d::invalid();
    for intent in &intents {
        bbox.expand_to_include(&intent.bbox());
    }
    if !bbox.is_valid() {
        return Ok(GroupLayout::default());
    }

    let dx = -bbox.center().x;
    for intent in &mut intents {
        intent.shift(dx);
    }

    Ok(GroupLayout {
        intents,
        bbox: bbox.translate(dx, 0.0),
    })
}

fn item_intent(
    common: &RendererCommon,
    symbolizer: &Symbolizer,
    feature: &Feature,
) -> Result<Option<DrawIntent>, CartographError> {
    let scale_factor = common.options.scale_factor;
    match symbolizer {
        Symbolizer::Text(s) | Symbolizer::Shield(s) => {
            let resolver = common.resolver(symbolizer.kind(), &s.properties, feature);
            let Some(text) = resolver.string(Key::Name).filter(|t| !t.trim().is_empty()) else {
                return Ok(None);
            };
            let font = font_selector(&resolver)?;
            let layout = TextLayout::new(
                common.shaper.as_ref(),
                &text,
                &font,
                &layout_options(&resolver, scale_factor),
            )?;

            Ok(Some(DrawIntent::Text {
                layout,
                style: TextStyle::from_resolver(&resolver, &common.options),
                offset: Vector2d::zeros(),
            }))
        }
        Symbolizer::Point(s) => {
            marker_intent(common, symbolizer.kind(), &s.properties, feature, None)
        }
        Symbolizer::Markers(s) => marker_intent(
            common,
            symbolizer.kind(),
            &s.properties,
            feature,
            Some("shape://ellipse"),
        ),
        other => {
            log::debug!("{} symbolizer cannot be a part of a group", other.kind());
            Ok(None)
        }
    }
}

fn marker_intent(
    common: &RendererCommon,
    kind: SymbolizerKind,
    properties: &Properties,
    feature: &Feature,
    default_file: Option<&str>,
) -> Result<Option<DrawIntent>, CartographError> {
    let resolver = common.resolver(kind, properties, feature);
    let Some(file) = resolver
        .string(Key::File)
        .or_else(|| default_file.map(str::to_string))
    else {
        return Ok(None);
    };

    let marker = common.markers.get(&file)?;
    let scale_factor = common.options.scale_factor;
    Ok(Some(DrawIntent::Marker {
        size: marker_size(&resolver, &marker, scale_factor),
        style: MarkerStyle::from_resolver(&resolver, scale_factor),
        marker,
        offset: Vector2d::zeros(),
    }))
}

/// Second phase: places the group box at the anchors and registers the accepted boxes in the
/// detector. Returns the accepted anchors.
pub(crate) fn place_group(
    common: &mut RendererCommon,
    layout: &GroupLayout,
    anchors: &[Point2d],
    params: &PlacementParams,
) -> Vec<Point2d> {
    let extent = common.detector.extent();
    let mut placed = vec![];
    for anchor in anchors {
        let bbox = layout.bbox.translate(anchor.x, anchor.y);
        if !params.fits_extent(&bbox, &extent) {
            continue;
        }
        if !params.allow_overlap
            && !common
                .detector
                .has_placement_with_margin(&bbox, params.margin)
        {
            continue;
        }

        if !params.ignore_placement {
            common.detector.insert(bbox);
        }
        placed.push(*anchor);
    }

    placed
}

/// Both phases: returns the layout and the anchors it was placed at.
pub(crate) fn render_group(
    common: &mut RendererCommon,
    symbolizer: &GroupSymbolizer,
    feature: &Feature,
    prj_trans: &ProjTransform,
) -> Result<(GroupLayout, Vec<Point2d>), CartographError> {
    let layout = layout_group(common, symbolizer, feature)?;
    if layout.intents.is_empty() {
        return Ok((layout, vec![]));
    }

    let resolver = common.resolver(SymbolizerKind::Group, &symbolizer.properties, feature);
    let params = PlacementParams::from_resolver(&resolver, common.options.scale_factor);
    let geometry = common.placement_geometry(feature, &resolver, prj_trans, params.placement);

    let anchors = place_group(common, &layout, &geometry.anchors, &params);
    Ok((layout, anchors))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use cartograph_types::projection::Srs;
    use cartograph_types::Geometry;

    use super::*;
    use crate::feature::Value;
    use crate::map::Map;
    use crate::render::common::RenderOptions;
    use crate::style::{GroupRule, TextSymbolizer};
    use crate::text::testing::BoxShaper;

    fn feature() -> Feature {
        Feature::new(7, Arc::new(Context::new(["ref1", "ref2", "kind"])))
            .with("ref1", "ab")
            .with("ref2", "cde")
            .with("kind", "road")
            .with_geometry(Geometry::Point(Point2d::new(50.0, 50.0)))
    }

    fn common() -> RendererCommon {
        let mut map = Map::new(100, 100, Srs::WebMercator);
        map.zoom_to_box(Box2d::new(0.0, 0.0, 100.0, 100.0));
        let mut common = RendererCommon::new(&map, RenderOptions::default());
        common.set_shaper(Arc::new(BoxShaper));
        common
    }

    fn group() -> GroupSymbolizer {
        GroupSymbolizer::new()
            .with(Key::NumColumns, 2.0)
            .with(Key::ItemMargin, 2.0)
            .with_rule(GroupRule {
                filter: None,
                symbolizers: vec![Symbolizer::Text(
                    TextSymbolizer::new("[ref%]".parse().unwrap()).with(Key::FaceName, "Test"),
                )],
            })
    }

    #[test]
    fn column_aliases() {
        let column = column_feature(&feature(), 2);
        assert_eq!(column.get("ref%"), &Value::String("cde".into()));
        assert_eq!(column.get("ref2"), &Value::String("cde".into()));
        assert_eq!(column.get("kind"), &Value::String("road".into()));
        assert_eq!(column.geometries().len(), 1);
        assert_eq!(column.id(), 7);
    }

    #[test]
    fn items_are_laid_out_in_a_row() {
        let common = common();
        let layout = layout_group(&common, &group(), &feature()).unwrap();

        assert_eq!(layout.intents.len(), 2);
        // "ab" is 12 pixels wide, "cde" is 18, plus 2 pixels of margin.
        assert_abs_diff_eq!(layout.bbox.width(), 32.0, epsilon = 1e-9);
        assert_abs_diff_eq!(layout.bbox.center().x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(layout.intents[0].bbox().min_x(), -16.0, epsilon = 1e-9);
        assert_abs_diff_eq!(layout.intents[1].bbox().min_x(), -2.0, epsilon = 1e-9);
    }

    #[test]
    fn group_is_placed_once() {
        let mut common = common();
        let feature = feature();
        let prj = ProjTransform::identity(&Srs::WebMercator);

        let (layout, anchors) = render_group(&mut common, &group(), &feature, &prj).unwrap();
        assert_eq!(layout.intents.len(), 2);
        assert_eq!(anchors.len(), 1);
        assert_eq!(common.detector().len(), 1);

        let (_, anchors) = render_group(&mut common, &group(), &feature, &prj).unwrap();
        assert!(anchors.is_empty());
    }

    #[test]
    fn unsupported_items_are_skipped() {
        let common = common();
        let symbolizer = GroupSymbolizer::new().with(Key::NumColumns, 1.0).with_rule(GroupRule {
            filter: None,
            symbolizers: vec![Symbolizer::Line(Default::default())],
        });
        let layout = layout_group(&common, &symbolizer, &feature()).unwrap();
        assert!(layout.intents.is_empty());
        assert!(!layout.bbox.is_valid());
    }
}
