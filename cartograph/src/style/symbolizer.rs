use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::key::Key;
use super::property::{Properties, Property, PropertyResolver};
use crate::error::CartographError;
use crate::expression::Expr;
use crate::feature::{Feature, Variables};

/// Kind of a [`Symbolizer`] without its properties.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SymbolizerKind {
    /// [`Symbolizer::Point`]
    Point,
    /// [`Symbolizer::Line`]
    Line,
    /// [`Symbolizer::LinePattern`]
    LinePattern,
    /// [`Symbolizer::Polygon`]
    Polygon,
    /// [`Symbolizer::PolygonPattern`]
    PolygonPattern,
    /// [`Symbolizer::Raster`]
    Raster,
    /// [`Symbolizer::Shield`]
    Shield,
    /// [`Symbolizer::Text`]
    Text,
    /// [`Symbolizer::Building`]
    Building,
    /// [`Symbolizer::Markers`]
    Markers,
    /// [`Symbolizer::Glyph`]
    Glyph,
    /// [`Symbolizer::Debug`]
    Debug,
    /// [`Symbolizer::Group`]
    Group,
}

impl SymbolizerKind {
    /// Name of the symbolizer kind.
    pub fn name(&self) -> &'static str {
        match self {
            SymbolizerKind::Point => "point",
            SymbolizerKind::Line => "line",
            SymbolizerKind::LinePattern => "line-pattern",
            SymbolizerKind::Polygon => "polygon",
            SymbolizerKind::PolygonPattern => "polygon-pattern",
            SymbolizerKind::Raster => "raster",
            SymbolizerKind::Shield => "shield",
            SymbolizerKind::Text => "text",
            SymbolizerKind::Building => "building",
            SymbolizerKind::Markers => "markers",
            SymbolizerKind::Glyph => "glyph",
            SymbolizerKind::Debug => "debug",
            SymbolizerKind::Group => "group",
        }
    }
}

impl Display for SymbolizerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

macro_rules! symbolizer {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name {
            /// Symbolizer properties.
            #[cfg_attr(feature = "serde", serde(default))]
            pub properties: Properties,
        }

        impl $name {
            /// Creates a symbolizer with default properties.
            pub fn new() -> Self {
                Self::default()
            }

            /// Sets a property.
            pub fn with(mut self, key: Key, value: impl Into<Property>) -> Self {
                self.properties.set(key, value);
                self
            }
        }
    };
}

symbolizer!(
    /// Draws an image (or the default square marker) at a point of the geometry.
    PointSymbolizer
);
symbolizer!(
    /// Strokes lines and polygon outlines.
    LineSymbolizer
);
symbolizer!(
    /// Draws an image repeatedly along lines.
    LinePatternSymbolizer
);
symbolizer!(
    /// Fills polygons with a color.
    PolygonSymbolizer
);
symbolizer!(
    /// Fills polygons with a repeated image.
    PolygonPatternSymbolizer
);
symbolizer!(
    /// Draws raster payloads of features.
    RasterSymbolizer
);
symbolizer!(
    /// Draws pseudo 3D buildings by extruding polygons.
    BuildingSymbolizer
);
symbolizer!(
    /// Draws markers at points, along lines or inside polygons.
    MarkersSymbolizer
);
symbolizer!(
    /// Draws a single font glyph, optionally rotated.
    GlyphSymbolizer
);
symbolizer!(
    /// Draws collision boxes or geometry vertices for debugging.
    DebugSymbolizer
);

/// Draws text labels. Shields are text labels with an image behind them.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TextSymbolizer {
    /// Symbolizer properties.
    #[cfg_attr(feature = "serde", serde(default))]
    pub properties: Properties,
    /// Alternative positions tried when the label doesn't fit.
    #[cfg_attr(feature = "serde", serde(default))]
    pub placements: TextPlacements,
}

impl TextSymbolizer {
    /// Creates a text symbolizer with the given label text expression.
    pub fn new(name: Expr) -> Self {
        Self {
            properties: Properties::new().with(Key::Name, name),
            placements: TextPlacements::default(),
        }
    }

    /// Sets a property.
    pub fn with(mut self, key: Key, value: impl Into<Property>) -> Self {
        self.properties.set(key, value);
        self
    }

    /// Sets alternative placements.
    pub fn with_placements(mut self, placements: TextPlacements) -> Self {
        self.placements = placements;
        self
    }
}

/// A set of rules applied to numbered attribute columns of a feature, laid out as one label.
///
/// For every column index `i` in `start-column..start-column + num-columns` a sub-feature is made in
/// which an attribute `name%` refers to `name{i}` of the original feature. Rules are matched against
/// the sub-features, and all the matched text, shield, point and markers symbolizers are placed as a
/// single group.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupSymbolizer {
    /// Symbolizer properties.
    #[cfg_attr(feature = "serde", serde(default))]
    pub properties: Properties,
    /// Rules matched against every column.
    #[cfg_attr(feature = "serde", serde(default))]
    pub rules: Vec<GroupRule>,
}

impl GroupSymbolizer {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property.
    pub fn with(mut self, key: Key, value: impl Into<Property>) -> Self {
        self.properties.set(key, value);
        self
    }

    /// Adds a rule.
    pub fn with_rule(mut self, rule: GroupRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Column indices of the group.
    pub fn columns(&self, resolver: &PropertyResolver) -> std::ops::Range<usize> {
        let start = resolver.f64_or(Key::StartColumn, 1.0).max(0.0) as usize;
        let count = resolver.f64_or(Key::NumColumns, 0.0).max(0.0) as usize;
        start..start + count
    }
}

/// Rule of a [`GroupSymbolizer`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupRule {
    /// Filter, `None` matches all columns.
    #[cfg_attr(feature = "serde", serde(default))]
    pub filter: Option<Expr>,
    /// Symbolizers applied to matched columns.
    pub symbolizers: Vec<Symbolizer>,
}

impl GroupRule {
    /// Returns true if the rule applies to the column feature.
    pub fn matches(&self, feature: &Feature, variables: &Variables) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.matches(feature, variables))
    }
}

/// Typed drawing instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "kebab-case"))]
pub enum Symbolizer {
    /// See [`PointSymbolizer`].
    Point(PointSymbolizer),
    /// See [`LineSymbolizer`].
    Line(LineSymbolizer),
    /// See [`LinePatternSymbolizer`].
    LinePattern(LinePatternSymbolizer),
    /// See [`PolygonSymbolizer`].
    Polygon(PolygonSymbolizer),
    /// See [`PolygonPatternSymbolizer`].
    PolygonPattern(PolygonPatternSymbolizer),
    /// See [`RasterSymbolizer`].
    Raster(RasterSymbolizer),
    /// Text with an image, see [`TextSymbolizer`].
    Shield(TextSymbolizer),
    /// See [`TextSymbolizer`].
    Text(TextSymbolizer),
    /// See [`BuildingSymbolizer`].
    Building(BuildingSymbolizer),
    /// See [`MarkersSymbolizer`].
    Markers(MarkersSymbolizer),
    /// See [`GlyphSymbolizer`].
    Glyph(GlyphSymbolizer),
    /// See [`DebugSymbolizer`].
    Debug(DebugSymbolizer),
    /// See [`GroupSymbolizer`].
    Group(GroupSymbolizer),
}

impl Symbolizer {
    /// Kind of the symbolizer.
    pub fn kind(&self) -> SymbolizerKind {
        match self {
            Symbolizer::Point(_) => SymbolizerKind::Point,
            Symbolizer::Line(_) => SymbolizerKind::Line,
            Symbolizer::LinePattern(_) => SymbolizerKind::LinePattern,
            Symbolizer::Polygon(_) => SymbolizerKind::Polygon,
            Symbolizer::PolygonPattern(_) => SymbolizerKind::PolygonPattern,
            Symbolizer::Raster(_) => SymbolizerKind::Raster,
            Symbolizer::Shield(_) => SymbolizerKind::Shield,
            Symbolizer::Text(_) => SymbolizerKind::Text,
            Symbolizer::Building(_) => SymbolizerKind::Building,
            Symbolizer::Markers(_) => SymbolizerKind::Markers,
            Symbolizer::Glyph(_) => SymbolizerKind::Glyph,
            Symbolizer::Debug(_) => SymbolizerKind::Debug,
            Symbolizer::Group(_) => SymbolizerKind::Group,
        }
    }

    /// Properties of the symbolizer.
    pub fn properties(&self) -> &Properties {
        match self {
            Symbolizer::Point(s) => &s.properties,
            Symbolizer::Line(s) => &s.properties,
            Symbolizer::LinePattern(s) => &s.properties,
            Symbolizer::Polygon(s) => &s.properties,
            Symbolizer::PolygonPattern(s) => &s.properties,
            Symbolizer::Raster(s) => &s.properties,
            Symbolizer::Shield(s) | Symbolizer::Text(s) => &s.properties,
            Symbolizer::Building(s) => &s.properties,
            Symbolizer::Markers(s) => &s.properties,
            Symbolizer::Glyph(s) => &s.properties,
            Symbolizer::Debug(s) => &s.properties,
            Symbolizer::Group(s) => &s.properties,
        }
    }

    /// Creates a resolver of the symbolizer properties for the feature.
    pub fn resolver<'a>(
        &'a self,
        defaults: Option<&'a Properties>,
        feature: &'a Feature,
        variables: &'a Variables,
    ) -> PropertyResolver<'a> {
        PropertyResolver::new(self.kind(), self.properties(), defaults, feature, variables)
    }

    /// Adds names of attributes read by the symbolizer to the set.
    pub fn collect_attributes(&self, names: &mut BTreeSet<String>) {
        self.properties().collect_attributes(names);
        if let Symbolizer::Group(group) = self {
            let mut column_names = BTreeSet::new();
            for rule in &group.rules {
                if let Some(filter) = &rule.filter {
                    filter.collect_attributes(&mut column_names);
                }
                for symbolizer in &rule.symbolizers {
                    symbolizer.collect_attributes(&mut column_names);
                }
            }

            // Column attributes can't be resolved without a feature, so all of them are requested
            // through the base name.
            names.extend(column_names.into_iter().map(|n| n.replace('%', "")));
        }
    }
}

macro_rules! impl_from {
    ($($ty:ident => $variant:ident),*) => {
        $(
            impl From<$ty> for Symbolizer {
                fn from(value: $ty) -> Self {
                    Symbolizer::$variant(value)
                }
            }
        )*
    };
}

impl_from!(
    PointSymbolizer => Point,
    LineSymbolizer => Line,
    LinePatternSymbolizer => LinePattern,
    PolygonSymbolizer => Polygon,
    PolygonPatternSymbolizer => PolygonPattern,
    RasterSymbolizer => Raster,
    TextSymbolizer => Text,
    BuildingSymbolizer => Building,
    MarkersSymbolizer => Markers,
    GlyphSymbolizer => Glyph,
    DebugSymbolizer => Debug,
    GroupSymbolizer => Group
);

/// Direction in which a label is moved from its anchor by alternative placements.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Displacement as set by `dx` and `dy`.
    Exact,
    /// Above the anchor.
    North,
    /// Below the anchor.
    South,
    /// Right of the anchor.
    East,
    /// Left of the anchor.
    West,
    /// Above right.
    NorthEast,
    /// Above left.
    NorthWest,
    /// Below right.
    SouthEast,
    /// Below left.
    SouthWest,
}

impl Direction {
    const NAMES: [(Direction, &'static str); 9] = [
        (Direction::Exact, "X"),
        (Direction::North, "N"),
        (Direction::South, "S"),
        (Direction::East, "E"),
        (Direction::West, "W"),
        (Direction::NorthEast, "NE"),
        (Direction::NorthWest, "NW"),
        (Direction::SouthEast, "SE"),
        (Direction::SouthWest, "SW"),
    ];

    fn name(&self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(d, _)| d == self)
            .map_or("X", |(_, name)| name)
    }

    /// Displacement in pixels (y axis points down) for the given `dx`/`dy` magnitudes.
    pub fn displacement(&self, dx: f64, dy: f64) -> (f64, f64) {
        let (dx, dy) = (dx.abs(), dy.abs());
        match self {
            Direction::Exact => (dx, dy),
            Direction::North => (0.0, -dy),
            Direction::South => (0.0, dy),
            Direction::East => (dx, 0.0),
            Direction::West => (-dx, 0.0),
            Direction::NorthEast => (dx, -dy),
            Direction::NorthWest => (-dx, -dy),
            Direction::SouthEast => (dx, dy),
            Direction::SouthWest => (-dx, dy),
        }
    }
}

/// Single attempt of text placement: displacement and font size.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlacementAttempt {
    /// Horizontal displacement.
    pub dx: f64,
    /// Vertical displacement.
    pub dy: f64,
    /// Font size.
    pub size: f64,
}

/// Alternative placements of text labels.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TextPlacements {
    /// Only the position set by the symbolizer properties is tried.
    #[default]
    Dummy,
    /// Positions in the given directions and with the given font sizes are tried in order.
    Simple(SimplePlacements),
}

impl TextPlacements {
    /// Placement attempts in order. `dx`, `dy` and `size` are the values from the symbolizer.
    pub fn attempts(&self, dx: f64, dy: f64, size: f64) -> Vec<PlacementAttempt> {
        match self {
            TextPlacements::Dummy => vec![PlacementAttempt { dx, dy, size }],
            TextPlacements::Simple(simple) => {
                let directions: &[Direction] = if simple.directions.is_empty() {
                    &[Direction::Exact]
                } else {
                    &simple.directions
                };
                let sizes: &[f64] = if simple.sizes.is_empty() {
                    std::slice::from_ref(&size)
                } else {
                    &simple.sizes
                };

                sizes
                    .iter()
                    .flat_map(|size| {
                        directions.iter().map(move |direction| {
                            let (dx, dy) = match direction {
                                Direction::Exact => (dx, dy),
                                d => d.displacement(dx, dy),
                            };
                            PlacementAttempt { dx, dy, size: *size }
                        })
                    })
                    .collect()
            }
        }
    }
}

/// Directions and font sizes, written as `N,S,E,W,12,10`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct SimplePlacements {
    /// Directions.
    pub directions: Vec<Direction>,
    /// Font sizes.
    pub sizes: Vec<f64>,
}

impl FromStr for SimplePlacements {
    type Err = CartographError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut placements = SimplePlacements::default();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            if let Some((direction, _)) = Direction::NAMES.iter().find(|(_, name)| *name == item) {
                placements.directions.push(*direction);
            } else if let Ok(size) = item.parse::<f64>() {
                placements.sizes.push(size);
            } else {
                return Err(CartographError::Config(format!(
                    "invalid text placement '{item}' in '{s}'"
                )));
            }
        }

        Ok(placements)
    }
}

impl Display for SimplePlacements {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let items: Vec<String> = self
            .directions
            .iter()
            .map(|d| d.name().to_string())
            .chain(self.sizes.iter().map(|s| s.to_string()))
            .collect();
        write!(f, "{}", items.join(","))
    }
}

impl TryFrom<String> for SimplePlacements {
    type Error = CartographError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SimplePlacements> for String {
    fn from(value: SimplePlacements) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::feature::Context;

    #[test]
    fn simple_placements() {
        let placements: SimplePlacements = "N, S,E,W,12,10".parse().unwrap();
        assert_eq!(placements.to_string(), "N,S,E,W,12,10");
        assert!("N,Q".parse::<SimplePlacements>().is_err());

        let attempts = TextPlacements::Simple(placements).attempts(3.0, 4.0, 14.0);
        assert_eq!(attempts.len(), 8);
        assert_eq!(
            attempts[0],
            PlacementAttempt {
                dx: 0.0,
                dy: -4.0,
                size: 12.0
            }
        );
        assert_eq!(
            attempts[7],
            PlacementAttempt {
                dx: -3.0,
                dy: 0.0,
                size: 10.0
            }
        );

        assert_eq!(
            TextPlacements::Dummy.attempts(1.0, 2.0, 3.0),
            vec![PlacementAttempt {
                dx: 1.0,
                dy: 2.0,
                size: 3.0
            }]
        );
    }

    #[test]
    fn group_columns_and_attributes() {
        let group = GroupSymbolizer::new()
            .with(Key::NumColumns, 3)
            .with(Key::StartColumn, 2)
            .with_rule(GroupRule {
                filter: Some(Expr::parse("[ref%] != ''").unwrap()),
                symbolizers: vec![TextSymbolizer::new(Expr::attribute("ref%")).into()],
            });
        let symbolizer = Symbolizer::from(group.clone());
        let feature = Feature::new(1, Arc::new(Context::default()));
        let variables = Variables::new();
        let resolver = symbolizer.resolver(None, &feature, &variables);
        assert_eq!(group.columns(&resolver), 2..5);

        let mut names = BTreeSet::new();
        symbolizer.collect_attributes(&mut names);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["ref"]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialization() {
        let json = r##"[
            {"type": "polygon", "properties": {"fill": "#ff0000", "fill-opacity": 0.5}},
            {"type": "text", "properties": {"name": "[name]"}, "placements": {"simple": "N,S,12"}},
            {"type": "debug"}
        ]"##;
        let symbolizers: Vec<Symbolizer> = serde_json::from_str(json).unwrap();
        assert_eq!(symbolizers[0].kind(), SymbolizerKind::Polygon);
        assert_eq!(symbolizers[1].kind(), SymbolizerKind::Text);
        assert_eq!(symbolizers[2].kind(), SymbolizerKind::Debug);
        let Symbolizer::Text(text) = &symbolizers[1] else {
            panic!("not a text symbolizer");
        };
        assert_eq!(
            text.placements,
            TextPlacements::Simple("N,S,12".parse().unwrap())
        );

        let back: Vec<Symbolizer> =
            serde_json::from_str(&serde_json::to_string(&symbolizers).unwrap()).unwrap();
        assert_eq!(back, symbolizers);
    }
}
