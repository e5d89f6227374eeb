use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::property::Property;
use super::symbolizer::SymbolizerKind;
use crate::feature::Value;
use crate::Color;

/// Type of the value a [`Key`] expects.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyKind {
    /// Floating point number.
    Double,
    /// Boolean flag.
    Bool,
    /// Free form string.
    String,
    /// One of a fixed set of names.
    Enumeration,
    /// Color.
    Color,
    /// Expression evaluated per feature (e.g. text of a label).
    Expression,
    /// Affine transform list.
    Transform,
}

macro_rules! keys {
    ($( $(#[$doc:meta])* $variant:ident => ($name:literal, $kind:ident, $default:expr), )*) => {
        /// Name of a symbolizer property.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Key {
            $( $(#[$doc])* $variant, )*
        }

        impl Key {
            /// All keys.
            pub const ALL: &'static [Key] = &[$( Key::$variant, )*];

            /// Name of the key in style definitions.
            pub fn name(&self) -> &'static str {
                match self {
                    $( Key::$variant => $name, )*
                }
            }

            /// Type of the key value.
            pub fn kind(&self) -> KeyKind {
                match self {
                    $( Key::$variant => KeyKind::$kind, )*
                }
            }

            /// Value used when the key is set neither on the symbolizer nor in the style defaults.
            pub fn default_value(&self) -> Property {
                match self {
                    $( Key::$variant => $default, )*
                }
            }
        }
    };
}

const fn double(v: f64) -> Property {
    Property::Value(Value::Double(v))
}

const fn flag(v: bool) -> Property {
    Property::Value(Value::Bool(v))
}

const fn color(c: Color) -> Property {
    Property::Color(c)
}

fn name(v: &str) -> Property {
    Property::Value(Value::String(v.to_string()))
}

const NONE: Property = Property::Value(Value::Null);

keys! {
    /// Fill color.
    Fill => ("fill", Color, color(Color::rgb(128, 128, 128))),
    /// Opacity of the fill.
    FillOpacity => ("fill-opacity", Double, double(1.0)),
    /// Opacity of the whole symbolizer (images, markers, rasters, text).
    Opacity => ("opacity", Double, double(1.0)),
    /// Stroke color.
    Stroke => ("stroke", Color, color(Color::BLACK)),
    /// Stroke width in pixels.
    StrokeWidth => ("stroke-width", Double, double(1.0)),
    /// Stroke opacity.
    StrokeOpacity => ("stroke-opacity", Double, double(1.0)),
    /// `miter`, `miter-revert`, `round` or `bevel`.
    StrokeLinejoin => ("stroke-linejoin", Enumeration, name("miter")),
    /// `butt`, `square` or `round`.
    StrokeLinecap => ("stroke-linecap", Enumeration, name("butt")),
    /// Miter limit of the stroke joins.
    StrokeMiterlimit => ("stroke-miterlimit", Double, double(4.0)),
    /// Dash array: comma or space separated list of dash and gap lengths.
    StrokeDasharray => ("stroke-dasharray", String, NONE),
    /// Offset of the dash pattern.
    StrokeDashoffset => ("stroke-dashoffset", Double, double(0.0)),
    /// Gamma of the stroke antialiasing.
    StrokeGamma => ("stroke-gamma", Double, double(1.0)),
    /// Gamma function of the stroke.
    StrokeGammaMethod => ("stroke-gamma-method", Enumeration, name("power")),
    /// Gamma of the fill antialiasing.
    Gamma => ("gamma", Double, double(1.0)),
    /// Gamma function: `power`, `linear`, `none`, `threshold` or `multiply`.
    GammaMethod => ("gamma-method", Enumeration, name("power")),
    /// Compositing operation of the symbolizer.
    CompOp => ("comp-op", Enumeration, name("src-over")),
    /// Clip geometries to the rendered extent.
    Clip => ("clip", Bool, flag(true)),
    /// Simplification tolerance in pixels.
    Simplify => ("simplify", Double, double(0.0)),
    /// `radial-distance`, `douglas-peucker` or `visvalingam-whyatt`.
    SimplifyAlgorithm => ("simplify-algorithm", Enumeration, name("radial-distance")),
    /// Smoothing factor in `[0, 1]`.
    Smooth => ("smooth", Double, double(0.0)),
    /// Transform applied to geometries in pixel space.
    GeometryTransform => ("geometry-transform", Transform, NONE),
    /// Transform applied to marker and point images.
    Transform => ("transform", Transform, NONE),
    /// Parallel offset of lines in pixels.
    Offset => ("offset", Double, double(0.0)),
    /// Path to an image or a `shape://` marker.
    File => ("file", String, NONE),
    /// Width of a marker.
    Width => ("width", Double, NONE),
    /// Height of a marker or of an extruded building.
    Height => ("height", Double, NONE),
    /// Distance between repeated labels or markers along lines.
    Spacing => ("spacing", Double, double(100.0)),
    /// Offset of the first marker along a line.
    SpacingOffset => ("spacing-offset", Double, double(0.0)),
    /// Share of spacing markers may be moved to find a free position.
    MaxError => ("max-error", Double, double(0.2)),
    /// Place the symbol even if it collides with others.
    AllowOverlap => ("allow-overlap", Bool, flag(false)),
    /// Don't register the placed symbol in the collision detector.
    IgnorePlacement => ("ignore-placement", Bool, flag(false)),
    /// Reject placements that cross the map edge.
    AvoidEdges => ("avoid-edges", Bool, flag(false)),
    /// Placement type: `point`, `line`, `interior`, `vertex`, `vertex-first`, `vertex-last`.
    Placement => ("placement", Enumeration, name("point")),
    /// Text of a label.
    Name => ("name", Expression, NONE),
    /// Font face name.
    FaceName => ("face-name", String, NONE),
    /// Name of a fontset.
    FontsetName => ("fontset-name", String, NONE),
    /// Font size in pixels.
    Size => ("size", Double, double(10.0)),
    /// Color of the text halo.
    HaloFill => ("halo-fill", Color, color(Color::WHITE)),
    /// Radius of the text halo.
    HaloRadius => ("halo-radius", Double, double(0.0)),
    /// Opacity of the text halo.
    HaloOpacity => ("halo-opacity", Double, double(1.0)),
    /// `full` or `fast`.
    HaloRasterizer => ("halo-rasterizer", Enumeration, name("full")),
    /// Horizontal displacement of the symbol.
    Dx => ("dx", Double, double(0.0)),
    /// Vertical displacement of the symbol.
    Dy => ("dy", Double, double(0.0)),
    /// Width after which text is wrapped to the next line.
    WrapWidth => ("wrap-width", Double, double(0.0)),
    /// `none`, `uppercase`, `lowercase` or `capitalize`.
    TextTransform => ("text-transform", Enumeration, name("none")),
    /// Additional space between characters.
    CharacterSpacing => ("character-spacing", Double, double(0.0)),
    /// Additional space between lines.
    LineSpacing => ("line-spacing", Double, double(0.0)),
    /// How far a label may move along a line from its ideal position.
    LabelPositionTolerance => ("label-position-tolerance", Double, double(0.0)),
    /// Maximum angle between two consecutive characters of a line label (degrees).
    MaxCharAngleDelta => ("max-char-angle-delta", Double, double(22.5)),
    /// Minimum distance between labels.
    MinimumDistance => ("minimum-distance", Double, double(0.0)),
    /// Minimum distance from a label to the map edge.
    MinimumPadding => ("minimum-padding", Double, double(0.0)),
    /// Lines shorter than this are not labeled.
    MinimumPathLength => ("minimum-path-length", Double, double(0.0)),
    /// Margin around a label that must stay free of other labels.
    Margin => ("margin", Double, double(0.0)),
    /// Minimum distance between labels with the same text.
    RepeatDistance => ("repeat-distance", Double, double(0.0)),
    /// Reading direction of line labels: `auto`, `auto-down`, `left`, `right`, `left-only`, `right-only`.
    Upright => ("upright", Enumeration, name("auto")),
    /// Rotation of point labels and glyphs (degrees).
    Orientation => ("orientation", Double, double(0.0)),
    /// `left`, `middle`, `right` or `auto`.
    HorizontalAlignment => ("horizontal-alignment", Enumeration, name("auto")),
    /// `top`, `middle`, `bottom` or `auto`.
    VerticalAlignment => ("vertical-alignment", Enumeration, name("auto")),
    /// Horizontal displacement of a shield image relative to its text.
    ShieldDx => ("shield-dx", Double, double(0.0)),
    /// Vertical displacement of a shield image relative to its text.
    ShieldDy => ("shield-dy", Double, double(0.0)),
    /// Place shield image and text independently.
    UnlockImage => ("unlock-image", Bool, flag(false)),
    /// Raster resampling: `near` or `bilinear`.
    Scaling => ("scaling", Enumeration, name("near")),
    /// Color stops of a single band raster: `value:color` pairs separated by spaces.
    Colorizer => ("colorizer", String, NONE),
    /// Pattern alignment: `global` or `local`.
    Alignment => ("alignment", Enumeration, name("global")),
    /// Debug symbolizer mode: `collision` or `vertex`.
    Mode => ("mode", Enumeration, name("collision")),
    /// Character drawn by the glyph symbolizer.
    Char => ("char", Expression, NONE),
    /// Rotation of the glyph symbol (degrees).
    Angle => ("angle", Double, double(0.0)),
    /// Number of attribute columns a group symbolizer repeats its rules for.
    NumColumns => ("num-columns", Double, double(0.0)),
    /// Index of the first group symbolizer column.
    StartColumn => ("start-column", Double, double(1.0)),
    /// Space between group items.
    ItemMargin => ("item-margin", Double, double(0.0)),
}

impl Key {
    /// Default of the key for the given symbolizer kind. Some symbolizers use other defaults than
    /// [`Key::default_value`] (black text, blue markers).
    pub fn class_default(&self, kind: SymbolizerKind) -> Property {
        match (kind, self) {
            (SymbolizerKind::Text | SymbolizerKind::Shield | SymbolizerKind::Glyph, Key::Fill) => {
                Property::Color(Color::BLACK)
            }
            (SymbolizerKind::Markers, Key::Fill) => Property::Color(Color::rgb(0, 0, 255)),
            (SymbolizerKind::Markers, Key::Width | Key::Height) => double(10.0),
            (SymbolizerKind::Markers, Key::Stroke) => Property::Color(Color::WHITE),
            (SymbolizerKind::Markers, Key::StrokeWidth) => double(0.5),
            (SymbolizerKind::Building, Key::Height) => double(0.0),
            (SymbolizerKind::Building, Key::Fill) => Property::Color(Color::GRAY),
            _ => self.default_value(),
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Key {
    type Err = crate::error::CartographError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::ALL
            .iter()
            .find(|key| key.name() == s)
            .copied()
            .ok_or_else(|| crate::error::CartographError::Config(format!("unknown property '{s}'")))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Key {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Key {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_parse_back() {
        for key in Key::ALL {
            assert_eq!(key.name().parse::<Key>().unwrap(), *key);
        }
        assert!("no-such-key".parse::<Key>().is_err());
    }

    #[test]
    fn class_defaults() {
        assert_eq!(
            Key::Fill.class_default(SymbolizerKind::Polygon),
            Property::Color(Color::rgb(128, 128, 128))
        );
        assert_eq!(
            Key::Fill.class_default(SymbolizerKind::Text),
            Property::Color(Color::BLACK)
        );
        assert_eq!(
            Key::Width.class_default(SymbolizerKind::Markers),
            Property::Value(Value::Double(10.0))
        );
        assert_eq!(Key::Width.class_default(SymbolizerKind::Point), NONE);
    }
}
