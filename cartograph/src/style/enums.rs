use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::CartographError;

macro_rules! named_enum {
    ($( $(#[$doc:meta])* $name:ident { $( $(#[$vdoc:meta])* $variant:ident => $text:literal, )* } )*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
            #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
            #[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
            pub enum $name {
                $( $(#[$vdoc])* $variant, )*
            }

            impl $name {
                /// Name of the value in style definitions.
                pub fn name(&self) -> &'static str {
                    match self {
                        $( $name::$variant => $text, )*
                    }
                }
            }

            impl Display for $name {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.name())
                }
            }

            impl FromStr for $name {
                type Err = CartographError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    match s {
                        $( $text => Ok($name::$variant), )*
                        _ => Err(CartographError::Config(format!(
                            "'{s}' is not a valid {}",
                            stringify!($name)
                        ))),
                    }
                }
            }

            impl TryFrom<String> for $name {
                type Error = CartographError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    value.parse()
                }
            }

            impl From<$name> for String {
                fn from(value: $name) -> Self {
                    value.name().to_string()
                }
            }
        )*
    };
}

named_enum! {
    /// Shape of stroke joins.
    LineJoin {
        /// Sharp corner, beveled when it exceeds the miter limit.
        Miter => "miter",
        /// Sharp corner, falls back to the plain join when it exceeds the miter limit.
        MiterRevert => "miter-revert",
        /// Rounded corner.
        Round => "round",
        /// Cut corner.
        Bevel => "bevel",
    }

    /// Shape of stroke ends.
    LineCap {
        /// Ends exactly at the end point.
        Butt => "butt",
        /// Extends by half of the width.
        Square => "square",
        /// Half circle.
        Round => "round",
    }

    /// Function converting the coverage of a pixel into its alpha.
    GammaMethod {
        /// `coverage ^ gamma`.
        Power => "power",
        /// Linear ramp.
        Linear => "linear",
        /// Coverage is used as is.
        None => "none",
        /// Fully opaque when coverage exceeds the threshold.
        Threshold => "threshold",
        /// `coverage * gamma`.
        Multiply => "multiply",
    }

    /// Line simplification algorithm.
    SimplifyAlgorithm {
        /// Drops vertices closer than the tolerance to the last kept one.
        RadialDistance => "radial-distance",
        /// Ramer-Douglas-Peucker.
        DouglasPeucker => "douglas-peucker",
        /// Drops vertices forming triangles with small areas.
        VisvalingamWhyatt => "visvalingam-whyatt",
    }

    /// Where labels and markers are placed on a geometry.
    LabelPlacement {
        /// Single label at the center (centroid) of the geometry.
        Point => "point",
        /// Repeated along lines and polygon outlines.
        Line => "line",
        /// Single label inside of the polygon.
        Interior => "interior",
        /// Every vertex of the geometry.
        Vertex => "vertex",
        /// First vertex of a line.
        VertexFirst => "vertex-first",
        /// Last vertex of a line.
        VertexLast => "vertex-last",
    }

    /// Case conversion of the label text.
    TextTransform {
        /// Text is drawn as is.
        None => "none",
        /// All letters are upper case.
        Uppercase => "uppercase",
        /// All letters are lower case.
        Lowercase => "lowercase",
        /// First letter of every word is upper case.
        Capitalize => "capitalize",
    }

    /// Reading direction of line labels.
    Upright {
        /// Flipped to read left to right.
        Auto => "auto",
        /// Flipped to read left to right, vertical labels read downwards.
        AutoDown => "auto-down",
        /// Follows the line direction.
        Right => "right",
        /// Opposite to the line direction.
        Left => "left",
        /// Follows the line direction, rejected when upside down.
        RightOnly => "right-only",
        /// Opposite to the line direction, rejected when upside down.
        LeftOnly => "left-only",
    }

    /// Horizontal alignment of a text block relative to its anchor.
    HorizontalAlignment {
        /// Derived from the displacement direction.
        Auto => "auto",
        /// Text is to the left of the anchor.
        Left => "left",
        /// Centered.
        Middle => "middle",
        /// Text is to the right of the anchor.
        Right => "right",
    }

    /// Vertical alignment of a text block relative to its anchor.
    VerticalAlignment {
        /// Derived from the displacement direction.
        Auto => "auto",
        /// Text is above the anchor.
        Top => "top",
        /// Centered.
        Middle => "middle",
        /// Text is below the anchor.
        Bottom => "bottom",
    }

    /// How text halos are rasterized.
    HaloRasterizer {
        /// Glyph outlines stroked with the halo width.
        Full => "full",
        /// Glyph coverage dilated by the halo radius.
        Fast => "fast",
    }

    /// Resampling of raster data.
    Scaling {
        /// Nearest neighbour.
        Near => "near",
        /// Bilinear interpolation.
        Bilinear => "bilinear",
    }

    /// Origin of the fill and line patterns.
    PatternAlignment {
        /// Pattern is aligned to the image origin, so adjacent features join seamlessly.
        Global => "global",
        /// Pattern starts at the top left corner of every feature.
        Local => "local",
    }

    /// What the debug symbolizer draws.
    DebugMode {
        /// Boxes registered in the collision detector.
        Collision => "collision",
        /// Vertices of the geometries.
        Vertex => "vertex",
    }
}

impl Default for GammaMethod {
    fn default() -> Self {
        Self::Power
    }
}

impl Default for HaloRasterizer {
    fn default() -> Self {
        Self::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("miter-revert".parse::<LineJoin>().unwrap(), LineJoin::MiterRevert);
        assert_eq!("vertex-last".parse::<LabelPlacement>().unwrap(), LabelPlacement::VertexLast);
        assert_eq!(Upright::AutoDown.to_string(), "auto-down");
        assert!("diagonal".parse::<HorizontalAlignment>().is_err());
    }
}
