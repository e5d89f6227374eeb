use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::CartographError;

macro_rules! comp_ops {
    ($( $variant:ident => $name:literal, )*) => {
        /// Compositing operation used to blend a symbolizer or a style into the image below.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
        pub enum CompOp {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )*
        }

        impl CompOp {
            /// All operations.
            pub const ALL: &'static [CompOp] = &[$( CompOp::$variant, )*];

            /// Name of the operation.
            pub fn name(&self) -> &'static str {
                match self {
                    $( CompOp::$variant => $name, )*
                }
            }
        }
    };
}

comp_ops! {
    Clear => "clear",
    Src => "src",
    Dst => "dst",
    SrcOver => "src-over",
    DstOver => "dst-over",
    SrcIn => "src-in",
    DstIn => "dst-in",
    SrcOut => "src-out",
    DstOut => "dst-out",
    SrcAtop => "src-atop",
    DstAtop => "dst-atop",
    Xor => "xor",
    Plus => "plus",
    Minus => "minus",
    Multiply => "multiply",
    Screen => "screen",
    Overlay => "overlay",
    Darken => "darken",
    Lighten => "lighten",
    ColorDodge => "color-dodge",
    ColorBurn => "color-burn",
    HardLight => "hard-light",
    SoftLight => "soft-light",
    Difference => "difference",
    Exclusion => "exclusion",
    Contrast => "contrast",
    Invert => "invert",
    InvertRgb => "invert-rgb",
    GrainMerge => "grain-merge",
    GrainExtract => "grain-extract",
    LinearDodge => "linear-dodge",
    LinearBurn => "linear-burn",
    Divide => "divide",
}

impl Default for CompOp {
    fn default() -> Self {
        CompOp::SrcOver
    }
}

impl Display for CompOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CompOp {
    type Err = CartographError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompOp::ALL
            .iter()
            .find(|op| op.name() == s)
            .copied()
            .ok_or_else(|| CartographError::Config(format!("unknown compositing operation '{s}'")))
    }
}

impl TryFrom<String> for CompOp {
    type Error = CartographError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CompOp> for String {
    fn from(value: CompOp) -> Self {
        value.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(CompOp::ALL.len(), 33);
        for op in CompOp::ALL {
            assert_eq!(op.name().parse::<CompOp>().unwrap(), *op);
        }
        assert!("blend".parse::<CompOp>().is_err());
    }
}
