use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CartographError;

/// Color representation (straight, not premultiplied alpha).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "String", into = "String"))]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl From<String> for Color {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or(Color::BLACK)
    }
}

impl From<Color> for String {
    fn from(val: Color) -> Self {
        val.to_hex()
    }
}

impl FromStr for Color {
    type Err = CartographError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CartographError::Config(format!("invalid color: '{s}'")))
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.a == 255 {
            write!(f, "rgb({},{},{})", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "rgba({},{},{},{})",
                self.r,
                self.g,
                self.b,
                self.a as f32 / 255.0
            )
        }
    }
}

const NAMED_COLORS: &[(&str, Color)] = &[
    ("transparent", Color::TRANSPARENT),
    ("black", Color::BLACK),
    ("white", Color::WHITE),
    ("red", Color::RED),
    ("green", Color::rgba(0, 128, 0, 255)),
    ("lime", Color::GREEN),
    ("blue", Color::BLUE),
    ("yellow", Color::rgba(255, 255, 0, 255)),
    ("cyan", Color::rgba(0, 255, 255, 255)),
    ("aqua", Color::rgba(0, 255, 255, 255)),
    ("magenta", Color::rgba(255, 0, 255, 255)),
    ("fuchsia", Color::rgba(255, 0, 255, 255)),
    ("gray", Color::rgba(128, 128, 128, 255)),
    ("grey", Color::rgba(128, 128, 128, 255)),
    ("silver", Color::rgba(192, 192, 192, 255)),
    ("maroon", Color::rgba(128, 0, 0, 255)),
    ("olive", Color::rgba(128, 128, 0, 255)),
    ("navy", Color::rgba(0, 0, 128, 255)),
    ("teal", Color::rgba(0, 128, 128, 255)),
    ("purple", Color::PURPLE),
    ("orange", Color::rgba(255, 165, 0, 255)),
    ("brown", Color::rgba(165, 42, 42, 255)),
    ("pink", Color::rgba(255, 192, 203, 255)),
    ("steelblue", Color::rgba(70, 130, 180, 255)),
    ("salmon", Color::rgba(250, 128, 114, 255)),
    ("beige", Color::rgba(245, 245, 220, 255)),
    ("khaki", Color::rgba(240, 230, 140, 255)),
    ("lightblue", Color::rgba(173, 216, 230, 255)),
    ("lightgray", Color::rgba(211, 211, 211, 255)),
    ("lightgrey", Color::rgba(211, 211, 211, 255)),
    ("darkgray", Color::rgba(169, 169, 169, 255)),
    ("darkgrey", Color::rgba(169, 169, 169, 255)),
    ("darkgreen", Color::rgba(0, 100, 0, 255)),
    ("darkblue", Color::rgba(0, 0, 139, 255)),
    ("darkred", Color::rgba(139, 0, 0, 255)),
    ("gold", Color::rgba(255, 215, 0, 255)),
    ("ivory", Color::rgba(255, 255, 240, 255)),
];

impl Color {
    /// Transparent color: `#00000000`
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    /// Red color: `#FF0000FF`
    pub const RED: Color = Color::rgba(255, 0, 0, 255);
    /// Green color: `#00FF00FF`
    pub const GREEN: Color = Color::rgba(0, 255, 0, 255);
    /// Blue color: `#0000FFFF`
    pub const BLUE: Color = Color::rgba(0, 0, 255, 255);
    /// White color: `#FFFFFFFF`
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    /// Black color: `#000000FF`
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    /// Gray color: `#AAAAAAFF`
    pub const GRAY: Color = Color::rgba(170, 170, 170, 255);
    /// Purple color: `#800080FF`
    pub const PURPLE: Color = Color::rgba(128, 0, 128, 255);

    /// Constructs color from its RGBA channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Constructs an opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Converts the color into f32 array with channel values in `[0, 1]`.
    pub fn to_f32_array(&self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    /// Converts the color into u8 array (RGBA).
    pub fn to_u8_array(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Converts the color into u8 array with color channels multiplied by alpha.
    pub fn to_premultiplied(&self) -> [u8; 4] {
        let a = self.a as u32;
        [
            ((self.r as u32 * a + 127) / 255) as u8,
            ((self.g as u32 * a + 127) / 255) as u8,
            ((self.b as u32 * a + 127) / 255) as u8,
            self.a,
        ]
    }

    /// Restores a color from premultiplied RGBA channels.
    pub fn from_premultiplied(rgba: [u8; 4]) -> Self {
        let a = rgba[3] as u32;
        if a == 0 {
            return Self::TRANSPARENT;
        }

        let demultiply = |c: u8| ((c as u32 * 255 + a / 2) / a).min(255) as u8;
        Self {
            r: demultiply(rgba[0]),
            g: demultiply(rgba[1]),
            b: demultiply(rgba[2]),
            a: rgba[3],
        }
    }

    /// Converts the color into HEX8 string: `#RRGGBBAA`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    /// Parses a color from the hex string. Hex string can be either HEX3 (`#RGB`), HEX6 (`#RRGGBB`)
    /// or HEX8 (`#RRGGBBAA`).
    pub fn try_from_hex(hex_string: &str) -> Option<Self> {
        let digits = hex_string.strip_prefix('#')?;
        if !digits.is_ascii() {
            return None;
        }

        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
        match digits.len() {
            3 => {
                let short = |i: usize| channel(i..i + 1).map(|v| v * 17);
                Some(Self::rgb(short(0)?, short(1)?, short(2)?))
            }
            6 => Some(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
            8 => Some(Self::rgba(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => None,
        }
    }

    /// Parses a color from any of the supported notations: hex (`#RGB`, `#RRGGBB`, `#RRGGBBAA`),
    /// functional (`rgb(255, 0, 0)`, `rgba(255, 0, 0, 0.5)`, percentages are allowed for color
    /// channels) or a color name (`steelblue`).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.starts_with('#') {
            return Self::try_from_hex(value);
        }

        let lower = value.to_ascii_lowercase();
        if let Some(args) = lower
            .strip_prefix("rgba(")
            .or_else(|| lower.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<&str> = args.split(',').map(str::trim).collect();
            let channel = |s: &str| -> Option<u8> {
                match s.strip_suffix('%') {
                    Some(percent) => {
                        let v: f32 = percent.parse().ok()?;
                        Some((v.clamp(0.0, 100.0) * 2.55).round() as u8)
                    }
                    None => {
                        let v: f32 = s.parse().ok()?;
                        Some(v.clamp(0.0, 255.0).round() as u8)
                    }
                }
            };

            return match parts.as_slice() {
                [r, g, b] => Some(Self::rgb(channel(r)?, channel(g)?, channel(b)?)),
                [r, g, b, a] => {
                    let alpha: f32 = a.parse().ok()?;
                    Some(Self::rgba(
                        channel(r)?,
                        channel(g)?,
                        channel(b)?,
                        (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
                    ))
                }
                _ => None,
            };
        }

        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, color)| *color)
    }

    /// Parses a color from the hex string. Hex string can be either HEX6 (`#RRGGBB`) or HEX8 (`#RRGGBBAA`).
    ///
    /// # Panics
    ///
    /// Panics if the parsing fails.
    pub const fn from_hex(hex_string: &'static str) -> Self {
        let bytes = hex_string.as_bytes();
        if bytes.len() != 7 && bytes.len() != 9 || bytes[0] != b'#' {
            panic!("Invalid color hex string");
        }

        let r = decode_byte(&[bytes[1], bytes[2]]);
        let g = decode_byte(&[bytes[3], bytes[4]]);
        let b = decode_byte(&[bytes[5], bytes[6]]);
        let a = if hex_string.len() == 9 {
            decode_byte(&[bytes[7], bytes[8]])
        } else {
            255
        };

        Self { r, g, b, a }
    }

    /// Returns a new color instance, copied from the base one but with the given alpha channel.
    pub fn with_alpha(&self, a: u8) -> Self {
        Self { a, ..*self }
    }

    /// Returns a new color with alpha multiplied by `opacity` (clamped to `[0, 1]`).
    pub fn with_opacity(&self, opacity: f64) -> Self {
        let a = (self.a as f64 * opacity.clamp(0.0, 1.0)).round() as u8;
        self.with_alpha(a)
    }

    /// Returns true if the color is fully transparent (`a == 0`).
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// Red component of the color in RGBA space.
    pub fn r(&self) -> u8 {
        self.r
    }

    /// Green component of the color in RGBA space.
    pub fn g(&self) -> u8 {
        self.g
    }

    /// Blue component of the color in RGBA space.
    pub fn b(&self) -> u8 {
        self.b
    }

    /// Opacity component of the color.
    pub fn a(&self) -> u8 {
        self.a
    }
}

const fn decode_byte(chars: &[u8]) -> u8 {
    debug_assert!(chars.len() == 2);
    let first = decode_char(chars[0]);
    let second = decode_char(chars[1]);

    first * 16 + second
}

const fn decode_char(byte: u8) -> u8 {
    match byte {
        b'0'..=b'9' => byte - b'0',
        b'a'..=b'f' => byte - b'a' + 10,
        b'A'..=b'F' => byte - b'A' + 10,
        _ => panic!("Invalid hex character"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_serialization() {
        let hex = "#FF1000AA";
        let color = Color::try_from_hex(hex).unwrap();
        assert_eq!(&color.to_hex(), hex);

        assert_eq!(Color::from_hex(hex), color);
    }

    #[test]
    fn parse_notations() {
        assert_eq!(Color::parse("#f00"), Some(Color::RED));
        assert_eq!(Color::parse("rgb(0, 0, 255)"), Some(Color::BLUE));
        assert_eq!(
            Color::parse("rgba(255,255,255,0.5)"),
            Some(Color::rgba(255, 255, 255, 128))
        );
        assert_eq!(Color::parse("rgb(100%, 0%, 0%)"), Some(Color::RED));
        assert_eq!(Color::parse("SteelBlue"), Some(Color::rgb(70, 130, 180)));
        assert_eq!(Color::parse("not a color"), None);
        assert_eq!(Color::parse("#12345"), None);
    }

    #[test]
    fn premultiplication() {
        let color = Color::rgba(200, 100, 50, 128);
        let premultiplied = color.to_premultiplied();
        assert_eq!(premultiplied, [100, 50, 25, 128]);

        let restored = Color::from_premultiplied(premultiplied);
        assert!(restored.r().abs_diff(200) <= 1);
        assert!(restored.g().abs_diff(100) <= 1);
        assert_eq!(Color::from_premultiplied([10, 10, 10, 0]), Color::TRANSPARENT);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_through_string() {
        let json = serde_json::to_string(&Color::RED).unwrap();
        assert_eq!(json, "\"#FF0000FF\"");
        let color: Color = serde_json::from_str("\"steelblue\"").unwrap();
        assert_eq!(color, Color::rgb(70, 130, 180));
    }
}
