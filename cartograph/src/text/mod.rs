//! Fonts, text shaping and layout of labels.
//!
//! Shaping is done by a [`TextShaper`]. The default one is [`FontRegistry`], which stores font
//! faces in a `fontdb` database and shapes text with `rustybuzz`. A [`TextLayout`] arranges shaped
//! glyphs into lines of a label.

use cartograph_types::Vector2d;
use rustybuzz::ttf_parser::FaceParsingError;
use thiserror::Error;

mod layout;
mod outline;
mod registry;

pub use layout::{LayoutGlyph, LayoutOptions, TextLayout};
pub use registry::FontRegistry;

/// Error from the font registry.
#[derive(Debug, Error)]
pub enum FontError {
    /// No face with the given name is loaded.
    #[error("font face '{0}' is not found")]
    FaceNotFound(String),
    /// No fontset with the given name is registered.
    #[error("fontset '{0}' is not found")]
    FontsetNotFound(String),
    /// Neither face name nor fontset is set for the text.
    #[error("no font face or fontset is set")]
    NoFace,
    /// Error parsing font face file.
    #[error(transparent)]
    FaceParsing(#[from] FaceParsingError),
    /// Font files cannot be read.
    #[error("failed to read fonts: {0}")]
    Io(#[from] std::io::Error),
}

/// Which faces to use for a text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FontSelector {
    /// Single face by its full name (`DejaVu Sans Book`), family name or PostScript name.
    Face(String),
    /// Named list of faces. The face covering the most characters of the text is used.
    Fontset(String),
}

/// Index of a face loaded into a [`TextShaper`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FaceId(pub usize);

/// A glyph produced by shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedGlyph {
    /// Face the glyph belongs to.
    pub face: FaceId,
    /// Index of the glyph in the face.
    pub glyph_id: u16,
    /// Character the glyph was produced for.
    pub character: char,
    /// Horizontal advance in pixels.
    pub advance: f64,
    /// Offset of the glyph from its pen position in pixels (Y axis down).
    pub offset: Vector2d,
}

/// Result of shaping one run of text.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedText {
    /// Glyphs in visual order.
    pub glyphs: Vec<ShapedGlyph>,
    /// Height of the face above the baseline in pixels (positive).
    pub ascender: f64,
    /// Depth of the face below the baseline in pixels (negative).
    pub descender: f64,
}

impl ShapedText {
    /// Sum of glyph advances.
    pub fn width(&self) -> f64 {
        self.glyphs.iter().map(|g| g.advance).sum()
    }
}

/// Shapes text and provides glyph outlines.
pub trait TextShaper: Send + Sync {
    /// Shapes a single line of text with the given font size (pixels).
    fn shape(&self, text: &str, font: &FontSelector, size: f64)
        -> Result<ShapedText, FontError>;

    /// Outline of a glyph with the origin in the glyph pen position, in pixels with Y axis down.
    fn glyph_path(&self, face: FaceId, glyph_id: u16, size: f64) -> Option<lyon::path::Path>;
}

#[cfg(test)]
pub(crate) mod testing {
    use lyon::geom::point;

    use super::*;

    /// Shaper that draws every character as a box `0.6 * size` wide and `size` tall. Ascender is
    /// `0.8 * size`, descender is `-0.2 * size`.
    pub struct BoxShaper;

    impl TextShaper for BoxShaper {
        fn shape(
            &self,
            text: &str,
            font: &FontSelector,
            size: f64,
        ) -> Result<ShapedText, FontError> {
            if let FontSelector::Face(name) = font {
                if name == "Missing" {
                    return Err(FontError::FaceNotFound(name.clone()));
                }
            }

            Ok(ShapedText {
                glyphs: text
                    .chars()
                    .map(|character| ShapedGlyph {
                        face: FaceId(0),
                        glyph_id: character as u16,
                        character,
                        advance: size * 0.6,
                        offset: Vector2d::zeros(),
                    })
                    .collect(),
                ascender: size * 0.8,
                descender: -size * 0.2,
            })
        }

        fn glyph_path(&self, _face: FaceId, glyph_id: u16, size: f64) -> Option<lyon::path::Path> {
            if glyph_id == ' ' as u16 {
                return None;
            }

            let (w, h) = ((size * 0.5) as f32, (size * 0.7) as f32);
            let mut builder = lyon::path::Path::builder();
            builder.begin(point(0.0, 0.0));
            builder.line_to(point(w, 0.0));
            builder.line_to(point(w, -h));
            builder.line_to(point(0.0, -h));
            builder.end(true);
            Some(builder.build())
        }
    }
}
