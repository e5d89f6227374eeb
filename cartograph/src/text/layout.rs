use cartograph_types::{Box2d, Point2d, Vector2d};

use super::{FontError, FontSelector, ShapedGlyph, TextShaper};
use crate::style::{HorizontalAlignment, TextTransform, VerticalAlignment};

/// Parameters of a text block layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOptions {
    /// Font size in pixels.
    pub size: f64,
    /// Lines longer than this are wrapped at spaces. `0` disables wrapping.
    pub wrap_width: f64,
    /// Additional space after every character.
    pub character_spacing: f64,
    /// Additional space between lines.
    pub line_spacing: f64,
    /// Case conversion.
    pub text_transform: TextTransform,
    /// Horizontal position of the block relative to the anchor.
    pub horizontal_alignment: HorizontalAlignment,
    /// Vertical position of the block relative to the anchor.
    pub vertical_alignment: VerticalAlignment,
    /// Displacement of the block from the anchor (pixels, Y axis down).
    pub displacement: Vector2d,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            size: 10.0,
            wrap_width: 0.0,
            character_spacing: 0.0,
            line_spacing: 0.0,
            text_transform: TextTransform::None,
            horizontal_alignment: HorizontalAlignment::Auto,
            vertical_alignment: VerticalAlignment::Auto,
            displacement: Vector2d::zeros(),
        }
    }
}

/// Glyph of a laid out text.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutGlyph {
    /// Shaped glyph.
    pub glyph: ShapedGlyph,
    /// Pen position of the glyph on the baseline relative to the anchor.
    pub position: Point2d,
    /// Advance including character spacing.
    pub advance: f64,
}

/// Text arranged into lines around an anchor point.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    text: String,
    size: f64,
    glyphs: Vec<LayoutGlyph>,
    bbox: Box2d,
    ascender: f64,
    descender: f64,
    line_count: usize,
}

impl TextLayout {
    /// Shapes and arranges the text.
    pub fn new(
        shaper: &dyn TextShaper,
        text: &str,
        font: &FontSelector,
        options: &LayoutOptions,
    ) -> Result<Self, FontError> {
        let text = transform_text(text, options.text_transform);

        let mut lines: Vec<Vec<ShapedGlyph>> = vec![];
        let mut ascender: f64 = 0.0;
        let mut descender: f64 = 0.0;
        for paragraph in text.split('\n') {
            let shaped = shaper.shape(paragraph, font, options.size)?;
            ascender = ascender.max(shaped.ascender);
            descender = descender.min(shaped.descender);
            wrap(shaped.glyphs, options, &mut lines);
        }

        let line_height = ascender - descender;
        let line_step = line_height + options.line_spacing;
        let widths: Vec<f64> = lines.iter().map(|l| line_width(l, options)).collect();
        let width = widths.iter().copied().fold(0.0, f64::max);
        let height = if lines.is_empty() {
            0.0
        } else {
            line_step * lines.len() as f64 - options.line_spacing
        };

        let dx = options.displacement.x;
        let dy = options.displacement.y;
        let horizontal = match options.horizontal_alignment {
            HorizontalAlignment::Auto if dx > 0.0 => HorizontalAlignment::Right,
            HorizontalAlignment::Auto if dx < 0.0 => HorizontalAlignment::Left,
            HorizontalAlignment::Auto => HorizontalAlignment::Middle,
            alignment => alignment,
        };
        let vertical = match options.vertical_alignment {
            VerticalAlignment::Auto if dy > 0.0 => VerticalAlignment::Bottom,
            VerticalAlignment::Auto if dy < 0.0 => VerticalAlignment::Top,
            VerticalAlignment::Auto => VerticalAlignment::Middle,
            alignment => alignment,
        };

        let left = dx
            + match horizontal {
                HorizontalAlignment::Left => -width,
                HorizontalAlignment::Right => 0.0,
                _ => -width / 2.0,
            };
        let top = dy
            + match vertical {
                VerticalAlignment::Top => -height,
                VerticalAlignment::Bottom => 0.0,
                _ => -height / 2.0,
            };

        let mut glyphs = vec![];
        for (index, (line, line_width)) in lines.into_iter().zip(widths).enumerate() {
            let mut x = left
                + match horizontal {
                    HorizontalAlignment::Left => width - line_width,
                    HorizontalAlignment::Right => 0.0,
                    _ => (width - line_width) / 2.0,
                };
            let baseline = top + ascender + line_step * index as f64;

            for glyph in line {
                let advance = glyph.advance + options.character_spacing;
                glyphs.push(LayoutGlyph {
                    position: Point2d::new(x, baseline),
                    advance,
                    glyph,
                });
                x += advance;
            }
        }

        let bbox = if glyphs.is_empty() {
            Box2d::invalid()
        } else {
            Box2d::new(left, top, left + width, top + height)
        };

        Ok(Self {
            line_count: glyphs
                .iter()
                .map(|g| g.position.y.to_bits())
                .collect::<std::collections::BTreeSet<_>>()
                .len(),
            text,
            size: options.size,
            glyphs,
            bbox,
            ascender,
            descender,
        })
    }

    /// Text after case conversion.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Font size.
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Positioned glyphs.
    pub fn glyphs(&self) -> &[LayoutGlyph] {
        &self.glyphs
    }

    /// Bounding box of the text block relative to the anchor. Invalid for empty text.
    pub fn bbox(&self) -> Box2d {
        self.bbox
    }

    /// Returns true if there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Height of the font above the baseline.
    pub fn ascender(&self) -> f64 {
        self.ascender
    }

    /// Depth of the font below the baseline (negative).
    pub fn descender(&self) -> f64 {
        self.descender
    }

    /// Total advance of all glyphs, as if the text was a single line.
    pub fn advance_width(&self) -> f64 {
        let total: f64 = self.glyphs.iter().map(|g| g.advance).sum();
        match self.glyphs.last() {
            Some(last) => total - (last.advance - last.glyph.advance),
            None => total,
        }
    }
}

fn line_width(line: &[ShapedGlyph], options: &LayoutOptions) -> f64 {
    if line.is_empty() {
        return 0.0;
    }

    line.iter().map(|g| g.advance).sum::<f64>()
        + options.character_spacing * (line.len() - 1) as f64
}

/// Greedy wrapping at whitespace glyphs. Spaces at the break positions are dropped.
fn wrap(glyphs: Vec<ShapedGlyph>, options: &LayoutOptions, lines: &mut Vec<Vec<ShapedGlyph>>) {
    if options.wrap_width <= 0.0 {
        lines.push(glyphs);
        return;
    }

    let mut line: Vec<ShapedGlyph> = vec![];
    let mut width = 0.0;
    let mut last_space: Option<usize> = None;
    for glyph in glyphs {
        if glyph.character.is_whitespace() {
            last_space = Some(line.len());
        }

        width += glyph.advance + options.character_spacing;
        line.push(glyph);

        if width > options.wrap_width {
            if let Some(space) = last_space.filter(|&s| s > 0) {
                let rest = line.split_off(space + 1);
                line.pop();
                lines.push(std::mem::replace(&mut line, rest));
                width = line.iter().map(|g| g.advance + options.character_spacing).sum();
                last_space = None;
            }
        }
    }

    lines.push(line);
}

fn transform_text(text: &str, transform: TextTransform) -> String {
    match transform {
        TextTransform::None => text.to_string(),
        TextTransform::Uppercase => text.to_uppercase(),
        TextTransform::Lowercase => text.to_lowercase(),
        TextTransform::Capitalize => {
            let mut result = String::with_capacity(text.len());
            let mut word_start = true;
            for c in text.chars() {
                if word_start && c.is_alphabetic() {
                    result.extend(c.to_uppercase());
                } else {
                    result.push(c);
                }
                word_start = c.is_whitespace();
            }
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::text::testing::BoxShaper;

    fn layout(text: &str, options: &LayoutOptions) -> TextLayout {
        TextLayout::new(&BoxShaper, text, &FontSelector::Face("Test".into()), options).unwrap()
    }

    #[test]
    fn single_line_is_centered() {
        let layout = layout("abcd", &LayoutOptions::default());
        // 4 glyphs 6px wide, 10px tall.
        assert_eq!(layout.bbox(), Box2d::new(-12.0, -5.0, 12.0, 5.0));
        assert_eq!(layout.line_count(), 1);
        assert_abs_diff_eq!(layout.glyphs()[0].position.x, -12.0);
        assert_abs_diff_eq!(layout.glyphs()[0].position.y, 3.0);
        assert_abs_diff_eq!(layout.glyphs()[3].position.x, 6.0);
        assert_abs_diff_eq!(layout.advance_width(), 24.0);
    }

    #[test]
    fn displacement_selects_alignment() {
        let options = LayoutOptions {
            displacement: Vector2d::new(5.0, -5.0),
            ..Default::default()
        };
        let layout = layout("ab", &options);
        assert_eq!(layout.bbox(), Box2d::new(5.0, -15.0, 17.0, -5.0));
    }

    #[test]
    fn wrapping_and_transform() {
        let options = LayoutOptions {
            wrap_width: 40.0,
            text_transform: TextTransform::Capitalize,
            ..Default::default()
        };
        let layout = layout("main street north", &options);
        assert_eq!(layout.text(), "Main Street North");
        assert_eq!(layout.line_count(), 3);
        assert_eq!(layout.glyphs().len(), "MainStreetNorth".len());

        let explicit = layout_text_lines("one\ntwo");
        assert_eq!(explicit, 2);
    }

    fn layout_text_lines(text: &str) -> usize {
        layout(text, &LayoutOptions::default()).line_count()
    }

    #[test]
    fn empty_text() {
        let layout = layout("", &LayoutOptions::default());
        assert!(layout.is_empty());
        assert!(!layout.bbox().is_valid());
    }
}
