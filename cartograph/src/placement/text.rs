use std::f64::consts::PI;

use cartograph_types::{Box2d, Point2d, Vector2d};
use nalgebra::Rotation2;

use super::path::angle_delta;
use super::{place_box, placement_matrix, PathWalker, PlacementGeometry, PlacementParams, ToleranceIterator};
use crate::label::LabelCollisionDetector;
use crate::style::{LabelPlacement, PlacementAttempt, Upright};
use crate::text::{FontError, FontSelector, LayoutOptions, ShapedGlyph, TextLayout, TextShaper};

/// Glyph with its final position on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedGlyph {
    /// Shaped glyph.
    pub glyph: ShapedGlyph,
    /// Pen position on the baseline in pixels.
    pub position: Point2d,
    /// Rotation of the glyph (radians, clockwise on the screen).
    pub angle: f64,
}

/// An accepted label: what to draw and where.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphPositions {
    /// Text of the label after the case conversion.
    pub text: String,
    /// Font size.
    pub size: f64,
    /// Anchor point of the label.
    pub anchor: Point2d,
    /// Glyphs.
    pub glyphs: Vec<PlacedGlyph>,
    /// Boxes registered in the collision detector (text and shield).
    pub bboxes: Vec<Box2d>,
    /// Box of the shield image, if the label has one.
    pub shield: Option<Box2d>,
}

/// Finds positions of text labels of one feature.
pub struct TextPlacementFinder<'a> {
    shaper: &'a dyn TextShaper,
    text: String,
    font: FontSelector,
    options: LayoutOptions,
    attempts: Vec<PlacementAttempt>,
    params: PlacementParams,
    halo_radius: f64,
    shield: Option<Box2d>,
}

impl<'a> TextPlacementFinder<'a> {
    /// Creates a finder for the text. The only placement attempt uses the displacement and size of
    /// `options`.
    pub fn new(
        shaper: &'a dyn TextShaper,
        text: impl Into<String>,
        font: FontSelector,
        options: LayoutOptions,
        params: PlacementParams,
    ) -> Self {
        let attempts = vec![PlacementAttempt {
            dx: options.displacement.x,
            dy: options.displacement.y,
            size: options.size,
        }];
        Self {
            shaper,
            text: text.into(),
            font,
            options,
            attempts,
            params,
            halo_radius: 0.0,
            shield: None,
        }
    }

    /// Sets alternative placements tried in order for point labels.
    pub fn with_attempts(mut self, attempts: Vec<PlacementAttempt>) -> Self {
        if !attempts.is_empty() {
            self.attempts = attempts;
        }
        self
    }

    /// Halo radius, the halo is a part of the collision box.
    pub fn with_halo_radius(mut self, radius: f64) -> Self {
        self.halo_radius = radius.max(0.0);
        self
    }

    /// Shield image box relative to the label anchor.
    pub fn with_shield(mut self, bbox: Box2d) -> Self {
        self.shield = Some(bbox);
        self
    }

    /// Placement parameters.
    pub fn params(&self) -> &PlacementParams {
        &self.params
    }

    /// Finds all placements of the label on the geometry and registers them in the detector.
    ///
    /// Fails only if the text cannot be shaped.
    pub fn find(
        &self,
        geometry: &PlacementGeometry,
        detector: &mut LabelCollisionDetector,
    ) -> Result<Vec<GlyphPositions>, FontError> {
        if self.text.trim().is_empty() {
            return Ok(vec![]);
        }

        let mut placed = vec![];
        match self.params.placement {
            LabelPlacement::Line => {
                let layout = self.line_layout()?;
                if layout.is_empty() {
                    return Ok(vec![]);
                }

                for path in &geometry.paths {
                    let walker = PathWalker::new(path);
                    self.place_on_path(&walker, &layout, detector, &mut placed);
                }
            }
            placement => {
                for anchor in point_anchors(geometry, placement) {
                    if let Some(positions) = self.place_at_point(anchor, detector)? {
                        placed.push(positions);
                    }
                }
            }
        }

        Ok(placed)
    }

    fn place_at_point(
        &self,
        anchor: Point2d,
        detector: &mut LabelCollisionDetector,
    ) -> Result<Option<GlyphPositions>, FontError> {
        let angle = self.params.orientation;
        for attempt in &self.attempts {
            let options = LayoutOptions {
                size: attempt.size,
                displacement: Vector2d::new(attempt.dx, attempt.dy),
                ..self.options.clone()
            };
            let layout = TextLayout::new(self.shaper, &self.text, &self.font, &options)?;
            if layout.is_empty() {
                return Ok(None);
            }

            let mut bboxes = vec![place_box(&layout.bbox(), anchor, angle).pad(self.halo_radius)];
            let shield = self.shield.map(|b| b.translate(anchor.x, anchor.y));
            bboxes.extend(shield);

            if self.try_accept(&bboxes, layout.text(), detector) {
                let matrix = placement_matrix(anchor, angle);
                let glyphs = layout
                    .glyphs()
                    .iter()
                    .map(|g| PlacedGlyph {
                        glyph: g.glyph.clone(),
                        position: matrix.transform_point(&(g.position + g.glyph.offset)),
                        angle,
                    })
                    .collect();

                return Ok(Some(GlyphPositions {
                    text: layout.text().to_string(),
                    size: layout.size(),
                    anchor,
                    glyphs,
                    bboxes,
                    shield,
                }));
            }
        }

        Ok(None)
    }

    /// Single line layout for the labels along lines.
    fn line_layout(&self) -> Result<TextLayout, FontError> {
        let options = LayoutOptions {
            wrap_width: 0.0,
            displacement: Vector2d::zeros(),
            ..self.options.clone()
        };
        let text = self.text.replace('\n', " ");
        TextLayout::new(self.shaper, &text, &self.font, &options)
    }

    fn place_on_path(
        &self,
        walker: &PathWalker,
        layout: &TextLayout,
        detector: &mut LabelCollisionDetector,
        placed: &mut Vec<GlyphPositions>,
    ) {
        let length = walker.length();
        let width = layout.advance_width();
        if length <= 0.0 || length < self.params.minimum_path_length || length < width {
            return;
        }

        let mut count = 1;
        if self.params.spacing > 0.0 {
            count = ((length / (self.params.spacing + width)).floor() as usize).max(1);
        }
        let spacing = length / count as f64;

        let tolerance = if self.params.label_position_tolerance > 0.0 {
            self.params.label_position_tolerance
        } else {
            spacing / 2.0
        };
        let step = (layout.size() / 2.0).max(1.0);

        for index in 0..count {
            let center = spacing / 2.0 + spacing * index as f64;
            for offset in ToleranceIterator::new(tolerance, step) {
                let start = center + offset - width / 2.0;
                if start < 0.0 || start + width > length {
                    continue;
                }

                let Some((glyphs, bboxes)) = self.glyphs_on_path(walker, layout, start) else {
                    continue;
                };

                if self.try_accept(&bboxes, layout.text(), detector) {
                    let anchor = walker
                        .point_at(start + width / 2.0)
                        .map_or(Point2d::origin(), |(p, _)| p);
                    placed.push(GlyphPositions {
                        text: layout.text().to_string(),
                        size: layout.size(),
                        anchor,
                        glyphs,
                        bboxes,
                        shield: None,
                    });
                    break;
                }
            }
        }
    }

    /// Lays the glyphs along the path starting at the arc length `start`. Returns `None` if the path
    /// bends too much under the label or the label would be upside down.
    fn glyphs_on_path(
        &self,
        walker: &PathWalker,
        layout: &TextLayout,
        start: f64,
    ) -> Option<(Vec<PlacedGlyph>, Vec<Box2d>)> {
        let width = layout.advance_width();
        let (_, middle_angle) = walker.point_at(start + width / 2.0)?;
        let reversed = match self.params.upright {
            Upright::Right | Upright::RightOnly => false,
            Upright::Left | Upright::LeftOnly => true,
            Upright::Auto => middle_angle.cos() < -f64::EPSILON,
            Upright::AutoDown => {
                let cos = middle_angle.cos();
                cos < -f64::EPSILON || (cos.abs() <= f64::EPSILON && middle_angle.sin() < 0.0)
            }
        };

        let upside_down = |angle: f64| angle.cos() < -f64::EPSILON;
        if matches!(self.params.upright, Upright::RightOnly | Upright::LeftOnly) {
            let angle = if reversed { middle_angle + PI } else { middle_angle };
            if upside_down(angle) {
                return None;
            }
        }

        // Moves the baseline so that the middle of the text height lies on the path.
        let baseline_shift = (layout.ascender() + layout.descender()) / 2.0 + self.options.displacement.y;
        let first_x = layout.glyphs().first()?.position.x;

        let mut glyphs = Vec::with_capacity(layout.glyphs().len());
        let mut bboxes = Vec::with_capacity(layout.glyphs().len());
        let mut previous_angle: Option<f64> = None;
        for g in layout.glyphs() {
            let pen = g.position.x - first_x;
            let advance = g.glyph.advance;
            let (distance, center) = if reversed {
                let d = start + width - pen;
                (d, d - advance / 2.0)
            } else {
                let d = start + pen;
                (d, d + advance / 2.0)
            };

            let (origin, _) = walker.point_at(distance.clamp(0.0, walker.length()))?;
            let (_, path_angle) = walker.point_at(center.clamp(0.0, walker.length()))?;
            let angle = if reversed {
                angle_delta(0.0, path_angle + PI)
            } else {
                path_angle
            };

            if let Some(previous) = previous_angle {
                if angle_delta(previous, angle).abs() > self.params.max_char_angle_delta {
                    return None;
                }
            }
            previous_angle = Some(angle);

            let rotation = Rotation2::new(angle);
            let origin = origin + rotation * Vector2d::new(0.0, baseline_shift);
            let glyph_box = Box2d::new(0.0, -layout.ascender(), advance, -layout.descender());
            bboxes.push(place_box(&glyph_box, origin, angle).pad(self.halo_radius));
            glyphs.push(PlacedGlyph {
                glyph: g.glyph.clone(),
                position: origin + rotation * g.glyph.offset,
                angle,
            });
        }

        Some((glyphs, bboxes))
    }

    fn try_accept(&self, bboxes: &[Box2d], key: &str, detector: &mut LabelCollisionDetector) -> bool {
        let extent = detector.extent();
        if !bboxes.iter().all(|b| self.params.fits_extent(b, &extent)) {
            return false;
        }

        if !self.params.allow_overlap
            && !bboxes.iter().all(|b| {
                detector.has_placement_with_repeat(b, self.params.margin, key, self.params.repeat_distance)
            })
        {
            return false;
        }

        if !self.params.ignore_placement {
            for bbox in bboxes {
                detector.insert_with_key(*bbox, key);
            }
        }

        true
    }
}

fn point_anchors(geometry: &PlacementGeometry, placement: LabelPlacement) -> Vec<Point2d> {
    let first_vertex = || geometry.paths.iter().find_map(|p| p.points.first().copied());
    let last_vertex = || {
        geometry.paths.iter().rev().find_map(|p| {
            if p.closed {
                p.points.first().copied()
            } else {
                p.points.last().copied()
            }
        })
    };

    match placement {
        LabelPlacement::Point | LabelPlacement::Interior | LabelPlacement::Line => {
            geometry.anchors.clone()
        }
        LabelPlacement::Vertex => {
            let vertices: Vec<Point2d> = geometry.vertices().collect();
            if vertices.is_empty() {
                geometry.anchors.clone()
            } else {
                vertices
            }
        }
        LabelPlacement::VertexFirst => first_vertex()
            .or_else(|| geometry.anchors.first().copied())
            .into_iter()
            .collect(),
        LabelPlacement::VertexLast => last_vertex()
            .or_else(|| geometry.anchors.last().copied())
            .into_iter()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;

    use super::*;
    use crate::converter::SubPath;
    use crate::style::{SimplePlacements, TextPlacements};
    use crate::text::testing::BoxShaper;

    fn detector() -> LabelCollisionDetector {
        LabelCollisionDetector::new(Box2d::new(0.0, 0.0, 256.0, 256.0))
    }

    fn font() -> FontSelector {
        FontSelector::Face("Test".into())
    }

    fn point(x: f64, y: f64) -> PlacementGeometry {
        PlacementGeometry {
            anchors: vec![Point2d::new(x, y)],
            paths: vec![],
        }
    }

    fn line(points: &[(f64, f64)]) -> PlacementGeometry {
        PlacementGeometry {
            anchors: vec![],
            paths: vec![SubPath::new(
                points.iter().map(|(x, y)| Point2d::new(*x, *y)).collect(),
                false,
            )],
        }
    }

    fn line_params() -> PlacementParams {
        PlacementParams {
            placement: LabelPlacement::Line,
            ..Default::default()
        }
    }

    fn finder<'a>(shaper: &'a BoxShaper, text: &str, params: PlacementParams) -> TextPlacementFinder<'a> {
        TextPlacementFinder::new(shaper, text, font(), LayoutOptions::default(), params)
    }

    #[test]
    fn point_label_collides_with_itself() {
        let mut detector = detector();
        let finder = finder(&BoxShaper, "ab", PlacementParams::default());

        let placed = finder.find(&point(50.0, 50.0), &mut detector).unwrap();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].bboxes, vec![Box2d::new(44.0, 45.0, 56.0, 55.0)]);
        assert_eq!(placed[0].glyphs[0].position, Point2d::new(44.0, 53.0));
        assert_eq!(placed[0].glyphs[1].position, Point2d::new(50.0, 53.0));

        assert!(finder.find(&point(50.0, 50.0), &mut detector).unwrap().is_empty());

        let overlapping = TextPlacementFinder::new(
            &BoxShaper,
            "ab",
            font(),
            LayoutOptions::default(),
            PlacementParams {
                allow_overlap: true,
                ..Default::default()
            },
        );
        assert_eq!(overlapping.find(&point(50.0, 50.0), &mut detector).unwrap().len(), 1);
    }

    #[test]
    fn alternative_placements() {
        let mut detector = detector();
        detector.insert(Box2d::new(44.0, 60.0, 56.0, 70.0));

        let placements: SimplePlacements = "X,N".parse().unwrap();
        let attempts = TextPlacements::Simple(placements)
            .attempts(0.0, 10.0, 10.0);
        let finder = finder(&BoxShaper, "ab", PlacementParams::default()).with_attempts(attempts);
        let placed = finder.find(&point(50.0, 50.0), &mut detector).unwrap();

        // Below the anchor (exact displacement) collides, above it is free.
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].bboxes[0], Box2d::new(44.0, 30.0, 56.0, 40.0));
        assert_eq!(placed[0].glyphs[0].position.y, 38.0);
    }

    #[test]
    fn repeat_distance_and_shield() {
        let mut detector = detector();
        let params = PlacementParams {
            repeat_distance: 50.0,
            ..Default::default()
        };

        let first = finder(&BoxShaper, "ab", params.clone())
            .with_shield(Box2d::new(-10.0, -10.0, 10.0, 10.0));
        let placed = first.find(&point(50.0, 50.0), &mut detector).unwrap();
        assert_eq!(placed[0].shield, Some(Box2d::new(40.0, 40.0, 60.0, 60.0)));
        assert_eq!(detector.len(), 2);

        let same = finder(&BoxShaper, "ab", params.clone());
        assert!(same.find(&point(90.0, 50.0), &mut detector).unwrap().is_empty());

        let other = finder(&BoxShaper, "cd", params);
        assert_eq!(other.find(&point(90.0, 50.0), &mut detector).unwrap().len(), 1);
    }

    #[test]
    fn label_along_line() {
        let forward = finder(&BoxShaper, "abc", line_params());
        let placed = forward
            .find(&line(&[(0.0, 100.0), (200.0, 100.0)]), &mut detector())
            .unwrap();
        assert_eq!(placed.len(), 1);

        let glyphs = &placed[0].glyphs;
        assert_abs_diff_eq!(glyphs[0].position, Point2d::new(91.0, 103.0), epsilon = 1e-9);
        assert_abs_diff_eq!(glyphs[2].position, Point2d::new(103.0, 103.0), epsilon = 1e-9);
        assert!(glyphs.iter().all(|g| g.angle == 0.0));
        assert_eq!(placed[0].bboxes.len(), 3);

        // Reversed line gives the same upright label.
        let placed = forward
            .find(&line(&[(200.0, 100.0), (0.0, 100.0)]), &mut detector())
            .unwrap();
        let glyphs = &placed[0].glyphs;
        assert_abs_diff_eq!(glyphs[0].position, Point2d::new(91.0, 103.0), epsilon = 1e-9);
        assert_abs_diff_eq!(glyphs[0].angle, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn repeated_labels_along_long_line() {
        let params = PlacementParams {
            spacing: 50.0,
            ..line_params()
        };
        let placed = finder(&BoxShaper, "ab", params)
            .find(&line(&[(0.0, 10.0), (248.0, 10.0)]), &mut detector())
            .unwrap();

        // 248 / (50 + 12) = 4 labels, one in the middle of every quarter.
        assert_eq!(placed.len(), 4);
        let anchors: Vec<f64> = placed.iter().map(|p| p.anchor.x).collect();
        assert_eq!(anchors, vec![31.0, 93.0, 155.0, 217.0]);
    }

    #[test]
    fn sharp_turns_reject_labels() {
        let corner = line(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0)]);
        let strict = PlacementParams {
            label_position_tolerance: 1.0,
            ..line_params()
        };
        assert!(finder(&BoxShaper, "abcdef", strict)
            .find(&corner, &mut detector())
            .unwrap()
            .is_empty());

        let relaxed = PlacementParams {
            label_position_tolerance: 1.0,
            max_char_angle_delta: PI,
            ..line_params()
        };
        let placed = finder(&BoxShaper, "abcdef", relaxed)
            .find(&corner, &mut detector())
            .unwrap();
        assert_eq!(placed.len(), 1);
        assert_abs_diff_eq!(placed[0].glyphs[0].angle, 0.0);
        assert_abs_diff_eq!(placed[0].glyphs[5].angle, FRAC_PI_2);
    }

    #[test]
    fn short_paths_and_missing_fonts() {
        let params = PlacementParams {
            minimum_path_length: 50.0,
            ..line_params()
        };
        assert!(finder(&BoxShaper, "ab", params)
            .find(&line(&[(0.0, 0.0), (30.0, 0.0)]), &mut detector())
            .unwrap()
            .is_empty());

        // Text longer than the line.
        assert!(finder(&BoxShaper, "abcdefgh", line_params())
            .find(&line(&[(0.0, 0.0), (30.0, 0.0)]), &mut detector())
            .unwrap()
            .is_empty());

        let missing = TextPlacementFinder::new(
            &BoxShaper,
            "ab",
            FontSelector::Face("Missing".into()),
            LayoutOptions::default(),
            PlacementParams::default(),
        );
        assert_matches!(
            missing.find(&point(1.0, 1.0), &mut detector()),
            Err(FontError::FaceNotFound(_))
        );
        assert!(finder(&BoxShaper, "  ", PlacementParams::default())
            .find(&point(1.0, 1.0), &mut detector())
            .unwrap()
            .is_empty());
    }
}
