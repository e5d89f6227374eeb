//! Placement finders decide where labels and markers go.
//!
//! A finder gets the geometry of a feature already converted into pixels
//! ([`PlacementGeometry`]), generates candidate positions for it and checks every candidate with the
//! [`LabelCollisionDetector`](crate::label::LabelCollisionDetector). Accepted candidates are
//! registered in the detector right away, so the order in which features are processed decides
//! which labels win.
//!
//! Running out of candidates is not an error: the label is just not drawn.

use cartograph_types::{Box2d, Point2d};
use nalgebra::{Matrix3, Rotation2, Vector2};

use crate::converter::SubPath;
use crate::style::{Key, LabelPlacement, PropertyResolver, Upright};

mod markers;
mod path;
mod text;

pub use markers::{MarkerPlacement, MarkersPlacementFinder};
pub use path::{PathWalker, ToleranceIterator};
pub use text::{GlyphPositions, PlacedGlyph, TextPlacementFinder};

/// Spacing used when the configured one is less than one pixel.
pub const DEFAULT_SPACING: f64 = 100.0;

/// Geometry of a feature in pixel space, prepared for placement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementGeometry {
    /// Label points: one for every point of the geometry, or the centroid (interior point) of
    /// lines and polygons.
    pub anchors: Vec<Point2d>,
    /// Paths of lines and polygon rings.
    pub paths: Vec<SubPath>,
}

impl PlacementGeometry {
    /// Returns true if there is nothing to place anything at.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty() && self.paths.iter().all(|p| p.points.is_empty())
    }

    /// All vertices of all paths.
    pub fn vertices(&self) -> impl Iterator<Item = Point2d> + '_ {
        self.paths.iter().flat_map(|p| p.points.iter().copied())
    }
}

/// Placement parameters shared by text and markers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementParams {
    /// Where to place.
    pub placement: LabelPlacement,
    /// Distance between repeated placements along lines.
    pub spacing: f64,
    /// Position of the first placement along a line (markers only). `0` means half of spacing.
    pub spacing_offset: f64,
    /// Share of the spacing a placement can be moved along the line to find a free place.
    pub max_error: f64,
    /// Place even when colliding.
    pub allow_overlap: bool,
    /// Don't register placed boxes.
    pub ignore_placement: bool,
    /// Reject placements not fully inside the detector extent.
    pub avoid_edges: bool,
    /// Free space required around the placement.
    pub margin: f64,
    /// Minimum distance between placements with the same repeat key.
    pub repeat_distance: f64,
    /// Minimum distance from the placement to the edge of the detector extent.
    pub minimum_padding: f64,
    /// Lines shorter than this are skipped.
    pub minimum_path_length: f64,
    /// How far a line label can be moved from its ideal position. `0` means half of spacing.
    pub label_position_tolerance: f64,
    /// Maximum angle between two consecutive characters (radians).
    pub max_char_angle_delta: f64,
    /// Reading direction of line labels.
    pub upright: Upright,
    /// Rotation of point placements (radians).
    pub orientation: f64,
}

impl Default for PlacementParams {
    fn default() -> Self {
        Self {
            placement: LabelPlacement::Point,
            spacing: DEFAULT_SPACING,
            spacing_offset: 0.0,
            max_error: 0.2,
            allow_overlap: false,
            ignore_placement: false,
            avoid_edges: false,
            margin: 0.0,
            repeat_distance: 0.0,
            minimum_padding: 0.0,
            minimum_path_length: 0.0,
            label_position_tolerance: 0.0,
            max_char_angle_delta: 22.5_f64.to_radians(),
            upright: Upright::Auto,
            orientation: 0.0,
        }
    }
}

impl PlacementParams {
    /// Reads the parameters from symbolizer properties. Distances are multiplied by `scale_factor`.
    pub fn from_resolver(resolver: &PropertyResolver, scale_factor: f64) -> Self {
        let defaults = Self::default();
        let distance = |key: Key, default: f64| resolver.f64_or(key, default) * scale_factor;

        // `minimum-distance` is the older name of the margin.
        let margin = distance(Key::Margin, 0.0).max(distance(Key::MinimumDistance, 0.0));

        Self {
            placement: resolver
                .enumeration(Key::Placement)
                .unwrap_or(defaults.placement),
            spacing: distance(Key::Spacing, DEFAULT_SPACING),
            spacing_offset: distance(Key::SpacingOffset, 0.0),
            max_error: resolver.f64_or(Key::MaxError, defaults.max_error),
            allow_overlap: resolver.bool(Key::AllowOverlap),
            ignore_placement: resolver.bool(Key::IgnorePlacement),
            avoid_edges: resolver.bool(Key::AvoidEdges),
            margin,
            repeat_distance: distance(Key::RepeatDistance, 0.0),
            minimum_padding: distance(Key::MinimumPadding, 0.0),
            minimum_path_length: distance(Key::MinimumPathLength, 0.0),
            label_position_tolerance: distance(Key::LabelPositionTolerance, 0.0),
            max_char_angle_delta: resolver
                .f64_or(Key::MaxCharAngleDelta, 22.5)
                .to_radians(),
            upright: resolver.enumeration(Key::Upright).unwrap_or(defaults.upright),
            orientation: resolver.f64_or(Key::Orientation, 0.0).to_radians(),
        }
    }

    /// Spacing clamped to [`DEFAULT_SPACING`] if it is less than one pixel.
    pub fn effective_spacing(&self) -> f64 {
        if self.spacing < 1.0 {
            DEFAULT_SPACING
        } else {
            self.spacing
        }
    }

    /// Edge checks of a box: `avoid_edges` and `minimum_padding`.
    pub(crate) fn fits_extent(&self, bbox: &Box2d, extent: &Box2d) -> bool {
        if self.avoid_edges && !extent.contains(bbox) {
            return false;
        }

        self.minimum_padding <= 0.0 || extent.contains(&bbox.pad(self.minimum_padding))
    }
}

/// Matrix rotating around the origin by `angle` radians and moving the origin to `position`.
pub(crate) fn placement_matrix(position: Point2d, angle: f64) -> Matrix3<f64> {
    let rotation = Rotation2::new(angle).to_homogeneous();
    Matrix3::new_translation(&Vector2::new(position.x, position.y)) * rotation
}

/// Envelope of the box rotated by `angle` around the origin and moved to `position`.
pub(crate) fn place_box(bbox: &Box2d, position: Point2d, angle: f64) -> Box2d {
    if angle == 0.0 {
        bbox.translate(position.x, position.y)
    } else {
        bbox.transform(&placement_matrix(position, angle))
    }
}
