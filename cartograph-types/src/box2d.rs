use std::fmt::{Display, Formatter};

use nalgebra::{Matrix3, Point2};
use num_traits::NumCast;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::geometry::CoordinateType;
use crate::Point2d;

/// Axis-aligned rectangle.
///
/// A box can be in an *invalid* state, which means that it does not contain any point at all. This
/// state is different from a degenerate box of zero width or height: `Box2d::new(1.0, 1.0, 1.0, 1.0)`
/// is a valid box that contains exactly one point, while `Box2d::invalid()` contains none.
/// Growing an invalid box with [`Box2d::expand_to_include`] turns it into the box it was grown with,
/// so the invalid box is a neutral element for union.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Box2d<T = f64> {
    min_x: T,
    min_y: T,
    max_x: T,
    max_y: T,
}

impl<T: CoordinateType> Box2d<T> {
    /// Creates a new box from two corners. Corner coordinates are normalized, so the order of the
    /// arguments doesn't matter.
    pub fn new(x0: T, y0: T, x1: T, y1: T) -> Self {
        let (min_x, max_x) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let (min_y, max_y) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Box that contains no points.
    pub fn invalid() -> Self {
        Self {
            min_x: T::max_value(),
            min_y: T::max_value(),
            max_x: T::min_value(),
            max_y: T::min_value(),
        }
    }

    /// Degenerate box containing a single point.
    pub fn from_point(x: T, y: T) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    /// Smallest box containing all the given points. Returns invalid box if the iterator is empty.
    pub fn from_points(points: impl IntoIterator<Item = (T, T)>) -> Self {
        let mut bbox = Self::invalid();
        for (x, y) in points {
            bbox.expand_to_include_point(x, y);
        }

        bbox
    }

    /// Returns false if the box is in invalid state.
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    /// Minimum x coordinate.
    pub fn min_x(&self) -> T {
        self.min_x
    }

    /// Minimum y coordinate.
    pub fn min_y(&self) -> T {
        self.min_y
    }

    /// Maximum x coordinate.
    pub fn max_x(&self) -> T {
        self.max_x
    }

    /// Maximum y coordinate.
    pub fn max_y(&self) -> T {
        self.max_y
    }

    /// Width of the box. Zero for invalid box.
    pub fn width(&self) -> T {
        if self.is_valid() {
            self.max_x - self.min_x
        } else {
            T::zero()
        }
    }

    /// Height of the box. Zero for invalid box.
    pub fn height(&self) -> T {
        if self.is_valid() {
            self.max_y - self.min_y
        } else {
            T::zero()
        }
    }

    /// Center point of the box.
    pub fn center(&self) -> Point2d {
        Point2d::new(
            (self.min_x.as_() + self.max_x.as_()) / 2.0,
            (self.min_y.as_() + self.max_y.as_()) / 2.0,
        )
    }

    /// Grows the box so that it contains the `other` box. Growing by an invalid box does nothing.
    pub fn expand_to_include(&mut self, other: &Self) {
        if !other.is_valid() {
            return;
        }

        self.min_x = partial_min(self.min_x, other.min_x);
        self.min_y = partial_min(self.min_y, other.min_y);
        self.max_x = partial_max(self.max_x, other.max_x);
        self.max_y = partial_max(self.max_y, other.max_y);
    }

    /// Grows the box so that it contains the given point.
    pub fn expand_to_include_point(&mut self, x: T, y: T) {
        self.min_x = partial_min(self.min_x, x);
        self.min_y = partial_min(self.min_y, y);
        self.max_x = partial_max(self.max_x, x);
        self.max_y = partial_max(self.max_y, y);
    }

    /// Union of two boxes.
    pub fn merge(&self, other: &Self) -> Self {
        let mut result = *self;
        result.expand_to_include(other);
        result
    }

    /// Returns true if the point is inside the box or on its border.
    pub fn contains_point(&self, x: T, y: T) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Returns true if the `other` box lies completely inside this one.
    pub fn contains(&self, other: &Self) -> bool {
        other.is_valid()
            && self.is_valid()
            && other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Returns true if the boxes have at least one common point, including touching borders.
    pub fn intersects(&self, other: &Self) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Returns true if the interiors of the boxes overlap. Boxes that only touch each other
    /// do not overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Common part of the two boxes. Returns invalid box if the boxes do not intersect.
    pub fn intersect(&self, other: &Self) -> Self {
        if !self.intersects(other) {
            return Self::invalid();
        }

        Self {
            min_x: partial_max(self.min_x, other.min_x),
            min_y: partial_max(self.min_y, other.min_y),
            max_x: partial_min(self.max_x, other.max_x),
            max_y: partial_min(self.max_y, other.max_y),
        }
    }

    /// Box grown by `d` in every direction. Negative `d` shrinks the box.
    pub fn pad(&self, d: T) -> Self {
        if !self.is_valid() {
            return *self;
        }

        Self::new(
            self.min_x - d,
            self.min_y - d,
            self.max_x + d,
            self.max_y + d,
        )
    }

    /// Box moved by the given offset.
    pub fn translate(&self, dx: T, dy: T) -> Self {
        if !self.is_valid() {
            return *self;
        }

        Self {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Casts coordinates to another numeric type. Returns `None` if any coordinate cannot be
    /// represented in the target type. Invalid box is cast into invalid box.
    pub fn cast<U: CoordinateType>(&self) -> Option<Box2d<U>> {
        if !self.is_valid() {
            return Some(Box2d::invalid());
        }

        Some(Box2d {
            min_x: NumCast::from(self.min_x)?,
            min_y: NumCast::from(self.min_y)?,
            max_x: NumCast::from(self.max_x)?,
            max_y: NumCast::from(self.max_y)?,
        })
    }

    /// Corners of the box in counterclockwise order starting from the minimum corner.
    pub fn corners(&self) -> [Point2<T>; 4] {
        [
            Point2::new(self.min_x, self.min_y),
            Point2::new(self.max_x, self.min_y),
            Point2::new(self.max_x, self.max_y),
            Point2::new(self.min_x, self.max_y),
        ]
    }
}

impl Box2d<f64> {
    /// Box of the same size with the center moved into the given point.
    pub fn re_center(&self, cx: f64, cy: f64) -> Self {
        if !self.is_valid() {
            return *self;
        }

        let half_width = self.width() / 2.0;
        let half_height = self.height() / 2.0;
        Self {
            min_x: cx - half_width,
            min_y: cy - half_height,
            max_x: cx + half_width,
            max_y: cy + half_height,
        }
    }

    /// Box with the same center and the given size.
    pub fn with_size(&self, width: f64, height: f64) -> Self {
        let center = self.center();
        Self::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            center.x + width / 2.0,
            center.y + height / 2.0,
        )
    }

    /// Bounding box of this box after applying the affine `transform` (homogeneous 3x3 matrix) to it.
    pub fn transform(&self, transform: &Matrix3<f64>) -> Self {
        if !self.is_valid() {
            return *self;
        }

        Self::from_points(self.corners().into_iter().map(|corner| {
            let p = transform.transform_point(&corner);
            (p.x, p.y)
        }))
    }
}

impl<T: CoordinateType> Default for Box2d<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T: CoordinateType + Display> Display for Box2d<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(
                f,
                "box2d({},{},{},{})",
                self.min_x, self.min_y, self.max_x, self.max_y
            )
        } else {
            write!(f, "box2d(INVALID)")
        }
    }
}

impl<T: CoordinateType> FromIterator<Box2d<T>> for Box2d<T> {
    fn from_iter<I: IntoIterator<Item = Box2d<T>>>(iter: I) -> Self {
        let mut result = Self::invalid();
        for bbox in iter {
            result.expand_to_include(&bbox);
        }

        result
    }
}

fn partial_min<T: PartialOrd>(a: T, b: T) -> T {
    if b < a {
        b
    } else {
        a
    }
}

fn partial_max<T: PartialOrd>(a: T, b: T) -> T {
    if b > a {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn union_of_disjoint_boxes() {
        let mut bbox = Box2d::new(0.0, 0.0, 1.0, 1.0);
        bbox.expand_to_include(&Box2d::new(2.0, 2.0, 3.0, 3.0));
        assert_eq!(bbox, Box2d::new(0.0, 0.0, 3.0, 3.0));
    }

    #[test]
    fn invalid_box_is_neutral_for_union() {
        let mut bbox = Box2d::<f64>::invalid();
        assert!(!bbox.is_valid());

        bbox.expand_to_include(&Box2d::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(bbox, Box2d::new(1.0, 2.0, 3.0, 4.0));

        bbox.expand_to_include(&Box2d::invalid());
        assert_eq!(bbox, Box2d::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn zero_area_box_is_valid() {
        let bbox = Box2d::new(1, 1, 1, 1);
        assert!(bbox.is_valid());
        assert_eq!(bbox.width(), 0);
        assert!(bbox.contains_point(1, 1));

        let invalid = Box2d::<i32>::invalid();
        assert!(!invalid.contains_point(0, 0));
        assert_eq!(invalid.width(), 0);
    }

    #[test]
    fn new_normalizes_corners() {
        let bbox = Box2d::new(3.0, 4.0, 1.0, 2.0);
        assert_eq!(bbox.min_x(), 1.0);
        assert_eq!(bbox.min_y(), 2.0);
        assert_eq!(bbox.max_x(), 3.0);
        assert_eq!(bbox.max_y(), 4.0);
    }

    #[test]
    fn touching_boxes_intersect_but_do_not_overlap() {
        let a = Box2d::new(0.0, 0.0, 1.0, 1.0);
        let b = Box2d::new(1.0, 0.0, 2.0, 1.0);
        assert!(a.intersects(&b));
        assert!(!a.overlaps(&b));

        let c = Box2d::new(0.5, 0.5, 2.0, 2.0);
        assert!(a.overlaps(&c));
        assert_eq!(a.intersect(&c), Box2d::new(0.5, 0.5, 1.0, 1.0));

        let d = Box2d::new(5.0, 5.0, 6.0, 6.0);
        assert!(!a.intersect(&d).is_valid());
    }

    #[test]
    fn pad_and_re_center() {
        let bbox = Box2d::new(0.0, 0.0, 2.0, 4.0);
        assert_eq!(bbox.pad(1.0), Box2d::new(-1.0, -1.0, 3.0, 5.0));
        assert_eq!(bbox.re_center(10.0, 10.0), Box2d::new(9.0, 8.0, 11.0, 12.0));
        assert_eq!(bbox.translate(1.0, -1.0), Box2d::new(1.0, -1.0, 3.0, 3.0));

        let center = bbox.center();
        assert_abs_diff_eq!(center.x, 1.0);
        assert_abs_diff_eq!(center.y, 2.0);
    }

    #[test]
    fn transform_rotated_box() {
        let rotation = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let bbox = Box2d::new(0.0, 0.0, 2.0, 1.0).transform(&rotation);
        assert_abs_diff_eq!(bbox.min_x(), -1.0);
        assert_abs_diff_eq!(bbox.max_x(), 0.0);
        assert_abs_diff_eq!(bbox.min_y(), 0.0);
        assert_abs_diff_eq!(bbox.max_y(), 2.0);
    }

    #[test]
    fn display() {
        assert_eq!(Box2d::new(0, 0, 3, 3).to_string(), "box2d(0,0,3,3)");
        assert_eq!(Box2d::<f64>::invalid().to_string(), "box2d(INVALID)");
    }

    #[test]
    fn collect_boxes() {
        let bbox: Box2d = [Box2d::new(0.0, 0.0, 1.0, 1.0), Box2d::new(-1.0, 0.5, 0.5, 2.0)]
            .into_iter()
            .collect();
        assert_eq!(bbox, Box2d::new(-1.0, 0.0, 1.0, 2.0));
    }
}
