//! Transformation between map coordinates and output pixels.

use cartograph_types::{Box2d, Point2d};
use nalgebra::Matrix3;

/// Transformation between the map coordinates (the map SRS) and pixel coordinates of the output
/// image.
///
/// Pixel space has its origin in the top left corner of the image with Y axis looking down, while
/// map space is Y-up. The extent is stretched to the image size independently in each direction,
/// so for undistorted rendering the extent aspect ratio must be equal to the image one (see
/// [`Map::zoom_to_box`](crate::Map::zoom_to_box)).
///
/// Optional offset shifts the pixel origin, which is used to render a part of a bigger image
/// (metatiles, buffered rendering).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    width: u32,
    height: u32,
    extent: Box2d,
    offset_x: f64,
    offset_y: f64,
    sx: f64,
    sy: f64,
}

impl ViewTransform {
    /// Creates a new transform.
    pub fn new(width: u32, height: u32, extent: Box2d) -> Self {
        let sx = if extent.width() > 0.0 {
            width as f64 / extent.width()
        } else {
            1.0
        };
        let sy = if extent.height() > 0.0 {
            height as f64 / extent.height()
        } else {
            1.0
        };

        Self {
            width,
            height,
            extent,
            offset_x: 0.0,
            offset_y: 0.0,
            sx,
            sy,
        }
    }

    /// Returns the same transform with pixel origin moved by the given offset.
    pub fn with_offset(&self, offset_x: f64, offset_y: f64) -> Self {
        Self {
            offset_x,
            offset_y,
            ..*self
        }
    }

    /// Width of the image in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the image in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Map extent covered by the image.
    pub fn extent(&self) -> Box2d {
        self.extent
    }

    /// Size of a pixel in map units along X axis.
    pub fn resolution(&self) -> f64 {
        1.0 / self.sx
    }

    /// Horizontal scale (pixels per map unit).
    pub fn scale_x(&self) -> f64 {
        self.sx
    }

    /// Vertical scale (pixels per map unit).
    pub fn scale_y(&self) -> f64 {
        self.sy
    }

    /// Converts map coordinates into pixel coordinates.
    pub fn forward(&self, point: &Point2d) -> Point2d {
        Point2d::new(
            (point.x - self.extent.min_x()) * self.sx - self.offset_x,
            (self.extent.max_y() - point.y) * self.sy - self.offset_y,
        )
    }

    /// Converts pixel coordinates into map coordinates.
    pub fn backward(&self, point: &Point2d) -> Point2d {
        Point2d::new(
            self.extent.min_x() + (point.x + self.offset_x) / self.sx,
            self.extent.max_y() - (point.y + self.offset_y) / self.sy,
        )
    }

    /// Converts a box in map coordinates into pixel coordinates.
    pub fn forward_box(&self, bbox: &Box2d) -> Box2d {
        if !bbox.is_valid() {
            return *bbox;
        }

        let a = self.forward(&Point2d::new(bbox.min_x(), bbox.min_y()));
        let b = self.forward(&Point2d::new(bbox.max_x(), bbox.max_y()));
        Box2d::new(a.x, a.y, b.x, b.y)
    }

    /// Converts a box in pixel coordinates into map coordinates.
    pub fn backward_box(&self, bbox: &Box2d) -> Box2d {
        if !bbox.is_valid() {
            return *bbox;
        }

        let a = self.backward(&Point2d::new(bbox.min_x(), bbox.min_y()));
        let b = self.backward(&Point2d::new(bbox.max_x(), bbox.max_y()));
        Box2d::new(a.x, a.y, b.x, b.y)
    }

    /// Map to pixel transformation as a homogeneous matrix.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.sx,
            0.0,
            -self.extent.min_x() * self.sx - self.offset_x,
            0.0,
            -self.sy,
            self.extent.max_y() * self.sy - self.offset_y,
            0.0,
            0.0,
            1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn corners_map_to_image_corners() {
        let view = ViewTransform::new(200, 100, Box2d::new(-10.0, 0.0, 10.0, 10.0));
        let top_left = view.forward(&Point2d::new(-10.0, 10.0));
        assert_abs_diff_eq!(top_left.x, 0.0);
        assert_abs_diff_eq!(top_left.y, 0.0);

        let bottom_right = view.forward(&Point2d::new(10.0, 0.0));
        assert_abs_diff_eq!(bottom_right.x, 200.0);
        assert_abs_diff_eq!(bottom_right.y, 100.0);
        assert_abs_diff_eq!(view.resolution(), 0.1);
    }

    #[test]
    fn round_trip() {
        let view =
            ViewTransform::new(256, 256, Box2d::new(100.0, 200.0, 356.0, 456.0)).with_offset(5.0, -3.0);
        let p = Point2d::new(123.4, 321.0);
        let back = view.backward(&view.forward(&p));
        assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-9);
        assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-9);

        let bbox = Box2d::new(110.0, 210.0, 150.0, 260.0);
        let screen = view.forward_box(&bbox);
        let restored = view.backward_box(&screen);
        assert_abs_diff_eq!(restored.min_x(), bbox.min_x(), epsilon = 1e-9);
        assert_abs_diff_eq!(restored.max_y(), bbox.max_y(), epsilon = 1e-9);
    }

    #[test]
    fn matrix_matches_forward() {
        let view =
            ViewTransform::new(300, 150, Box2d::new(0.0, 0.0, 30.0, 15.0)).with_offset(1.0, 2.0);
        let p = Point2d::new(7.0, 3.0);
        let expected = view.forward(&p);
        let actual = view.matrix().transform_point(&p);
        assert_abs_diff_eq!(actual.x, expected.x, epsilon = 1e-9);
        assert_abs_diff_eq!(actual.y, expected.y, epsilon = 1e-9);
    }
}
