//! Straight line segments.

use crate::orient::Orientation;
use crate::Point2d;

/// A straight line segment between two points.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Segment(pub Point2d, pub Point2d);

impl Segment {
    /// Length of the segment.
    pub fn length(&self) -> f64 {
        (self.1 - self.0).norm()
    }

    /// Angle of the segment direction in radians, measured from the positive X axis.
    pub fn angle(&self) -> f64 {
        (self.1.y - self.0.y).atan2(self.1.x - self.0.x)
    }

    /// Point at the given fraction of the segment (`0.0` is the start, `1.0` is the end).
    pub fn interpolate(&self, t: f64) -> Point2d {
        self.0 + (self.1 - self.0) * t
    }

    /// Shortest euclidean distance (squared) between a point and the segment:
    ///
    /// * if the normal from the point to the segment ends inside the segment, the returned value is
    ///   the squared length of the normal
    /// * otherwise, the returned value is the smaller one of the distances between the point and the
    ///   segment's endpoints
    pub fn distance_to_point_sq(&self, point: &Point2d) -> f64 {
        if self.0 == self.1 {
            return (*point - self.0).norm_squared();
        }

        let ds = self.1 - self.0;
        let dp = *point - self.0;
        let ds_len = ds.norm_squared();

        let r = dp.dot(&ds) / ds_len;
        if r <= 0.0 {
            (*point - self.0).norm_squared()
        } else if r >= 1.0 {
            (*point - self.1).norm_squared()
        } else {
            let s = (dp.y * ds.x - dp.x * ds.y) / ds_len;
            (s * s) * ds_len
        }
    }

    /// Returns true, if the segment has at least one common point with the `other` segment.
    pub fn intersects(&self, other: &Segment) -> bool {
        fn on_segment(p: &Point2d, q: &Point2d, r: &Point2d) -> bool {
            q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
        }

        let o1 = Orientation::triplet(&self.0, &other.0, &self.1);
        let o2 = Orientation::triplet(&self.0, &other.1, &self.1);
        let o3 = Orientation::triplet(&other.0, &self.0, &other.1);
        let o4 = Orientation::triplet(&other.0, &self.1, &other.1);

        if o1 != o2 && o3 != o4 {
            return true;
        }

        (o1 == Orientation::Collinear && on_segment(&self.0, &other.0, &self.1))
            || (o2 == Orientation::Collinear && on_segment(&self.0, &other.1, &self.1))
            || (o3 == Orientation::Collinear && on_segment(&other.0, &self.0, &other.1))
            || (o4 == Orientation::Collinear && on_segment(&other.0, &self.1, &other.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn distance_to_point() {
        let segment = Segment(Point2d::new(0.0, 0.0), Point2d::new(10.0, 0.0));
        assert_abs_diff_eq!(segment.distance_to_point_sq(&Point2d::new(5.0, 3.0)), 9.0);
        assert_abs_diff_eq!(segment.distance_to_point_sq(&Point2d::new(-3.0, 4.0)), 25.0);
        assert_abs_diff_eq!(segment.distance_to_point_sq(&Point2d::new(13.0, 4.0)), 25.0);
    }

    #[test]
    fn intersections() {
        let a = Segment(Point2d::new(0.0, 0.0), Point2d::new(2.0, 2.0));
        let b = Segment(Point2d::new(0.0, 2.0), Point2d::new(2.0, 0.0));
        let c = Segment(Point2d::new(3.0, 3.0), Point2d::new(4.0, 4.0));
        let d = Segment(Point2d::new(1.0, 1.0), Point2d::new(3.0, 3.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.intersects(&d));
    }

    #[test]
    fn interpolate_and_angle() {
        let segment = Segment(Point2d::new(0.0, 0.0), Point2d::new(0.0, 4.0));
        assert_eq!(segment.interpolate(0.25), Point2d::new(0.0, 1.0));
        assert_abs_diff_eq!(segment.angle(), std::f64::consts::FRAC_PI_2);
        assert_abs_diff_eq!(segment.length(), 4.0);
    }
}
