use cartograph_types::segment::Segment;
use cartograph_types::Point2d;

use crate::converter::SubPath;

/// Position on a path by the arc length.
#[derive(Debug, Clone)]
pub struct PathWalker {
    points: Vec<Point2d>,
    /// Arc length at every point.
    distances: Vec<f64>,
}

impl PathWalker {
    /// Creates a walker over the sub-path. Closed sub-paths include their closing segment.
    pub fn new(path: &SubPath) -> Self {
        Self::from_points(path.to_line())
    }

    /// Creates a walker over a line.
    pub fn from_points(points: Vec<Point2d>) -> Self {
        let mut distances = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (i, p) in points.iter().enumerate() {
            if i > 0 {
                total += (*p - points[i - 1]).norm();
            }
            distances.push(total);
        }

        Self { points, distances }
    }

    /// Total length.
    pub fn length(&self) -> f64 {
        self.distances.last().copied().unwrap_or(0.0)
    }

    /// Point at the arc length `distance` and the direction angle of the path there (radians).
    ///
    /// Returns `None` if the distance is outside of the path or the path has zero length.
    pub fn point_at(&self, distance: f64) -> Option<(Point2d, f64)> {
        let length = self.length();
        if length <= 0.0 || !(0.0..=length).contains(&distance) {
            return None;
        }

        // Index of the first point further than `distance`.
        let index = self
            .distances
            .partition_point(|d| *d <= distance)
            .clamp(1, self.points.len() - 1);
        let index = self.segment_with_length(index);
        let segment = Segment(self.points[index - 1], self.points[index]);

        let start = self.distances[index - 1];
        let segment_length = self.distances[index] - start;
        let t = (distance - start) / segment_length;

        Some((segment.interpolate(t), segment.angle()))
    }

    /// Direction of the path at its first point.
    pub fn start_angle(&self) -> Option<f64> {
        self.first_segment().map(|s| s.angle())
    }

    /// Direction of the path at its last point.
    pub fn end_angle(&self) -> Option<f64> {
        (1..self.points.len())
            .rev()
            .map(|i| Segment(self.points[i - 1], self.points[i]))
            .find(|s| s.length() > 0.0)
            .map(|s| s.angle())
    }

    fn first_segment(&self) -> Option<Segment> {
        (1..self.points.len())
            .map(|i| Segment(self.points[i - 1], self.points[i]))
            .find(|s| s.length() > 0.0)
    }

    /// End index of a segment with non-zero length near `index`.
    fn segment_with_length(&self, mut index: usize) -> usize {
        while index > 1 && self.distances[index] == self.distances[index - 1] {
            index -= 1;
        }
        while index + 1 < self.points.len() && self.distances[index] == self.distances[index - 1] {
            index += 1;
        }

        index
    }
}

/// Offsets tried around an ideal position: `0, +step, -step, +2 step, -2 step, ...` not further
/// than `tolerance` from zero.
#[derive(Debug, Clone)]
pub struct ToleranceIterator {
    tolerance: f64,
    step: f64,
    index: usize,
}

impl ToleranceIterator {
    /// Creates a new iterator. With non-positive `step` or `tolerance` only `0` is produced.
    pub fn new(tolerance: f64, step: f64) -> Self {
        Self {
            tolerance,
            step,
            index: 0,
        }
    }
}

impl Iterator for ToleranceIterator {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let index = self.index;
        self.index += 1;
        if index == 0 {
            return Some(0.0);
        }

        if self.step <= 0.0 || self.tolerance <= 0.0 {
            return None;
        }

        let magnitude = index.div_ceil(2) as f64 * self.step;
        if magnitude > self.tolerance {
            return None;
        }

        Some(if index % 2 == 1 { magnitude } else { -magnitude })
    }
}

/// Signed difference `b - a` of two angles normalized into `(-PI, PI]`.
pub(crate) fn angle_delta(a: f64, b: f64) -> f64 {
    use std::f64::consts::PI;

    let mut delta = (b - a) % (2.0 * PI);
    if delta > PI {
        delta -= 2.0 * PI;
    } else if delta <= -PI {
        delta += 2.0 * PI;
    }

    delta
}

#[cfg(test)]
mod tests {
    use std::f64::consts::{FRAC_PI_2, PI};

    use approx::assert_abs_diff_eq;

    use super::*;

    fn walker(points: &[(f64, f64)]) -> PathWalker {
        PathWalker::from_points(points.iter().map(|(x, y)| Point2d::new(*x, *y)).collect())
    }

    #[test]
    fn walk_along_corner() {
        let walker = walker(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        assert_abs_diff_eq!(walker.length(), 20.0);

        let (p, angle) = walker.point_at(5.0).unwrap();
        assert_abs_diff_eq!(p, Point2d::new(5.0, 0.0));
        assert_abs_diff_eq!(angle, 0.0);

        let (p, angle) = walker.point_at(15.0).unwrap();
        assert_abs_diff_eq!(p, Point2d::new(10.0, 5.0));
        assert_abs_diff_eq!(angle, FRAC_PI_2);

        let (p, _) = walker.point_at(20.0).unwrap();
        assert_abs_diff_eq!(p, Point2d::new(10.0, 10.0));

        assert!(walker.point_at(20.5).is_none());
        assert!(walker.point_at(-0.5).is_none());
        assert_abs_diff_eq!(walker.start_angle().unwrap(), 0.0);
        assert_abs_diff_eq!(walker.end_angle().unwrap(), FRAC_PI_2);
    }

    #[test]
    fn degenerate_paths() {
        assert!(walker(&[(1.0, 1.0), (1.0, 1.0)]).point_at(0.0).is_none());
        assert!(walker(&[]).point_at(0.0).is_none());
        assert!(walker(&[(1.0, 1.0)]).start_angle().is_none());

        // Duplicate points in the middle don't break the direction.
        let walker = walker(&[(0.0, 0.0), (5.0, 0.0), (5.0, 0.0), (5.0, 5.0)]);
        let (_, angle) = walker.point_at(5.0).unwrap();
        assert!(angle.is_finite());
    }

    #[test]
    fn tolerance_offsets() {
        let offsets: Vec<f64> = ToleranceIterator::new(5.0, 2.0).collect();
        assert_eq!(offsets, vec![0.0, 2.0, -2.0, 4.0, -4.0]);
        assert_eq!(ToleranceIterator::new(0.0, 1.0).collect::<Vec<_>>(), vec![0.0]);
    }

    #[test]
    fn angle_normalization() {
        assert_abs_diff_eq!(angle_delta(0.1, 2.0 * PI - 0.1), -0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(angle_delta(-PI + 0.1, PI - 0.1), -0.2, epsilon = 1e-12);
    }
}
