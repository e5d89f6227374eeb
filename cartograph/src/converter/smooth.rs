use cartograph_types::Point2d;

use super::{PathOp, SubPath};

/// Smoothing of sub-paths. Every segment is replaced with a bezier curve, control points of which
/// are derived from the neighbouring segments. The curves are approximated with straight lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smooth {
    value: f64,
}

const MAX_STEP: f64 = 2.0;
const MAX_SUBDIVISIONS: usize = 32;

impl Smooth {
    /// Creates a new smoothing stage. The factor is clamped into `[0, 1]`.
    pub fn new(value: f64) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
        }
    }

    /// Smoothing factor.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Control points of the curve between `v1` and `v2`.
    fn control_points(
        &self,
        v0: Point2d,
        v1: Point2d,
        v2: Point2d,
        v3: Point2d,
    ) -> (Point2d, Point2d) {
        let d0 = (v1 - v0).norm();
        let d1 = (v2 - v1).norm();
        let d2 = (v3 - v2).norm();

        let k1 = ratio(d0, d1);
        let k2 = ratio(d1, d2);

        let m1 = v0 + (v2 - v0) * k1;
        let m2 = v1 + (v3 - v1) * k2;

        (v1 + (v2 - m1) * self.value, v2 + (v1 - m2) * self.value)
    }

    fn smooth(&self, path: &SubPath) -> Vec<Point2d> {
        let points = &path.points;
        let n = points.len();
        if n < 3 {
            return points.clone();
        }

        let at = |i: isize| -> Point2d {
            if path.closed {
                points[i.rem_euclid(n as isize) as usize]
            } else {
                points[i.clamp(0, n as isize - 1) as usize]
            }
        };

        let segments = if path.closed { n } else { n - 1 };
        let mut result = vec![points[0]];
        for i in 0..segments as isize {
            let (v0, v1, v2, v3) = (at(i - 1), at(i), at(i + 1), at(i + 2));
            let (c1, c2) = self.control_points(v0, v1, v2, v3);
            subdivide(v1, c1, c2, v2, &mut result);
        }

        if path.closed {
            // The last curve ends in the first point.
            result.pop();
        }

        result
    }
}

impl PathOp for Smooth {
    fn process(&mut self, path: SubPath, output: &mut Vec<SubPath>) {
        let points = self.smooth(&path);
        output.push(SubPath::new(points, path.closed));
    }
}

fn ratio(a: f64, b: f64) -> f64 {
    if a + b > 0.0 {
        a / (a + b)
    } else {
        0.5
    }
}

/// Adds points of the cubic curve excluding the start point.
fn subdivide(p0: Point2d, p1: Point2d, p2: Point2d, p3: Point2d, output: &mut Vec<Point2d>) {
    let length = (p1 - p0).norm() + (p2 - p1).norm() + (p3 - p2).norm();
    let steps = ((length / MAX_STEP).ceil() as usize).clamp(1, MAX_SUBDIVISIONS);
    for step in 1..steps {
        let t = step as f64 / steps as f64;
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        output.push(Point2d::new(
            a * p0.x + b * p1.x + c * p2.x + d * p3.x,
            a * p0.y + b * p1.y + c * p2.y + d * p3.y,
        ));
    }

    output.push(p3);
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn smoothed_line_keeps_end_points_and_passes_vertices() {
        let path = SubPath::new(
            vec![Point2d::new(0.0, 0.0), Point2d::new(10.0, 10.0), Point2d::new(20.0, 0.0)],
            false,
        );

        let mut output = vec![];
        Smooth::new(1.0).process(path.clone(), &mut output);
        let smoothed = &output[0].points;

        assert!(smoothed.len() > path.points.len());
        assert_eq!(smoothed.first(), path.points.first());
        assert_eq!(smoothed.last(), path.points.last());
        assert!(smoothed.contains(&Point2d::new(10.0, 10.0)));
    }

    #[test]
    fn collinear_points_stay_on_line() {
        let path = SubPath::new(
            vec![Point2d::new(0.0, 0.0), Point2d::new(10.0, 0.0), Point2d::new(20.0, 0.0)],
            false,
        );
        let mut output = vec![];
        Smooth::new(0.5).process(path, &mut output);
        for p in &output[0].points {
            assert_abs_diff_eq!(p.y, 0.0);
        }
    }

    #[test]
    fn closed_ring_stays_closed() {
        let ring = SubPath::new(
            vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(10.0, 0.0),
                Point2d::new(10.0, 10.0),
                Point2d::new(0.0, 10.0),
            ],
            true,
        );
        let mut output = vec![];
        Smooth::new(1.0).process(ring, &mut output);
        assert!(output[0].closed);
        assert_eq!(output[0].points[0], Point2d::new(0.0, 0.0));
        assert_ne!(output[0].points.last(), Some(&Point2d::new(0.0, 0.0)));
    }

    #[test]
    fn factor_is_clamped() {
        assert_abs_diff_eq!(Smooth::new(3.0).value(), 1.0);
        assert_abs_diff_eq!(Smooth::new(-1.0).value(), 0.0);
    }
}
