use nalgebra::Point2;

use crate::geometry::CoordinateType;
use crate::orient::Orientation;

/// Signed area of a ring. Positive for counterclockwise rings in a Y-up coordinate system.
///
/// The ring may or may not repeat its first point at the end.
pub fn ring_area<T: CoordinateType>(ring: &[Point2<T>]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut prev = ring[ring.len() - 1];
    for p in ring {
        sum += prev.x.as_() * p.y.as_() - p.x.as_() * prev.y.as_();
        prev = *p;
    }

    sum / 2.0
}

/// Orientation of a ring by the sign of its area.
pub fn ring_orientation<T: CoordinateType>(ring: &[Point2<T>]) -> Orientation {
    let area = ring_area(ring);
    if area > 0.0 {
        Orientation::Counterclockwise
    } else if area < 0.0 {
        Orientation::Clockwise
    } else {
        Orientation::Collinear
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn area_and_orientation() {
        let ccw = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 2.0),
            Point2::new(0.0, 2.0),
        ];
        assert_abs_diff_eq!(ring_area(&ccw), 4.0);
        assert_eq!(ring_orientation(&ccw), Orientation::Counterclockwise);

        let mut cw = ccw.clone();
        cw.reverse();
        cw.push(cw[0]);
        assert_abs_diff_eq!(ring_area(&cw), -4.0);
        assert_eq!(ring_orientation(&cw), Orientation::Clockwise);

        assert_eq!(
            ring_orientation(&[Point2::new(0, 0), Point2::new(1, 1)]),
            Orientation::Collinear
        );
    }
}
