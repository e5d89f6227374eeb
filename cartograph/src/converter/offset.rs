use cartograph_types::{Point2d, Vector2d};

use super::SubPath;

/// Miter is replaced with two points when the angle between the segments is sharper than this.
const MIN_MITER_COS: f64 = -0.8;

/// Moves the path by `offset` pixels perpendicular to its direction. Positive offset moves the path
/// to the left of its direction as it is seen on the screen (Y axis down).
pub fn offset_path(path: &SubPath, offset: f64) -> SubPath {
    if offset == 0.0 {
        return path.clone();
    }

    let mut points = path.points.clone();
    points.dedup();
    if points.len() < 2 {
        return SubPath::new(points, path.closed);
    }

    let normal = |a: &Point2d, b: &Point2d| -> Vector2d {
        let d = (b - a).normalize();
        Vector2d::new(d.y, -d.x)
    };

    let n = points.len();
    let segment_count = if path.closed { n } else { n - 1 };
    let normals: Vec<Vector2d> = (0..segment_count)
        .map(|i| normal(&points[i], &points[(i + 1) % n]))
        .collect();

    let mut result = Vec::with_capacity(n);
    for (i, point) in points.iter().enumerate() {
        let prev = if i > 0 {
            Some(normals[i - 1])
        } else if path.closed {
            normals.last().copied()
        } else {
            None
        };
        let next = normals.get(i).copied();

        match (prev, next) {
            (Some(n1), Some(n2)) => {
                let cos = n1.dot(&n2);
                if cos < MIN_MITER_COS {
                    result.push(point + n1 * offset);
                    result.push(point + n2 * offset);
                } else {
                    let miter = (n1 + n2) / (1.0 + cos);
                    result.push(point + miter * offset);
                }
            }
            (Some(n), None) | (None, Some(n)) => result.push(point + n * offset),
            (None, None) => result.push(*point),
        }
    }

    SubPath::new(result, path.closed)
}
