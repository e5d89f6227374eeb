use std::cmp::Ordering;
use std::collections::BinaryHeap;

use cartograph_types::segment::Segment;
use cartograph_types::Point2d;

use super::{PathOp, SubPath};
use crate::style::SimplifyAlgorithm;

/// Simplification of sub-paths. Tolerance is given in the units of the stream (pixels when the
/// stage follows the view transform).
///
/// The first and the last point of every sub-path are always kept. Closed rings keep at least
/// three points, or are left untouched if simplification would collapse them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simplify {
    /// Algorithm.
    pub algorithm: SimplifyAlgorithm,
    /// Tolerance.
    pub tolerance: f64,
}

impl Simplify {
    /// Creates a new simplification stage.
    pub fn new(algorithm: SimplifyAlgorithm, tolerance: f64) -> Self {
        Self {
            algorithm,
            tolerance,
        }
    }

    /// Simplifies a sequence of points.
    pub fn simplify(&self, points: &[Point2d]) -> Vec<Point2d> {
        if points.len() < 3 {
            return points.to_vec();
        }

        match self.algorithm {
            SimplifyAlgorithm::RadialDistance => radial_distance(points, self.tolerance),
            SimplifyAlgorithm::DouglasPeucker => douglas_peucker(points, self.tolerance),
            SimplifyAlgorithm::VisvalingamWhyatt => visvalingam_whyatt(points, self.tolerance),
        }
    }
}

impl PathOp for Simplify {
    fn process(&mut self, path: SubPath, output: &mut Vec<SubPath>) {
        let simplified = self.simplify(&path.points);
        if path.closed && simplified.len() < 3 {
            output.push(path);
        } else {
            output.push(SubPath::new(simplified, path.closed));
        }
    }
}

fn radial_distance(points: &[Point2d], tolerance: f64) -> Vec<Point2d> {
    let tolerance_sq = tolerance * tolerance;
    let last_index = points.len() - 1;
    let mut result = vec![points[0]];
    let mut last_kept = points[0];
    for p in &points[1..last_index] {
        if (p - last_kept).norm_squared() > tolerance_sq {
            result.push(*p);
            last_kept = *p;
        }
    }

    result.push(points[last_index]);
    result
}

fn douglas_peucker(points: &[Point2d], tolerance: f64) -> Vec<Point2d> {
    let tolerance_sq = tolerance * tolerance;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0, points.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let segment = Segment(points[start], points[end]);
        let (index, distance) = (start + 1..end)
            .map(|i| (i, segment.distance_to_point_sq(&points[i])))
            .fold((start, -1.0), |best, curr| if curr.1 > best.1 { curr } else { best });

        if distance > tolerance_sq {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, keep)| keep.then_some(*p))
        .collect()
}

fn triangle_area(a: &Point2d, b: &Point2d, c: &Point2d) -> f64 {
    ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() / 2.0
}

/// Vertex of a Visvalingam-Whyatt run, ordered so that `BinaryHeap` pops the smallest area first.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    area: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .area
            .total_cmp(&self.area)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Removes the vertex with the smallest effective area until all remaining ones have the area of
/// at least `tolerance^2`.
///
/// Remaining vertices are kept in a linked list and candidates in a min-heap. Heap entries whose
/// area no longer matches the vertex are stale and skipped.
fn visvalingam_whyatt(points: &[Point2d], tolerance: f64) -> Vec<Point2d> {
    let threshold = tolerance * tolerance;
    let last = points.len() - 1;
    let mut prev: Vec<usize> = (0..points.len()).map(|i| i.saturating_sub(1)).collect();
    let mut next: Vec<usize> = (0..points.len()).map(|i| (i + 1).min(last)).collect();
    let mut removed = vec![false; points.len()];
    let mut areas = vec![f64::INFINITY; points.len()];

    let mut heap = BinaryHeap::with_capacity(points.len());
    for index in 1..last {
        areas[index] = triangle_area(&points[index - 1], &points[index], &points[index + 1]);
        heap.push(Candidate {
            area: areas[index],
            index,
        });
    }

    while let Some(Candidate { area, index }) = heap.pop() {
        if removed[index] || area != areas[index] {
            continue;
        }

        if area >= threshold {
            break;
        }

        removed[index] = true;
        let (p, n) = (prev[index], next[index]);
        next[p] = n;
        prev[n] = p;

        for neighbour in [p, n] {
            if neighbour == 0 || neighbour == last {
                continue;
            }

            areas[neighbour] = triangle_area(
                &points[prev[neighbour]],
                &points[neighbour],
                &points[next[neighbour]],
            );
            heap.push(Candidate {
                area: areas[neighbour],
                index: neighbour,
            });
        }
    }

    points
        .iter()
        .zip(removed)
        .filter_map(|(p, removed)| (!removed).then_some(*p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag() -> Vec<Point2d> {
        (0..=20)
            .map(|i| Point2d::new(i as f64, if i % 2 == 0 { 0.0 } else { 0.2 }))
            .collect()
    }

    #[test]
    fn end_points_are_kept() {
        let line = zigzag();
        for algorithm in [
            SimplifyAlgorithm::RadialDistance,
            SimplifyAlgorithm::DouglasPeucker,
            SimplifyAlgorithm::VisvalingamWhyatt,
        ] {
            let simplified = Simplify::new(algorithm, 3.0).simplify(&line);
            assert!(simplified.len() < line.len(), "{algorithm}");
            assert_eq!(simplified.first(), line.first(), "{algorithm}");
            assert_eq!(simplified.last(), line.last(), "{algorithm}");
        }
    }

    #[test]
    fn douglas_peucker_keeps_significant_vertices() {
        // (5, 5.2) is 0.14 away from the (0, 0)-(10, 10) chord, (15, 0.1) is 3.46 away from the
        // (10, 10)-(20, 0) chord.
        let line = vec![
            Point2d::new(0.0, 0.0),
            Point2d::new(5.0, 5.2),
            Point2d::new(10.0, 10.0),
            Point2d::new(15.0, 0.1),
            Point2d::new(20.0, 0.0),
        ];

        let simplified = Simplify::new(SimplifyAlgorithm::DouglasPeucker, 1.0).simplify(&line);
        assert_eq!(
            simplified,
            vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(10.0, 10.0),
                Point2d::new(15.0, 0.1),
                Point2d::new(20.0, 0.0)
            ]
        );

        let simplified = Simplify::new(SimplifyAlgorithm::DouglasPeucker, 4.0).simplify(&line);
        assert_eq!(
            simplified,
            vec![Point2d::new(0.0, 0.0), Point2d::new(10.0, 10.0), Point2d::new(20.0, 0.0)]
        );
    }

    #[test]
    fn visvalingam_whyatt_recomputes_neighbour_areas() {
        let line = vec![
            Point2d::new(0.0, 0.0),
            Point2d::new(1.0, 0.1),
            Point2d::new(2.0, 0.0),
            Point2d::new(3.0, 5.0),
            Point2d::new(4.0, 0.0),
        ];

        let simplified = Simplify::new(SimplifyAlgorithm::VisvalingamWhyatt, 1.0).simplify(&line);
        assert_eq!(
            simplified,
            vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(2.0, 0.0),
                Point2d::new(3.0, 5.0),
                Point2d::new(4.0, 0.0)
            ]
        );

        let simplified = Simplify::new(SimplifyAlgorithm::VisvalingamWhyatt, 10.0).simplify(&line);
        assert_eq!(simplified, vec![Point2d::new(0.0, 0.0), Point2d::new(4.0, 0.0)]);
    }

    #[test]
    fn visvalingam_whyatt_on_long_lines() {
        let line: Vec<Point2d> = (0..100_000)
            .map(|i| Point2d::new(i as f64, if i % 2 == 0 { 0.0 } else { 0.1 }))
            .collect();
        // No triangle of this strip is larger than 100_000 * 0.1 / 2.
        let simplified = Simplify::new(SimplifyAlgorithm::VisvalingamWhyatt, 100.0).simplify(&line);
        assert_eq!(simplified, vec![line[0], line[99_999]]);
    }

    #[test]
    fn radial_distance_drops_close_points() {
        let line = vec![
            Point2d::new(0.0, 0.0),
            Point2d::new(0.5, 0.0),
            Point2d::new(3.0, 0.0),
            Point2d::new(3.1, 0.0),
        ];
        let simplified = Simplify::new(SimplifyAlgorithm::RadialDistance, 1.0).simplify(&line);
        assert_eq!(
            simplified,
            vec![Point2d::new(0.0, 0.0), Point2d::new(3.0, 0.0), Point2d::new(3.1, 0.0)]
        );
    }

    #[test]
    fn small_rings_are_not_collapsed() {
        let ring = SubPath::new(
            vec![Point2d::new(0.0, 0.0), Point2d::new(1.0, 0.0), Point2d::new(1.0, 1.0)],
            true,
        );
        let mut output = vec![];
        Simplify::new(SimplifyAlgorithm::DouglasPeucker, 10.0).process(ring.clone(), &mut output);
        assert_eq!(output, vec![ring]);
    }
}
