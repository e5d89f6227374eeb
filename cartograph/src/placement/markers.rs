use cartograph_types::{Box2d, Point2d};

use super::{place_box, PathWalker, PlacementGeometry, PlacementParams, ToleranceIterator};
use crate::label::LabelCollisionDetector;
use crate::style::LabelPlacement;

/// Accepted position of a marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPlacement {
    /// Position of the marker origin in pixels.
    pub position: Point2d,
    /// Rotation of the marker (radians). Markers along lines follow the line direction.
    pub angle: f64,
    /// Box registered in the collision detector.
    pub bbox: Box2d,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cursor {
    /// Index of the next point candidate.
    Points(usize),
    /// Index of the path and the next ideal position on it.
    Line { path: usize, position: Option<f64> },
    Exhausted,
}

/// Finds positions for markers of one feature.
///
/// Candidates are produced one by one with [`next`](Self::next). Once all candidates are consumed
/// the finder keeps returning `None` until [`rewind`](Self::rewind) is called.
#[derive(Debug, Clone)]
pub struct MarkersPlacementFinder {
    marker: Box2d,
    params: PlacementParams,
    points: Vec<(Point2d, f64)>,
    walkers: Vec<PathWalker>,
    cursor: Cursor,
}

impl MarkersPlacementFinder {
    /// Creates a finder.
    ///
    /// `marker` is the box of the marker relative to its origin, before rotation.
    pub fn new(geometry: &PlacementGeometry, marker: Box2d, params: PlacementParams) -> Self {
        let mut points = vec![];
        let mut walkers = vec![];
        match params.placement {
            LabelPlacement::Point | LabelPlacement::Interior => {
                points.extend(geometry.anchors.iter().map(|p| (*p, 0.0)));
            }
            LabelPlacement::Vertex => {
                points.extend(geometry.vertices().map(|p| (p, 0.0)));
                if points.is_empty() {
                    points.extend(geometry.anchors.iter().map(|p| (*p, 0.0)));
                }
            }
            LabelPlacement::VertexFirst => {
                if let Some(path) = geometry.paths.iter().find(|p| !p.points.is_empty()) {
                    let walker = PathWalker::new(path);
                    points.push((path.points[0], walker.start_angle().unwrap_or(0.0)));
                } else {
                    points.extend(geometry.anchors.first().map(|p| (*p, 0.0)));
                }
            }
            LabelPlacement::VertexLast => {
                if let Some(path) = geometry.paths.iter().rev().find(|p| !p.points.is_empty()) {
                    let line = path.to_line();
                    let walker = PathWalker::from_points(line.clone());
                    let last = line[line.len() - 1];
                    points.push((last, walker.end_angle().unwrap_or(0.0)));
                } else {
                    points.extend(geometry.anchors.last().map(|p| (*p, 0.0)));
                }
            }
            LabelPlacement::Line => {
                walkers.extend(geometry.paths.iter().map(PathWalker::new));
            }
        }

        let cursor = Self::initial_cursor(&params);
        Self {
            marker,
            params,
            points,
            walkers,
            cursor,
        }
    }

    fn initial_cursor(params: &PlacementParams) -> Cursor {
        match params.placement {
            LabelPlacement::Line => Cursor::Line {
                path: 0,
                position: None,
            },
            _ => Cursor::Points(0),
        }
    }

    /// Placement parameters.
    pub fn params(&self) -> &PlacementParams {
        &self.params
    }

    /// Restarts the search from the first candidate.
    pub fn rewind(&mut self) {
        self.cursor = Self::initial_cursor(&self.params);
    }

    /// Finds the next accepted placement and registers it in the detector (unless
    /// `ignore_placement` is set). Returns `None` when there are no more candidates.
    pub fn next(&mut self, detector: &mut LabelCollisionDetector) -> Option<MarkerPlacement> {
        loop {
            match self.cursor {
                Cursor::Exhausted => return None,
                Cursor::Points(index) => {
                    let Some((position, angle)) = self.points.get(index).copied() else {
                        self.cursor = Cursor::Exhausted;
                        continue;
                    };

                    self.cursor = Cursor::Points(index + 1);
                    let bbox = place_box(&self.marker, position, angle);
                    if self.try_accept(bbox, detector) {
                        return Some(MarkerPlacement {
                            position,
                            angle,
                            bbox,
                        });
                    }
                }
                Cursor::Line { path, position } => {
                    if path >= self.walkers.len() {
                        self.cursor = Cursor::Exhausted;
                        continue;
                    }

                    let spacing = self.params.effective_spacing();
                    let position = position.unwrap_or(if self.params.spacing_offset > 0.0 {
                        self.params.spacing_offset
                    } else {
                        spacing / 2.0
                    });

                    let half = self.marker.width().max(0.0) / 2.0;
                    let length = self.walkers[path].length();
                    if length <= 0.0 || position + half > length {
                        self.cursor = Cursor::Line {
                            path: path + 1,
                            position: None,
                        };
                        continue;
                    }

                    self.cursor = Cursor::Line {
                        path,
                        position: Some(position + spacing),
                    };

                    if let Some(placement) = self.place_on_line(path, position, half, detector) {
                        return Some(placement);
                    }
                }
            }
        }
    }

    /// Tries the positions around `position` not further than `max_error * spacing`.
    fn place_on_line(
        &self,
        path: usize,
        position: f64,
        half: f64,
        detector: &mut LabelCollisionDetector,
    ) -> Option<MarkerPlacement> {
        let walker = &self.walkers[path];
        let tolerance = self.params.max_error.max(0.0) * self.params.effective_spacing();
        let step = (tolerance / 4.0).max(1.0);

        for offset in ToleranceIterator::new(tolerance, step) {
            let distance = position + offset;
            if distance - half < 0.0 || distance + half > walker.length() {
                continue;
            }

            let Some((point, angle)) = walker.point_at(distance) else {
                continue;
            };

            let bbox = place_box(&self.marker, point, angle);
            if self.try_accept(bbox, detector) {
                return Some(MarkerPlacement {
                    position: point,
                    angle,
                    bbox,
                });
            }
        }

        log::trace!("No free place for a marker at {position} of path {path}");
        None
    }

    fn try_accept(&self, bbox: Box2d, detector: &mut LabelCollisionDetector) -> bool {
        if !self.params.fits_extent(&bbox, &detector.extent()) {
            return false;
        }

        if !self.params.allow_overlap
            && !detector.has_placement_with_margin(&bbox, self.params.margin)
        {
            return false;
        }

        if !self.params.ignore_placement {
            detector.insert(bbox);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::converter::SubPath;

    fn empty_detector() -> LabelCollisionDetector {
        LabelCollisionDetector::new(Box2d::new(0.0, 0.0, 256.0, 256.0))
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

    fn params(placement: LabelPlacement) -> PlacementParams {
        PlacementParams {
            placement,
            ..Default::default()
        }
    }

    fn collect(finder: &mut MarkersPlacementFinder, detector: &mut LabelCollisionDetector) -> Vec<MarkerPlacement> {
        std::iter::from_fn(|| finder.next(detector)).collect()
    }

    #[test]
    fn point_placement() {
        let geometry = PlacementGeometry {
            anchors: vec![Point2d::new(10.0, 10.0)],
            paths: vec![],
        };
        let mut detector = empty_detector();
        let mut finder = MarkersPlacementFinder::new(
            &geometry,
            Box2d::new(-2.0, -2.0, 2.0, 2.0),
            params(LabelPlacement::Point),
        );

        let placement = finder.next(&mut detector).unwrap();
        assert_eq!(placement.bbox, Box2d::new(8.0, 8.0, 12.0, 12.0));
        assert!(!detector.has_placement(&Box2d::new(11.0, 11.0, 20.0, 20.0)));
        assert!(detector.has_placement(&Box2d::new(12.0, 12.0, 20.0, 20.0)));

        assert!(finder.next(&mut detector).is_none());
        assert!(finder.next(&mut detector).is_none());

        // The same place is taken now.
        finder.rewind();
        assert!(finder.next(&mut detector).is_none());
    }

    #[test]
    fn line_spacing() {
        let geometry = line(&[(0.0, 0.0), (100.0, 0.0)]);
        let params = PlacementParams {
            spacing: 25.0,
            ..params(LabelPlacement::Line)
        };
        let mut finder = MarkersPlacementFinder::new(&geometry, Box2d::new(0.0, 0.0, 0.0, 0.0), params);

        let mut detector = empty_detector();
        let placements = collect(&mut finder, &mut detector);
        let xs: Vec<f64> = placements.iter().map(|p| p.position.x).collect();
        assert_eq!(xs, vec![12.5, 37.5, 62.5, 87.5]);
        assert!(placements.iter().all(|p| p.position.y == 0.0));

        assert!(finder.next(&mut detector).is_none());

        finder.rewind();
        let again = collect(&mut finder, &mut empty_detector());
        assert_eq!(again, placements);
    }

    #[test]
    fn spacing_offset_and_small_spacing() {
        let geometry = line(&[(0.0, 0.0), (256.0, 0.0)]);
        let offset = PlacementParams {
            spacing: 100.0,
            spacing_offset: 10.0,
            ..params(LabelPlacement::Line)
        };
        let mut finder = MarkersPlacementFinder::new(&geometry, Box2d::new(-1.0, -1.0, 1.0, 1.0), offset);
        let xs: Vec<f64> = collect(&mut finder, &mut empty_detector())
            .iter()
            .map(|p| p.position.x)
            .collect();
        assert_eq!(xs, vec![10.0, 110.0, 210.0]);

        let tiny = PlacementParams {
            spacing: 0.0,
            ..params(LabelPlacement::Line)
        };
        let mut finder = MarkersPlacementFinder::new(&geometry, Box2d::new(-1.0, -1.0, 1.0, 1.0), tiny);
        assert_eq!(collect(&mut finder, &mut empty_detector()).len(), 3);
    }

    #[test]
    fn collisions_move_markers_within_error() {
        let geometry = line(&[(0.0, 50.0), (100.0, 50.0)]);
        let mut detector = empty_detector();
        // Occupies the ideal position of the first marker.
        detector.insert(Box2d::new(45.0, 40.0, 50.0, 60.0));

        let tolerant = PlacementParams {
            spacing: 100.0,
            max_error: 0.2,
            ..params(LabelPlacement::Line)
        };
        let mut finder = MarkersPlacementFinder::new(&geometry, Box2d::new(-2.0, -2.0, 2.0, 2.0), tolerant);
        let placement = finder.next(&mut detector).unwrap();
        assert_abs_diff_eq!(placement.position.x, 55.0, epsilon = 1e-9);

        let strict = PlacementParams {
            spacing: 100.0,
            max_error: 0.0,
            ..params(LabelPlacement::Line)
        };
        let mut finder = MarkersPlacementFinder::new(&geometry, Box2d::new(-2.0, -2.0, 2.0, 2.0), strict);
        assert!(finder.next(&mut detector).is_none());
    }

    #[test]
    fn vertex_placements() {
        let geometry = line(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let marker = Box2d::new(-1.0, -1.0, 1.0, 1.0);

        let mut first = MarkersPlacementFinder::new(&geometry, marker, params(LabelPlacement::VertexFirst));
        let placements = collect(&mut first, &mut empty_detector());
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].position, Point2d::new(0.0, 0.0));
        assert_abs_diff_eq!(placements[0].angle, 0.0);

        let mut last = MarkersPlacementFinder::new(&geometry, marker, params(LabelPlacement::VertexLast));
        let placements = collect(&mut last, &mut empty_detector());
        assert_eq!(placements[0].position, Point2d::new(10.0, 10.0));
        assert_abs_diff_eq!(placements[0].angle, FRAC_PI_2);

        let mut all = MarkersPlacementFinder::new(&geometry, marker, params(LabelPlacement::Vertex));
        assert_eq!(collect(&mut all, &mut empty_detector()).len(), 3);
    }

    #[test]
    fn edges_and_overlap_flags() {
        let geometry = PlacementGeometry {
            anchors: vec![Point2d::new(1.0, 1.0)],
            paths: vec![],
        };
        let marker = Box2d::new(-2.0, -2.0, 2.0, 2.0);

        let avoid = PlacementParams {
            avoid_edges: true,
            ..params(LabelPlacement::Point)
        };
        let mut finder = MarkersPlacementFinder::new(&geometry, marker, avoid);
        assert!(finder.next(&mut empty_detector()).is_none());

        let mut detector = empty_detector();
        detector.insert(Box2d::new(0.0, 0.0, 5.0, 5.0));
        let overlap = PlacementParams {
            allow_overlap: true,
            ignore_placement: true,
            ..params(LabelPlacement::Point)
        };
        let mut finder = MarkersPlacementFinder::new(&geometry, marker, overlap);
        assert!(finder.next(&mut detector).is_some());
        assert_eq!(detector.len(), 1);
    }

    #[test]
    fn zero_length_path() {
        let geometry = line(&[(5.0, 5.0), (5.0, 5.0)]);
        let mut finder =
            MarkersPlacementFinder::new(&geometry, Box2d::new(0.0, 0.0, 0.0, 0.0), params(LabelPlacement::Line));
        assert!(finder.next(&mut empty_detector()).is_none());
    }
}
