//! Decomposition of an extruded polygon into faces.

use cartograph_types::{Point2d, Vector2d};

use crate::converter::SubPath;

/// Faces of a pseudo 3D building.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuildingFaces {
    /// Wall quads `[base start, base end, top end, top start]`, one per ring edge, in drawing
    /// order: sorted by the base edge `y` ascending.
    pub walls: Vec<[Point2d; 4]>,
    /// Rings of the roof: the polygon rings moved by the height.
    pub roof: Vec<SubPath>,
    /// Outline: the base rings, the roof rings and a vertical segment at every vertex.
    pub frame: Vec<SubPath>,
}

impl BuildingFaces {
    /// Extrudes the polygon rings by `height` along the Y axis.
    ///
    /// Duplicate closing points of the rings are ignored.
    pub fn extrude(rings: &[SubPath], height: f64) -> Self {
        let shift = Vector2d::new(0.0, height);
        let mut faces = BuildingFaces::default();

        for ring in rings {
            let mut points = ring.points.clone();
            if points.len() > 1 && points.first() == points.last() {
                points.pop();
            }
            if points.len() < 2 {
                continue;
            }

            for (i, a) in points.iter().enumerate() {
                let b = points[(i + 1) % points.len()];
                if *a == b {
                    continue;
                }
                faces.walls.push([*a, b, b + shift, *a + shift]);
            }

            let top: Vec<Point2d> = points.iter().map(|p| p + shift).collect();
            faces.frame.push(SubPath::new(points.clone(), true));
            faces.frame.push(SubPath::new(top.clone(), true));
            faces
                .frame
                .extend(points.iter().map(|p| SubPath::new(vec![*p, p + shift], false)));
            faces.roof.push(SubPath::new(top, true));
        }

        faces
            .walls
            .sort_by(|a, b| base_y(a).total_cmp(&base_y(b)));
        faces
    }
}

fn base_y(wall: &[Point2d; 4]) -> f64 {
    (wall[0].y + wall[1].y) / 2.0
}
