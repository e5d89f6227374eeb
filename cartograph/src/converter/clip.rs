use cartograph_types::{Box2d, Point2d};

use super::{PathOp, SubPath};

/// Clipping of geometries to a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clip {
    /// Every sub-path is clipped as a closed ring. Output rings are always closed, rings that end
    /// up with less than 3 points are dropped.
    Polygon(Box2d),
    /// Sub-paths are clipped as lines. A line crossing the box several times is split into
    /// several sub-paths.
    Line(Box2d),
}

impl Clip {
    /// Clip box.
    pub fn bbox(&self) -> Box2d {
        match self {
            Clip::Polygon(bbox) | Clip::Line(bbox) => *bbox,
        }
    }
}

impl PathOp for Clip {
    fn process(&mut self, path: SubPath, output: &mut Vec<SubPath>) {
        let bbox = self.bbox();
        if !bbox.is_valid() {
            return;
        }

        if path.points.len() == 1 {
            let p = path.points[0];
            if bbox.contains_point(p.x, p.y) {
                output.push(path);
            }
            return;
        }

        match self {
            Clip::Polygon(_) if path.points.len() >= 3 => {
                let ring = clip_ring(&path.points, &bbox);
                if ring.len() >= 3 {
                    output.push(SubPath::new(ring, true));
                }
            }
            _ => clip_line(&path, &bbox, output),
        }
    }
}

#[derive(Copy, Clone)]
enum Edge {
    Left(f64),
    Right(f64),
    Bottom(f64),
    Top(f64),
}

impl Edge {
    fn inside(&self, p: &Point2d) -> bool {
        match *self {
            Edge::Left(x) => p.x >= x,
            Edge::Right(x) => p.x <= x,
            Edge::Bottom(y) => p.y >= y,
            Edge::Top(y) => p.y <= y,
        }
    }

    fn intersection(&self, a: &Point2d, b: &Point2d) -> Point2d {
        match *self {
            Edge::Left(x) | Edge::Right(x) => {
                let t = (x - a.x) / (b.x - a.x);
                Point2d::new(x, a.y + (b.y - a.y) * t)
            }
            Edge::Bottom(y) | Edge::Top(y) => {
                let t = (y - a.y) / (b.y - a.y);
                Point2d::new(a.x + (b.x - a.x) * t, y)
            }
        }
    }
}

/// Sutherland-Hodgman clipping of a ring against the four edges of the box.
fn clip_ring(ring: &[Point2d], bbox: &Box2d) -> Vec<Point2d> {
    let edges = [
        Edge::Left(bbox.min_x()),
        Edge::Right(bbox.max_x()),
        Edge::Bottom(bbox.min_y()),
        Edge::Top(bbox.max_y()),
    ];

    let mut input: Vec<Point2d> = ring.to_vec();
    if input.len() > 1 && input.first() == input.last() {
        input.pop();
    }

    let mut output = Vec::with_capacity(input.len() + 4);
    for edge in edges {
        output.clear();
        let Some(&last) = input.last() else {
            break;
        };

        let mut prev = last;
        for &curr in &input {
            match (edge.inside(&prev), edge.inside(&curr)) {
                (true, true) => output.push(curr),
                (true, false) => output.push(edge.intersection(&prev, &curr)),
                (false, true) => {
                    output.push(edge.intersection(&prev, &curr));
                    output.push(curr);
                }
                (false, false) => {}
            }
            prev = curr;
        }

        std::mem::swap(&mut input, &mut output);
    }

    input.dedup();
    if input.len() > 1 && input.first() == input.last() {
        input.pop();
    }

    input
}

/// Liang-Barsky clipping of one segment. Returns the parameters of the visible part.
fn clip_segment(a: &Point2d, b: &Point2d, bbox: &Box2d) -> Option<(f64, f64)> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let checks = [
        (-dx, a.x - bbox.min_x()),
        (dx, bbox.max_x() - a.x),
        (-dy, a.y - bbox.min_y()),
        (dy, bbox.max_y() - a.y),
    ];

    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }

        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some((t0, t1))
}

fn clip_line(path: &SubPath, bbox: &Box2d, output: &mut Vec<SubPath>) {
    if path.closed && bbox.contains(&Box2d::from_points(path.points.iter().map(|p| (p.x, p.y)))) {
        output.push(path.clone());
        return;
    }

    let line = path.to_line();
    let mut current: Vec<Point2d> = vec![];
    for segment in line.windows(2) {
        let (a, b) = (segment[0], segment[1]);
        let Some((t0, t1)) = clip_segment(&a, &b, bbox) else {
            if current.len() > 1 {
                output.push(SubPath::new(std::mem::take(&mut current), false));
            }
            current.clear();
            continue;
        };

        let start = if t0 > 0.0 { a + (b - a) * t0 } else { a };
        let end = if t1 < 1.0 { a + (b - a) * t1 } else { b };

        if current.last() != Some(&start) {
            if current.len() > 1 {
                output.push(SubPath::new(std::mem::take(&mut current), false));
            }
            current.clear();
            current.push(start);
        }
        current.push(end);

        if t1 < 1.0 {
            output.push(SubPath::new(std::mem::take(&mut current), false));
        }
    }

    if current.len() > 1 {
        output.push(SubPath::new(current, false));
    }
}
