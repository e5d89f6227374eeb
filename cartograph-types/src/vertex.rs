use crate::Point2d;

/// Path command attached to every vertex of a path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Starts a new sub-path at the vertex.
    MoveTo,
    /// Continues current sub-path with a straight segment to the vertex.
    LineTo,
    /// Closes current sub-path. The vertex of a close command carries the coordinates of the first
    /// vertex of the sub-path, so consumers that ignore commands still see a closed ring.
    Close,
}

/// A point of a path together with the command of how to get to it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Vertex {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Path command.
    pub cmd: Command,
}

impl Vertex {
    /// Creates a new vertex.
    pub fn new(x: f64, y: f64, cmd: Command) -> Self {
        Self { x, y, cmd }
    }

    /// Vertex with [`Command::MoveTo`].
    pub fn move_to(x: f64, y: f64) -> Self {
        Self::new(x, y, Command::MoveTo)
    }

    /// Vertex with [`Command::LineTo`].
    pub fn line_to(x: f64, y: f64) -> Self {
        Self::new(x, y, Command::LineTo)
    }

    /// Vertex with [`Command::Close`].
    pub fn close(x: f64, y: f64) -> Self {
        Self::new(x, y, Command::Close)
    }

    /// Coordinates of the vertex.
    pub fn point(&self) -> Point2d {
        Point2d::new(self.x, self.y)
    }

    /// Same vertex with different coordinates.
    pub fn with_point(&self, point: Point2d) -> Self {
        Self::new(point.x, point.y, self.cmd)
    }
}

/// Helpers for iterators over path vertices.
pub trait VertexPath: Iterator<Item = Vertex> + Sized {
    /// Splits the vertex stream into sub-paths. Each sub-path is a list of points, and a flag
    /// whether it was closed.
    ///
    /// The closing vertex is not repeated in the returned points.
    fn sub_paths(self) -> Vec<(Vec<Point2d>, bool)> {
        let mut result: Vec<(Vec<Point2d>, bool)> = vec![];
        for vertex in self {
            match vertex.cmd {
                Command::MoveTo => result.push((vec![vertex.point()], false)),
                Command::LineTo => match result.last_mut() {
                    Some((points, false)) => points.push(vertex.point()),
                    _ => result.push((vec![vertex.point()], false)),
                },
                Command::Close => {
                    if let Some((_, closed)) = result.last_mut() {
                        *closed = true;
                    }
                }
            }
        }

        result
    }
}

impl<I: Iterator<Item = Vertex>> VertexPath for I {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_into_sub_paths() {
        let path = vec![
            Vertex::move_to(0.0, 0.0),
            Vertex::line_to(1.0, 0.0),
            Vertex::line_to(1.0, 1.0),
            Vertex::close(0.0, 0.0),
            Vertex::move_to(5.0, 5.0),
            Vertex::line_to(6.0, 6.0),
        ];

        let parts = path.into_iter().sub_paths();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0.len(), 3);
        assert!(parts[0].1);
        assert_eq!(parts[1].0, vec![Point2d::new(5.0, 5.0), Point2d::new(6.0, 6.0)]);
        assert!(!parts[1].1);
    }
}
