use std::fmt::Write;

use cartograph_types::{Command, Vertex};

/// Writes a vertex stream as SVG path data (the `d` attribute).
#[derive(Debug, Default, Clone)]
pub struct PathGenerator {
    data: String,
}

impl PathGenerator {
    /// Creates an empty generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends vertices to the path data.
    pub fn add_path(&mut self, vertices: impl IntoIterator<Item = Vertex>) {
        for vertex in vertices {
            if !self.data.is_empty() {
                self.data.push(' ');
            }

            // Writing into a string never fails.
            let _ = match vertex.cmd {
                Command::MoveTo => write!(self.data, "M{} {}", coord(vertex.x), coord(vertex.y)),
                Command::LineTo => write!(self.data, "L{} {}", coord(vertex.x), coord(vertex.y)),
                Command::Close => write!(self.data, "Z"),
            };
        }
    }

    /// Returns true if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Path data.
    pub fn finish(self) -> String {
        self.data
    }
}

fn coord(v: f64) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    if rounded == 0.0 {
        // No negative zero.
        return "0".to_string();
    }

    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_data() {
        let mut generator = PathGenerator::new();
        generator.add_path([
            Vertex::move_to(0.0, 0.0),
            Vertex::line_to(10.5, -0.001),
            Vertex::line_to(1.0 / 3.0, 20.0),
            Vertex::close(0.0, 0.0),
        ]);
        assert_eq!(generator.finish(), "M0 0 L10.5 0 L0.33 20 Z");
    }
}
