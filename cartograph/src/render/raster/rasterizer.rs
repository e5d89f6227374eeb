use cartograph_types::{Command, Point2d, Vertex};
use lyon::path::iterator::PathIterator;
use lyon::path::{Event, Path};
use nalgebra::Matrix3;

use crate::converter::SubPath;

/// Which parts of a self intersecting path are inside.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FillRule {
    /// Areas with non-zero winding number are filled.
    #[default]
    NonZero,
    /// Areas crossed an odd number of times are filled.
    EvenOdd,
}

#[derive(Debug, Copy, Clone)]
struct Cell {
    x: i32,
    y: i32,
    cover: f32,
    area: f32,
}

/// Scanline rasterizer with exact area coverage antialiasing.
///
/// Edges are accumulated into cells (one per touched pixel). Every cell stores the signed height
/// of the edges crossing it (`cover`) and the part of that height lying left of the edges
/// (`area`). Sweeping the sorted cells of a row gives the coverage of every pixel.
///
/// Everything above, below and right of the image is dropped at insertion. Edges left of the
/// image keep their cover, so winding numbers of visible pixels stay correct.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    width: u32,
    height: u32,
    fill_rule: FillRule,
    cells: Vec<Cell>,
    start: Option<Point2d>,
    current: Option<Point2d>,
}

impl Rasterizer {
    /// Creates a rasterizer for an image of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fill_rule: FillRule::NonZero,
            cells: vec![],
            start: None,
            current: None,
        }
    }

    /// Width of the target image.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the target image.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Removes all accumulated edges. The fill rule is reset to [`FillRule::NonZero`].
    pub fn reset(&mut self) {
        self.cells.clear();
        self.start = None;
        self.current = None;
        self.fill_rule = FillRule::NonZero;
    }

    /// Sets the fill rule.
    pub fn set_fill_rule(&mut self, fill_rule: FillRule) {
        self.fill_rule = fill_rule;
    }

    /// Fill rule.
    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    /// Returns true if nothing was added since the last reset.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Starts a new contour, closing the previous one.
    pub fn move_to(&mut self, point: Point2d) {
        self.close();
        self.start = Some(point);
        self.current = Some(point);
    }

    /// Adds an edge from the current point.
    pub fn line_to(&mut self, point: Point2d) {
        match self.current {
            Some(current) => {
                self.add_edge(current, point);
                self.current = Some(point);
            }
            None => self.move_to(point),
        }
    }

    /// Closes the current contour with an edge to its first point.
    ///
    /// Filled contours are always closed, so calling this is only needed to separate contours.
    pub fn close(&mut self) {
        if let (Some(start), Some(current)) = (self.start, self.current) {
            self.add_edge(current, start);
        }
        self.current = self.start;
    }

    /// Adds a vertex stream.
    pub fn add_vertices(&mut self, vertices: impl IntoIterator<Item = Vertex>) {
        for vertex in vertices {
            match vertex.cmd {
                Command::MoveTo => self.move_to(vertex.point()),
                Command::LineTo => self.line_to(vertex.point()),
                Command::Close => self.close(),
            }
        }
        self.close();
    }

    /// Adds collected sub-paths. Open paths are filled as if closed.
    pub fn add_sub_paths<'a>(&mut self, paths: impl IntoIterator<Item = &'a SubPath>) {
        for path in paths {
            let mut points = path.points.iter();
            if let Some(first) = points.next() {
                self.move_to(*first);
                for p in points {
                    self.line_to(*p);
                }
            }
        }
        self.close();
    }

    /// Adds a lyon path transformed by the matrix. Curves are flattened with the given tolerance.
    pub fn add_path(&mut self, path: &Path, transform: &Matrix3<f64>, tolerance: f32) {
        let apply = |p: lyon::math::Point| {
            let v = transform * nalgebra::Vector3::new(p.x as f64, p.y as f64, 1.0);
            Point2d::new(v.x, v.y)
        };

        for event in path.iter().flattened(tolerance) {
            match event {
                Event::Begin { at } => self.move_to(apply(at)),
                Event::Line { to, .. } => self.line_to(apply(to)),
                Event::End { .. } => self.close(),
                Event::Quadratic { to, .. } | Event::Cubic { to, .. } => self.line_to(apply(to)),
            }
        }
        self.close();
    }

    /// Adds a triangle. The triangle is oriented so that overlapping triangles added with the
    /// non-zero fill rule merge without seams.
    pub fn add_triangle(&mut self, a: Point2d, b: Point2d, c: Point2d) {
        let cross = (b - a).perp(&(c - a));
        let (b, c) = if cross < 0.0 { (c, b) } else { (b, c) };
        self.move_to(a);
        self.line_to(b);
        self.line_to(c);
        self.close();
    }

    fn add_edge(&mut self, from: Point2d, to: Point2d) {
        if from.y == to.y || !(from.x.is_finite() && from.y.is_finite()) {
            return;
        }
        if !(to.x.is_finite() && to.y.is_finite()) {
            return;
        }

        let y_min = from.y.min(to.y).max(0.0);
        let y_max = from.y.max(to.y).min(self.height as f64);
        if y_min >= y_max {
            return;
        }

        let dir = if to.y > from.y { 1.0 } else { -1.0 };
        let slope = (to.x - from.x) / (to.y - from.y);
        let x_at = |y: f64| from.x + (y - from.y) * slope;

        let mut row = y_min.floor() as i32;
        while (row as f64) < y_max {
            let top = (row as f64).max(y_min);
            let bottom = (row as f64 + 1.0).min(y_max);
            if bottom > top {
                let (x_top, x_bottom) = (x_at(top), x_at(bottom));
                let dy = (bottom - top) * dir;
                if dir > 0.0 {
                    self.add_row_segment(row, x_top, x_bottom, dy);
                } else {
                    self.add_row_segment(row, x_bottom, x_top, dy);
                }
            }
            row += 1;
        }
    }

    /// Adds a part of an edge within one row. `dy` is the signed height of the part.
    fn add_row_segment(&mut self, y: i32, x0: f64, x1: f64, dy: f64) {
        let width = self.width as f64;
        let lo = x0.min(x1);
        let hi = x0.max(x1);

        if hi - lo < 1e-12 {
            let cx = lo.floor();
            if cx < 0.0 {
                self.push_cell(-1, y, dy, 0.0);
            } else if cx < width {
                self.push_cell(cx as i32, y, dy, dy * (lo - cx));
            }
            return;
        }

        let share = |u: f64, v: f64| dy * (v - u) / (hi - lo);

        if lo < 0.0 {
            self.push_cell(-1, y, share(lo, hi.min(0.0)), 0.0);
        }

        let end = hi.min(width);
        let mut u = lo.max(0.0);
        while u < end {
            let cx = u.floor();
            let v = (cx + 1.0).min(end);
            let piece = share(u, v);
            self.push_cell(cx as i32, y, piece, piece * ((u + v) / 2.0 - cx));
            u = v;
        }
    }

    fn push_cell(&mut self, x: i32, y: i32, cover: f64, area: f64) {
        self.cells.push(Cell {
            x,
            y,
            cover: cover as f32,
            area: area as f32,
        });
    }

    fn coverage(&self, winding: f32) -> f32 {
        match self.fill_rule {
            FillRule::NonZero => winding.abs().min(1.0),
            FillRule::EvenOdd => {
                let folded = winding.abs() % 2.0;
                if folded > 1.0 {
                    2.0 - folded
                } else {
                    folded
                }
            }
        }
    }

    /// Calls `span(y, x, len, coverage)` for every run of pixels with the same non-zero coverage.
    /// Coverage is in `[0, 1]`. Accumulated edges are consumed.
    pub fn sweep(&mut self, mut span: impl FnMut(u32, u32, u32, f32)) {
        let mut cells = std::mem::take(&mut self.cells);
        self.start = None;
        self.current = None;
        cells.sort_unstable_by_key(|c| (c.y, c.x));

        let width = self.width as i32;
        let mut index = 0;
        while index < cells.len() {
            let y = cells[index].y;
            let mut winding = 0.0f32;
            let mut next_x = 0;

            while index < cells.len() && cells[index].y == y {
                let x = cells[index].x;
                let mut cover = 0.0;
                let mut area = 0.0;
                while index < cells.len() && cells[index].y == y && cells[index].x == x {
                    cover += cells[index].cover;
                    area += cells[index].area;
                    index += 1;
                }

                if x < 0 {
                    winding += cover;
                    continue;
                }

                if x > next_x {
                    let c = self.coverage(winding);
                    if c > 0.0 {
                        span(y as u32, next_x as u32, (x - next_x) as u32, c);
                    }
                }

                let c = self.coverage(winding + cover - area);
                if c > 0.0 {
                    span(y as u32, x as u32, 1, c);
                }
                winding += cover;
                next_x = x + 1;
            }

            if next_x < width {
                let c = self.coverage(winding);
                if c > 1e-6 {
                    span(y as u32, next_x as u32, (width - next_x) as u32, c);
                }
            }
        }
    }

    /// Sweeps the edges into a coverage mask of the whole image.
    pub fn mask(&mut self) -> Mask {
        let mut mask = Mask::new(self.width, self.height);
        self.sweep(|y, x, len, c| {
            let start = (y * mask.width + x) as usize;
            for value in &mut mask.data[start..start + len as usize] {
                *value = c;
            }
        });
        mask
    }
}

/// Coverage values of an image area.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Mask {
    /// Empty mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    /// Coverage of the pixel, `0` outside of the mask.
    pub fn get(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0.0;
        }
        self.data[(y as usize) * self.width as usize + x as usize]
    }

    /// Grows covered areas by `radius` pixels: every pixel takes the maximum coverage within the
    /// square of the radius around it.
    pub fn dilate(&self, radius: u32) -> Mask {
        if radius == 0 {
            return self.clone();
        }

        let r = radius as i64;
        let mut horizontal = Mask::new(self.width, self.height);
        for y in 0..self.height as i64 {
            for x in 0..self.width as i64 {
                let value = (-r..=r).map(|d| self.get(x + d, y)).fold(0.0, f32::max);
                horizontal.data[(y * self.width as i64 + x) as usize] = value;
            }
        }

        let mut result = Mask::new(self.width, self.height);
        for y in 0..self.height as i64 {
            for x in 0..self.width as i64 {
                let value = (-r..=r)
                    .map(|d| horizontal.get(x, y + d))
                    .fold(0.0, f32::max);
                result.data[(y * self.width as i64 + x) as usize] = value;
            }
        }

        result
    }

    /// Calls `span(y, x, len, coverage)` for every run of covered pixels.
    pub fn spans(&self, mut span: impl FnMut(u32, u32, u32, f32)) {
        for y in 0..self.height {
            let row = &self.data[(y * self.width) as usize..((y + 1) * self.width) as usize];
            let mut x = 0;
            while x < row.len() {
                let c = row[x];
                let start = x;
                while x < row.len() && row[x] == c {
                    x += 1;
                }
                if c > 0.0 {
                    span(y, start as u32, (x - start) as u32, c);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn render(rasterizer: &mut Rasterizer) -> Vec<f32> {
        let mut pixels = vec![0.0; (rasterizer.width() * rasterizer.height()) as usize];
        let width = rasterizer.width();
        rasterizer.sweep(|y, x, len, c| {
            for i in x..x + len {
                pixels[(y * width + i) as usize] = c;
            }
        });
        pixels
    }

    fn rect(rasterizer: &mut Rasterizer, x0: f64, y0: f64, x1: f64, y1: f64) {
        rasterizer.move_to(Point2d::new(x0, y0));
        rasterizer.line_to(Point2d::new(x1, y0));
        rasterizer.line_to(Point2d::new(x1, y1));
        rasterizer.line_to(Point2d::new(x0, y1));
        rasterizer.close();
    }

    #[test]
    fn pixel_aligned_square() {
        let mut rasterizer = Rasterizer::new(4, 4);
        rect(&mut rasterizer, 1.0, 1.0, 3.0, 3.0);
        let pixels = render(&mut rasterizer);

        #[rustfmt::skip]
        let expected = vec![
            0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 1.0, 0.0,
            0.0, 1.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0,
        ];
        assert_eq!(pixels, expected);
        assert!(rasterizer.is_empty());
    }

    #[test]
    fn partial_coverage() {
        let mut rasterizer = Rasterizer::new(3, 1);
        rect(&mut rasterizer, 0.5, 0.0, 2.25, 1.0);
        let pixels = render(&mut rasterizer);
        assert_abs_diff_eq!(pixels[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(pixels[1], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pixels[2], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn diagonal_edge_covers_half() {
        let mut rasterizer = Rasterizer::new(1, 1);
        rasterizer.move_to(Point2d::new(0.0, 0.0));
        rasterizer.line_to(Point2d::new(1.0, 1.0));
        rasterizer.line_to(Point2d::new(0.0, 1.0));
        rasterizer.close();
        let pixels = render(&mut rasterizer);
        assert_abs_diff_eq!(pixels[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn shapes_outside_are_clipped() {
        let mut rasterizer = Rasterizer::new(4, 2);
        rect(&mut rasterizer, -100.0, -5.0, 2.0, 50.0);
        let pixels = render(&mut rasterizer);
        assert_eq!(pixels, vec![1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);

        rect(&mut rasterizer, 1.0, 0.0, 1000.0, 1.0);
        let pixels = render(&mut rasterizer);
        assert_eq!(pixels, vec![0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn fill_rules() {
        let mut rasterizer = Rasterizer::new(5, 1);
        rect(&mut rasterizer, 0.0, 0.0, 5.0, 1.0);
        rect(&mut rasterizer, 1.0, 0.0, 4.0, 1.0);
        let pixels = render(&mut rasterizer);
        assert_eq!(pixels, vec![1.0; 5]);

        rasterizer.set_fill_rule(FillRule::EvenOdd);
        rect(&mut rasterizer, 0.0, 0.0, 5.0, 1.0);
        rect(&mut rasterizer, 1.0, 0.0, 4.0, 1.0);
        let pixels = render(&mut rasterizer);
        assert_eq!(pixels, vec![1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn overlapping_triangles_have_no_seams() {
        let mut rasterizer = Rasterizer::new(2, 2);
        let (a, b, c, d) = (
            Point2d::new(0.0, 0.0),
            Point2d::new(2.0, 0.0),
            Point2d::new(2.0, 2.0),
            Point2d::new(0.0, 2.0),
        );
        rasterizer.add_triangle(a, b, c);
        rasterizer.add_triangle(a, d, c);
        let pixels = render(&mut rasterizer);
        for p in pixels {
            assert_abs_diff_eq!(p, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn dilated_mask() {
        let mut rasterizer = Rasterizer::new(5, 5);
        rect(&mut rasterizer, 2.0, 2.0, 3.0, 3.0);
        let mask = rasterizer.mask();
        assert_eq!(mask.get(2, 2), 1.0);
        assert_eq!(mask.get(1, 1), 0.0);

        let dilated = mask.dilate(1);
        assert_eq!(dilated.get(1, 1), 1.0);
        assert_eq!(dilated.get(3, 3), 1.0);
        assert_eq!(dilated.get(0, 0), 0.0);

        let mut count = 0;
        dilated.spans(|_, _, len, _| count += len);
        assert_eq!(count, 9);
    }
}
