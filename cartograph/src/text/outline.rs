use lyon::path::path::Builder;
use lyon::path::Path;
use rustybuzz::ttf_parser::OutlineBuilder;

/// Collects a glyph outline into a `lyon` path. Font units are scaled into pixels and the Y axis
/// is flipped to point down.
pub(super) struct GlyphPathBuilder {
    builder: Builder,
    scale: f32,
    open: bool,
}

impl GlyphPathBuilder {
    pub(super) fn new(scale: f32) -> Self {
        Self {
            builder: Path::builder(),
            scale,
            open: false,
        }
    }

    fn point(&self, x: f32, y: f32) -> lyon::geom::Point<f32> {
        lyon::geom::point(x * self.scale, -y * self.scale)
    }

    pub(super) fn build(mut self) -> Path {
        if self.open {
            self.builder.end(true);
        }

        self.builder.build()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        if self.open {
            self.builder.end(true);
        }

        let p = self.point(x, y);
        self.builder.begin(p);
        self.open = true;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = self.point(x, y);
        self.builder.line_to(p);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let ctrl = self.point(x1, y1);
        let to = self.point(x, y);
        self.builder.quadratic_bezier_to(ctrl, to);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let ctrl1 = self.point(x1, y1);
        let ctrl2 = self.point(x2, y2);
        let to = self.point(x, y);
        self.builder.cubic_bezier_to(ctrl1, ctrl2, to);
    }

    fn close(&mut self) {
        if self.open {
            self.builder.end(true);
            self.open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_is_flipped_and_scaled() {
        let mut builder = GlyphPathBuilder::new(0.5);
        builder.move_to(0.0, 0.0);
        builder.line_to(10.0, 0.0);
        builder.line_to(10.0, 20.0);
        builder.close();
        builder.move_to(0.0, 0.0);
        builder.line_to(2.0, 2.0);

        let path = builder.build();
        let points: Vec<_> = path.iter().map(|event| event.to()).collect();
        assert!(points.contains(&lyon::geom::point(5.0, -10.0)));
        assert_eq!(path.iter().filter(|e| matches!(e, lyon::path::Event::End { .. })).count(), 2);
    }
}
