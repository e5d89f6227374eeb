use cartograph_types::Point2d;
use lyon::math::point;
use lyon::path::Path;
use lyon::tessellation::{
    BuffersBuilder, StrokeOptions, StrokeTessellator, StrokeVertex, VertexBuffers,
};

use super::rasterizer::Rasterizer;
use crate::converter::SubPath;
use crate::style::{LineCap, LineJoin};

/// Parameters of a stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    /// Width in pixels.
    pub width: f64,
    /// Join shape.
    pub join: LineJoin,
    /// End shape.
    pub cap: LineCap,
    /// Miter limit (ratio of the miter length to the width).
    pub miter_limit: f64,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            width: 1.0,
            join: LineJoin::Miter,
            cap: LineCap::Butt,
            miter_limit: 4.0,
        }
    }
}

impl From<LineJoin> for lyon::tessellation::LineJoin {
    fn from(value: LineJoin) -> Self {
        match value {
            LineJoin::Miter => lyon::tessellation::LineJoin::MiterClip,
            LineJoin::MiterRevert => lyon::tessellation::LineJoin::Miter,
            LineJoin::Round => lyon::tessellation::LineJoin::Round,
            LineJoin::Bevel => lyon::tessellation::LineJoin::Bevel,
        }
    }
}

impl From<LineCap> for lyon::tessellation::LineCap {
    fn from(value: LineCap) -> Self {
        match value {
            LineCap::Butt => lyon::tessellation::LineCap::Butt,
            LineCap::Square => lyon::tessellation::LineCap::Square,
            LineCap::Round => lyon::tessellation::LineCap::Round,
        }
    }
}

impl Stroke {
    fn options(&self) -> StrokeOptions {
        StrokeOptions::DEFAULT
            .with_line_cap(self.cap.into())
            .with_line_width(self.width as f32)
            .with_miter_limit(self.miter_limit.max(1.0) as f32)
            .with_tolerance(0.1)
            .with_line_join(self.join.into())
    }

    /// Adds the outline of the stroked paths to the rasterizer as a set of triangles.
    pub fn add_sub_paths<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a SubPath>,
        rasterizer: &mut Rasterizer,
    ) {
        let mut builder = Path::builder();
        let mut has_segments = false;
        for path in paths {
            let mut points = path.points.iter();
            let Some(first) = points.next() else {
                continue;
            };

            builder.begin(point(first.x as f32, first.y as f32));
            for p in points {
                builder.line_to(point(p.x as f32, p.y as f32));
                has_segments = true;
            }
            builder.end(path.closed);
        }

        if has_segments {
            self.add_path(&builder.build(), rasterizer);
        }
    }

    /// Adds the outline of the stroked lyon path to the rasterizer.
    pub fn add_path(&self, path: &Path, rasterizer: &mut Rasterizer) {
        if self.width <= 0.0 {
            return;
        }

        let mut buffers: VertexBuffers<Point2d, u32> = VertexBuffers::new();
        let mut tessellator = StrokeTessellator::new();
        let result = tessellator.tessellate_path(
            path,
            &self.options(),
            &mut BuffersBuilder::new(&mut buffers, |vertex: StrokeVertex| {
                let p = vertex.position();
                Point2d::new(p.x as f64, p.y as f64)
            }),
        );

        if let Err(err) = result {
            log::warn!("Failed to tessellate stroke: {err:?}");
            return;
        }

        for triangle in buffers.indices.chunks_exact(3) {
            rasterizer.add_triangle(
                buffers.vertices[triangle[0] as usize],
                buffers.vertices[triangle[1] as usize],
                buffers.vertices[triangle[2] as usize],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn horizontal_line_coverage() {
        let mut rasterizer = Rasterizer::new(10, 10);
        let path = SubPath::new(vec![Point2d::new(2.0, 5.0), Point2d::new(8.0, 5.0)], false);
        let stroke = Stroke {
            width: 2.0,
            ..Default::default()
        };
        stroke.add_sub_paths([&path], &mut rasterizer);

        let mask = rasterizer.mask();
        assert_abs_diff_eq!(mask.get(5, 4), 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(mask.get(5, 5), 1.0, epsilon = 1e-4);
        assert_eq!(mask.get(5, 3), 0.0);
        assert_eq!(mask.get(5, 6), 0.0);
        assert_eq!(mask.get(1, 5), 0.0);
        assert_eq!(mask.get(8, 5), 0.0);
    }

    #[test]
    fn square_cap_extends_the_line() {
        let mut rasterizer = Rasterizer::new(10, 10);
        let path = SubPath::new(vec![Point2d::new(2.0, 5.0), Point2d::new(8.0, 5.0)], false);
        let stroke = Stroke {
            width: 2.0,
            cap: LineCap::Square,
            ..Default::default()
        };
        stroke.add_sub_paths([&path], &mut rasterizer);

        let mask = rasterizer.mask();
        assert_abs_diff_eq!(mask.get(1, 5), 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(mask.get(8, 5), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn single_point_is_ignored() {
        let mut rasterizer = Rasterizer::new(10, 10);
        let path = SubPath::new(vec![Point2d::new(2.0, 5.0)], false);
        Stroke::default().add_sub_paths([&path], &mut rasterizer);
        assert!(rasterizer.is_empty());
    }
}
