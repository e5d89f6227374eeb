//! Vertex converters: lazy stages a geometry goes through on its way to the rasterizer.
//!
//! A [`ConverterConfig`] selects the stages and their parameters. [`ConverterConfig::apply`] wraps
//! a vertex source into a [`VertexConverter`], which pulls the vertices through the stages in a
//! fixed order:
//!
//! 1. clipping to a box (polygon or line clipping, see [`Clip`]),
//! 2. user transform of every vertex (usually the projection of the layer into the map SRS),
//! 3. view transform from the map coordinates into pixels,
//! 4. affine transform in pixel space (`geometry-transform` of a symbolizer),
//! 5. simplification,
//! 6. smoothing.
//!
//! A disabled stage passes the vertices through untouched. Stages working with whole sub-paths
//! (clipping, simplification, smoothing) buffer one sub-path at a time.
//!
//! Line offsetting and dashing need the complete path and are done on [`SubPath`]s by the
//! renderers, see [`offset_path`] and [`dash_path`].

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::iter::Peekable;
use std::sync::Arc;

use cartograph_types::{Command, Point2d, Vertex};
use nalgebra::Matrix3;

use crate::view::ViewTransform;

mod clip;
mod dash;
mod offset;
mod path_generator;
mod simplify;
mod smooth;

pub use clip::Clip;
pub use dash::dash_path;
pub use offset::offset_path;
pub use path_generator::PathGenerator;
pub use simplify::Simplify;
pub use smooth::Smooth;

/// A run of connected points.
#[derive(Debug, Clone, PartialEq)]
pub struct SubPath {
    /// Points of the sub-path. The first point of a closed sub-path is not repeated at the end.
    pub points: Vec<Point2d>,
    /// Whether the last point is connected to the first one.
    pub closed: bool,
}

impl SubPath {
    /// Creates a new sub-path.
    pub fn new(points: Vec<Point2d>, closed: bool) -> Self {
        Self { points, closed }
    }

    /// Length of the sub-path including the closing segment.
    pub fn length(&self) -> f64 {
        let open: f64 = self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
        match (self.closed, self.points.first(), self.points.last()) {
            (true, Some(first), Some(last)) => open + (first - last).norm(),
            _ => open,
        }
    }

    /// Points of the sub-path with the first point repeated at the end if the sub-path is closed.
    pub fn to_line(&self) -> Vec<Point2d> {
        let mut points = self.points.clone();
        if self.closed {
            if let Some(first) = self.points.first() {
                points.push(*first);
            }
        }

        points
    }

    fn push_vertices(&self, output: &mut VecDeque<Vertex>) {
        let Some(first) = self.points.first() else {
            return;
        };

        output.push_back(Vertex::move_to(first.x, first.y));
        for p in &self.points[1..] {
            output.push_back(Vertex::line_to(p.x, p.y));
        }
        if self.closed {
            output.push_back(Vertex::close(first.x, first.y));
        }
    }
}

/// Collects a vertex stream into sub-paths.
pub fn collect_sub_paths(vertices: impl IntoIterator<Item = Vertex>) -> Vec<SubPath> {
    let mut reader = SubPathReader::new(vertices.into_iter());
    std::iter::from_fn(|| reader.next_sub_path()).collect()
}

struct SubPathReader<I: Iterator<Item = Vertex>> {
    source: Peekable<I>,
}

impl<I: Iterator<Item = Vertex>> SubPathReader<I> {
    fn new(source: I) -> Self {
        Self {
            source: source.peekable(),
        }
    }

    fn next_sub_path(&mut self) -> Option<SubPath> {
        loop {
            let first = self.source.next()?;
            if first.cmd == Command::Close {
                // Close without an open sub-path.
                continue;
            }

            let mut points = vec![first.point()];
            let mut closed = false;
            while let Some(vertex) = self.source.peek() {
                match vertex.cmd {
                    Command::MoveTo => break,
                    Command::LineTo => points.push(vertex.point()),
                    Command::Close => closed = true,
                }
                self.source.next();
                if closed {
                    break;
                }
            }

            return Some(SubPath { points, closed });
        }
    }
}

/// Stage that processes whole sub-paths.
pub trait PathOp {
    /// Processes one sub-path, pushing the results into `output`. A sub-path may be dropped or
    /// split into several ones.
    fn process(&mut self, path: SubPath, output: &mut Vec<SubPath>);
}

/// Stage that processes every point independently.
pub trait PointOp {
    /// Transforms the point. `None` drops the vertex.
    fn apply(&self, point: Point2d) -> Option<Point2d>;
}

/// Adapter running a [`PathOp`] over a vertex stream.
pub struct PathStage<I: Iterator<Item = Vertex>, O: PathOp> {
    inner: PathStageInner<I, O>,
}

enum PathStageInner<I: Iterator<Item = Vertex>, O: PathOp> {
    Pass(I),
    Active {
        reader: SubPathReader<I>,
        op: O,
        buffer: Vec<SubPath>,
        pending: VecDeque<Vertex>,
    },
}

impl<I: Iterator<Item = Vertex>, O: PathOp> PathStage<I, O> {
    fn new(source: I, op: Option<O>) -> Self {
        let inner = match op {
            None => PathStageInner::Pass(source),
            Some(op) => PathStageInner::Active {
                reader: SubPathReader::new(source),
                op,
                buffer: vec![],
                pending: VecDeque::new(),
            },
        };

        Self { inner }
    }
}

impl<I: Iterator<Item = Vertex>, O: PathOp> Iterator for PathStage<I, O> {
    type Item = Vertex;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            PathStageInner::Pass(source) => source.next(),
            PathStageInner::Active {
                reader,
                op,
                buffer,
                pending,
            } => loop {
                if let Some(vertex) = pending.pop_front() {
                    return Some(vertex);
                }

                let path = reader.next_sub_path()?;
                op.process(path, buffer);
                for path in buffer.drain(..) {
                    path.push_vertices(pending);
                }
            },
        }
    }
}

/// Adapter running a [`PointOp`] over a vertex stream.
///
/// When a vertex is dropped, the next vertex of the same sub-path starts a new sub-path if the
/// dropped vertex was a `MoveTo`. Close vertices are re-targeted to the transformed start of
/// the sub-path.
pub struct PointStage<I: Iterator<Item = Vertex>, O: PointOp> {
    source: I,
    op: Option<O>,
    need_move: bool,
    start: Option<Point2d>,
}

impl<I: Iterator<Item = Vertex>, O: PointOp> PointStage<I, O> {
    fn new(source: I, op: Option<O>) -> Self {
        Self {
            source,
            op,
            need_move: false,
            start: None,
        }
    }
}

impl<I: Iterator<Item = Vertex>, O: PointOp> Iterator for PointStage<I, O> {
    type Item = Vertex;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(op) = &self.op else {
            return self.source.next();
        };

        loop {
            let vertex = self.source.next()?;
            match vertex.cmd {
                Command::Close => {
                    if self.need_move {
                        continue;
                    }
                    if let Some(start) = self.start {
                        return Some(Vertex::close(start.x, start.y));
                    }
                }
                Command::MoveTo | Command::LineTo => {
                    if vertex.cmd == Command::MoveTo {
                        self.need_move = true;
                        self.start = None;
                    }

                    let Some(point) = op.apply(vertex.point()) else {
                        continue;
                    };

                    if self.need_move || self.start.is_none() {
                        self.need_move = false;
                        self.start = Some(point);
                        return Some(Vertex::move_to(point.x, point.y));
                    }

                    return Some(Vertex::line_to(point.x, point.y));
                }
            }
        }
    }
}

/// Per-vertex transform supplied by the caller, usually the projection of the layer into the map
/// SRS. Vertices the function returns `None` for are dropped.
#[derive(Clone)]
pub struct UserTransform(Arc<dyn Fn(Point2d) -> Option<Point2d> + Send + Sync>);

impl UserTransform {
    /// Creates a new transform.
    pub fn new(f: impl Fn(Point2d) -> Option<Point2d> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl Debug for UserTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserTransform")
    }
}

impl PointOp for UserTransform {
    fn apply(&self, point: Point2d) -> Option<Point2d> {
        (self.0)(point)
    }
}

/// Map to pixels stage.
#[derive(Debug, Clone, Copy)]
pub struct View(pub ViewTransform);

impl PointOp for View {
    fn apply(&self, point: Point2d) -> Option<Point2d> {
        Some(self.0.forward(&point))
    }
}

/// Affine transform stage.
#[derive(Debug, Clone, Copy)]
pub struct Affine(pub Matrix3<f64>);

impl PointOp for Affine {
    fn apply(&self, point: Point2d) -> Option<Point2d> {
        let p = self.0.transform_point(&point);
        (p.x.is_finite() && p.y.is_finite()).then_some(p)
    }
}

type Pipeline<I> = PathStage<
    PathStage<PointStage<PointStage<PointStage<PathStage<I, Clip>, UserTransform>, View>, Affine>, Simplify>,
    Smooth,
>;

/// Set of enabled converter stages with their parameters.
#[derive(Debug, Clone, Default)]
pub struct ConverterConfig {
    clip: Option<Clip>,
    user_transform: Option<UserTransform>,
    view: Option<ViewTransform>,
    affine: Option<Matrix3<f64>>,
    simplify: Option<Simplify>,
    smooth: Option<Smooth>,
}

impl ConverterConfig {
    /// Config with all stages disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables clipping.
    pub fn with_clip(mut self, clip: Clip) -> Self {
        self.clip = Some(clip);
        self
    }

    /// Enables the user transform.
    pub fn with_user_transform(mut self, transform: UserTransform) -> Self {
        self.user_transform = Some(transform);
        self
    }

    /// Enables conversion of the map coordinates into pixels.
    pub fn with_view(mut self, view: ViewTransform) -> Self {
        self.view = Some(view);
        self
    }

    /// Enables affine transform in pixel space. Identity matrix disables the stage.
    pub fn with_affine(mut self, matrix: Matrix3<f64>) -> Self {
        self.affine = (matrix != Matrix3::identity()).then_some(matrix);
        self
    }

    /// Enables simplification. Non-positive tolerance disables the stage.
    pub fn with_simplify(mut self, simplify: Simplify) -> Self {
        self.simplify = (simplify.tolerance > 0.0).then_some(simplify);
        self
    }

    /// Enables smoothing. Non-positive smoothing factor disables the stage.
    pub fn with_smooth(mut self, smooth: Smooth) -> Self {
        self.smooth = (smooth.value() > 0.0).then_some(smooth);
        self
    }

    /// Clip stage, if enabled.
    pub fn clip(&self) -> Option<&Clip> {
        self.clip.as_ref()
    }

    /// Returns true if no stage is enabled.
    pub fn is_empty(&self) -> bool {
        self.clip.is_none()
            && self.user_transform.is_none()
            && self.view.is_none()
            && self.affine.is_none()
            && self.simplify.is_none()
            && self.smooth.is_none()
    }

    /// Wraps the vertex source into the converter chain.
    pub fn apply<I: IntoIterator<Item = Vertex>>(&self, source: I) -> VertexConverter<I::IntoIter> {
        let clipped = PathStage::new(source.into_iter(), self.clip);
        let transformed = PointStage::new(clipped, self.user_transform.clone());
        let viewed = PointStage::new(transformed, self.view.map(View));
        let affine = PointStage::new(viewed, self.affine.map(Affine));
        let simplified = PathStage::new(affine, self.simplify);
        let smoothed = PathStage::new(simplified, self.smooth);

        VertexConverter(smoothed)
    }
}

/// Lazy iterator over converted vertices, see [`ConverterConfig::apply`].
pub struct VertexConverter<I: Iterator<Item = Vertex>>(Pipeline<I>);

impl<I: Iterator<Item = Vertex>> Iterator for VertexConverter<I> {
    type Item = Vertex;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use cartograph_types::{Box2d, Geometry, Polygon};

    use super::*;
    use crate::style::SimplifyAlgorithm;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Polygon::new(
            vec![
                Point2d::new(x0, y0),
                Point2d::new(x1, y0),
                Point2d::new(x1, y1),
                Point2d::new(x0, y1),
            ],
            vec![],
        )
        .into()
    }

    #[test]
    fn disabled_stages_pass_vertices_through() {
        let input = vec![
            Vertex::move_to(0.0, 0.0),
            Vertex::line_to(10.0, 0.0),
            Vertex::line_to(10.0, 10.0),
            Vertex::close(0.0, 0.0),
            Vertex::move_to(20.0, 20.0),
            Vertex::line_to(1e9, -1e9),
            Vertex::line_to(20.0, 20.0),
            Vertex::line_to(20.0, 20.0),
        ];

        let output: Vec<_> = ConverterConfig::new().apply(input.clone()).collect();
        assert_eq!(output, input);

        let output: Vec<_> = ConverterConfig::new()
            .with_affine(Matrix3::identity())
            .with_simplify(Simplify::new(SimplifyAlgorithm::DouglasPeucker, 0.0))
            .with_smooth(Smooth::new(0.0))
            .apply(input.clone())
            .collect();
        assert_eq!(output, input);
    }

    #[test]
    fn full_chain() {
        let view = ViewTransform::new(100, 100, Box2d::new(0.0, 0.0, 100.0, 100.0));
        let config = ConverterConfig::new()
            .with_clip(Clip::Polygon(Box2d::new(0.0, 0.0, 50.0, 50.0)))
            .with_user_transform(UserTransform::new(|p| Some(Point2d::new(p.x * 2.0, p.y * 2.0))))
            .with_view(view)
            .with_affine(Matrix3::new_translation(&nalgebra::Vector2::new(1.0, 0.0)));

        let geometry = square(-10.0, -10.0, 10.0, 10.0);
        let paths = collect_sub_paths(config.apply(geometry.vertices()));
        assert_eq!(paths.len(), 1);
        assert!(paths[0].closed);

        // Clipped to (0,0)-(10,10), scaled to (0,0)-(20,20), flipped and shifted by one pixel.
        let bbox = Box2d::from_points(paths[0].points.iter().map(|p| (p.x, p.y)));
        assert_abs_diff_eq!(bbox.min_x(), 1.0);
        assert_abs_diff_eq!(bbox.max_x(), 21.0);
        assert_abs_diff_eq!(bbox.min_y(), 80.0);
        assert_abs_diff_eq!(bbox.max_y(), 100.0);
    }

    #[test]
    fn dropped_vertices_restart_sub_path() {
        let config = ConverterConfig::new()
            .with_user_transform(UserTransform::new(|p| (p.x >= 0.0).then_some(p)));
        let line = Geometry::LineString(vec![
            Point2d::new(-1.0, 0.0),
            Point2d::new(1.0, 0.0),
            Point2d::new(2.0, 0.0),
        ]);

        let output: Vec<_> = config.apply(line.vertices()).collect();
        assert_eq!(output, vec![Vertex::move_to(1.0, 0.0), Vertex::line_to(2.0, 0.0)]);
    }

    #[test]
    fn ring_closure_survives_stages() {
        let config = ConverterConfig::new()
            .with_clip(Clip::Polygon(Box2d::new(2.0, 2.0, 8.0, 8.0)))
            .with_simplify(Simplify::new(SimplifyAlgorithm::RadialDistance, 0.5))
            .with_smooth(Smooth::new(0.5));

        let output: Vec<_> = config.apply(square(0.0, 0.0, 10.0, 10.0).vertices()).collect();
        let first = output.first().unwrap();
        let last = output.last().unwrap();
        assert_eq!(first.cmd, Command::MoveTo);
        assert_eq!(last.cmd, Command::Close);
        assert_eq!(first.point(), last.point());
    }
}
