//! Uniform sampling of path geometry into needle points.
//!
//! Every segment is sampled on its own parameter domain, so a segment's end
//! point and the next segment's start point both appear in the output.

use kurbo::{BezPath, CubicBez, Line, ParamCurve, ParamCurveArclen, PathEl, PathSeg, Point, QuadBez};

/// Arc length accuracy in output units (tenths of a millimeter).
const ARCLEN_ACCURACY: f64 = 1e-3;

/// Segments shorter than this are treated as zero length.
const MIN_SEGMENT_LENGTH: f64 = 1e-9;

/// Minimum number of intervals a non-degenerate segment is split into.
const MIN_INTERVALS: usize = 2;

/// A piece of geometry with a length and a parametric position function.
pub trait DrawableSegment {
    fn length(&self) -> f64;

    /// Point at parameter `t` in `[0, 1]`.
    fn point_at(&self, t: f64) -> Point;
}

impl DrawableSegment for PathSeg {
    fn length(&self) -> f64 {
        self.arclen(ARCLEN_ACCURACY)
    }

    fn point_at(&self, t: f64) -> Point {
        self.eval(t)
    }
}

impl DrawableSegment for Line {
    fn length(&self) -> f64 {
        self.arclen(ARCLEN_ACCURACY)
    }

    fn point_at(&self, t: f64) -> Point {
        self.eval(t)
    }
}

/// Most needle points a single conversion may sample.
pub const MAX_STITCH_POINTS: usize = 1_000_000;

/// Number of intervals for a segment of `length` at the given spacing.
/// Never more than [`MAX_STITCH_POINTS`].
pub fn interval_count(length: f64, density: f64) -> usize {
    let raw = if density > 0.0 && density.is_finite() {
        (length / density).floor()
    } else {
        0.0
    };
    (raw.min(MAX_STITCH_POINTS as f64) as usize).max(MIN_INTERVALS)
}

/// Points a segment of `length` yields; zero when degenerate.
fn point_count(length: f64, density: f64) -> usize {
    if !(length > MIN_SEGMENT_LENGTH) || !length.is_finite() {
        return 0;
    }
    interval_count(length, density) + 1
}

fn points_along<S: DrawableSegment + ?Sized>(segment: &S, count: usize) -> Vec<Point> {
    if count < 2 {
        return Vec::new();
    }
    let intervals = (count - 1) as f64;
    (0..count)
        .map(|i| segment.point_at(i as f64 / intervals))
        .collect()
}

/// Sample one segment. Degenerate segments yield no points.
pub fn sample_segment<S: DrawableSegment + ?Sized>(segment: &S, density: f64) -> Vec<Point> {
    points_along(segment, point_count(segment.length(), density))
}

/// Sample a continuous path, segment by segment, in order.
pub fn sample_path<S: DrawableSegment>(segments: &[S], density: f64) -> Vec<Point> {
    segments
        .iter()
        .flat_map(|segment| sample_segment(segment, density))
        .collect()
}

/// Like [`sample_path`], but returns `None` without sampling when the path
/// would need more than `limit` points.
pub fn sample_path_within<S: DrawableSegment>(
    segments: &[S],
    density: f64,
    limit: usize,
) -> Option<Vec<Point>> {
    let counts: Vec<usize> = segments
        .iter()
        .map(|segment| point_count(segment.length(), density))
        .collect();
    let total = counts.iter().fold(0usize, |acc, n| acc.saturating_add(*n));
    if total > limit {
        return None;
    }
    Some(
        segments
            .iter()
            .zip(counts)
            .flat_map(|(segment, count)| points_along(segment, count))
            .collect(),
    )
}

/// Split a path into its continuous subpaths. A `MoveTo` starts a new
/// subpath; `ClosePath` becomes a line back to the subpath start.
pub fn subpaths(path: &BezPath) -> Vec<Vec<PathSeg>> {
    let mut out: Vec<Vec<PathSeg>> = Vec::new();
    let mut current: Vec<PathSeg> = Vec::new();
    let mut start = Point::ZERO;
    let mut last = Point::ZERO;

    for element in path.elements() {
        match *element {
            PathEl::MoveTo(p) => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                start = p;
                last = p;
            }
            PathEl::LineTo(p) => {
                current.push(PathSeg::Line(Line::new(last, p)));
                last = p;
            }
            PathEl::QuadTo(p1, p2) => {
                current.push(PathSeg::Quad(QuadBez::new(last, p1, p2)));
                last = p2;
            }
            PathEl::CurveTo(p1, p2, p3) => {
                current.push(PathSeg::Cubic(CubicBez::new(last, p1, p2, p3)));
                last = p3;
            }
            PathEl::ClosePath => {
                current.push(PathSeg::Line(Line::new(last, start)));
                last = start;
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
