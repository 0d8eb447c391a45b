//! Path building and scanline rasterization.
//!
//! Paths are stored flattened, in device space: every point is
//! transformed by the CTM as it is appended, and curves are subdivided
//! into line segments immediately. Fills use a classic scanline edge
//! list with both winding rules; strokes are per-segment quads.

use crate::geom::{Matrix, Rect};
use crate::raster::pixmap::Pixmap;
use crate::raster::state::Color;

/// Interior test for fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

const CURVE_STEPS: usize = 16;

/// The current path, accumulated between painting operators.
#[derive(Debug, Clone, Default)]
pub struct Path {
    subpaths: Vec<Subpath>,
    current: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Default)]
struct Subpath {
    points: Vec<(f32, f32)>,
    closed: bool,
}

impl Path {
    pub fn new() -> Self {
        Path::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.iter().all(|s| s.points.len() < 2)
    }

    pub fn clear(&mut self) {
        self.subpaths.clear();
        self.current = None;
    }

    pub fn current_point(&self) -> Option<(f32, f32)> {
        self.current
    }

    pub fn move_to(&mut self, ctm: &Matrix, x: f32, y: f32) {
        let p = ctm.transform_point(x, y);
        self.subpaths.push(Subpath {
            points: vec![p],
            closed: false,
        });
        self.current = Some(p);
    }

    pub fn line_to(&mut self, ctm: &Matrix, x: f32, y: f32) {
        let p = ctm.transform_point(x, y);
        self.push_point(p);
    }

    /// Cubic Bézier from the current point through two control points.
    pub fn curve_to(
        &mut self,
        ctm: &Matrix,
        c1: (f32, f32),
        c2: (f32, f32),
        end: (f32, f32),
    ) {
        self.curve_device(
            ctm.transform_point(c1.0, c1.1),
            ctm.transform_point(c2.0, c2.1),
            ctm.transform_point(end.0, end.1),
        );
    }

    /// The `v` operator: the current point doubles as the first control.
    pub fn curve_to_v(&mut self, ctm: &Matrix, c2: (f32, f32), end: (f32, f32)) {
        let Some(p0) = self.current else { return };
        self.curve_device(
            p0,
            ctm.transform_point(c2.0, c2.1),
            ctm.transform_point(end.0, end.1),
        );
    }

    /// The `y` operator: the endpoint doubles as the second control.
    pub fn curve_to_y(&mut self, ctm: &Matrix, c1: (f32, f32), end: (f32, f32)) {
        let e = ctm.transform_point(end.0, end.1);
        self.curve_device(ctm.transform_point(c1.0, c1.1), e, e);
    }

    fn curve_device(&mut self, p1: (f32, f32), p2: (f32, f32), p3: (f32, f32)) {
        let p0 = match self.current {
            Some(p) => p,
            None => return,
        };
        for i in 1..=CURVE_STEPS {
            let t = i as f32 / CURVE_STEPS as f32;
            let u = 1.0 - t;
            let x = u * u * u * p0.0
                + 3.0 * u * u * t * p1.0
                + 3.0 * u * t * t * p2.0
                + t * t * t * p3.0;
            let y = u * u * u * p0.1
                + 3.0 * u * u * t * p1.1
                + 3.0 * u * t * t * p2.1
                + t * t * t * p3.1;
            self.push_point((x, y));
        }
    }

    pub fn close(&mut self) {
        if let Some(sub) = self.subpaths.last_mut() {
            if !sub.points.is_empty() {
                sub.closed = true;
                self.current = Some(sub.points[0]);
            }
        }
    }

    /// Axis-aligned rectangle in user space (the `re` operator).
    pub fn rect(&mut self, ctm: &Matrix, x: f32, y: f32, w: f32, h: f32) {
        self.move_to(ctm, x, y);
        self.line_to(ctm, x + w, y);
        self.line_to(ctm, x + w, y + h);
        self.line_to(ctm, x, y + h);
        self.close();
    }

    fn push_point(&mut self, p: (f32, f32)) {
        match self.subpaths.last_mut() {
            Some(sub) if !sub.closed => sub.points.push(p),
            _ => self.subpaths.push(Subpath {
                points: vec![p],
                closed: false,
            }),
        }
        self.current = Some(p);
    }

    /// Device-space bounding box of all points.
    pub fn bounds(&self) -> Option<Rect> {
        let mut out: Option<Rect> = None;
        for sub in &self.subpaths {
            for &(x, y) in &sub.points {
                if !x.is_finite() || !y.is_finite() {
                    continue;
                }
                out = Some(match out {
                    None => Rect::new(x, y, x, y),
                    Some(r) => Rect::new(r.x0.min(x), r.y0.min(y), r.x1.max(x), r.y1.max(y)),
                });
            }
        }
        out
    }

    /// Fill the path interior. Open subpaths are implicitly closed.
    pub fn fill(
        &self,
        pixmap: &mut Pixmap,
        color: Color,
        alpha: f32,
        rule: FillRule,
        clip: Option<Rect>,
    ) {
        let edges = self.collect_edges();
        fill_edges(pixmap, &edges, color, alpha, rule, clip);
    }

    /// Stroke each segment as a filled quad of the given device width.
    /// No joins or caps; adequate at raster resolution.
    pub fn stroke(
        &self,
        pixmap: &mut Pixmap,
        color: Color,
        alpha: f32,
        device_width: f32,
        clip: Option<Rect>,
    ) {
        let half = (device_width.max(1.0)) / 2.0;
        let mut edges = Vec::new();
        for sub in &self.subpaths {
            let n = sub.points.len();
            if n < 2 {
                continue;
            }
            let count = if sub.closed { n } else { n - 1 };
            for i in 0..count {
                let a = sub.points[i];
                let b = sub.points[(i + 1) % n];
                let dx = b.0 - a.0;
                let dy = b.1 - a.1;
                let len = (dx * dx + dy * dy).sqrt();
                if !len.is_finite() || len < 1e-6 {
                    continue;
                }
                let nx = -dy / len * half;
                let ny = dx / len * half;
                let quad = [
                    (a.0 + nx, a.1 + ny),
                    (b.0 + nx, b.1 + ny),
                    (b.0 - nx, b.1 - ny),
                    (a.0 - nx, a.1 - ny),
                ];
                for j in 0..4 {
                    edges.push(Edge::new(quad[j], quad[(j + 1) % 4]));
                }
            }
        }
        fill_edges(pixmap, &edges, color, alpha, FillRule::NonZero, clip);
    }

    fn collect_edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for sub in &self.subpaths {
            let n = sub.points.len();
            if n < 2 {
                continue;
            }
            for i in 0..n {
                // Implicit close for filling.
                let a = sub.points[i];
                let b = sub.points[(i + 1) % n];
                if i + 1 == n && a == b {
                    continue;
                }
                edges.push(Edge::new(a, b));
            }
        }
        edges
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    /// +1 when the edge points down in device space, -1 when up.
    dir: i32,
}

impl Edge {
    fn new(a: (f32, f32), b: (f32, f32)) -> Edge {
        if a.1 <= b.1 {
            Edge {
                x0: a.0,
                y0: a.1,
                x1: b.0,
                y1: b.1,
                dir: 1,
            }
        } else {
            Edge {
                x0: b.0,
                y0: b.1,
                x1: a.0,
                y1: a.1,
                dir: -1,
            }
        }
    }
}

fn fill_edges(
    pixmap: &mut Pixmap,
    edges: &[Edge],
    color: Color,
    alpha: f32,
    rule: FillRule,
    clip: Option<Rect>,
) {
    if edges.is_empty() || alpha <= 0.0 {
        return;
    }
    let rgb = color.to_rgb8();

    let mut y_min = f32::MAX;
    let mut y_max = f32::MIN;
    for e in edges {
        if !e.y0.is_finite() || !e.y1.is_finite() {
            continue;
        }
        y_min = y_min.min(e.y0);
        y_max = y_max.max(e.y1);
    }
    if let Some(c) = clip {
        y_min = y_min.max(c.y0);
        y_max = y_max.min(c.y1);
    }
    if y_min > y_max {
        return;
    }
    let row_start = (y_min.floor().max(0.0)) as u32;
    let row_end = (y_max.ceil().min(pixmap.height() as f32)) as u32;

    let mut crossings: Vec<(f32, i32)> = Vec::new();
    for y in row_start..row_end {
        let yc = y as f32 + 0.5;
        if let Some(c) = clip {
            if yc < c.y0 || yc >= c.y1 {
                continue;
            }
        }
        crossings.clear();
        for e in edges {
            // Half-open span so shared vertices count once.
            if yc >= e.y0 && yc < e.y1 {
                let t = (yc - e.y0) / (e.y1 - e.y0);
                let x = e.x0 + t * (e.x1 - e.x0);
                if x.is_finite() {
                    crossings.push((x, e.dir));
                }
            }
        }
        if crossings.len() < 2 {
            continue;
        }
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        match rule {
            FillRule::NonZero => {
                let mut winding = 0;
                let mut span_start = 0.0f32;
                for &(x, dir) in crossings.iter() {
                    let was_inside = winding != 0;
                    winding += dir;
                    let is_inside = winding != 0;
                    if !was_inside && is_inside {
                        span_start = x;
                    } else if was_inside && !is_inside {
                        fill_span(pixmap, y, span_start, x, rgb, alpha, clip);
                    }
                }
            }
            FillRule::EvenOdd => {
                for pair in crossings.chunks(2) {
                    if pair.len() == 2 {
                        fill_span(pixmap, y, pair[0].0, pair[1].0, rgb, alpha, clip);
                    }
                }
            }
        }
    }
}

/// Paint pixels whose centers lie in `[x_start, x_end)` on row `y`.
fn fill_span(
    pixmap: &mut Pixmap,
    y: u32,
    mut x_start: f32,
    mut x_end: f32,
    rgb: [u8; 3],
    alpha: f32,
    clip: Option<Rect>,
) {
    if let Some(c) = clip {
        x_start = x_start.max(c.x0);
        x_end = x_end.min(c.x1);
    }
    if x_end <= x_start {
        return;
    }
    let first = (x_start - 0.5).ceil().max(0.0) as u32;
    let last_exclusive = ((x_end - 0.5).ceil().max(0.0) as u32).min(pixmap.width());
    for x in first..last_exclusive {
        if alpha >= 1.0 {
            pixmap.set_pixel(x, y, rgb);
        } else {
            pixmap.blend_pixel(x, y, rgb, alpha);
        }
    }
}
