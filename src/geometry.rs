//! Plain 2-D geometry used by layout, routing and measurement.

use serde::{Deserialize, Serialize};

const EPS: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn inflate(&self, pad: f32) -> Rect {
        Rect::new(
            self.x - pad,
            self.y - pad,
            self.width + pad * 2.0,
            self.height + pad * 2.0,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Containment with a small tolerance for float accumulation.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x - 0.01
            && other.y >= self.y - 0.01
            && other.right() <= self.right() + 0.01
            && other.bottom() <= self.bottom() + 0.01
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x - 0.01
            && p.x <= self.right() + 0.01
            && p.y >= self.y - 0.01
            && p.y <= self.bottom() + 0.01
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 - x1 > EPS && y2 - y1 > EPS {
            Some(Rect::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Shortest distance between the rectangle and a segment; zero when they touch.
    pub fn distance_to_segment(&self, a: Point, b: Point) -> f32 {
        if segment_intersects_rect(a, b, self) {
            return 0.0;
        }
        let corners = self.corners();
        let mut best = f32::MAX;
        for corner in corners {
            best = best.min(point_segment_distance(corner, a, b));
        }
        for (c, d) in self.sides() {
            best = best.min(point_segment_distance(a, c, d));
            best = best.min(point_segment_distance(b, c, d));
        }
        best
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.right(), self.y),
            Point::new(self.right(), self.bottom()),
            Point::new(self.x, self.bottom()),
        ]
    }

    pub fn sides(&self) -> [(Point, Point); 4] {
        let c = self.corners();
        [(c[0], c[1]), (c[1], c[2]), (c[2], c[3]), (c[3], c[0])]
    }
}

pub fn bounding_rect<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
    let mut iter = rects.into_iter();
    let first = *iter.next()?;
    Some(iter.fold(first, |acc, r| acc.union(r)))
}

pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= EPS {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + dx * t, a.y + dy * t))
}

/// True when the segment touches or crosses the rectangle interior or border.
pub fn segment_intersects_rect(a: Point, b: Point, rect: &Rect) -> bool {
    let min_x = a.x.min(b.x);
    let max_x = a.x.max(b.x);
    let min_y = a.y.min(b.y);
    let max_y = a.y.max(b.y);
    if max_x < rect.x || min_x > rect.right() || max_y < rect.y || min_y > rect.bottom() {
        return false;
    }
    if rect.contains_point(a) || rect.contains_point(b) {
        return true;
    }
    rect.sides()
        .iter()
        .any(|(c, d)| segments_intersect(a, b, *c, *d))
}

/// True when the segment passes through the open interior of the rectangle.
/// Running along the border does not count.
pub fn segment_crosses_interior(a: Point, b: Point, rect: &Rect) -> bool {
    let inner = rect.inflate(-0.5);
    if inner.width <= 0.0 || inner.height <= 0.0 {
        return false;
    }
    segment_intersects_rect(a, b, &inner)
}

pub fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    fn orient(a: Point, b: Point, c: Point) -> f32 {
        (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
    }
    fn on_segment(a: Point, b: Point, c: Point) -> bool {
        c.x >= a.x.min(b.x) - 1e-6
            && c.x <= a.x.max(b.x) + 1e-6
            && c.y >= a.y.min(b.y) - 1e-6
            && c.y <= a.y.max(b.y) + 1e-6
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    if (o1 > 0.0 && o2 < 0.0 || o1 < 0.0 && o2 > 0.0)
        && (o3 > 0.0 && o4 < 0.0 || o3 < 0.0 && o4 > 0.0)
    {
        return true;
    }
    (o1.abs() <= 1e-6 && on_segment(a, b, c))
        || (o2.abs() <= 1e-6 && on_segment(a, b, d))
        || (o3.abs() <= 1e-6 && on_segment(c, d, a))
        || (o4.abs() <= 1e-6 && on_segment(c, d, b))
}

/// Strict crossing: the segments cross at a single interior point of both.
/// Shared endpoints and touching ends are not crossings.
pub fn segments_cross(a: Point, b: Point, c: Point, d: Point) -> bool {
    fn orient(a: Point, b: Point, c: Point) -> f32 {
        (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    o1 * o2 < -1e-6 && o3 * o4 < -1e-6
}

pub fn path_length(points: &[Point]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

pub fn path_bend_count(points: &[Point]) -> usize {
    if points.len() < 3 {
        return 0;
    }
    let mut bends = 0usize;
    for idx in 1..points.len() - 1 {
        let p0 = points[idx - 1];
        let p1 = points[idx];
        let p2 = points[idx + 1];
        let dx1 = p1.x - p0.x;
        let dy1 = p1.y - p0.y;
        let dx2 = p2.x - p1.x;
        let dy2 = p2.y - p1.y;
        if (dx1.abs() <= EPS && dy1.abs() <= EPS) || (dx2.abs() <= EPS && dy2.abs() <= EPS) {
            continue;
        }
        if (dx1 * dy2 - dy1 * dx2).abs() > EPS {
            bends += 1;
        }
    }
    bends
}

pub fn is_axis_aligned(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() <= EPS || (a.y - b.y).abs() <= EPS
}

/// Drops duplicate and collinear interior points, keeping both endpoints.
pub fn compress_path(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if let Some(last) = out.last()
            && (last.x - p.x).abs() <= EPS
            && (last.y - p.y).abs() <= EPS
        {
            continue;
        }
        out.push(p);
    }
    if out.len() <= 2 {
        return out;
    }
    let mut idx = 1;
    while idx + 1 < out.len() {
        let prev = out[idx - 1];
        let curr = out[idx];
        let next = out[idx + 1];
        let cross = (curr.x - prev.x) * (next.y - curr.y) - (curr.y - prev.y) * (next.x - curr.x);
        if cross.abs() <= EPS {
            out.remove(idx);
        } else {
            idx += 1;
        }
    }
    out
}

/// Midpoint of the longest segment of the path.
pub fn longest_segment_midpoint(points: &[Point]) -> Option<Point> {
    if points.len() < 2 {
        return None;
    }
    let mut best_idx = 0usize;
    let mut best_len = -1.0f32;
    for (idx, w) in points.windows(2).enumerate() {
        let len = w[0].distance(w[1]);
        if len > best_len + EPS {
            best_len = len;
            best_idx = idx;
        }
    }
    let a = points[best_idx];
    let b = points[best_idx + 1];
    Some(Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_disjoint_rects_is_none() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 0.0, 10.0, 10.0);
        assert!(a.intersection(&b).is_none());
        let touching = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(a.intersection(&touching).is_none());
    }

    #[test]
    fn intersection_area_matches_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        let inter = a.intersection(&b).expect("overlap");
        assert!((inter.area() - 25.0).abs() < 1e-3);
    }

    #[test]
    fn compress_path_removes_collinear_points() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 10.0),
        ];
        let out = compress_path(&pts);
        assert_eq!(
            out,
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0)
            ]
        );
    }

    #[test]
    fn bend_count_counts_turns() {
        let pts = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 10.0),
        ];
        assert_eq!(path_bend_count(&pts), 2);
        assert!((path_length(&pts) - 30.0).abs() < 1e-4);
    }

    #[test]
    fn segment_through_rect_is_detected() {
        let rect = Rect::new(10.0, 10.0, 10.0, 10.0);
        assert!(segment_intersects_rect(
            Point::new(0.0, 15.0),
            Point::new(30.0, 15.0),
            &rect
        ));
        assert!(!segment_intersects_rect(
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            &rect
        ));
    }

    #[test]
    fn border_run_does_not_cross_interior() {
        let rect = Rect::new(10.0, 10.0, 10.0, 10.0);
        assert!(!segment_crosses_interior(
            Point::new(10.0, 0.0),
            Point::new(10.0, 30.0),
            &rect
        ));
        assert!(segment_crosses_interior(
            Point::new(15.0, 0.0),
            Point::new(15.0, 30.0),
            &rect
        ));
    }

    #[test]
    fn strict_crossing_ignores_shared_endpoints() {
        let a = Point::new(0.0, 0.0);
        assert!(!segments_cross(a, Point::new(10.0, 0.0), a, Point::new(0.0, 10.0)));
        assert!(segments_cross(
            Point::new(0.0, 5.0),
            Point::new(10.0, 5.0),
            Point::new(5.0, 0.0),
            Point::new(5.0, 10.0)
        ));
    }

    #[test]
    fn label_anchor_sits_on_longest_segment() {
        let pts = [
            Point::new(0.0, 0.0),
            Point::new(0.0, 4.0),
            Point::new(40.0, 4.0),
        ];
        assert_eq!(longest_segment_midpoint(&pts), Some(Point::new(20.0, 4.0)));
    }
}
