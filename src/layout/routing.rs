use std::cmp::Ordering;

use crate::config::{Config, RouteWeights};
use crate::error::LayoutError;
use crate::geometry::{
    Point, Rect, compress_path, is_axis_aligned, longest_segment_midpoint, path_bend_count,
    path_length, segment_crosses_interior, segment_intersects_rect,
};
use crate::ir::{DiagramSpec, Edge, EdgeKind, RouteKind};
use crate::theme::Theme;

use super::{Layout, ResolvedRoute, RoutedEdge, TextStyle, measure_text};

// ── Candidate search ────────────────────────────────────────────────
/// Costs closer than this are treated as equal and fall through to the
/// length / turns / key tie-breakers.
const COST_EPS: f32 = 1e-3;
/// Extra distance U-shaped detours keep from the outermost box edge.
const DETOUR_OFFSET: f32 = 18.0;
/// Self-loop overhang beyond the box border.
const SELF_LOOP_OFFSET: f32 = 20.0;

// ── Labels ──────────────────────────────────────────────────────────
/// Wrap width for edge labels.
const EDGE_LABEL_MAX_WIDTH: f32 = 160.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
            Side::Top => "top",
            Side::Bottom => "bottom",
        }
    }

    fn is_horizontal(self) -> bool {
        matches!(self, Side::Left | Side::Right)
    }
}

fn side_midpoint(rect: &Rect, side: Side) -> Point {
    let c = rect.center();
    match side {
        Side::Left => Point::new(rect.x, c.y),
        Side::Right => Point::new(rect.right(), c.y),
        Side::Top => Point::new(c.x, rect.y),
        Side::Bottom => Point::new(c.x, rect.bottom()),
    }
}

/// Something an edge should not pass through: a padded unrelated box or a
/// group title.
#[derive(Debug, Clone)]
pub(super) struct Obstacle {
    pub id: String,
    pub rect: Rect,
}

/// One scored path option for an edge.
#[derive(Debug, Clone)]
struct Candidate {
    key: String,
    route: ResolvedRoute,
    points: Vec<Point>,
    length: f32,
    bends: usize,
    hits: Vec<String>,
    cost: f32,
}

impl Candidate {
    fn compare(&self, other: &Candidate) -> Ordering {
        if (self.cost - other.cost).abs() > COST_EPS {
            return self.cost.total_cmp(&other.cost);
        }
        if (self.length - other.length).abs() > COST_EPS {
            return self.length.total_cmp(&other.length);
        }
        self.bends
            .cmp(&other.bends)
            .then_with(|| self.key.cmp(&other.key))
    }
}

struct RouteContext<'a> {
    weights: &'a RouteWeights,
    clearance: f32,
    obstacles: Vec<Obstacle>,
}

/// Routes every spec edge against the computed layout. Edges are routed
/// independently; labels of other edges are never obstacles.
pub fn route_edges(
    spec: &DiagramSpec,
    layout: &Layout,
    theme: &Theme,
    config: &Config,
) -> Result<Vec<RoutedEdge>, LayoutError> {
    let label_style = TextStyle {
        font_family: theme.font_family.as_str(),
        font_size: config.fonts.edge_label_size,
        line_height: config.fonts.line_height,
        fast_metrics: config.fonts.fast_text_metrics,
    };
    let mut routed = Vec::with_capacity(spec.edges.len());
    for edge in &spec.edges {
        let source = layout
            .boxes
            .get(&edge.from)
            .ok_or_else(|| LayoutError::MissingBox {
                edge: edge.id.clone(),
                id: edge.from.clone(),
            })?;
        let target = layout
            .boxes
            .get(&edge.to)
            .ok_or_else(|| LayoutError::MissingBox {
                edge: edge.id.clone(),
                id: edge.to.clone(),
            })?;
        let ctx = RouteContext {
            weights: &config.routing.weights,
            clearance: config.routing.clearance,
            obstacles: build_obstacles(layout, edge, config.routing.obstacle_padding),
        };
        let best = if edge.from == edge.to {
            score(&ctx, edge.kind, self_loop(&source.rect))
        } else {
            choose_route(&ctx, edge, &source.rect, &target.rect)
        };
        if !best.hits.is_empty() {
            log::debug!(edge = edge.id.as_str(), hits = best.hits.len(); "No obstacle-free route");
        }
        for p in &best.points {
            if !p.is_finite() {
                return Err(LayoutError::NonFinite {
                    subject: format!("edge {}", edge.id),
                });
            }
        }
        let label = edge
            .label
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| measure_text(text, label_style, Some(EDGE_LABEL_MAX_WIDTH)));
        let label_anchor = label
            .as_ref()
            .and_then(|_| longest_segment_midpoint(&best.points));
        routed.push(RoutedEdge {
            id: edge.id.clone(),
            from: edge.from.clone(),
            to: edge.to.clone(),
            kind: edge.kind,
            route: best.route,
            points: best.points,
            label,
            label_anchor,
            obstacle_hits: best.hits,
            cost: best.cost,
        });
    }
    Ok(routed)
}

pub(super) fn build_obstacles(layout: &Layout, edge: &Edge, padding: f32) -> Vec<Obstacle> {
    let boxes = layout
        .boxes
        .values()
        .filter(|b| b.id != edge.from && b.id != edge.to)
        .map(|b| Obstacle {
            id: b.id.clone(),
            rect: b.rect.inflate(padding),
        });
    let titles = layout
        .groups
        .iter()
        .filter(|g| !g.label.text().trim().is_empty())
        .map(|g| Obstacle {
            id: format!("{}#title", g.id),
            rect: g.title_text_rect(),
        });
    boxes.chain(titles).collect()
}

fn choose_route(ctx: &RouteContext<'_>, edge: &Edge, source: &Rect, target: &Rect) -> Candidate {
    let straight = aligned_candidates(source, target);
    match edge.route {
        RouteKind::Straight => score(ctx, edge.kind, closest_straight(source, target)),
        RouteKind::Auto if !straight.is_empty() => pick(ctx, edge.kind, straight, source, target),
        RouteKind::Auto | RouteKind::Orthogonal => {
            let mut raw = straight;
            raw.extend(orthogonal_candidates(ctx, source, target));
            pick(ctx, edge.kind, raw, source, target)
        }
    }
}

/// Scores every candidate and returns the cheapest. Candidates that cut
/// through their own endpoint boxes are only used when nothing else exists.
fn pick(
    ctx: &RouteContext<'_>,
    kind: EdgeKind,
    raw: Vec<RawPath>,
    source: &Rect,
    target: &Rect,
) -> Candidate {
    let (clean, dirty): (Vec<RawPath>, Vec<RawPath>) = raw
        .into_iter()
        .partition(|path| !crosses_endpoints(&path.points, source, target));
    let pool = if clean.is_empty() { dirty } else { clean };
    pool.into_iter()
        .map(|path| score(ctx, kind, path))
        .min_by(|a, b| a.compare(b))
        .unwrap_or_else(|| score(ctx, kind, closest_straight(source, target)))
}

fn crosses_endpoints(points: &[Point], source: &Rect, target: &Rect) -> bool {
    points.windows(2).any(|w| {
        segment_crosses_interior(w[0], w[1], source) || segment_crosses_interior(w[0], w[1], target)
    })
}

/// Unscored path with its tie-break key.
#[derive(Debug, Clone)]
struct RawPath {
    key: String,
    route: ResolvedRoute,
    points: Vec<Point>,
}

impl RawPath {
    fn orthogonal(key: String, points: Vec<Point>) -> Self {
        Self {
            key,
            route: ResolvedRoute::Orthogonal,
            points: compress_path(&points),
        }
    }
}

fn key(from: Side, to: Side, variant: &str) -> String {
    format!("{}-{}-{variant}", from.as_str(), to.as_str())
}

/// Direct segment between the closest pair of side midpoints.
fn closest_straight(source: &Rect, target: &Rect) -> RawPath {
    let sides = [Side::Left, Side::Right, Side::Top, Side::Bottom];
    let mut best: Option<(f32, Side, Side)> = None;
    for from in sides {
        for to in sides {
            let d = side_midpoint(source, from).distance(side_midpoint(target, to));
            if best.is_none_or(|(bd, _, _)| d < bd - COST_EPS) {
                best = Some((d, from, to));
            }
        }
    }
    let (_, from, to) = best.unwrap_or((0.0, Side::Right, Side::Left));
    RawPath {
        key: key(from, to, "straight"),
        route: ResolvedRoute::Straight,
        points: vec![side_midpoint(source, from), side_midpoint(target, to)],
    }
}

/// Axis-aligned single segments, available when the boxes share a band on
/// one axis.
fn aligned_candidates(source: &Rect, target: &Rect) -> Vec<RawPath> {
    let mut out = Vec::new();
    let top = source.y.max(target.y);
    let bottom = source.bottom().min(target.bottom());
    if bottom - top > 1.0 {
        let y = (top + bottom) / 2.0;
        if source.right() <= target.x {
            out.push(straight_path(Side::Right, Side::Left, Point::new(source.right(), y), Point::new(target.x, y)));
        } else if target.right() <= source.x {
            out.push(straight_path(Side::Left, Side::Right, Point::new(source.x, y), Point::new(target.right(), y)));
        }
    }
    let left = source.x.max(target.x);
    let right = source.right().min(target.right());
    if right - left > 1.0 {
        let x = (left + right) / 2.0;
        if source.bottom() <= target.y {
            out.push(straight_path(Side::Bottom, Side::Top, Point::new(x, source.bottom()), Point::new(x, target.y)));
        } else if target.bottom() <= source.y {
            out.push(straight_path(Side::Top, Side::Bottom, Point::new(x, source.y), Point::new(x, target.bottom())));
        }
    }
    out
}

fn straight_path(from: Side, to: Side, a: Point, b: Point) -> RawPath {
    RawPath {
        key: key(from, to, "aligned"),
        route: ResolvedRoute::Straight,
        points: vec![a, b],
    }
}

fn orthogonal_candidates(ctx: &RouteContext<'_>, source: &Rect, target: &Rect) -> Vec<RawPath> {
    let sc = source.center();
    let tc = target.center();
    let h_out = if tc.x >= sc.x { Side::Right } else { Side::Left };
    let h_in = if tc.x >= sc.x { Side::Left } else { Side::Right };
    let v_out = if tc.y >= sc.y { Side::Bottom } else { Side::Top };
    let v_in = if tc.y >= sc.y { Side::Top } else { Side::Bottom };
    let mut out = Vec::new();

    // Single bend: leave horizontally and enter vertically, or the reverse.
    let start = side_midpoint(source, h_out);
    let end = side_midpoint(target, v_in);
    out.push(RawPath::orthogonal(
        key(h_out, v_in, "l"),
        vec![start, Point::new(end.x, start.y), end],
    ));
    let start = side_midpoint(source, v_out);
    let end = side_midpoint(target, h_in);
    out.push(RawPath::orthogonal(
        key(v_out, h_in, "l"),
        vec![start, Point::new(start.x, end.y), end],
    ));

    // Double bend through a vertical channel between the boxes.
    let start = side_midpoint(source, h_out);
    let end = side_midpoint(target, h_in);
    let (lo, hi) = (start.x.min(end.x), start.x.max(end.x));
    let gap_open = match h_out {
        Side::Right => source.right() < target.x,
        _ => target.right() < source.x,
    };
    if gap_open {
        for (i, x) in channels(ctx, lo, hi, true).into_iter().enumerate() {
            out.push(RawPath::orthogonal(
                key(h_out, h_in, &format!("z{i:02}")),
                vec![start, Point::new(x, start.y), Point::new(x, end.y), end],
            ));
        }
    }

    // Double bend through a horizontal channel.
    let start = side_midpoint(source, v_out);
    let end = side_midpoint(target, v_in);
    let (lo, hi) = (start.y.min(end.y), start.y.max(end.y));
    let gap_open = match v_out {
        Side::Bottom => source.bottom() < target.y,
        _ => target.bottom() < source.y,
    };
    if gap_open {
        for (i, y) in channels(ctx, lo, hi, false).into_iter().enumerate() {
            out.push(RawPath::orthogonal(
                key(v_out, v_in, &format!("z{i:02}")),
                vec![start, Point::new(start.x, y), Point::new(end.x, y), end],
            ));
        }
    }

    // Detours around the outside of both boxes.
    let offset = DETOUR_OFFSET + ctx.clearance;
    for side in [Side::Right, Side::Left, Side::Bottom, Side::Top] {
        let a = side_midpoint(source, side);
        let b = side_midpoint(target, side);
        let points = match side {
            Side::Right => {
                let x = source.right().max(target.right()) + offset;
                vec![a, Point::new(x, a.y), Point::new(x, b.y), b]
            }
            Side::Left => {
                let x = source.x.min(target.x) - offset;
                vec![a, Point::new(x, a.y), Point::new(x, b.y), b]
            }
            Side::Bottom => {
                let y = source.bottom().max(target.bottom()) + offset;
                vec![a, Point::new(a.x, y), Point::new(b.x, y), b]
            }
            Side::Top => {
                let y = source.y.min(target.y) - offset;
                vec![a, Point::new(a.x, y), Point::new(b.x, y), b]
            }
        };
        out.push(RawPath::orthogonal(key(side, side, "u"), points));
    }
    out
}

/// Channel coordinates strictly between `lo` and `hi`: the midpoint plus the
/// borders of every padded obstacle that falls inside the span.
fn channels(ctx: &RouteContext<'_>, lo: f32, hi: f32, vertical: bool) -> Vec<f32> {
    let mut values = vec![(lo + hi) / 2.0];
    for obstacle in &ctx.obstacles {
        let (a, b) = if vertical {
            (obstacle.rect.x, obstacle.rect.right())
        } else {
            (obstacle.rect.y, obstacle.rect.bottom())
        };
        for v in [a, b] {
            if v > lo + 1.0 && v < hi - 1.0 {
                values.push(v);
            }
        }
    }
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|a, b| (*a - *b).abs() < 0.5);
    values
}

fn self_loop(rect: &Rect) -> RawPath {
    let x = rect.right() + SELF_LOOP_OFFSET;
    let y1 = rect.y + rect.height / 3.0;
    let y2 = rect.y + rect.height * 2.0 / 3.0;
    RawPath::orthogonal(
        key(Side::Right, Side::Right, "loop"),
        vec![
            Point::new(rect.right(), y1),
            Point::new(x, y1),
            Point::new(x, y2),
            Point::new(rect.right(), y2),
        ],
    )
}

fn score(ctx: &RouteContext<'_>, kind: EdgeKind, path: RawPath) -> Candidate {
    let w = ctx.weights;
    let length = path_length(&path.points);
    let bends = path_bend_count(&path.points);
    let mut hits = Vec::new();
    let mut proximity = 0.0f32;
    for obstacle in &ctx.obstacles {
        let hit = path
            .points
            .windows(2)
            .any(|seg| segment_intersects_rect(seg[0], seg[1], &obstacle.rect));
        if hit {
            hits.push(obstacle.id.clone());
            continue;
        }
        for seg in path.points.windows(2) {
            let d = obstacle.rect.distance_to_segment(seg[0], seg[1]);
            proximity += (ctx.clearance - d).max(0.0);
        }
    }
    let off_corridor = corridor_penalty(kind, &path.points);
    let cost = length * w.length
        + bends as f32 * w.turn
        + hits.len() as f32 * w.obstacle
        + proximity * w.proximity
        + off_corridor * w.corridor;
    Candidate {
        key: path.key,
        route: path.route,
        points: path.points,
        length,
        bends,
        hits,
        cost,
    }
}

/// Length travelled against the preferred axis of the edge kind: main flow
/// runs horizontally, risk and validation feedback vertically.
fn corridor_penalty(kind: EdgeKind, points: &[Point]) -> f32 {
    let prefer_horizontal = match kind {
        EdgeKind::Main => true,
        EdgeKind::Risk | EdgeKind::Validate => false,
        EdgeKind::Aux => return 0.0,
    };
    points
        .windows(2)
        .filter(|seg| is_axis_aligned(seg[0], seg[1]))
        .map(|seg| {
            let horizontal = (seg[0].y - seg[1].y).abs() <= 1e-4;
            if horizontal == prefer_horizontal {
                0.0
            } else {
                seg[0].distance(seg[1])
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::compute_layout;
    use crate::parser::parse_spec;

    fn route(raw: &str) -> (Layout, Vec<RoutedEdge>) {
        let mut config = Config::default();
        config.fonts.fast_text_metrics = true;
        let spec = parse_spec(raw).expect("valid spec").spec;
        let theme = config.theme();
        let layout = compute_layout(&spec, &theme, &config).expect("layout");
        let edges = route_edges(&spec, &layout, &theme, &config).expect("routes");
        (layout, edges)
    }

    fn assert_orthogonal(edge: &RoutedEdge) {
        for seg in edge.points.windows(2) {
            assert!(
                is_axis_aligned(seg[0], seg[1]),
                "edge {} has diagonal segment {:?}",
                edge.id,
                seg
            );
        }
    }

    #[test]
    fn far_apart_boxes_get_at_most_one_bend() {
        let raw = r#"{
            canvas: { width: 1200, height: 900 },
            groups: [
                { id: "a", label: "", boxes: [ { id: "src", label: "Source", pin: { x: 40, y: 40 } } ] },
                { id: "b", label: "", boxes: [ { id: "dst", label: "Target", pin: { x: 800, y: 600 } } ] },
            ],
            edges: [ { from: "src", to: "dst", route: "orthogonal" } ],
        }"#;
        let (_, edges) = route(raw);
        let edge = &edges[0];
        assert_orthogonal(edge);
        assert!(path_bend_count(&edge.points) <= 1, "{:?}", edge.points);
        assert!(edge.obstacle_hits.is_empty());
    }

    #[test]
    fn anchors_lie_on_box_borders() {
        let raw = r#"{
            canvas: { width: 900, height: 600 },
            groups: [ { id: "g", label: "Flow", boxes: [
                { id: "a", label: "A" }, { id: "b", label: "B" }, { id: "c", label: "C" },
            ] } ],
            edges: [ { from: "a", to: "c" }, { from: "c", to: "a", route: "straight" } ],
        }"#;
        let (layout, edges) = route(raw);
        for edge in &edges {
            let from = layout.boxes[&edge.from].rect;
            let to = layout.boxes[&edge.to].rect;
            let first = edge.points[0];
            let last = edge.points[edge.points.len() - 1];
            assert!(from.contains_point(first) && !from.inflate(-0.5).contains_point(first));
            assert!(to.contains_point(last) && !to.inflate(-0.5).contains_point(last));
        }
    }

    #[test]
    fn orthogonal_route_avoids_box_in_between() {
        let raw = r#"{
            canvas: { width: 1000, height: 500 },
            groups: [ { id: "g", label: "", boxes: [
                { id: "a", label: "A", pin: { x: 40, y: 200, width: 120, height: 60 } },
                { id: "m", label: "Middle", pin: { x: 400, y: 190, width: 120, height: 80 } },
                { id: "b", label: "B", pin: { x: 760, y: 200, width: 120, height: 60 } },
            ] } ],
            edges: [ { from: "a", to: "b", label: "detour" } ],
        }"#;
        let (_, edges) = route(raw);
        let edge = &edges[0];
        assert_orthogonal(edge);
        assert!(edge.obstacle_hits.is_empty(), "hits {:?}", edge.obstacle_hits);
        assert!(edge.points.len() > 2);
        assert!(edge.label_anchor.is_some());
    }

    #[test]
    fn auto_route_is_straight_when_aligned() {
        let raw = r#"{
            canvas: { width: 900, height: 400 },
            groups: [ { id: "g", label: "Row", columns: 2, boxes: [ { id: "a", label: "A" }, { id: "b", label: "B" } ] } ],
            edges: [ { from: "a", to: "b", route: "auto" } ],
        }"#;
        let (_, edges) = route(raw);
        assert_eq!(edges[0].route, ResolvedRoute::Straight);
        assert_eq!(edges[0].points.len(), 2);
    }

    #[test]
    fn routing_is_reproducible() {
        let raw = r#"{
            canvas: { width: 900, height: 600 },
            groups: [
                { id: "l", label: "Left", boxes: [ { id: "a", label: "A" }, { id: "b", label: "B" } ] },
                { id: "r", label: "Right", boxes: [ { id: "c", label: "C" }, { id: "d", label: "D" } ] },
            ],
            edges: [
                { from: "a", to: "d", kind: "risk" },
                { from: "b", to: "c", kind: "validate" },
                { from: "d", to: "a", kind: "aux" },
            ],
        }"#;
        let (_, first) = route(raw);
        let (_, second) = route(raw);
        assert_eq!(first, second);
        for edge in &first {
            assert_orthogonal(edge);
        }
    }

    #[test]
    fn corridor_penalty_prefers_axis_by_kind() {
        let horizontal = [Point::new(0.0, 0.0), Point::new(50.0, 0.0)];
        assert_eq!(corridor_penalty(EdgeKind::Main, &horizontal), 0.0);
        assert_eq!(corridor_penalty(EdgeKind::Risk, &horizontal), 50.0);
        assert_eq!(corridor_penalty(EdgeKind::Aux, &horizontal), 0.0);
    }
}
