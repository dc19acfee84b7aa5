use serde::{Deserialize, Serialize};

use crate::config::EvaluationConfig;
use crate::geometry::{Rect, Size, is_axis_aligned, segment_crosses_interior, segments_cross};
use crate::ir::{CanvasMode, DiagramSpec};
use crate::layout::{Layout, ResolvedRoute, RoutedEdge};
use crate::theme::{Theme, contrast_ratio};

/// Intersections smaller than this (px²) are rounding noise.
const MIN_OVERLAP_AREA: f32 = 0.01;

pub struct MeasureInput<'a> {
    pub spec: &'a DiagramSpec,
    pub layout: &'a Layout,
    pub routes: &'a [RoutedEdge],
    pub theme: &'a Theme,
    pub evaluation: &'a EvaluationConfig,
    pub raster_hash: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapMeasure {
    pub a: String,
    pub b: String,
    pub area: f32,
    /// Overlap area over the area of the smaller rectangle.
    pub ratio: f32,
}

/// A rectangle that sticks out of the one that should contain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub subject: String,
    pub container: String,
    pub excess: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxMeasure {
    pub id: String,
    pub font_px: f32,
    pub effective_font_px: f32,
    /// Text block area over box area.
    pub density: f32,
    pub text_overflow: f32,
    pub contrast: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextRole {
    Title,
    GroupTitle,
    EdgeLabel,
}

/// Subject of the diagram title. Ids never contain `#`, so it cannot clash
/// with a box, group or edge.
pub const TITLE_SUBJECT: &str = "#title";

/// Text that does not live in a box: the title, group titles, edge labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMeasure {
    pub subject: String,
    pub role: TextRole,
    pub font_px: f32,
    pub effective_font_px: f32,
    pub contrast: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crossing {
    pub a: String,
    pub b: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeHit {
    pub edge: String,
    pub obstacles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelOverlap {
    pub edge: String,
    pub other: String,
    pub area: f32,
}

/// Un-judged facts about one rendered round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub canvas: Size,
    pub canvas_fixed: bool,
    pub canvas_expanded: bool,
    pub print_scale: f32,
    pub content_bounds: Option<Rect>,
    /// Smallest distance between content and a canvas edge; negative when
    /// content extends past the canvas.
    pub min_margin: Option<f32>,
    pub canvas_overflow: f32,
    pub box_overlaps: Vec<OverlapMeasure>,
    pub group_overlaps: Vec<OverlapMeasure>,
    pub containment: Vec<Membership>,
    pub boxes: Vec<BoxMeasure>,
    pub texts: Vec<TextMeasure>,
    pub crossings: Vec<Crossing>,
    pub edge_hits: Vec<EdgeHit>,
    pub label_overlaps: Vec<LabelOverlap>,
    /// Orthogonal edges with a diagonal segment.
    pub non_orthogonal: Vec<String>,
    pub raster_hash: Option<String>,
}

impl Measurements {
    pub fn total_crossings(&self) -> usize {
        self.crossings.iter().map(|c| c.count).sum()
    }
}

pub fn measure(input: &MeasureInput<'_>) -> Measurements {
    let layout = input.layout;
    let canvas = layout.canvas;
    let print_scale = input
        .evaluation
        .print_width
        .filter(|w| *w > 0.0 && canvas.width > 0.0)
        .map(|w| (w / canvas.width).min(1.0))
        .unwrap_or(1.0);

    let content_bounds = layout.content_bounds();
    let (min_margin, canvas_overflow) = match content_bounds {
        Some(bounds) => {
            let margins = [
                bounds.x,
                bounds.y,
                canvas.width - bounds.right(),
                canvas.height - bounds.bottom(),
            ];
            let min = margins.iter().copied().fold(f32::INFINITY, f32::min);
            (Some(min), (-min).max(0.0))
        }
        None => (None, 0.0),
    };

    Measurements {
        canvas,
        canvas_fixed: input.spec.canvas.mode == CanvasMode::Fixed,
        canvas_expanded: layout.canvas_expanded,
        print_scale,
        content_bounds,
        min_margin,
        canvas_overflow,
        box_overlaps: overlaps(layout.boxes.values().map(|b| (b.id.as_str(), &b.rect))),
        group_overlaps: overlaps(layout.groups.iter().map(|g| (g.id.as_str(), &g.rect))),
        containment: containment(layout),
        boxes: box_measures(input, print_scale),
        texts: text_measures(input, print_scale),
        crossings: crossings(input.routes),
        edge_hits: edge_hits(layout, input.routes),
        label_overlaps: label_overlaps(layout, input.routes),
        non_orthogonal: input
            .routes
            .iter()
            .filter(|r| r.route == ResolvedRoute::Orthogonal)
            .filter(|r| r.points.windows(2).any(|w| !is_axis_aligned(w[0], w[1])))
            .map(|r| r.id.clone())
            .collect(),
        raster_hash: input.raster_hash.map(str::to_string),
    }
}

fn overlaps<'a>(items: impl Iterator<Item = (&'a str, &'a Rect)>) -> Vec<OverlapMeasure> {
    let items: Vec<_> = items.collect();
    let mut out = Vec::new();
    for (i, (a_id, a)) in items.iter().enumerate() {
        for (b_id, b) in &items[i + 1..] {
            let Some(overlap) = a.intersection(b) else {
                continue;
            };
            let area = overlap.area();
            if area <= MIN_OVERLAP_AREA {
                continue;
            }
            let smaller = a.area().min(b.area()).max(f32::EPSILON);
            out.push(OverlapMeasure {
                a: a_id.to_string(),
                b: b_id.to_string(),
                area,
                ratio: area / smaller,
            });
        }
    }
    out
}

fn excess_outside(inner: &Rect, outer: &Rect) -> f32 {
    [
        outer.x - inner.x,
        outer.y - inner.y,
        inner.right() - outer.right(),
        inner.bottom() - outer.bottom(),
    ]
    .into_iter()
    .fold(0.0, f32::max)
}

fn containment(layout: &Layout) -> Vec<Membership> {
    let mut out = Vec::new();
    for node in layout.boxes.values() {
        let Some(group) = layout.group(&node.group) else {
            out.push(Membership {
                subject: node.id.clone(),
                container: node.group.clone(),
                excess: node.rect.width.max(node.rect.height),
            });
            continue;
        };
        let excess = excess_outside(&node.rect, &group.rect);
        if excess > 0.5 {
            out.push(Membership {
                subject: node.id.clone(),
                container: group.id.clone(),
                excess,
            });
        }
    }
    let canvas = layout.canvas_rect();
    for group in &layout.groups {
        let excess = excess_outside(&group.rect, &canvas);
        if excess > 0.5 {
            out.push(Membership {
                subject: group.id.clone(),
                container: "canvas".to_string(),
                excess,
            });
        }
    }
    out
}

fn box_measures(input: &MeasureInput<'_>, print_scale: f32) -> Vec<BoxMeasure> {
    input
        .layout
        .boxes
        .values()
        .map(|node| {
            let style = input.theme.box_style(node.kind);
            let area = node.rect.area().max(f32::EPSILON);
            BoxMeasure {
                id: node.id.clone(),
                font_px: node.font_size,
                effective_font_px: node.font_size * print_scale,
                density: (node.label.width * node.label.height) / area,
                text_overflow: node.text_overflow,
                contrast: contrast_ratio(&style.text, &style.fill),
            }
        })
        .collect()
}

fn text_measures(input: &MeasureInput<'_>, print_scale: f32) -> Vec<TextMeasure> {
    let theme = input.theme;
    let mut out = Vec::new();
    if let Some(title) = &input.layout.title {
        out.push(TextMeasure {
            subject: TITLE_SUBJECT.to_string(),
            role: TextRole::Title,
            font_px: title.text.font_size,
            effective_font_px: title.text.font_size * print_scale,
            contrast: contrast_ratio(&theme.title_color, &theme.background),
        });
    }
    for group in &input.layout.groups {
        if group.label.lines.is_empty() {
            continue;
        }
        out.push(TextMeasure {
            subject: format!("{}#title", group.id),
            role: TextRole::GroupTitle,
            font_px: group.label.font_size,
            effective_font_px: group.label.font_size * print_scale,
            contrast: contrast_ratio(&theme.group_title_color, &theme.group_fill),
        });
    }
    for route in input.routes {
        if let Some(label) = &route.label {
            out.push(TextMeasure {
                subject: format!("{}#label", route.id),
                role: TextRole::EdgeLabel,
                font_px: label.font_size,
                effective_font_px: label.font_size * print_scale,
                contrast: contrast_ratio(&theme.edge_label_color, &theme.edge_label_background),
            });
        }
    }
    out
}

fn crossings(routes: &[RoutedEdge]) -> Vec<Crossing> {
    let mut out = Vec::new();
    for (i, a) in routes.iter().enumerate() {
        for b in &routes[i + 1..] {
            let mut count = 0;
            for sa in a.points.windows(2) {
                for sb in b.points.windows(2) {
                    if segments_cross(sa[0], sa[1], sb[0], sb[1]) {
                        count += 1;
                    }
                }
            }
            if count > 0 {
                out.push(Crossing {
                    a: a.id.clone(),
                    b: b.id.clone(),
                    count,
                });
            }
        }
    }
    out
}

fn edge_hits(layout: &Layout, routes: &[RoutedEdge]) -> Vec<EdgeHit> {
    let mut out = Vec::new();
    for route in routes {
        let mut obstacles = Vec::new();
        for node in layout.boxes.values() {
            if node.id == route.from || node.id == route.to {
                continue;
            }
            if route
                .points
                .windows(2)
                .any(|w| segment_crosses_interior(w[0], w[1], &node.rect))
            {
                obstacles.push(node.id.clone());
            }
        }
        for group in &layout.groups {
            let title = group.title_text_rect();
            if route
                .points
                .windows(2)
                .any(|w| segment_crosses_interior(w[0], w[1], &title))
            {
                obstacles.push(format!("{}#title", group.id));
            }
        }
        if !obstacles.is_empty() {
            out.push(EdgeHit {
                edge: route.id.clone(),
                obstacles,
            });
        }
    }
    out
}

fn label_overlaps(layout: &Layout, routes: &[RoutedEdge]) -> Vec<LabelOverlap> {
    let labels: Vec<(&str, Rect)> = routes
        .iter()
        .filter_map(|r| r.label_rect().map(|rect| (r.id.as_str(), rect)))
        .collect();
    let mut out = Vec::new();
    for (i, (edge, rect)) in labels.iter().enumerate() {
        for node in layout.boxes.values() {
            if let Some(hit) = rect.intersection(&node.rect)
                && hit.area() > MIN_OVERLAP_AREA
            {
                out.push(LabelOverlap {
                    edge: edge.to_string(),
                    other: node.id.clone(),
                    area: hit.area(),
                });
            }
        }
        for (other, other_rect) in &labels[i + 1..] {
            if let Some(hit) = rect.intersection(other_rect)
                && hit.area() > MIN_OVERLAP_AREA
            {
                out.push(LabelOverlap {
                    edge: edge.to_string(),
                    other: format!("{other}#label"),
                    area: hit.area(),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::layout::{compute_layout, route_edges};
    use crate::parser::parse_spec;

    fn measure_raw(raw: &str, config: &Config) -> Measurements {
        let spec = parse_spec(raw).unwrap().spec;
        let theme = config.theme();
        let layout = compute_layout(&spec, &theme, config).unwrap();
        let routes = route_edges(&spec, &layout, &theme, config).unwrap();
        measure(&MeasureInput {
            spec: &spec,
            layout: &layout,
            routes: &routes,
            theme: &theme,
            evaluation: &config.evaluation,
            raster_hash: None,
        })
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.fonts.fast_text_metrics = true;
        config
    }

    #[test]
    fn identical_pins_overlap_completely() {
        let raw = r#"{
            canvas: { width: 800, height: 600 },
            groups: [ { id: "g", label: "G", boxes: [
                { id: "a", label: "A", pin: { x: 100, y: 100, width: 120, height: 60 } },
                { id: "b", label: "B", pin: { x: 100, y: 100, width: 120, height: 60 } },
                { id: "c", label: "C" },
            ] } ],
        }"#;
        let m = measure_raw(raw, &fast_config());
        let hit = m
            .box_overlaps
            .iter()
            .find(|o| o.a == "a" && o.b == "b")
            .expect("pinned boxes overlap");
        assert!((hit.ratio - 1.0).abs() < 1e-3);
        assert!(hit.area > 0.0);
    }

    #[test]
    fn clean_layout_has_no_structural_findings() {
        let raw = r#"{
            canvas: { width: 900, height: 500 },
            groups: [
                { id: "in", label: "In", boxes: [ { id: "a", label: "Load" } ] },
                { id: "out", label: "Out", boxes: [ { id: "b", label: "Store" } ] },
            ],
            edges: [ { from: "a", to: "b" } ],
        }"#;
        let m = measure_raw(raw, &fast_config());
        assert!(m.box_overlaps.is_empty());
        assert!(m.group_overlaps.is_empty());
        assert!(m.containment.is_empty());
        assert!(m.non_orthogonal.is_empty());
        assert_eq!(m.canvas_overflow, 0.0);
        assert!(m.min_margin.unwrap() >= 0.0);
    }

    #[test]
    fn print_scale_reduces_effective_font() {
        let raw = r#"{
            canvas: { width: 1000, height: 400, mode: "fixed" },
            groups: [ { id: "g", label: "G", boxes: [ { id: "a", label: "A" } ] } ],
        }"#;
        let mut config = fast_config();
        config.evaluation.print_width = Some(500.0);
        let m = measure_raw(raw, &config);
        assert!((m.print_scale - 0.5).abs() < 1e-6);
        let b = &m.boxes[0];
        assert!((b.effective_font_px - b.font_px * 0.5).abs() < 1e-4);
    }

    #[test]
    fn measurement_is_deterministic() {
        let raw = r#"{
            canvas: { width: 700, height: 400 },
            groups: [ { id: "g", label: "G", boxes: [ { id: "a", label: "A" }, { id: "b", label: "B" }, { id: "c", label: "C" } ] } ],
            edges: [ { from: "a", to: "c" }, { from: "b", to: "c", label: "x" } ],
        }"#;
        let config = fast_config();
        assert_eq!(measure_raw(raw, &config), measure_raw(raw, &config));
    }
}
