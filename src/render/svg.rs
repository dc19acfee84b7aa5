
use crate::geometry::Point;
use crate::ir::EdgeKind;
use crate::layout::{Layout, RoutedEdge, TextBlock};
use crate::theme::Theme;

use super::{escape_xml, num};

const EDGE_KINDS: [EdgeKind; 4] = [EdgeKind::Main, EdgeKind::Aux, EdgeKind::Risk, EdgeKind::Validate];

fn kind_slug(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Main => "main",
        EdgeKind::Aux => "aux",
        EdgeKind::Risk => "risk",
        EdgeKind::Validate => "validate",
    }
}

/// Static SVG preview with the same z-order as the editable document: group
/// backgrounds, connectors, boxes.
pub fn render_svg(layout: &Layout, routes: &[RoutedEdge], theme: &Theme, line_height: f32) -> String {
    let width = num(layout.canvas.width);
    let height = num(layout.canvas.height);
    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">"
    ));
    svg.push_str(&format!(
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        theme.background
    ));

    svg.push_str("<defs>");
    for kind in EDGE_KINDS {
        svg.push_str(&format!(
            "<marker id=\"arrow-{}\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" markerWidth=\"7\" markerHeight=\"7\" orient=\"auto-start-reverse\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"{}\"/></marker>",
            kind_slug(kind),
            theme.edge_style(kind).stroke
        ));
    }
    svg.push_str("</defs>");

    if let Some(title) = &layout.title {
        let center = title.rect.center();
        svg.push_str(&text_block(
            center,
            &title.text,
            &theme.font_family,
            &theme.title_color,
            line_height,
            true,
        ));
    }

    for group in &layout.groups {
        let r = group.rect;
        svg.push_str(&format!(
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" rx=\"8\" ry=\"8\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1.2\"/>",
            num(r.x),
            num(r.y),
            num(r.width),
            num(r.height),
            theme.group_fill,
            theme.group_stroke
        ));
        svg.push_str(&text_block(
            group.title_rect.center(),
            &group.label,
            &theme.font_family,
            &theme.group_title_color,
            line_height,
            true,
        ));
    }

    for edge in routes {
        let style = theme.edge_style(edge.kind);
        let dash = if style.dashed {
            " stroke-dasharray=\"6 4\""
        } else {
            ""
        };
        svg.push_str(&format!(
            "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\"{dash} marker-end=\"url(#arrow-{})\"/>",
            points_to_path(&edge.points),
            style.stroke,
            num(style.stroke_width),
            kind_slug(edge.kind)
        ));
        if let (Some(label), Some(anchor), Some(rect)) =
            (&edge.label, edge.label_anchor, edge.label_rect())
        {
            svg.push_str(&format!(
                "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" rx=\"4\" ry=\"4\" fill=\"{}\"/>",
                num(rect.x),
                num(rect.y),
                num(rect.width),
                num(rect.height),
                theme.edge_label_background
            ));
            svg.push_str(&text_block(
                anchor,
                label,
                &theme.font_family,
                &theme.edge_label_color,
                line_height,
                false,
            ));
        }
    }

    for node in layout.boxes.values() {
        let style = theme.box_style(node.kind);
        let r = node.rect;
        svg.push_str(&format!(
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" rx=\"6\" ry=\"6\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{}\"/>",
            num(r.x),
            num(r.y),
            num(r.width),
            num(r.height),
            style.fill,
            style.stroke,
            num(style.stroke_width)
        ));
        svg.push_str(&text_block(
            r.center(),
            &node.label,
            &theme.font_family,
            &style.text,
            line_height,
            false,
        ));
    }

    svg.push_str("</svg>");
    svg
}

fn points_to_path(points: &[Point]) -> String {
    let mut d = String::new();
    for (idx, p) in points.iter().enumerate() {
        let cmd = if idx == 0 { "M" } else { " L" };
        d.push_str(&format!("{cmd} {} {}", num(p.x), num(p.y)));
    }
    d
}

fn text_block(
    center: Point,
    label: &TextBlock,
    font_family: &str,
    fill: &str,
    line_height: f32,
    bold: bool,
) -> String {
    let step = label.font_size * line_height;
    let total = label.lines.len() as f32 * step;
    // Baseline of the first line, approximating ascent as 0.8em.
    let first = center.y - total / 2.0 + (step - label.font_size) / 2.0 + label.font_size * 0.8;
    let weight = if bold { " font-weight=\"bold\"" } else { "" };
    let mut text = String::new();
    text.push_str(&format!(
        "<text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\"{weight}>",
        num(center.x),
        num(first),
        escape_xml(font_family),
        num(label.font_size),
        escape_xml(fill)
    ));
    for (idx, line) in label.lines.iter().enumerate() {
        let dy = if idx == 0 { 0.0 } else { step };
        text.push_str(&format!(
            "<tspan x=\"{}\" dy=\"{}\">{}</tspan>",
            num(center.x),
            num(dy),
            escape_xml(line)
        ));
    }
    text.push_str("</text>");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::layout::{compute_layout, route_edges};
    use crate::parser::parse_spec;

    #[test]
    fn svg_contains_every_label_in_z_order() {
        let raw = r#"{
            title: "A & B",
            canvas: { width: 800, height: 400 },
            groups: [ { id: "g", label: "Stage", boxes: [ { id: "a", label: "Alpha" }, { id: "b", label: "Beta <2>" } ] } ],
            edges: [ { from: "a", to: "b", label: "feeds" } ],
        }"#;
        let mut config = Config::default();
        config.fonts.fast_text_metrics = true;
        let spec = parse_spec(raw).unwrap().spec;
        let theme = config.theme();
        let layout = compute_layout(&spec, &theme, &config).unwrap();
        let routes = route_edges(&spec, &layout, &theme, &config).unwrap();
        let svg = render_svg(&layout, &routes, &theme, config.fonts.line_height);
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("A &amp; B"));
        assert!(svg.contains("Beta &lt;2&gt;"));
        let group_at = svg.find(">Stage<").unwrap();
        let edge_at = svg.find("marker-end").unwrap();
        let box_at = svg.find(">Alpha<").unwrap();
        assert!(group_at < edge_at && edge_at < box_at);
    }
}
