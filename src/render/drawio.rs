//! Editable draw.io (`mxfile`) document codec.
//!
//! Every cell hangs off the default layer with absolute geometry. Group
//! membership is recorded in the `schemGroup` style key rather than by
//! nesting, so editing a group in draw.io never moves its boxes implicitly.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::RenderIntegrityError;
use crate::geometry::{Point, Rect};
use crate::ir::DiagramSpec;
use crate::layout::{BoxLayout, Layout, ResolvedRoute, RoutedEdge};
use crate::theme::Theme;

use super::{escape_xml, num};

/// Cell counts reported by a successful preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    pub cells: usize,
    pub vertices: usize,
    pub edges: usize,
}

pub fn group_cell_id(id: &str) -> String {
    format!("grp-{id}")
}

pub fn box_cell_id(id: &str) -> String {
    format!("box-{id}")
}

pub fn edge_cell_id(id: &str) -> String {
    format!("edge-{id}")
}

/// Serializes a laid-out, routed diagram. The output carries no timestamps,
/// so encoding the same inputs twice yields identical bytes.
pub fn encode(spec: &DiagramSpec, layout: &Layout, routes: &[RoutedEdge], theme: &Theme) -> String {
    let name = if spec.title.trim().is_empty() {
        "Diagram".to_string()
    } else {
        spec.title.trim().to_string()
    };
    let mut xml = String::new();
    xml.push_str("<mxfile host=\"schematic-engine\" type=\"device\">\n");
    xml.push_str(&format!(
        "  <diagram id=\"schematic\" name=\"{}\">\n",
        escape_xml(&name)
    ));
    xml.push_str(&format!(
        "    <mxGraphModel dx=\"0\" dy=\"0\" grid=\"1\" gridSize=\"10\" guides=\"1\" tooltips=\"1\" connect=\"1\" arrows=\"1\" fold=\"1\" page=\"1\" pageScale=\"1\" pageWidth=\"{}\" pageHeight=\"{}\" background=\"{}\" math=\"0\" shadow=\"0\">\n",
        num(layout.canvas.width),
        num(layout.canvas.height),
        theme.background
    ));
    xml.push_str("      <root>\n");
    xml.push_str("        <mxCell id=\"0\"/>\n");
    xml.push_str("        <mxCell id=\"1\" parent=\"0\"/>\n");

    if let Some(title) = &layout.title {
        let style = format!(
            "text;html=1;align=center;verticalAlign=middle;fontStyle=1;fontSize={};fontColor={};fontFamily={};",
            num(title.text.font_size),
            theme.title_color,
            first_family(&theme.font_family)
        );
        vertex(&mut xml, "title", &title.text.text(), &style, &title.rect);
    }

    for group in &layout.groups {
        let style = format!(
            "rounded=1;arcSize=4;whiteSpace=wrap;html=1;verticalAlign=top;align=center;spacingTop=6;fontStyle=1;fontSize={};fillColor={};strokeColor={};fontColor={};fontFamily={};container=0;schemRole={};",
            num(group.label.font_size),
            theme.group_fill,
            theme.group_stroke,
            theme.group_title_color,
            first_family(&theme.font_family),
            group
                .role
                .map(|r| format!("{r:?}").to_ascii_lowercase())
                .unwrap_or_else(|| "none".to_string())
        );
        vertex(
            &mut xml,
            &group_cell_id(&group.id),
            &group.label.text(),
            &style,
            &group.rect,
        );
    }

    for edge in routes {
        let (Some(source), Some(target)) = (layout.boxes.get(&edge.from), layout.boxes.get(&edge.to))
        else {
            continue;
        };
        connector(&mut xml, edge, source, target, theme);
    }

    for node in layout.boxes.values() {
        let style = theme.box_style(node.kind);
        let cell_style = format!(
            "rounded=1;arcSize=10;whiteSpace=wrap;html=1;fontSize={};fillColor={};strokeColor={};strokeWidth={};fontColor={};fontFamily={};schemGroup={};schemKind={:?};",
            num(node.font_size),
            style.fill,
            style.stroke,
            num(style.stroke_width),
            style.text,
            first_family(&theme.font_family),
            node.group,
            node.kind
        );
        vertex(
            &mut xml,
            &box_cell_id(&node.id),
            &node.label.text(),
            &cell_style,
            &node.rect,
        );
    }

    xml.push_str("      </root>\n");
    xml.push_str("    </mxGraphModel>\n");
    xml.push_str("  </diagram>\n");
    xml.push_str("</mxfile>\n");
    xml
}

fn first_family(stack: &str) -> String {
    stack
        .split(',')
        .next()
        .map(|f| f.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "Helvetica".to_string())
}

fn vertex(xml: &mut String, id: &str, value: &str, style: &str, rect: &Rect) {
    xml.push_str(&format!(
        "        <mxCell id=\"{}\" value=\"{}\" style=\"{}\" vertex=\"1\" parent=\"1\">\n",
        escape_xml(id),
        escape_xml(&value.replace('\n', "<br>")),
        escape_xml(style)
    ));
    xml.push_str(&format!(
        "          <mxGeometry x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" as=\"geometry\"/>\n",
        num(rect.x),
        num(rect.y),
        num(rect.width),
        num(rect.height)
    ));
    xml.push_str("        </mxCell>\n");
}

/// Relative position of `p` on `rect`, as draw.io expects for exit/entry
/// constraints.
fn relative(p: Point, rect: &Rect) -> (f32, f32) {
    let rx = if rect.width > 0.0 {
        ((p.x - rect.x) / rect.width).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let ry = if rect.height > 0.0 {
        ((p.y - rect.y) / rect.height).clamp(0.0, 1.0)
    } else {
        0.5
    };
    (rx, ry)
}

fn connector(xml: &mut String, edge: &RoutedEdge, source: &BoxLayout, target: &BoxLayout, theme: &Theme) {
    let style = theme.edge_style(edge.kind);
    let first = edge.points.first().copied().unwrap_or(source.rect.center());
    let last = edge.points.last().copied().unwrap_or(target.rect.center());
    let (exit_x, exit_y) = relative(first, &source.rect);
    let (entry_x, entry_y) = relative(last, &target.rect);
    let edge_style = match edge.route {
        ResolvedRoute::Orthogonal => "edgeStyle=orthogonalEdgeStyle;",
        ResolvedRoute::Straight => "edgeStyle=none;",
    };
    let cell_style = format!(
        "{edge_style}rounded=0;html=1;endArrow=block;endFill=1;strokeColor={};strokeWidth={};dashed={};fontSize={};fontColor={};labelBackgroundColor={};exitX={};exitY={};exitDx=0;exitDy=0;entryX={};entryY={};entryDx=0;entryDy=0;schemKind={:?};",
        style.stroke,
        num(style.stroke_width),
        u8::from(style.dashed),
        num(edge.label.as_ref().map(|l| l.font_size).unwrap_or(12.0)),
        theme.edge_label_color,
        theme.edge_label_background,
        num(exit_x),
        num(exit_y),
        num(entry_x),
        num(entry_y),
        edge.kind
    );
    let value = edge.label.as_ref().map(|l| l.text()).unwrap_or_default();
    xml.push_str(&format!(
        "        <mxCell id=\"{}\" value=\"{}\" style=\"{}\" edge=\"1\" parent=\"1\" source=\"{}\" target=\"{}\">\n",
        escape_xml(&edge_cell_id(&edge.id)),
        escape_xml(&value.replace('\n', "<br>")),
        escape_xml(&cell_style),
        escape_xml(&box_cell_id(&edge.from)),
        escape_xml(&box_cell_id(&edge.to))
    ));
    xml.push_str("          <mxGeometry relative=\"1\" as=\"geometry\">\n");
    xml.push_str(&format!(
        "            <mxPoint x=\"{}\" y=\"{}\" as=\"sourcePoint\"/>\n",
        num(first.x),
        num(first.y)
    ));
    xml.push_str(&format!(
        "            <mxPoint x=\"{}\" y=\"{}\" as=\"targetPoint\"/>\n",
        num(last.x),
        num(last.y)
    ));
    let waypoints = edge.waypoints();
    if !waypoints.is_empty() {
        xml.push_str("            <Array as=\"points\">\n");
        for p in waypoints {
            xml.push_str(&format!(
                "              <mxPoint x=\"{}\" y=\"{}\"/>\n",
                num(p.x),
                num(p.y)
            ));
        }
        xml.push_str("            </Array>\n");
    }
    xml.push_str("          </mxGeometry>\n");
    xml.push_str("        </mxCell>\n");
}

fn fail(reason: impl Into<String>) -> RenderIntegrityError {
    RenderIntegrityError::new(reason)
}

fn finite_attr(node: roxmltree::Node<'_, '_>, name: &str, cell: &str) -> Result<f32, RenderIntegrityError> {
    let raw = node.attribute(name).unwrap_or("0");
    let value: f32 = raw
        .parse()
        .map_err(|_| fail(format!("cell {cell}: attribute {name}=\"{raw}\" is not a number")))?;
    if !value.is_finite() {
        return Err(fail(format!("cell {cell}: attribute {name} is not finite")));
    }
    Ok(value)
}

/// Well-formedness check run before anything is rasterized or measured.
pub fn preflight(xml: &str) -> Result<DocumentStats, RenderIntegrityError> {
    let doc = roxmltree::Document::parse(xml).map_err(|err| fail(format!("malformed XML: {err}")))?;
    let root = doc.root_element();
    if root.tag_name().name() != "mxfile" {
        return Err(fail(format!(
            "root element is <{}>, expected <mxfile>",
            root.tag_name().name()
        )));
    }
    let cells_root = root
        .descendants()
        .find(|n| n.has_tag_name("root"))
        .ok_or_else(|| fail("missing <root> element"))?;

    let cells: Vec<_> = cells_root
        .children()
        .filter(|n| n.has_tag_name("mxCell"))
        .collect();
    let mut ids: HashSet<&str> = HashSet::new();
    for cell in &cells {
        let id = cell.attribute("id").ok_or_else(|| fail("cell without id"))?;
        if !ids.insert(id) {
            return Err(fail(format!("duplicate cell id \"{id}\"")));
        }
    }
    for required in ["0", "1"] {
        if !ids.contains(required) {
            return Err(fail(format!("missing root cell \"{required}\"")));
        }
    }

    let mut stats = DocumentStats {
        cells: cells.len(),
        ..DocumentStats::default()
    };
    let vertex_ids: BTreeSet<&str> = cells
        .iter()
        .filter(|c| c.attribute("vertex") == Some("1"))
        .filter_map(|c| c.attribute("id"))
        .collect();
    for cell in &cells {
        let id = cell.attribute("id").unwrap_or_default();
        if let Some(parent) = cell.attribute("parent")
            && !ids.contains(parent)
        {
            return Err(fail(format!("cell {id}: unknown parent \"{parent}\"")));
        }
        let geometry = cell.children().find(|n| n.has_tag_name("mxGeometry"));
        if cell.attribute("vertex") == Some("1") {
            stats.vertices += 1;
            let geometry = geometry.ok_or_else(|| fail(format!("vertex {id} has no geometry")))?;
            finite_attr(geometry, "x", id)?;
            finite_attr(geometry, "y", id)?;
            let w = finite_attr(geometry, "width", id)?;
            let h = finite_attr(geometry, "height", id)?;
            if w <= 0.0 || h <= 0.0 {
                return Err(fail(format!("vertex {id} has empty geometry")));
            }
        }
        if cell.attribute("edge") == Some("1") {
            stats.edges += 1;
            for end in ["source", "target"] {
                let other = cell
                    .attribute(end)
                    .ok_or_else(|| fail(format!("edge {id} has no {end}")))?;
                if !vertex_ids.contains(other) {
                    return Err(fail(format!("edge {id}: {end} \"{other}\" does not exist")));
                }
            }
            if let Some(geometry) = geometry {
                for point in geometry.descendants().filter(|n| n.has_tag_name("mxPoint")) {
                    finite_attr(point, "x", id)?;
                    finite_attr(point, "y", id)?;
                }
            }
        }
    }
    Ok(stats)
}
