use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, Size};
use crate::ir::{BoxKind, EdgeKind, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
    /// Width by which the widest unbreakable word exceeds the wrap width.
    #[serde(default)]
    pub overflow: f32,
}

impl TextBlock {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Named arrangement presets. `Auto` is resolved to a concrete preset before
/// layout begins and never appears in a [`Layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutTemplate {
    #[default]
    Classic,
    ThreeColumn,
    LayeredPipeline,
    PackedThreeColumn,
    Auto,
}

impl LayoutTemplate {
    pub fn as_str(self) -> &'static str {
        match self {
            LayoutTemplate::Classic => "classic",
            LayoutTemplate::ThreeColumn => "three-column",
            LayoutTemplate::LayeredPipeline => "layered-pipeline",
            LayoutTemplate::PackedThreeColumn => "packed-three-column",
            LayoutTemplate::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleLayout {
    pub text: TextBlock,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLayout {
    pub id: String,
    pub label: TextBlock,
    pub role: Option<Role>,
    pub rect: Rect,
    pub title_rect: Rect,
    pub columns: usize,
    /// Member box ids in spec order.
    pub boxes: Vec<String>,
}

impl GroupLayout {
    /// Area covered by the title text, centred in the title bar.
    pub fn title_text_rect(&self) -> Rect {
        let width = (self.label.width + 8.0).min(self.title_rect.width);
        Rect::new(
            self.title_rect.center().x - width / 2.0,
            self.title_rect.y + 2.0,
            width,
            (self.title_rect.height - 4.0).max(0.0),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxLayout {
    pub id: String,
    pub group: String,
    pub label: TextBlock,
    pub rect: Rect,
    pub font_size: f32,
    pub text_overflow: f32,
    pub kind: BoxKind,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub canvas: Size,
    /// The content did not fit the declared canvas and the canvas was grown.
    pub canvas_expanded: bool,
    pub template: LayoutTemplate,
    pub title: Option<TitleLayout>,
    pub groups: Vec<GroupLayout>,
    pub boxes: BTreeMap<String, BoxLayout>,
}

impl Layout {
    pub fn canvas_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.canvas.width, self.canvas.height)
    }

    /// Union of every group, box and title rectangle.
    pub fn content_bounds(&self) -> Option<Rect> {
        let rects = self
            .groups
            .iter()
            .map(|g| &g.rect)
            .chain(self.boxes.values().map(|b| &b.rect))
            .chain(self.title.iter().map(|t| &t.rect));
        crate::geometry::bounding_rect(rects)
    }

    pub fn group(&self, id: &str) -> Option<&GroupLayout> {
        self.groups.iter().find(|g| g.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedRoute {
    Straight,
    Orthogonal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub route: ResolvedRoute,
    /// Source anchor, waypoints, target anchor.
    pub points: Vec<Point>,
    pub label: Option<TextBlock>,
    pub label_anchor: Option<Point>,
    /// Boxes or group title bars the chosen path passes through.
    pub obstacle_hits: Vec<String>,
    pub cost: f32,
}

impl RoutedEdge {
    pub fn waypoints(&self) -> &[Point] {
        if self.points.len() <= 2 {
            &[]
        } else {
            &self.points[1..self.points.len() - 1]
        }
    }

    /// Label rectangle centred on the anchor.
    pub fn label_rect(&self) -> Option<Rect> {
        let label = self.label.as_ref()?;
        let anchor = self.label_anchor?;
        Some(Rect::new(
            anchor.x - label.width / 2.0 - 4.0,
            anchor.y - label.height / 2.0 - 2.0,
            label.width + 8.0,
            label.height + 4.0,
        ))
    }
}
