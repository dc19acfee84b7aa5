use serde::{Deserialize, Serialize};

use crate::layout::LayoutTemplate;

/// Validated, normalized diagram description. Every id is filled in and
/// every edge endpoint is stored as a resolved box id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramSpec {
    #[serde(default)]
    pub title: String,
    pub canvas: CanvasSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<LayoutTemplate>,
    pub groups: Vec<Group>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSpec {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub mode: CanvasMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanvasMode {
    /// Layout fits content into the declared canvas and never enlarges it.
    Fixed,
    /// Layout may grow the canvas to avoid overlap and shrink it to content.
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
    pub boxes: Vec<BoxSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpec {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub kind: BoxKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<Pin>,
}

/// Explicit geometry for a box, in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum BoxKind {
    #[default]
    Default,
    Primary,
    Secondary,
    Highlight,
    Risk,
    Muted,
}

impl BoxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BoxKind::Default => "default",
            BoxKind::Primary => "primary",
            BoxKind::Secondary => "secondary",
            BoxKind::Highlight => "highlight",
            BoxKind::Risk => "risk",
            BoxKind::Muted => "muted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Input,
    Process,
    Output,
    Support,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub kind: EdgeKind,
    #[serde(default)]
    pub route: RouteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    #[default]
    Main,
    Aux,
    Risk,
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    #[default]
    Orthogonal,
    Straight,
    Auto,
}

impl DiagramSpec {
    pub fn boxes(&self) -> impl Iterator<Item = (&Group, &BoxSpec)> {
        self.groups
            .iter()
            .flat_map(|group| group.boxes.iter().map(move |b| (group, b)))
    }

    pub fn find_box(&self, id: &str) -> Option<(&Group, &BoxSpec)> {
        self.boxes().find(|(_, b)| b.id == id)
    }

    pub fn box_count(&self) -> usize {
        self.groups.iter().map(|g| g.boxes.len()).sum()
    }
}

/// Lowercase ASCII slug used for generated ids.
pub fn slugify(text: &str) -> String {
    let mut out = String::new();
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        out.push_str("box");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Data  Collection (v2)"), "data-collection-v2");
        assert_eq!(slugify("  "), "box");
        assert_eq!(slugify("数据"), "box");
    }
}
