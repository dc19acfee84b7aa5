use crate::ir::{BoxKind, EdgeKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindStyle {
    pub fill: String,
    pub stroke: String,
    pub text: String,
    pub stroke_width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeStyle {
    pub stroke: String,
    pub stroke_width: f32,
    pub dashed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub font_family: String,
    pub background: String,
    pub title_color: String,
    pub group_fill: String,
    pub group_stroke: String,
    pub group_title_color: String,
    pub edge_label_background: String,
    pub edge_label_color: String,
    /// Dark and light text colours used when contrast must be repaired.
    pub text_dark: String,
    pub text_light: String,
    pub default_box: KindStyle,
    pub primary_box: KindStyle,
    pub secondary_box: KindStyle,
    pub highlight_box: KindStyle,
    pub risk_box: KindStyle,
    pub muted_box: KindStyle,
    pub main_edge: EdgeStyle,
    pub aux_edge: EdgeStyle,
    pub risk_edge: EdgeStyle,
    pub validate_edge: EdgeStyle,
}

fn kind(fill: &str, stroke: &str, text: &str, stroke_width: f32) -> KindStyle {
    KindStyle {
        fill: fill.to_string(),
        stroke: stroke.to_string(),
        text: text.to_string(),
        stroke_width,
    }
}

fn edge(stroke: &str, stroke_width: f32, dashed: bool) -> EdgeStyle {
    EdgeStyle {
        stroke: stroke.to_string(),
        stroke_width,
        dashed,
    }
}

impl Theme {
    pub const PRESETS: [&'static str; 3] = ["academic", "modern", "contrast"];

    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "academic" | "default" => Some(Self::academic()),
            "modern" => Some(Self::modern()),
            "contrast" | "high-contrast" => Some(Self::contrast()),
            _ => None,
        }
    }

    /// Muted blues suited to grant and thesis figures.
    pub fn academic() -> Self {
        Self {
            name: "academic".to_string(),
            font_family: "Arial, Helvetica, sans-serif".to_string(),
            background: "#FFFFFF".to_string(),
            title_color: "#1F2937".to_string(),
            group_fill: "#F5F7FB".to_string(),
            group_stroke: "#9AA8C1".to_string(),
            group_title_color: "#1F3A68".to_string(),
            edge_label_background: "#FFFFFF".to_string(),
            edge_label_color: "#374151".to_string(),
            text_dark: "#111827".to_string(),
            text_light: "#FFFFFF".to_string(),
            default_box: kind("#FFFFFF", "#6B7FA3", "#1F2937", 1.2),
            primary_box: kind("#DCE7F7", "#2F5597", "#1F2937", 1.6),
            secondary_box: kind("#E8F1E4", "#548235", "#1F2937", 1.2),
            highlight_box: kind("#FFF2CC", "#BF9000", "#1F2937", 1.6),
            risk_box: kind("#FBE4E4", "#C00000", "#7F1D1D", 1.4),
            muted_box: kind("#F2F2F2", "#A6A6A6", "#4B5563", 1.0),
            main_edge: edge("#2F5597", 1.6, false),
            aux_edge: edge("#7F7F7F", 1.2, true),
            risk_edge: edge("#C00000", 1.4, true),
            validate_edge: edge("#548235", 1.4, true),
        }
    }

    pub fn modern() -> Self {
        Self {
            name: "modern".to_string(),
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            background: "#FFFFFF".to_string(),
            title_color: "#1C2430".to_string(),
            group_fill: "#F7FAFF".to_string(),
            group_stroke: "#D7E0F0".to_string(),
            group_title_color: "#1C2430".to_string(),
            edge_label_background: "#FFFFFF".to_string(),
            edge_label_color: "#1C2430".to_string(),
            text_dark: "#1C2430".to_string(),
            text_light: "#FFFFFF".to_string(),
            default_box: kind("#F8FAFF", "#C7D2E5", "#1C2430", 1.2),
            primary_box: kind("#3B5BDB", "#364FC7", "#FFFFFF", 1.4),
            secondary_box: kind("#EEF2F8", "#A5B4CF", "#1C2430", 1.2),
            highlight_box: kind("#FFF4E6", "#F08C00", "#1C2430", 1.4),
            risk_box: kind("#FFF5F5", "#E03131", "#C92A2A", 1.4),
            muted_box: kind("#F1F3F5", "#CED4DA", "#495057", 1.0),
            main_edge: edge("#7A8AA6", 1.4, false),
            aux_edge: edge("#ADB5BD", 1.2, true),
            risk_edge: edge("#E03131", 1.4, true),
            validate_edge: edge("#2F9E44", 1.4, true),
        }
    }

    /// Black-on-white preset for print and projectors.
    pub fn contrast() -> Self {
        Self {
            name: "contrast".to_string(),
            font_family: "Arial, Helvetica, sans-serif".to_string(),
            background: "#FFFFFF".to_string(),
            title_color: "#000000".to_string(),
            group_fill: "#FFFFFF".to_string(),
            group_stroke: "#000000".to_string(),
            group_title_color: "#000000".to_string(),
            edge_label_background: "#FFFFFF".to_string(),
            edge_label_color: "#000000".to_string(),
            text_dark: "#000000".to_string(),
            text_light: "#FFFFFF".to_string(),
            default_box: kind("#FFFFFF", "#000000", "#000000", 1.5),
            primary_box: kind("#E6E6E6", "#000000", "#000000", 2.2),
            secondary_box: kind("#FFFFFF", "#404040", "#000000", 1.5),
            highlight_box: kind("#FFFFFF", "#000000", "#000000", 2.8),
            risk_box: kind("#FFFFFF", "#000000", "#000000", 1.5),
            muted_box: kind("#F2F2F2", "#808080", "#000000", 1.0),
            main_edge: edge("#000000", 1.6, false),
            aux_edge: edge("#404040", 1.2, true),
            risk_edge: edge("#000000", 1.4, true),
            validate_edge: edge("#404040", 1.4, true),
        }
    }

    pub fn box_style(&self, kind: BoxKind) -> &KindStyle {
        match kind {
            BoxKind::Default => &self.default_box,
            BoxKind::Primary => &self.primary_box,
            BoxKind::Secondary => &self.secondary_box,
            BoxKind::Highlight => &self.highlight_box,
            BoxKind::Risk => &self.risk_box,
            BoxKind::Muted => &self.muted_box,
        }
    }

    pub fn box_style_mut(&mut self, kind: BoxKind) -> &mut KindStyle {
        match kind {
            BoxKind::Default => &mut self.default_box,
            BoxKind::Primary => &mut self.primary_box,
            BoxKind::Secondary => &mut self.secondary_box,
            BoxKind::Highlight => &mut self.highlight_box,
            BoxKind::Risk => &mut self.risk_box,
            BoxKind::Muted => &mut self.muted_box,
        }
    }

    pub fn edge_style(&self, kind: EdgeKind) -> &EdgeStyle {
        match kind {
            EdgeKind::Main => &self.main_edge,
            EdgeKind::Aux => &self.aux_edge,
            EdgeKind::Risk => &self.risk_edge,
            EdgeKind::Validate => &self.validate_edge,
        }
    }

    /// Whichever of the dark/light text colours reads better on `fill`.
    pub fn readable_text_on(&self, fill: &str) -> &str {
        let dark = contrast_ratio(&self.text_dark, fill).unwrap_or(0.0);
        let light = contrast_ratio(&self.text_light, fill).unwrap_or(0.0);
        if dark >= light {
            &self.text_dark
        } else {
            &self.text_light
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::academic()
    }
}

/// Parses `#rgb`, `#rrggbb` and a few named colours into 0..=255 channels.
pub fn parse_color(input: &str) -> Option<(u8, u8, u8)> {
    let s = input.trim().to_ascii_lowercase();
    match s.as_str() {
        "white" => return Some((255, 255, 255)),
        "black" => return Some((0, 0, 0)),
        "red" => return Some((255, 0, 0)),
        "none" | "transparent" => return None,
        _ => {}
    }
    let hex = s.strip_prefix('#')?;
    let digit = |c: u8| (c as char).to_digit(16).map(|v| v as u8);
    let bytes = hex.as_bytes();
    match bytes.len() {
        3 => Some((
            digit(bytes[0])? * 17,
            digit(bytes[1])? * 17,
            digit(bytes[2])? * 17,
        )),
        6 => Some((
            digit(bytes[0])? * 16 + digit(bytes[1])?,
            digit(bytes[2])? * 16 + digit(bytes[3])?,
            digit(bytes[4])? * 16 + digit(bytes[5])?,
        )),
        _ => None,
    }
}

/// WCAG 2.x relative luminance.
pub fn relative_luminance(color: (u8, u8, u8)) -> f32 {
    fn channel(c: u8) -> f32 {
        let c = c as f32 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }
    0.2126 * channel(color.0) + 0.7152 * channel(color.1) + 0.0722 * channel(color.2)
}

/// WCAG contrast ratio in 1.0..=21.0; `None` when either colour is unparseable.
pub fn contrast_ratio(foreground: &str, background: &str) -> Option<f32> {
    let l1 = relative_luminance(parse_color(foreground)?);
    let l2 = relative_luminance(parse_color(background)?);
    let (hi, lo) = if l1 >= l2 { (l1, l2) } else { (l2, l1) };
    Some((hi + 0.05) / (lo + 0.05))
}
