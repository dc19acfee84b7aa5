//! Deterministic repairs applied between plateau rounds.
//!
//! Fixes only ever enlarge text, widen or space out geometry, recolour text,
//! or shorten labels. They never add boxes or edges and never shrink a font.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::evaluate::{EvaluationReport, Severity, TextMeasure, TextRole};
use crate::ir::DiagramSpec;
use crate::theme::Theme;

static PARENTHETICAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[(\[（][^()\[\]（）]*[)\]）]").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ── Limits ──────────────────────────────────────────────────────────

/// Largest font size auto-fix will grow to.
const MAX_FONT_PX: f32 = 32.0;
/// Widest box auto-fix will allow.
const MAX_BOX_WIDTH: f32 = 560.0;
/// Labels longer than this are truncated at a word boundary.
const MAX_LABEL_CHARS: usize = 48;
const BOX_WIDEN_STEP: f32 = 24.0;
const GAP_STEP: f32 = 8.0;
const GAP_SHRINK: f32 = 0.85;
const OBSTACLE_PADDING_STEP: f32 = 4.0;
const MAX_OBSTACLE_PADDING: f32 = 32.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAction {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct FixPlan {
    pub spec: DiagramSpec,
    pub config: Config,
    pub actions: Vec<FixAction>,
}

impl FixPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Font class a text subject belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FontClass {
    Box,
    GroupTitle,
    EdgeLabel,
    Title,
}

impl FontClass {
    /// Class of `subject` by the role its text was measured under; anything
    /// not measured as free text is box text.
    fn of(subject: &str, texts: &[TextMeasure]) -> Self {
        match texts.iter().find(|t| t.subject == subject).map(|t| t.role) {
            Some(TextRole::Title) => FontClass::Title,
            Some(TextRole::GroupTitle) => FontClass::GroupTitle,
            Some(TextRole::EdgeLabel) => FontClass::EdgeLabel,
            None => FontClass::Box,
        }
    }

    fn field(self, config: &mut Config) -> (&'static str, &mut f32) {
        match self {
            FontClass::Box => ("fonts.box_size", &mut config.fonts.box_size),
            FontClass::GroupTitle => ("fonts.group_title_size", &mut config.fonts.group_title_size),
            FontClass::EdgeLabel => ("fonts.edge_label_size", &mut config.fonts.edge_label_size),
            FontClass::Title => ("fonts.title_size", &mut config.fonts.title_size),
        }
    }
}

/// Shortens a label: drops parentheticals, collapses whitespace and cuts
/// overlong text at a word boundary. Returns `None` when nothing changes.
pub fn shorten_label(label: &str) -> Option<String> {
    let stripped = PARENTHETICAL_RE.replace_all(label, "");
    let mut short = WHITESPACE_RE.replace_all(stripped.trim(), " ").to_string();
    if short.is_empty() {
        short = WHITESPACE_RE.replace_all(label.trim(), " ").to_string();
    }
    if short.chars().count() > MAX_LABEL_CHARS {
        let mut cut = String::new();
        for word in short.split(' ') {
            let next = if cut.is_empty() {
                word.chars().count()
            } else {
                cut.chars().count() + 1 + word.chars().count()
            };
            if next > MAX_LABEL_CHARS - 1 {
                break;
            }
            if !cut.is_empty() {
                cut.push(' ');
            }
            cut.push_str(word);
        }
        if cut.is_empty() {
            cut = short.chars().take(MAX_LABEL_CHARS - 1).collect();
        }
        cut.push('…');
        short = cut;
    }
    (short != label).then_some(short)
}

/// Plans the next round's spec and config from this round's defects.
pub fn plan_fixes(
    report: &EvaluationReport,
    spec: &DiagramSpec,
    config: &Config,
    theme: &Theme,
) -> FixPlan {
    let mut next_spec = spec.clone();
    let mut next = config.clone();
    let mut actions = Vec::new();
    let mut act = |code: &str, subject: Option<&str>, description: String| {
        actions.push(FixAction {
            code: code.to_string(),
            subject: subject.map(str::to_string),
            description,
        });
    };

    let overflow_risk: BTreeSet<&str> = report
        .defects
        .iter()
        .filter(|d| d.code == "text-overflow" || (d.code == "crowding" && d.severity == Severity::P0))
        .filter_map(|d| d.subject.as_deref())
        .collect();
    let print_scale = report.measurements.print_scale.max(f32::EPSILON);
    let min_font = config.evaluation.thresholds.min_font_px;

    // Fonts: one bump per class, to the size that prints at the minimum.
    let mut font_classes: BTreeSet<FontClass> = BTreeSet::new();
    let mut widen = false;
    for d in report.defects_with_code("font-too-small") {
        let subject = d.subject.as_deref().unwrap_or_default();
        let class = FontClass::of(subject, &report.measurements.texts);
        if class == FontClass::Box && overflow_risk.contains(subject) {
            widen = true;
            continue;
        }
        font_classes.insert(class);
    }
    for class in font_classes {
        let (field, size) = class.field(&mut next);
        let target = (min_font / print_scale).ceil().max(*size + 1.0).min(MAX_FONT_PX);
        if target > *size {
            let from = *size;
            *size = target;
            act(
                "font-too-small",
                None,
                format!("{field}: {from} -> {target}"),
            );
        }
    }

    // Crowding and overflow: shorten the labels involved and widen boxes.
    let crowded: BTreeSet<&str> = report
        .defects
        .iter()
        .filter(|d| d.code == "crowding" || d.code == "text-overflow")
        .filter_map(|d| d.subject.as_deref())
        .collect();
    for group in &mut next_spec.groups {
        for b in &mut group.boxes {
            if !crowded.contains(b.id.as_str()) {
                continue;
            }
            if let Some(short) = shorten_label(&b.label) {
                act(
                    "crowding",
                    Some(b.id.as_str()),
                    format!("label \"{}\" -> \"{short}\"", b.label),
                );
                b.label = short;
            }
        }
    }
    if (!crowded.is_empty() || widen) && next.layout.box_max_width < MAX_BOX_WIDTH {
        let from = next.layout.box_max_width;
        next.layout.box_max_width = (from + BOX_WIDEN_STEP).min(MAX_BOX_WIDTH);
        act(
            "crowding",
            None,
            format!("layout.box_max_width: {from} -> {}", next.layout.box_max_width),
        );
    }

    if report.has_code("overlap") || report.has_code("label-overlap") {
        next.layout.box_gap_x += GAP_STEP;
        next.layout.box_gap_y += GAP_STEP;
        next.layout.group_gap += GAP_STEP;
        act(
            "overlap",
            None,
            format!(
                "gaps +{GAP_STEP}px (box {}/{}, group {})",
                next.layout.box_gap_x, next.layout.box_gap_y, next.layout.group_gap
            ),
        );
    }

    for d in report.defects_with_code("low-contrast") {
        let Some(subject) = d.subject.as_deref() else {
            continue;
        };
        let Some((_, b)) = spec.find_box(subject) else {
            continue;
        };
        let fill = &theme.box_style(b.kind).fill;
        let text = theme.readable_text_on(fill).to_string();
        if next.text_colors.get(&b.kind) != Some(&text) {
            act(
                "low-contrast",
                Some(subject),
                format!("{:?} text colour -> {text}", b.kind),
            );
            next.text_colors.insert(b.kind, text);
        }
    }

    if report.has_code("canvas-overflow") && report.measurements.canvas_fixed {
        let min_gap = next.layout.min_gap;
        if next.layout.max_columns > 1 {
            next.layout.max_columns -= 1;
        }
        for gap in [
            &mut next.layout.box_gap_x,
            &mut next.layout.box_gap_y,
            &mut next.layout.group_gap,
        ] {
            *gap = (*gap * GAP_SHRINK).max(min_gap);
        }
        act(
            "canvas-overflow",
            None,
            format!(
                "layout.max_columns -> {}, gaps x{GAP_SHRINK}",
                next.layout.max_columns
            ),
        );
    }

    if report.has_code("edge-through-box") {
        next.layout.group_gap += GAP_STEP * 1.5;
        next.routing.obstacle_padding =
            (next.routing.obstacle_padding + OBSTACLE_PADDING_STEP).min(MAX_OBSTACLE_PADDING);
        act(
            "edge-through-box",
            None,
            format!(
                "layout.group_gap -> {}, routing.obstacle_padding -> {}",
                next.layout.group_gap, next.routing.obstacle_padding
            ),
        );
    }

    if let Some(margin) = report
        .defects_with_code("margin")
        .map(|d| d.metric_value)
        .reduce(f32::min)
    {
        let needed = (config.evaluation.thresholds.min_margin_px - margin).max(4.0);
        next.canvas.margin += needed;
        act("margin", None, format!("canvas.margin -> {}", next.canvas.margin));
    }

    FixPlan {
        spec: next_spec,
        config: next,
        actions,
    }
}
