mod routing;
mod templates;
mod text;
pub(crate) mod types;

pub use routing::route_edges;
pub use templates::TemplatePreset;
pub use types::*;
pub(crate) use text::{TextStyle, measure_text};

use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::LayoutError;
use crate::geometry::{Rect, Size};
use crate::ir::{CanvasMode, DiagramSpec};
use crate::theme::Theme;

// ── Canvas fitting ──────────────────────────────────────────────────
/// Upper bound on compression passes for a fixed canvas.
const MAX_FIT_STEPS: usize = 48;
/// Factor applied to every gap per compression pass.
const GAP_COMPRESSION: f32 = 0.8;
/// Factor applied to the box width cap once gaps are exhausted.
const BOX_WIDTH_COMPRESSION: f32 = 0.9;

// ── Title bars ──────────────────────────────────────────────────────
/// Vertical padding around the diagram title.
const TITLE_PAD: f32 = 8.0;
/// Vertical padding inside a group title bar.
const GROUP_TITLE_PAD: f32 = 7.0;

/// Spacing knobs the fitter is allowed to tighten.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Spacing {
    box_gap_x: f32,
    box_gap_y: f32,
    group_gap: f32,
    group_padding: f32,
    group_columns: usize,
    box_max_width: f32,
}

impl Spacing {
    fn new(config: &Config, preset: &TemplatePreset) -> Self {
        let layout = &config.layout;
        Self {
            box_gap_x: layout.box_gap_x,
            box_gap_y: layout.box_gap_y,
            group_gap: layout.group_gap,
            group_padding: layout.group_padding,
            group_columns: preset.group_columns.max(1),
            box_max_width: layout.box_max_width,
        }
    }

    /// Shrinks every gap toward `min_gap`; false once nothing is left to take.
    fn compress_gaps(&mut self, min_gap: f32) -> bool {
        let before = *self;
        let shrink = |value: f32| (value * GAP_COMPRESSION).max(min_gap.min(value));
        self.box_gap_x = shrink(self.box_gap_x);
        self.box_gap_y = shrink(self.box_gap_y);
        self.group_gap = shrink(self.group_gap);
        self.group_padding = shrink(self.group_padding);
        *self != before
    }
}

struct LayoutContext<'a> {
    spec: &'a DiagramSpec,
    config: &'a Config,
    preset: TemplatePreset,
    order: Vec<usize>,
    margin: f32,
    box_style: TextStyle<'a>,
    group_style: TextStyle<'a>,
    title_style: TextStyle<'a>,
}

struct Arranged {
    title: Option<TitleLayout>,
    groups: Vec<GroupLayout>,
    boxes: BTreeMap<String, BoxLayout>,
}

impl Arranged {
    fn bounds(&self) -> Option<Rect> {
        let rects = self
            .groups
            .iter()
            .map(|g| &g.rect)
            .chain(self.boxes.values().map(|b| &b.rect))
            .chain(self.title.iter().map(|t| &t.rect));
        crate::geometry::bounding_rect(rects)
    }
}

/// Measured group before it is given a position.
struct GroupBlock {
    index: usize,
    label: TextBlock,
    title_height: f32,
    columns: usize,
    cell: Size,
    size: Size,
    boxes: Vec<MeasuredBox>,
}

struct MeasuredBox {
    index: usize,
    label: TextBlock,
    natural: Size,
}

pub fn compute_layout(
    spec: &DiagramSpec,
    theme: &Theme,
    config: &Config,
) -> Result<Layout, LayoutError> {
    let template = spec
        .template
        .or(config.layout.template)
        .unwrap_or(LayoutTemplate::Auto)
        .resolve(spec);
    let preset = template.preset(spec.groups.len());
    let fonts = &config.fonts;
    let font_family = theme.font_family.as_str();
    let text_style = move |font_size: f32| TextStyle {
        font_family,
        font_size,
        line_height: fonts.line_height,
        fast_metrics: fonts.fast_text_metrics,
    };
    let ctx = LayoutContext {
        spec,
        config,
        preset,
        order: templates::group_order(spec, &preset),
        margin: config.canvas.margin,
        box_style: text_style(fonts.box_size),
        group_style: text_style(fonts.group_title_size),
        title_style: text_style(fonts.title_size),
    };
    let declared = Size::new(spec.canvas.width, spec.canvas.height);
    let available_width = (declared.width - 2.0 * ctx.margin).max(1.0);

    let spacing = Spacing::new(config, &preset);
    let mut arranged = arrange(&ctx, spacing, available_width);
    if spec.canvas.mode == CanvasMode::Fixed {
        let excess = |(w, h): (f32, f32)| w.max(0.0) + h.max(0.0);
        let mut overflow = overflow_of(&arranged, declared, ctx.margin);
        let mut best_excess = excess(overflow);
        let mut trial_spacing = spacing;
        for _ in 0..MAX_FIT_STEPS {
            if best_excess <= 0.0 {
                break;
            }
            if !trial_spacing.compress_gaps(config.layout.min_gap) {
                let over_width = overflow.0 > 0.0;
                if over_width && trial_spacing.group_columns > 1 {
                    trial_spacing.group_columns -= 1;
                } else if over_width
                    && trial_spacing.box_max_width > config.layout.box_min_width + 0.5
                {
                    trial_spacing.box_max_width = (trial_spacing.box_max_width
                        * BOX_WIDTH_COMPRESSION)
                        .max(config.layout.box_min_width);
                } else {
                    break;
                }
            }
            let trial = arrange(&ctx, trial_spacing, available_width);
            overflow = overflow_of(&trial, declared, ctx.margin);
            if excess(overflow) < best_excess {
                best_excess = excess(overflow);
                arranged = trial;
            }
        }
        if best_excess > 0.0 {
            log::warn!(excess = best_excess; "Content does not fit the fixed canvas");
        }
    }

    let content = arranged
        .bounds()
        .unwrap_or(Rect::new(ctx.margin, ctx.margin, 0.0, 0.0));
    let needed = Size::new(content.right() + ctx.margin, content.bottom() + ctx.margin);
    let (canvas, canvas_expanded) = match spec.canvas.mode {
        CanvasMode::Fixed => (declared, false),
        CanvasMode::Auto => {
            let expanded =
                needed.width > declared.width + 0.01 || needed.height > declared.height + 0.01;
            if config.canvas.shrink_to_content {
                (needed, expanded)
            } else {
                (
                    Size::new(
                        declared.width.max(needed.width),
                        declared.height.max(needed.height),
                    ),
                    expanded,
                )
            }
        }
    };

    let layout = Layout {
        canvas,
        canvas_expanded,
        template,
        title: arranged.title,
        groups: arranged.groups,
        boxes: arranged.boxes,
    };
    check_finite(&layout)?;
    log::debug!(
        template = template.as_str(),
        width = layout.canvas.width,
        height = layout.canvas.height,
        expanded = layout.canvas_expanded;
        "Computed layout"
    );
    Ok(layout)
}

fn overflow_of(arranged: &Arranged, canvas: Size, margin: f32) -> (f32, f32) {
    match arranged.bounds() {
        Some(bounds) => (
            bounds.right() + margin - canvas.width,
            bounds.bottom() + margin - canvas.height,
        ),
        None => (0.0, 0.0),
    }
}

fn check_finite(layout: &Layout) -> Result<(), LayoutError> {
    if !layout.canvas.width.is_finite() || !layout.canvas.height.is_finite() {
        return Err(LayoutError::NonFinite {
            subject: "canvas".to_string(),
        });
    }
    for group in &layout.groups {
        if !group.rect.is_finite() || !group.title_rect.is_finite() {
            return Err(LayoutError::NonFinite {
                subject: format!("group {}", group.id),
            });
        }
    }
    for node in layout.boxes.values() {
        if !node.rect.is_finite() {
            return Err(LayoutError::NonFinite {
                subject: format!("box {}", node.id),
            });
        }
    }
    Ok(())
}

fn arrange(ctx: &LayoutContext<'_>, spacing: Spacing, available_width: f32) -> Arranged {
    let margin = ctx.margin;
    let title = title_layout(ctx, available_width);
    let top = title
        .as_ref()
        .map(|t| t.rect.bottom() + TITLE_PAD)
        .unwrap_or(margin);

    let group_count = ctx.order.len();
    let group_columns = spacing.group_columns.min(group_count).max(1);
    let per_group_width = ((available_width - (group_columns - 1) as f32 * spacing.group_gap)
        / group_columns as f32)
        .max(1.0);
    let blocks: Vec<GroupBlock> = ctx
        .order
        .iter()
        .map(|&index| measure_group(ctx, index, &spacing, per_group_width))
        .collect();

    let rects = if ctx.preset.packed {
        place_packed(&blocks, group_columns, margin, top, spacing.group_gap)
    } else {
        place_rows(
            &blocks,
            group_columns,
            margin,
            top,
            spacing.group_gap,
            ctx.preset.stretch_rows,
        )
    };

    let mut groups = Vec::with_capacity(blocks.len());
    let mut boxes = BTreeMap::new();
    for (block, rect) in blocks.iter().zip(rects) {
        let (group, placed) = fill_group(ctx, block, rect, &spacing);
        groups.push(group);
        for node in placed {
            boxes.insert(node.id.clone(), node);
        }
    }

    let mut title = title;
    if let Some(title) = title.as_mut() {
        let right = groups
            .iter()
            .map(|g| g.rect.right())
            .fold(title.rect.right(), f32::max);
        title.rect.width = right - title.rect.x;
    }
    Arranged {
        title,
        groups,
        boxes,
    }
}

fn title_layout(ctx: &LayoutContext<'_>, available_width: f32) -> Option<TitleLayout> {
    let title = ctx.spec.title.trim();
    if title.is_empty() {
        return None;
    }
    let text = measure_text(title, ctx.title_style, Some(available_width));
    let rect = Rect::new(
        ctx.margin,
        ctx.margin,
        text.width,
        text.height + TITLE_PAD * 2.0,
    );
    Some(TitleLayout { text, rect })
}

fn measure_group(
    ctx: &LayoutContext<'_>,
    index: usize,
    spacing: &Spacing,
    available_width: f32,
) -> GroupBlock {
    let group = &ctx.spec.groups[index];
    let layout = &ctx.config.layout;
    let max_box_width = spacing.box_max_width.max(layout.box_min_width);
    let inner_max = (max_box_width - 2.0 * layout.padding_x).max(1.0);
    let boxes: Vec<MeasuredBox> = group
        .boxes
        .iter()
        .enumerate()
        .map(|(box_index, spec_box)| {
            let label = measure_text(&spec_box.label, ctx.box_style, Some(inner_max));
            let natural = Size::new(
                (label.width + 2.0 * layout.padding_x).clamp(layout.box_min_width, max_box_width),
                (label.height + 2.0 * layout.padding_y).max(layout.box_min_height),
            );
            MeasuredBox {
                index: box_index,
                label,
                natural,
            }
        })
        .collect();

    let gridded: Vec<&MeasuredBox> = boxes
        .iter()
        .filter(|b| group.boxes[b.index].pin.is_none())
        .collect();
    let cell = if gridded.is_empty() {
        Size::new(layout.box_min_width, layout.box_min_height)
    } else {
        Size::new(
            gridded.iter().map(|b| b.natural.width).fold(0.0, f32::max),
            gridded.iter().map(|b| b.natural.height).fold(0.0, f32::max),
        )
    };

    let label = measure_text(&group.label, ctx.group_style, None);
    let title_height = label.height + 2.0 * GROUP_TITLE_PAD;
    let pad = spacing.group_padding;
    let grid_width = |columns: usize| {
        2.0 * pad + columns as f32 * cell.width + columns.saturating_sub(1) as f32 * spacing.box_gap_x
    };
    let mut columns = group
        .columns
        .or(ctx.preset.box_columns)
        .unwrap_or(layout.max_columns)
        .min(gridded.len())
        .max(1);
    while columns > 1 && grid_width(columns) > available_width {
        columns -= 1;
    }
    let rows = gridded.len().div_ceil(columns);
    let width = grid_width(columns)
        .max(label.width + 2.0 * pad)
        .max(layout.box_min_width + 2.0 * pad);
    let height = if rows == 0 {
        title_height + 2.0 * pad
    } else {
        title_height
            + 2.0 * pad
            + rows as f32 * cell.height
            + (rows - 1) as f32 * spacing.box_gap_y
    };
    GroupBlock {
        index,
        label,
        title_height,
        columns,
        cell,
        size: Size::new(width, height),
        boxes,
    }
}

/// Row-major placement with column widths shared down each column and
/// heights shared across each row.
fn place_rows(
    blocks: &[GroupBlock],
    columns: usize,
    left: f32,
    top: f32,
    gap: f32,
    stretch: bool,
) -> Vec<Rect> {
    let mut col_widths = vec![0.0f32; columns];
    for (i, block) in blocks.iter().enumerate() {
        let col = i % columns;
        col_widths[col] = col_widths[col].max(block.size.width);
    }
    if stretch {
        let widest = col_widths.iter().copied().fold(0.0, f32::max);
        col_widths.iter_mut().for_each(|w| *w = widest);
    }
    let mut rects = Vec::with_capacity(blocks.len());
    let mut y = top;
    for row in blocks.chunks(columns) {
        let row_height = row.iter().map(|b| b.size.height).fold(0.0, f32::max);
        let mut x = left;
        for (col, _) in row.iter().enumerate() {
            rects.push(Rect::new(x, y, col_widths[col], row_height));
            x += col_widths[col] + gap;
        }
        y += row_height + gap;
    }
    rects
}

/// Masonry placement: each group drops into the currently shortest column.
fn place_packed(blocks: &[GroupBlock], columns: usize, left: f32, top: f32, gap: f32) -> Vec<Rect> {
    let col_width = blocks.iter().map(|b| b.size.width).fold(0.0, f32::max);
    let mut heights = vec![top; columns];
    let mut rects = Vec::with_capacity(blocks.len());
    for block in blocks {
        let mut col = 0;
        for (idx, h) in heights.iter().enumerate() {
            if *h < heights[col] - 0.01 {
                col = idx;
            }
        }
        let x = left + col as f32 * (col_width + gap);
        rects.push(Rect::new(x, heights[col], col_width, block.size.height));
        heights[col] += block.size.height + gap;
    }
    rects
}

fn fill_group(
    ctx: &LayoutContext<'_>,
    block: &GroupBlock,
    rect: Rect,
    spacing: &Spacing,
) -> (GroupLayout, Vec<BoxLayout>) {
    let group = &ctx.spec.groups[block.index];
    let layout = &ctx.config.layout;
    let pad = spacing.group_padding;
    let columns = block.columns;
    let grid_width = columns as f32 * block.cell.width
        + columns.saturating_sub(1) as f32 * spacing.box_gap_x;
    let origin_x = rect.x + ((rect.width - grid_width) / 2.0).max(pad);
    let origin_y = rect.y + block.title_height + pad;

    let mut group_rect = rect;
    let mut placed = Vec::with_capacity(block.boxes.len());
    let mut slot = 0usize;
    for measured in &block.boxes {
        let spec_box = &group.boxes[measured.index];
        let (box_rect, pinned) = match spec_box.pin {
            Some(pin) => {
                let r = Rect::new(
                    pin.x,
                    pin.y,
                    pin.width.unwrap_or(measured.natural.width),
                    pin.height.unwrap_or(measured.natural.height),
                );
                let needed = Rect::new(
                    r.x - pad,
                    r.y - pad - block.title_height,
                    r.width + 2.0 * pad,
                    r.height + 2.0 * pad + block.title_height,
                );
                group_rect = group_rect.union(&needed);
                (r, true)
            }
            None => {
                let row = slot / columns;
                let col = slot % columns;
                slot += 1;
                (
                    Rect::new(
                        origin_x + col as f32 * (block.cell.width + spacing.box_gap_x),
                        origin_y + row as f32 * (block.cell.height + spacing.box_gap_y),
                        block.cell.width,
                        block.cell.height,
                    ),
                    false,
                )
            }
        };
        let text_overflow = (measured.label.width - (box_rect.width - 2.0 * layout.padding_x))
            .max(measured.label.height - (box_rect.height - 2.0 * layout.padding_y))
            .max(0.0);
        placed.push(BoxLayout {
            id: spec_box.id.clone(),
            group: group.id.clone(),
            label: measured.label.clone(),
            rect: box_rect,
            font_size: ctx.box_style.font_size,
            text_overflow,
            kind: spec_box.kind,
            pinned,
        });
    }

    let title_rect = Rect::new(
        group_rect.x,
        group_rect.y,
        group_rect.width,
        block.title_height,
    );
    let group_layout = GroupLayout {
        id: group.id.clone(),
        label: block.label.clone(),
        role: group.role,
        rect: group_rect,
        title_rect,
        columns,
        boxes: group.boxes.iter().map(|b| b.id.clone()).collect(),
    };
    (group_layout, placed)
}
