//! Named arrangement presets.
//!
//! A preset only seeds the arrangement: explicit group column counts, pins and
//! canvas fitting all override it.

use crate::ir::{DiagramSpec, Group, Role};

use super::LayoutTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplatePreset {
    /// Groups placed side by side before wrapping to a new row (or, when
    /// `packed`, the number of masonry columns).
    pub group_columns: usize,
    /// Sort groups input → process → output, with support groups last.
    pub order_by_role: bool,
    /// Fill the shortest column first instead of row by row.
    pub packed: bool,
    /// Box grid column hint inside each group; `None` uses the config maximum.
    pub box_columns: Option<usize>,
    /// Stretch every group in a row to the full content width.
    pub stretch_rows: bool,
}

impl LayoutTemplate {
    pub fn preset(self, group_count: usize) -> TemplatePreset {
        match self {
            LayoutTemplate::Classic | LayoutTemplate::Auto => TemplatePreset {
                group_columns: group_count.clamp(1, 3),
                order_by_role: false,
                packed: false,
                box_columns: None,
                stretch_rows: false,
            },
            LayoutTemplate::ThreeColumn => TemplatePreset {
                group_columns: 3,
                order_by_role: true,
                packed: false,
                box_columns: Some(1),
                stretch_rows: false,
            },
            LayoutTemplate::LayeredPipeline => TemplatePreset {
                group_columns: 1,
                order_by_role: true,
                packed: false,
                box_columns: None,
                stretch_rows: true,
            },
            LayoutTemplate::PackedThreeColumn => TemplatePreset {
                group_columns: 3,
                order_by_role: false,
                packed: true,
                box_columns: Some(2),
                stretch_rows: false,
            },
        }
    }

    /// Picks a concrete template for `Auto`; concrete templates pass through.
    pub fn resolve(self, spec: &DiagramSpec) -> LayoutTemplate {
        if self != LayoutTemplate::Auto {
            return self;
        }
        let groups = &spec.groups;
        let tagged = groups.iter().filter(|g| g.role.is_some()).count();
        let main_roles = [Role::Input, Role::Process, Role::Output]
            .iter()
            .filter(|role| groups.iter().any(|g| g.role == Some(**role)))
            .count();
        let largest = groups.iter().map(|g| g.boxes.len()).max().unwrap_or(0);
        if main_roles == 3 && tagged == groups.len() && groups.len() <= 4 {
            LayoutTemplate::ThreeColumn
        } else if groups.len() >= 4 && tagged == groups.len() && largest > 4 {
            LayoutTemplate::LayeredPipeline
        } else if (4..=9).contains(&groups.len()) && largest <= 4 {
            LayoutTemplate::PackedThreeColumn
        } else {
            LayoutTemplate::Classic
        }
    }
}

fn role_rank(group: &Group) -> usize {
    match group.role {
        Some(Role::Input) => 0,
        Some(Role::Process) => 1,
        Some(Role::Output) => 2,
        None => 3,
        Some(Role::Support) => 4,
    }
}

/// Group indices in placement order. The sort is stable, so groups with the
/// same role keep their spec order.
pub(crate) fn group_order(spec: &DiagramSpec, preset: &TemplatePreset) -> Vec<usize> {
    let mut order: Vec<usize> = (0..spec.groups.len()).collect();
    if preset.order_by_role {
        order.sort_by_key(|&idx| role_rank(&spec.groups[idx]));
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BoxKind, BoxSpec, CanvasMode, CanvasSpec};

    fn group(id: &str, role: Option<Role>, boxes: usize) -> Group {
        Group {
            id: id.to_string(),
            label: id.to_string(),
            role,
            columns: None,
            boxes: (0..boxes)
                .map(|i| BoxSpec {
                    id: format!("{id}-b{i}"),
                    label: format!("Box {i}"),
                    kind: BoxKind::Default,
                    role: None,
                    pin: None,
                })
                .collect(),
        }
    }

    fn spec(groups: Vec<Group>) -> DiagramSpec {
        DiagramSpec {
            title: String::new(),
            canvas: CanvasSpec {
                width: 1200.0,
                height: 800.0,
                mode: CanvasMode::Auto,
            },
            template: None,
            groups,
            edges: Vec::new(),
        }
    }

    #[test]
    fn auto_picks_three_column_for_role_tagged_groups() {
        let s = spec(vec![
            group("out", Some(Role::Output), 2),
            group("in", Some(Role::Input), 2),
            group("proc", Some(Role::Process), 3),
        ]);
        assert_eq!(LayoutTemplate::Auto.resolve(&s), LayoutTemplate::ThreeColumn);
        let preset = LayoutTemplate::ThreeColumn.preset(3);
        assert_eq!(group_order(&s, &preset), vec![1, 2, 0]);
    }

    #[test]
    fn auto_packs_many_small_groups() {
        let s = spec((0..6).map(|i| group(&format!("g{i}"), None, 2)).collect());
        assert_eq!(
            LayoutTemplate::Auto.resolve(&s),
            LayoutTemplate::PackedThreeColumn
        );
    }

    #[test]
    fn concrete_templates_are_not_rewritten() {
        let s = spec(vec![group("a", None, 1)]);
        assert_eq!(
            LayoutTemplate::LayeredPipeline.resolve(&s),
            LayoutTemplate::LayeredPipeline
        );
        assert_eq!(LayoutTemplate::Auto.resolve(&s), LayoutTemplate::Classic);
    }
}
