use crate::error::{EngineError, ValidationError};
use crate::ir::{
    BoxKind, BoxSpec, CanvasMode, CanvasSpec, DiagramSpec, Edge, EdgeKind, Group, Pin, Role,
    RouteKind, slugify,
};
use crate::layout::LayoutTemplate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

static SAFE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

const LONG_LABEL_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct ParsedSpec {
    pub spec: DiagramSpec,
    pub warnings: Vec<ValidationWarning>,
}

/// Non-fatal finding; never blocks rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecDocument {
    #[serde(default)]
    title: String,
    canvas: CanvasDocument,
    #[serde(default)]
    template: Option<LayoutTemplate>,
    #[serde(default)]
    groups: Vec<GroupDocument>,
    #[serde(default)]
    edges: Vec<EdgeDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CanvasDocument {
    width: f32,
    height: f32,
    #[serde(default)]
    mode: CanvasMode,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    columns: Option<usize>,
    #[serde(default)]
    boxes: Vec<BoxDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BoxDocument {
    #[serde(default)]
    id: Option<String>,
    label: String,
    #[serde(default)]
    kind: BoxKind,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    pin: Option<Pin>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EdgeDocument {
    #[serde(default)]
    id: Option<String>,
    from: String,
    to: String,
    #[serde(default)]
    kind: EdgeKind,
    #[serde(default)]
    route: RouteKind,
    #[serde(default)]
    label: Option<String>,
}

/// Parses and validates a spec document (JSON or JSON5).
pub fn parse_spec(raw: &str) -> Result<ParsedSpec, ValidationError> {
    let document: SpecDocument =
        json5::from_str(raw).map_err(|err| ValidationError::new("$", err.to_string()))?;
    normalize(document)
}

pub fn load_spec(path: &Path) -> Result<ParsedSpec, EngineError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(parse_spec(&raw)?)
}

/// Serializes a normalized spec; the output re-parses to the same spec.
pub fn serialize_spec(spec: &DiagramSpec) -> Result<String, EngineError> {
    Ok(serde_json::to_string_pretty(spec)?)
}

pub fn is_safe_id(id: &str) -> bool {
    SAFE_ID_RE.is_match(id)
}

fn normalize(document: SpecDocument) -> Result<ParsedSpec, ValidationError> {
    let mut warnings = Vec::new();
    let canvas = normalize_canvas(&document.canvas)?;

    let mut group_ids: HashSet<String> = HashSet::new();
    let mut box_ids: HashSet<String> = HashSet::new();
    let mut groups = Vec::with_capacity(document.groups.len());

    for (gi, raw_group) in document.groups.into_iter().enumerate() {
        let group_path = format!("groups[{gi}]");
        let group_id = raw_group
            .id
            .map(|id| id.trim().to_string())
            .unwrap_or_else(|| format!("g{gi}"));
        check_id(&group_id, &format!("{group_path}.id"))?;
        if !group_ids.insert(group_id.clone()) {
            return Err(ValidationError::new(
                format!("{group_path}.id"),
                format!("duplicate group id \"{group_id}\""),
            ));
        }
        if raw_group.columns == Some(0) {
            return Err(ValidationError::new(
                format!("{group_path}.columns"),
                "column count must be at least 1",
            ));
        }
        if raw_group.boxes.is_empty() {
            warnings.push(ValidationWarning {
                path: group_path.clone(),
                message: format!("group \"{group_id}\" has no boxes"),
            });
        }

        let mut boxes = Vec::with_capacity(raw_group.boxes.len());
        for (bi, raw_box) in raw_group.boxes.into_iter().enumerate() {
            let box_path = format!("{group_path}.boxes[{bi}]");
            let label = raw_box.label.trim().to_string();
            let box_id = raw_box
                .id
                .map(|id| id.trim().to_string())
                .unwrap_or_else(|| format!("{group_id}-{}-{bi}", slugify(&label)));
            check_id(&box_id, &format!("{box_path}.id"))?;
            if !box_ids.insert(box_id.clone()) {
                return Err(ValidationError::new(
                    format!("{box_path}.id"),
                    format!("duplicate box id \"{box_id}\""),
                ));
            }
            if let Some(pin) = &raw_box.pin {
                check_pin(pin, &format!("{box_path}.pin"))?;
            }
            if label.chars().count() > LONG_LABEL_CHARS {
                warnings.push(ValidationWarning {
                    path: format!("{box_path}.label"),
                    message: format!(
                        "label is {} characters long; consider shortening it",
                        label.chars().count()
                    ),
                });
            }
            boxes.push(BoxSpec {
                id: box_id,
                label,
                kind: raw_box.kind,
                role: raw_box.role,
                pin: raw_box.pin,
            });
        }

        groups.push(Group {
            id: group_id,
            label: raw_group.label.trim().to_string(),
            role: raw_group.role,
            columns: raw_group.columns,
            boxes,
        });
    }

    let mut edge_ids: HashSet<String> = HashSet::new();
    let mut edges = Vec::with_capacity(document.edges.len());
    for (ei, raw_edge) in document.edges.into_iter().enumerate() {
        let edge_path = format!("edges[{ei}]");
        let edge_id = raw_edge
            .id
            .map(|id| id.trim().to_string())
            .unwrap_or_else(|| format!("e{ei}"));
        check_id(&edge_id, &format!("{edge_path}.id"))?;
        if !edge_ids.insert(edge_id.clone()) {
            return Err(ValidationError::new(
                format!("{edge_path}.id"),
                format!("duplicate edge id \"{edge_id}\""),
            ));
        }
        let from = resolve_endpoint(&groups, &raw_edge.from, &format!("{edge_path}.from"))?;
        let to = resolve_endpoint(&groups, &raw_edge.to, &format!("{edge_path}.to"))?;
        if from == to {
            warnings.push(ValidationWarning {
                path: edge_path.clone(),
                message: format!("edge \"{edge_id}\" connects box \"{from}\" to itself"),
            });
        }
        let label = raw_edge
            .label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        edges.push(Edge {
            id: edge_id,
            from,
            to,
            kind: raw_edge.kind,
            route: raw_edge.route,
            label,
        });
    }

    let spec = DiagramSpec {
        title: document.title.trim().to_string(),
        canvas,
        template: document.template,
        groups,
        edges,
    };
    warnings.extend(terminology_warnings(&spec));
    Ok(ParsedSpec { spec, warnings })
}

fn normalize_canvas(canvas: &CanvasDocument) -> Result<CanvasSpec, ValidationError> {
    for (field, value) in [("width", canvas.width), ("height", canvas.height)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::new(
                format!("canvas.{field}"),
                format!("must be a positive number, got {value}"),
            ));
        }
    }
    Ok(CanvasSpec {
        width: canvas.width,
        height: canvas.height,
        mode: canvas.mode,
    })
}

fn check_id(id: &str, path: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::new(path, "id must not be empty"));
    }
    if !is_safe_id(id) {
        return Err(ValidationError::new(
            path,
            format!("id \"{id}\" may only contain ASCII letters, digits, '_' and '-'"),
        ));
    }
    Ok(())
}

fn check_pin(pin: &Pin, path: &str) -> Result<(), ValidationError> {
    if !pin.x.is_finite() || !pin.y.is_finite() {
        return Err(ValidationError::new(path, "pin coordinates must be finite"));
    }
    for (field, value) in [("width", pin.width), ("height", pin.height)] {
        if let Some(v) = value
            && (!v.is_finite() || v <= 0.0)
        {
            return Err(ValidationError::new(
                format!("{path}.{field}"),
                format!("must be a positive number, got {v}"),
            ));
        }
    }
    Ok(())
}

/// Resolves `group.box` (or a bare box id) to the box id.
fn resolve_endpoint(groups: &[Group], reference: &str, path: &str) -> Result<String, ValidationError> {
    let reference = reference.trim();
    let unknown = || ValidationError::new(path, format!("unknown box \"{reference}\""));
    match reference.split_once('.') {
        Some((group_id, box_id)) => groups
            .iter()
            .find(|g| g.id == group_id)
            .and_then(|g| g.boxes.iter().find(|b| b.id == box_id))
            .map(|b| b.id.clone())
            .ok_or_else(unknown),
        None => groups
            .iter()
            .flat_map(|g| g.boxes.iter())
            .find(|b| b.id == reference)
            .map(|b| b.id.clone())
            .ok_or_else(unknown),
    }
}

fn terminology_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Flags the same concept written two different ways, e.g. "Data set" and "dataset".
fn terminology_warnings(spec: &DiagramSpec) -> Vec<ValidationWarning> {
    let mut variants: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for (gi, group) in spec.groups.iter().enumerate() {
        for (bi, b) in group.boxes.iter().enumerate() {
            let key = terminology_key(&b.label);
            if key.is_empty() {
                continue;
            }
            variants
                .entry(key)
                .or_default()
                .push((format!("groups[{gi}].boxes[{bi}].label"), b.label.clone()));
        }
    }
    let mut warnings = Vec::new();
    for entries in variants.values() {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (path, label) in entries {
            seen.entry(label.as_str()).or_insert(path.as_str());
        }
        if seen.len() < 2 {
            continue;
        }
        let mut spellings: Vec<&str> = seen.keys().copied().collect();
        spellings.sort_unstable();
        let first_path = entries.first().map(|(p, _)| p.clone()).unwrap_or_default();
        warnings.push(ValidationWarning {
            path: first_path,
            message: format!(
                "inconsistent terminology: {}",
                spellings
                    .iter()
                    .map(|s| format!("\"{s}\""))
                    .collect::<Vec<_>>()
                    .join(" vs ")
            ),
        });
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"{
        title: "Roadmap",
        canvas: { width: 1200, height: 800 },
        groups: [
            { id: "groupA", label: "Inputs", role: "input", boxes: [
                { id: "survey", label: "Field survey" },
                { label: "Data set" },
            ] },
            { id: "groupB", label: "Analysis", boxes: [
                { id: "model", label: "Model fitting", kind: "primary" },
                { label: "dataset" },
            ] },
        ],
        edges: [
            { from: "groupA.survey", to: "groupB.model", label: "feeds" },
            { from: "survey", to: "model", kind: "aux", route: "straight" },
        ],
    }"#;

    #[test]
    fn parses_and_generates_ids() {
        let parsed = parse_spec(BASIC).expect("valid spec");
        let spec = parsed.spec;
        assert_eq!(spec.groups[0].boxes[1].id, "groupA-data-set-1");
        assert_eq!(spec.edges[0].id, "e0");
        assert_eq!(spec.edges[0].from, "survey");
        assert_eq!(spec.edges[1].route, RouteKind::Straight);
        assert_eq!(spec.canvas.mode, CanvasMode::Auto);
    }

    #[test]
    fn generated_ids_are_stable_across_parses() {
        let a = parse_spec(BASIC).expect("valid").spec;
        let b = parse_spec(BASIC).expect("valid").spec;
        assert_eq!(a, b);
    }

    #[test]
    fn warns_about_inconsistent_terminology() {
        let parsed = parse_spec(BASIC).expect("valid spec");
        assert!(
            parsed
                .warnings
                .iter()
                .any(|w| w.message.contains("\"Data set\"") && w.message.contains("\"dataset\"")),
            "{:?}",
            parsed.warnings
        );
    }

    #[test]
    fn rejects_unknown_endpoint_with_field_path() {
        let raw = r#"{
            canvas: { width: 800, height: 600 },
            groups: [
                { id: "groupA", label: "A", boxes: [ { id: "a", label: "A" } ] },
                { id: "groupB", label: "B", boxes: [ { id: "b", label: "B" } ] },
            ],
            edges: [
                { from: "groupA.a", to: "groupB.b" },
                { from: "groupB.b", to: "groupA.a" },
                { from: "groupA.a", to: "groupA.missing" },
            ],
        }"#;
        let err = parse_spec(raw).expect_err("must reject");
        assert_eq!(err.path, "edges[2].to");
        assert!(err.message.contains("groupA.missing"));
    }

    #[test]
    fn rejects_duplicate_box_ids_across_groups() {
        let raw = r#"{
            canvas: { width: 800, height: 600 },
            groups: [
                { id: "a", label: "A", boxes: [ { id: "x", label: "X" } ] },
                { id: "b", label: "B", boxes: [ { id: "x", label: "Y" } ] },
            ],
        }"#;
        let err = parse_spec(raw).expect_err("duplicate");
        assert_eq!(err.path, "groups[1].boxes[0].id");
    }

    #[test]
    fn rejects_xml_unsafe_ids() {
        let raw = r#"{
            canvas: { width: 800, height: 600 },
            groups: [ { id: "a", label: "A", boxes: [ { id: "x<y", label: "X" } ] } ],
        }"#;
        let err = parse_spec(raw).expect_err("unsafe id");
        assert_eq!(err.path, "groups[0].boxes[0].id");
    }

    #[test]
    fn rejects_non_positive_canvas() {
        let raw = r#"{ canvas: { width: 0, height: 600 }, groups: [] }"#;
        let err = parse_spec(raw).expect_err("zero width");
        assert_eq!(err.path, "canvas.width");
    }

    #[test]
    fn serialized_spec_round_trips_through_validator() {
        let spec = parse_spec(BASIC).expect("valid").spec;
        let text = serialize_spec(&spec).expect("serialize");
        let again = parse_spec(&text).expect("re-parse").spec;
        assert_eq!(spec, again);
    }
}
