use crate::error::EngineError;
use crate::layout::{Layout, LayoutTemplate, RoutedEdge};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub const SNAPSHOT_FILE: &str = "layout.json";
const SNAPSHOT_SCHEMA: &str = "schematic.layout/v1";

/// Geometry of one round, sufficient to re-encode the editable document
/// without re-running layout or routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub schema: String,
    pub template: LayoutTemplate,
    pub layout: Layout,
    pub edges: Vec<RoutedEdge>,
    pub summary: SnapshotSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub groups: usize,
    pub boxes: usize,
    pub edges: usize,
    pub waypoints: usize,
    pub pinned: Vec<String>,
}

impl LayoutSnapshot {
    pub fn new(layout: &Layout, routes: &[RoutedEdge]) -> Self {
        let summary = SnapshotSummary {
            groups: layout.groups.len(),
            boxes: layout.boxes.len(),
            edges: routes.len(),
            waypoints: routes.iter().map(|r| r.waypoints().len()).sum(),
            pinned: layout
                .boxes
                .values()
                .filter(|b| b.pinned)
                .map(|b| b.id.clone())
                .collect(),
        };
        LayoutSnapshot {
            schema: SNAPSHOT_SCHEMA.to_string(),
            template: layout.template,
            layout: layout.clone(),
            edges: routes.to_vec(),
            summary,
        }
    }
}

pub fn write_snapshot(path: &Path, layout: &Layout, routes: &[RoutedEdge]) -> Result<(), EngineError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &LayoutSnapshot::new(layout, routes))?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<LayoutSnapshot, EngineError> {
    let file = File::open(path)?;
    let snapshot: LayoutSnapshot = serde_json::from_reader(BufReader::new(file))?;
    if snapshot.schema != SNAPSHOT_SCHEMA {
        return Err(EngineError::State(format!(
            "unsupported snapshot schema \"{}\"",
            snapshot.schema
        )));
    }
    Ok(snapshot)
}
