//! Quality evaluation, split into raw measurement and threshold judging so a
//! different judge can re-score the same facts.

mod judge;
mod measure;
pub mod oracle;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use judge::judge;
pub use measure::{
    BoxMeasure, Crossing, EdgeHit, LabelOverlap, MeasureInput, Measurements, Membership,
    OverlapMeasure, TITLE_SUBJECT, TextMeasure, TextRole, measure,
};
pub use oracle::{ExternalOracle, HeuristicOracle, ScoringOracle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    P0,
    P1,
    P2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    Structure,
    Visual,
    Readability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    pub dimension: Dimension,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    /// Id of the box, edge or group the defect is about, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub metric_value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub round: u32,
    pub oracle: String,
    pub defects: Vec<Defect>,
    pub dimension_penalties: BTreeMap<Dimension, f32>,
    pub score: f32,
    pub measurements: Measurements,
}

impl EvaluationReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.defects.iter().filter(|d| d.severity == severity).count()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.defects.iter().any(|d| d.code == code)
    }

    pub fn defects_with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Defect> + 'a {
        self.defects.iter().filter(move |d| d.code == code)
    }

    /// `P0=n P1=n P2=n` summary used in logs.
    pub fn severity_summary(&self) -> String {
        format!(
            "P0={} P1={} P2={}",
            self.count(Severity::P0),
            self.count(Severity::P1),
            self.count(Severity::P2)
        )
    }
}
