//! Pluggable scoring: the same measurements can be judged by the built-in
//! thresholds or by a collaborator through the exchange directory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::EvaluationConfig;
use crate::error::{EngineError, ExternalResponseError};

use super::judge::score;
use super::{Defect, EvaluationReport, Measurements, judge};

pub const MEASUREMENTS_FILE: &str = "measurements.json";
pub const JUDGEMENT_FILE: &str = "judgement.json";
const MEASUREMENTS_SCHEMA: &str = "schematic.measurements/v1";

pub trait ScoringOracle: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        round: u32,
        measurements: &Measurements,
    ) -> Result<EvaluationReport, EngineError>;
}

/// Deterministic threshold judge.
#[derive(Debug, Clone)]
pub struct HeuristicOracle {
    config: EvaluationConfig,
}

impl HeuristicOracle {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }
}

impl ScoringOracle for HeuristicOracle {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn evaluate(
        &self,
        round: u32,
        measurements: &Measurements,
    ) -> Result<EvaluationReport, EngineError> {
        let mut report = judge(measurements, &self.config);
        report.round = round;
        Ok(report)
    }
}

#[derive(Debug, Serialize)]
struct MeasurementsRequest<'a> {
    schema: &'static str,
    round: u32,
    measurements: &'a Measurements,
    /// Defects the built-in thresholds would report, as a starting point.
    heuristic: Vec<Defect>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JudgementDocument {
    round: u32,
    defects: Vec<Defect>,
    #[serde(default)]
    note: Option<String>,
}

/// Hands measurements to a collaborator and reads back re-judged defects.
/// Penalties and weights still come from the local evaluation config.
#[derive(Debug, Clone)]
pub struct ExternalOracle {
    exchange_dir: PathBuf,
    config: EvaluationConfig,
}

impl ExternalOracle {
    pub fn new(exchange_dir: impl Into<PathBuf>, config: EvaluationConfig) -> Self {
        Self {
            exchange_dir: exchange_dir.into(),
            config,
        }
    }

    fn write_request(&self, round: u32, measurements: &Measurements) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.exchange_dir)?;
        let request = MeasurementsRequest {
            schema: MEASUREMENTS_SCHEMA,
            round,
            measurements,
            heuristic: judge(measurements, &self.config).defects,
        };
        let path = self.exchange_dir.join(MEASUREMENTS_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(&request)?)?;
        Ok(())
    }
}

impl ScoringOracle for ExternalOracle {
    fn name(&self) -> &'static str {
        "external"
    }

    fn evaluate(
        &self,
        round: u32,
        measurements: &Measurements,
    ) -> Result<EvaluationReport, EngineError> {
        self.write_request(round, measurements)?;

        let path = self.exchange_dir.join(JUDGEMENT_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExternalResponseError::Missing { path }.into());
            }
            Err(err) => return Err(err.into()),
        };
        let document: JudgementDocument =
            serde_json::from_str(&raw).map_err(|err| ExternalResponseError::Invalid {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        if document.round != round {
            log::debug!(
                expected = round, found = document.round;
                "ignoring judgement for another round"
            );
            return Err(ExternalResponseError::Missing { path }.into());
        }
        if let Some(bad) = document.defects.iter().find(|d| !d.metric_value.is_finite()) {
            return Err(ExternalResponseError::Invalid {
                path,
                reason: format!("defect `{}` has a non-finite metric", bad.code),
            }
            .into());
        }

        if let Some(note) = &document.note {
            log::info!(round = round; "external judgement: {note}");
        }

        let mut report = score(document.defects, measurements.clone(), &self.config);
        report.round = round;
        report.oracle = self.name().to_string();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::{OverlapMeasure, Severity};
    use crate::geometry::Size;

    fn measurements() -> Measurements {
        Measurements {
            canvas: Size::new(400.0, 300.0),
            canvas_fixed: true,
            canvas_expanded: false,
            print_scale: 1.0,
            content_bounds: None,
            min_margin: Some(20.0),
            canvas_overflow: 0.0,
            box_overlaps: vec![OverlapMeasure {
                a: "a".into(),
                b: "b".into(),
                area: 10.0,
                ratio: 0.05,
            }],
            group_overlaps: Vec::new(),
            containment: Vec::new(),
            boxes: Vec::new(),
            texts: Vec::new(),
            crossings: Vec::new(),
            edge_hits: Vec::new(),
            label_overlaps: Vec::new(),
            non_orthogonal: Vec::new(),
            raster_hash: Some("abc".into()),
        }
    }

    #[test]
    fn heuristic_oracle_stamps_the_round() {
        let oracle = HeuristicOracle::new(EvaluationConfig::default());
        let report = oracle.evaluate(3, &measurements()).unwrap();
        assert_eq!(report.round, 3);
        assert_eq!(report.oracle, "heuristic");
        assert_eq!(report.count(Severity::P0), 1);
    }

    #[test]
    fn external_oracle_waits_then_rejudges() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = ExternalOracle::new(dir.path(), EvaluationConfig::default());

        let err = oracle.evaluate(1, &measurements()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ExternalResponse(ExternalResponseError::Missing { .. })
        ));
        assert!(dir.path().join(MEASUREMENTS_FILE).is_file());

        // A collaborator downgrades the small overlap to P2.
        std::fs::write(
            dir.path().join(JUDGEMENT_FILE),
            r#"{ "round": 1, "defects": [ { "dimension": "visual", "severity": "P2", "code": "overlap", "message": "cosmetic", "metric_value": 0.05 } ] }"#,
        )
        .unwrap();
        let report = oracle.evaluate(1, &measurements()).unwrap();
        assert_eq!(report.oracle, "external");
        assert_eq!(report.count(Severity::P0), 0);
        assert_eq!(report.score, 97.0);
    }

    #[test]
    fn external_oracle_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(JUDGEMENT_FILE),
            r#"{ "round": 1, "defects": [], "score": 100 }"#,
        )
        .unwrap();
        let oracle = ExternalOracle::new(dir.path(), EvaluationConfig::default());
        let err = oracle.evaluate(1, &measurements()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ExternalResponse(ExternalResponseError::Invalid { .. })
        ));
    }
}
