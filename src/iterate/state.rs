use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::EngineError;
use crate::ir::DiagramSpec;

use super::stop::{RoundSummary, StopReason};

pub const STATE_FILE: &str = "state.json";
const STATE_SCHEMA: &str = "schematic.run/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Running,
    /// A critic request is out; `resume` applies the response.
    AwaitingCritic,
    /// The external oracle has not judged the pending round yet.
    AwaitingJudgement,
    Finished,
}

/// Everything `resume` needs to continue a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub schema: String,
    pub run: String,
    pub status: RunStatus,
    /// Last completed round, 0 before the first.
    pub round: u32,
    pub history: Vec<RoundSummary>,
    pub best_round: Option<u32>,
    pub best_score: Option<f32>,
    pub stop_reason: Option<StopReason>,
    /// Inputs of the next round.
    pub spec: DiagramSpec,
    pub config: Config,
}

impl RunState {
    pub fn new(run: &str, spec: DiagramSpec, config: Config) -> Self {
        Self {
            schema: STATE_SCHEMA.to_string(),
            run: run.to_string(),
            status: RunStatus::Running,
            round: 0,
            history: Vec::new(),
            best_round: None,
            best_score: None,
            stop_reason: None,
            spec,
            config,
        }
    }

    pub fn next_round(&self) -> u32 {
        self.round + 1
    }

    /// Records a completed round. Returns true when it beats the best so far.
    pub fn record(&mut self, summary: RoundSummary) -> bool {
        let improved = self.best_score.is_none_or(|best| summary.score > best);
        if improved {
            self.best_round = Some(summary.round);
            self.best_score = Some(summary.score);
        }
        self.round = summary.round;
        self.history.push(summary);
        improved
    }

    pub fn last_score(&self) -> Option<f32> {
        self.history.last().map(|r| r.score)
    }

    /// Writes `state.json` through a temporary file so a crash never leaves
    /// a truncated state behind.
    pub fn save(&self, run_dir: &Path) -> Result<(), EngineError> {
        std::fs::create_dir_all(run_dir)?;
        let tmp = run_dir.join(format!("{STATE_FILE}.tmp"));
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, run_dir.join(STATE_FILE))?;
        Ok(())
    }

    pub fn load(run_dir: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(run_dir.join(STATE_FILE))?;
        let state: RunState = serde_json::from_str(&raw)?;
        if state.schema != STATE_SCHEMA {
            return Err(EngineError::State(format!(
                "unsupported run state schema \"{}\"",
                state.schema
            )));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_spec;

    fn spec() -> DiagramSpec {
        parse_spec(
            r#"{ canvas: { width: 400, height: 300 }, groups: [ { id: "g", label: "G", boxes: [ { id: "a", label: "A" } ] } ] }"#,
        )
        .unwrap()
        .spec
    }

    fn summary(round: u32, score: f32) -> RoundSummary {
        RoundSummary {
            round,
            score,
            raster_hash: format!("h{round}"),
            p0: 0,
            p1: 0,
            p2: 0,
            candidate: 0,
        }
    }

    #[test]
    fn best_only_moves_on_strict_improvement() {
        let mut state = RunState::new("run-0001", spec(), Config::default());
        assert!(state.record(summary(1, 80.0)));
        assert!(!state.record(summary(2, 80.0)));
        assert!(state.record(summary(3, 85.0)));
        assert!(!state.record(summary(4, 60.0)));
        assert_eq!(state.best_round, Some(3));
        assert_eq!(state.next_round(), 5);
    }

    #[test]
    fn state_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = RunState::new("run-0002", spec(), Config::default());
        state.record(summary(1, 70.0));
        state.status = RunStatus::AwaitingCritic;
        state.save(dir.path()).unwrap();
        assert_eq!(RunState::load(dir.path()).unwrap(), state);
        assert!(!dir.path().join("state.json.tmp").exists());
    }
}
