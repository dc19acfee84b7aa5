//! Round loop: candidates → render → measure → judge → decide.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::config::{Config, OracleKind, StopStrategyKind};
use crate::error::{EngineError, ExternalResponseError};
use crate::evaluate::{
    EvaluationReport, ExternalOracle, HeuristicOracle, MeasureInput, Measurements, ScoringOracle,
    Severity, judge, measure,
};
use crate::ir::DiagramSpec;
use crate::layout::{Layout, RoutedEdge, compute_layout, route_edges};
use crate::parser::serialize_spec;
use crate::render::{DRAWIO_FILE, PNG_FILE, RenderArtifacts, render_round};
use crate::snapshot::{SNAPSHOT_FILE, write_snapshot};

use super::autofix::plan_fixes;
use super::candidates::{Candidate, generate, select_best};
use super::critic::{
    CriticRequest, CriticVerdict, REQUEST_FILE, REQUEST_SCHEMA, RESPONSE_FILE, consume_response,
    discard_stale_response, read_response, reject_response, wait_for_file, write_request,
};
use super::output::{CONFIG_FILE, EVALUATION_FILE, LogRow, OutputRoot, SPEC_FILE, append_log};
use super::state::{RunState, RunStatus};
use super::stop::{CriticStop, Decision, PlateauStop, RoundSummary, StopReason, StopStrategy};

/// Where a run stands after `optimize` or `resume` returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub run: String,
    pub status: RunStatus,
    pub rounds: u32,
    pub best_round: Option<u32>,
    pub best_score: Option<f32>,
    pub stop_reason: Option<StopReason>,
    pub best_dir: Option<PathBuf>,
    /// Set while the run waits for the critic.
    pub critic_request: Option<PathBuf>,
}

/// Starts a new run under `root` and drives it until it stops or suspends.
pub fn optimize(
    root: &OutputRoot,
    spec: DiagramSpec,
    config: Config,
) -> Result<RunOutcome, EngineError> {
    config.validate()?;
    let run = root.next_run_id()?;
    let state = RunState::new(&run, spec, config);
    state.save(&root.run_dir(&run)?)?;
    log::info!(
        run = run.as_str(),
        strategy:? = state.config.iteration.strategy,
        oracle:? = state.config.iteration.oracle;
        "starting optimization run"
    );
    drive(root, state)
}

/// Continues a suspended or interrupted run; the latest run when `run` is
/// not given.
pub fn resume(root: &OutputRoot, run: Option<&str>) -> Result<RunOutcome, EngineError> {
    let run = match run {
        Some(run) => run.to_string(),
        None => root
            .latest_run()?
            .ok_or_else(|| EngineError::State("no run to resume".to_string()))?,
    };
    let run_dir = root.run_dir(&run)?;
    let mut state = RunState::load(&run_dir)?;
    log::info!(run = run.as_str(), status:? = state.status; "resuming run");

    match state.status {
        RunStatus::Finished => return outcome(root, &state, None),
        RunStatus::AwaitingCritic => {
            let critic_dir = root.resolve(&state.config.critic.dir)?;
            if !apply_critic(&critic_dir, &mut state)? {
                let request = critic_dir.join(REQUEST_FILE);
                return outcome(root, &state, Some(request));
            }
            if state.status == RunStatus::Finished {
                state.save(&run_dir)?;
                return outcome(root, &state, None);
            }
        }
        RunStatus::AwaitingJudgement | RunStatus::Running => {}
    }
    state.status = RunStatus::Running;
    state.save(&run_dir)?;
    drive(root, state)
}

fn strategy_for(config: &Config) -> Box<dyn StopStrategy> {
    match config.iteration.strategy {
        StopStrategyKind::Plateau => Box::new(PlateauStop::from_config(&config.iteration)),
        StopStrategyKind::ExternalCritic => Box::new(CriticStop {
            max_rounds: config.iteration.max_rounds,
        }),
    }
}

fn oracle_for(root: &OutputRoot, config: &Config) -> Result<Box<dyn ScoringOracle>, EngineError> {
    Ok(match config.iteration.oracle {
        OracleKind::Heuristic => Box::new(HeuristicOracle::new(config.evaluation.clone())),
        OracleKind::External => Box::new(ExternalOracle::new(
            root.resolve(&config.critic.dir)?,
            config.evaluation.clone(),
        )),
    })
}

fn drive(root: &OutputRoot, mut state: RunState) -> Result<RunOutcome, EngineError> {
    let run_dir = root.run_dir(&state.run)?;
    loop {
        let round = state.next_round();
        let strategy = strategy_for(&state.config);
        let oracle = oracle_for(root, &state.config)?;

        let result = match play_round(root, &state, round, oracle.as_ref()) {
            Ok(result) => result,
            Err(EngineError::ExternalResponse(ExternalResponseError::Missing { path })) => {
                log::info!(round = round, path:? = path; "waiting for external judgement");
                state.status = RunStatus::AwaitingJudgement;
                state.save(&run_dir)?;
                return outcome(root, &state, None);
            }
            Err(err) => return Err(err),
        };

        let summary = RoundSummary {
            round,
            score: result.report.score,
            raster_hash: result.artifacts.raster_hash.clone(),
            p0: result.report.count(Severity::P0),
            p1: result.report.count(Severity::P1),
            p2: result.report.count(Severity::P2),
            candidate: result.candidate,
        };
        let previous_score = state.last_score();
        let improved = state.record(summary);
        state.config = result.config.clone();
        if improved {
            let best = root.promote(&state.config.output.best_dir, &result.dir)?;
            log::info!(round = round, score = result.report.score, best:? = best; "promoted round");
        }

        let decision = strategy.decide(&state.history);
        let mut notes = Vec::new();
        if let Some(reason) = &result.artifacts.degraded {
            notes.push(format!("fallback: {reason}"));
        }
        log::info!(
            round = round,
            candidate = result.candidate,
            score = result.report.score,
            defects = result.report.severity_summary().as_str();
            "round complete"
        );

        match decision {
            Decision::Continue => {
                if state.config.iteration.auto_fix
                    && state.config.iteration.strategy == StopStrategyKind::Plateau
                {
                    let theme = state.config.theme();
                    let plan = plan_fixes(&result.report, &state.spec, &state.config, &theme);
                    for action in &plan.actions {
                        log::debug!(round = round, code = action.code.as_str(); "{}", action.description);
                    }
                    notes.extend(plan.actions.iter().map(|a| a.description.clone()));
                    state.spec = plan.spec;
                    state.config = plan.config;
                }
                log_round(&run_dir, &state, &result, previous_score, &notes)?;
                state.save(&run_dir)?;
            }
            Decision::Stop(reason) => {
                notes.push(format!("stop: {}", reason.describe()));
                log_round(&run_dir, &state, &result, previous_score, &notes)?;
                return finish(root, &run_dir, state, reason);
            }
            Decision::Suspend => {
                notes.push("awaiting critic".to_string());
                log_round(&run_dir, &state, &result, previous_score, &notes)?;
                let critic_dir = root.resolve(&state.config.critic.dir)?;
                let request = hand_off(root, &critic_dir, &state, &result)?;
                state.status = RunStatus::AwaitingCritic;
                state.save(&run_dir)?;

                let critic = &state.config.critic;
                let answered = critic.wait
                    && wait_for_file(
                        &critic_dir.join(RESPONSE_FILE),
                        Duration::from_millis(critic.poll_interval_ms),
                        Duration::from_secs(critic.wait_timeout_secs),
                    );
                if !answered || !apply_critic(&critic_dir, &mut state)? {
                    log::info!(round = round, request:? = request; "suspended for critic");
                    return outcome(root, &state, Some(request));
                }
                if state.status == RunStatus::Finished {
                    state.save(&run_dir)?;
                    return outcome(root, &state, None);
                }
                state.status = RunStatus::Running;
                state.save(&run_dir)?;
            }
        }
    }
}

fn finish(
    root: &OutputRoot,
    run_dir: &Path,
    mut state: RunState,
    reason: StopReason,
) -> Result<RunOutcome, EngineError> {
    state.status = RunStatus::Finished;
    state.stop_reason = Some(reason);
    state.save(run_dir)?;
    log::info!(
        run = state.run.as_str(),
        rounds = state.round,
        best_round:? = state.best_round;
        "run finished: {}",
        reason.describe()
    );
    outcome(root, &state, None)
}

fn outcome(
    root: &OutputRoot,
    state: &RunState,
    critic_request: Option<PathBuf>,
) -> Result<RunOutcome, EngineError> {
    let best_dir = match state.best_round {
        Some(_) => Some(root.resolve(&state.config.output.best_dir)?),
        None => None,
    };
    Ok(RunOutcome {
        run: state.run.clone(),
        status: state.status,
        rounds: state.round,
        best_round: state.best_round,
        best_score: state.best_score,
        stop_reason: state.stop_reason,
        best_dir,
        critic_request,
    })
}

fn log_round(
    run_dir: &Path,
    state: &RunState,
    result: &RoundResult,
    previous_score: Option<f32>,
    notes: &[String],
) -> Result<(), EngineError> {
    let Some(summary) = state.history.last() else {
        return Ok(());
    };
    let notes = notes.join("; ");
    append_log(
        run_dir,
        &LogRow {
            round: summary.round,
            candidate: result.candidate,
            score: summary.score,
            previous_score,
            p0: summary.p0,
            p1: summary.p1,
            p2: summary.p2,
            raster_hash: &summary.raster_hash,
            notes: &notes,
        },
    )
}

/// Applies a critic response to `state`. Returns false while no response
/// exists. An invalid response is moved aside and leaves the state as it
/// was, so the next round re-runs the last valid inputs.
fn apply_critic(critic_dir: &Path, state: &mut RunState) -> Result<bool, EngineError> {
    match read_response(
        critic_dir,
        &state.run,
        state.round,
        &state.spec,
        &state.config,
    ) {
        Ok(CriticVerdict::Stop { reason }) => {
            consume_response(critic_dir, state.round)?;
            log::info!(round = state.round; "critic stop: {reason}");
            state.status = RunStatus::Finished;
            state.stop_reason = Some(StopReason::CriticStop);
            Ok(true)
        }
        Ok(CriticVerdict::Continue {
            action,
            reason,
            spec,
            config,
        }) => {
            consume_response(critic_dir, state.round)?;
            log::info!(round = state.round, action:? = action; "critic response applied: {reason}");
            state.spec = spec;
            state.config = config;
            Ok(true)
        }
        Err(ExternalResponseError::Missing { .. }) => Ok(false),
        Err(err @ ExternalResponseError::Stale { .. }) => {
            let moved = discard_stale_response(critic_dir, state.round)?;
            log::warn!(error:% = err, moved:? = moved; "ignored critic response for another request");
            Ok(false)
        }
        Err(err) => {
            let moved = reject_response(critic_dir, state.round)?;
            log::warn!(error:% = err, moved:? = moved; "rejected critic response");
            Ok(true)
        }
    }
}

fn hand_off(
    root: &OutputRoot,
    critic_dir: &Path,
    state: &RunState,
    result: &RoundResult,
) -> Result<PathBuf, EngineError> {
    let raster_path = result
        .artifacts
        .png
        .as_ref()
        .map(|_| root.relative(&result.dir.join(PNG_FILE)));
    let request = CriticRequest {
        schema: REQUEST_SCHEMA.to_string(),
        run: state.run.clone(),
        round: state.round,
        spec: state.spec.clone(),
        config: state.config.clone(),
        evaluation: result.report.clone(),
        raster_path,
        drawio_path: root.relative(&result.dir.join(DRAWIO_FILE)),
        response_path: root.relative(&critic_dir.join(RESPONSE_FILE)),
    };
    write_request(critic_dir, &request)
}

struct Trial {
    index: usize,
    score: f32,
    layout: Layout,
    routes: Vec<RoutedEdge>,
}

struct RoundResult {
    candidate: usize,
    config: Config,
    report: EvaluationReport,
    artifacts: RenderArtifacts,
    /// Committed round directory.
    dir: PathBuf,
}

/// Lays out, routes and heuristically scores one candidate.
fn trial(spec: &DiagramSpec, candidate: &Candidate) -> Result<Trial, EngineError> {
    let config = &candidate.config;
    let theme = config.theme();
    let layout = compute_layout(spec, &theme, config)?;
    let routes = route_edges(spec, &layout, &theme, config)?;
    let measurements = measure(&MeasureInput {
        spec,
        layout: &layout,
        routes: &routes,
        theme: &theme,
        evaluation: &config.evaluation,
        raster_hash: None,
    });
    let score = judge(&measurements, &config.evaluation).score;
    Ok(Trial {
        index: candidate.index,
        score,
        layout,
        routes,
    })
}

/// Scores every candidate, in candidate order regardless of threading.
fn run_trials(
    spec: &DiagramSpec,
    candidates: &[Candidate],
    parallel: bool,
) -> Vec<Result<Trial, EngineError>> {
    if !parallel || candidates.len() < 2 {
        return candidates.iter().map(|c| trial(spec, c)).collect();
    }
    std::thread::scope(|scope| {
        let handles: Vec<_> = candidates
            .iter()
            .map(|candidate| scope.spawn(move || trial(spec, candidate)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}

fn play_round(
    root: &OutputRoot,
    state: &RunState,
    round: u32,
    oracle: &dyn ScoringOracle,
) -> Result<RoundResult, EngineError> {
    let candidates = generate(&state.config, round);
    let mut trials = Vec::with_capacity(candidates.len());
    for (candidate, result) in candidates
        .iter()
        .zip(run_trials(&state.spec, &candidates, state.config.iteration.parallel))
    {
        match result {
            Ok(trial) => trials.push(trial),
            Err(err) if candidate.index > 0 => {
                log::warn!(round = round, candidate = candidate.index, error:% = err; "dropping candidate");
            }
            Err(err) => return Err(err),
        }
    }
    let scores: Vec<(usize, f32)> = trials.iter().map(|t| (t.index, t.score)).collect();
    let winner = select_best(&scores).unwrap_or(0);
    let Some(trial) = trials.into_iter().find(|t| t.index == winner) else {
        return Err(EngineError::State(format!("round {round} produced no candidate")));
    };
    let chosen = &candidates[winner];
    log::debug!(
        round = round,
        candidate = winner,
        heuristic = trial.score,
        jitter:? = chosen.jitter;
        "selected candidate"
    );

    let config = chosen.config.clone();
    let theme = config.theme();
    let round_dir = root.begin_round(&state.run, round)?;
    let artifacts = render_round(
        &state.spec,
        &trial.layout,
        &trial.routes,
        &theme,
        &config,
        round_dir.path(),
    )?;

    let measurements = measure(&MeasureInput {
        spec: &state.spec,
        layout: &trial.layout,
        routes: &trial.routes,
        theme: &theme,
        evaluation: &config.evaluation,
        raster_hash: Some(&artifacts.raster_hash),
    });
    let report = evaluate_with_wait(oracle, round, &measurements, &config)?;

    let dir = round_dir.path();
    std::fs::write(
        dir.join(EVALUATION_FILE),
        serde_json::to_string_pretty(&report)?,
    )?;
    std::fs::write(dir.join(SPEC_FILE), serialize_spec(&state.spec)?)?;
    std::fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(&config)?)?;
    write_snapshot(&dir.join(SNAPSHOT_FILE), &trial.layout, &trial.routes)?;
    let dir = round_dir.commit()?;

    Ok(RoundResult {
        candidate: winner,
        config,
        report,
        artifacts,
        dir,
    })
}

/// Runs the oracle; with `critic.wait` a missing judgement is polled for
/// once before the round is given up as pending.
fn evaluate_with_wait(
    oracle: &dyn ScoringOracle,
    round: u32,
    measurements: &Measurements,
    config: &Config,
) -> Result<EvaluationReport, EngineError> {
    match oracle.evaluate(round, measurements) {
        Err(EngineError::ExternalResponse(ExternalResponseError::Missing { path }))
            if config.critic.wait =>
        {
            let critic = &config.critic;
            if wait_for_file(
                &path,
                Duration::from_millis(critic.poll_interval_ms),
                Duration::from_secs(critic.wait_timeout_secs),
            ) {
                oracle.evaluate(round, measurements)
            } else {
                Err(ExternalResponseError::Missing { path }.into())
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::oracle::{JUDGEMENT_FILE, MEASUREMENTS_FILE};
    use crate::parser::parse_spec;

    fn spec() -> DiagramSpec {
        parse_spec(
            r#"{
                title: "Controller",
                canvas: { width: 900, height: 500 },
                groups: [
                    { id: "in", label: "Input", boxes: [ { id: "a", label: "Sensor" }, { id: "b", label: "Buffer" } ] },
                    { id: "out", label: "Output", boxes: [ { id: "c", label: "Display" } ] },
                ],
                edges: [ { from: "a", to: "c" } ],
            }"#,
        )
        .unwrap()
        .spec
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.fonts.fast_text_metrics = true;
        config.render.external_tool = None;
        config.render.pdf = false;
        config.iteration.candidates = 0;
        config
    }

    #[test]
    fn plateau_run_finishes_and_promotes_best() {
        let dir = tempfile::tempdir().unwrap();
        let root = OutputRoot::open(dir.path()).unwrap();
        let outcome = optimize(&root, spec(), config()).unwrap();

        assert_eq!(outcome.status, RunStatus::Finished);
        assert!(outcome.stop_reason.is_some());
        assert!(outcome.rounds >= 1);
        let best = outcome.best_dir.unwrap();
        assert!(best.join(DRAWIO_FILE).is_file());
        assert!(best.join(EVALUATION_FILE).is_file());

        let run_dir = root.run_dir(&outcome.run).unwrap();
        for round in 1..=outcome.rounds {
            assert!(run_dir.join(format!("round-{round:02}")).is_dir());
            assert!(!run_dir.join(format!("round-{round:02}.partial")).exists());
        }
        let state = RunState::load(&run_dir).unwrap();
        assert_eq!(state.history.len() as u32, outcome.rounds);
    }

    #[test]
    fn critic_run_suspends_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let root = OutputRoot::open(dir.path()).unwrap();
        let mut config = config();
        config.iteration.strategy = StopStrategyKind::ExternalCritic;
        config.iteration.max_rounds = 3;

        let first = optimize(&root, spec(), config).unwrap();
        assert_eq!(first.status, RunStatus::AwaitingCritic);
        assert_eq!(first.rounds, 1);
        assert!(first.critic_request.as_ref().unwrap().is_file());

        let pending = resume(&root, None).unwrap();
        assert_eq!(pending.status, RunStatus::AwaitingCritic);
        assert_eq!(pending.rounds, 1);

        let critic = dir.path().join("critic");
        std::fs::write(
            critic.join(RESPONSE_FILE),
            r#"{ "run": "run-0001", "round": 1, "action": "config_only", "reason": "more room", "config": { "layout": { "group_gap": 72 } } }"#,
        )
        .unwrap();
        let second = resume(&root, Some(&first.run)).unwrap();
        assert_eq!(second.status, RunStatus::AwaitingCritic);
        assert_eq!(second.rounds, 2);
        let state = RunState::load(&root.run_dir(&first.run).unwrap()).unwrap();
        assert_eq!(state.config.layout.group_gap, 72.0);
        assert!(critic.join("response.applied-01.json").is_file());

        std::fs::write(
            critic.join(RESPONSE_FILE),
            r#"{ "run": "run-0001", "round": 2, "action": "stop", "reason": "good enough" }"#,
        )
        .unwrap();
        let done = resume(&root, None).unwrap();
        assert_eq!(done.status, RunStatus::Finished);
        assert_eq!(done.stop_reason, Some(StopReason::CriticStop));
        assert_eq!(done.rounds, 2);
    }

    #[test]
    fn leftover_response_from_another_run_is_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let root = OutputRoot::open(dir.path()).unwrap();
        let mut config = config();
        config.iteration.strategy = StopStrategyKind::ExternalCritic;

        let first = optimize(&root, spec(), config.clone()).unwrap();
        assert_eq!(first.run, "run-0001");
        let critic = dir.path().join("critic");
        std::fs::write(
            critic.join(RESPONSE_FILE),
            r#"{ "run": "run-0000", "round": 1, "action": "config_only", "reason": "old", "config": { "layout": { "group_gap": 90 } } }"#,
        )
        .unwrap();
        let pending = resume(&root, Some(&first.run)).unwrap();
        assert_eq!(pending.status, RunStatus::AwaitingCritic);
        assert_eq!(pending.rounds, 1);
        assert!(critic.join("response.stale-01.json").is_file());
        assert!(!critic.join(RESPONSE_FILE).exists());
        let state = RunState::load(&root.run_dir(&first.run).unwrap()).unwrap();
        assert_eq!(state.config.layout.group_gap, config.layout.group_gap);
    }

    #[test]
    fn invalid_critic_response_reruns_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let root = OutputRoot::open(dir.path()).unwrap();
        let mut config = config();
        config.iteration.strategy = StopStrategyKind::ExternalCritic;

        let first = optimize(&root, spec(), config.clone()).unwrap();
        let critic = dir.path().join("critic");
        std::fs::write(
            critic.join(RESPONSE_FILE),
            r#"{ "run": "run-0001", "round": 1, "action": "config_only", "reason": "x", "config": { "critic": { "dir": "../elsewhere" } } }"#,
        )
        .unwrap();
        let next = resume(&root, Some(&first.run)).unwrap();
        assert_eq!(next.rounds, 2);
        assert!(critic.join("response.rejected-01.json").is_file());
        let state = RunState::load(&root.run_dir(&first.run).unwrap()).unwrap();
        assert_eq!(state.config.critic.dir, config.critic.dir);
    }

    #[test]
    fn external_oracle_waits_for_judgement() {
        let dir = tempfile::tempdir().unwrap();
        let root = OutputRoot::open(dir.path()).unwrap();
        let mut config = config();
        config.iteration.oracle = OracleKind::External;
        config.iteration.max_rounds = 1;
        config.iteration.min_rounds = 1;

        let first = optimize(&root, spec(), config).unwrap();
        assert_eq!(first.status, RunStatus::AwaitingJudgement);
        assert_eq!(first.rounds, 0);
        let critic = dir.path().join("critic");
        assert!(critic.join(MEASUREMENTS_FILE).is_file());

        std::fs::write(
            critic.join(JUDGEMENT_FILE),
            r#"{ "round": 1, "defects": [], "note": "clean" }"#,
        )
        .unwrap();
        let done = resume(&root, None).unwrap();
        assert_eq!(done.status, RunStatus::Finished);
        assert_eq!(done.best_score, Some(100.0));
        assert_eq!(done.stop_reason, Some(StopReason::RoundBudget));
    }

    #[test]
    fn parallel_and_serial_trials_agree() {
        let spec = spec();
        let mut base = config();
        base.iteration.candidates = 4;
        let candidates = generate(&base, 1);
        let serial: Vec<f32> = run_trials(&spec, &candidates, false)
            .into_iter()
            .map(|t| t.unwrap().score)
            .collect();
        let parallel: Vec<f32> = run_trials(&spec, &candidates, true)
            .into_iter()
            .map(|t| t.unwrap().score)
            .collect();
        assert_eq!(serial, parallel);
    }
}
