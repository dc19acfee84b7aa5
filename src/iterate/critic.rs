//! File-based hand-off to an external critic.
//!
//! After a round the engine writes `request.json` into the exchange
//! directory and suspends. The critic answers with `response.json`, which is
//! validated in full before anything in it is applied.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Config, apply_override};
use crate::error::{EngineError, ExternalResponseError};
use crate::evaluate::EvaluationReport;
use crate::ir::DiagramSpec;
use crate::parser::parse_spec;

pub const REQUEST_FILE: &str = "request.json";
pub const RESPONSE_FILE: &str = "response.json";
pub const REQUEST_SCHEMA: &str = "schematic.critic-request/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticRequest {
    pub schema: String,
    pub run: String,
    pub round: u32,
    pub spec: DiagramSpec,
    pub config: Config,
    pub evaluation: EvaluationReport,
    /// Paths relative to the output root.
    pub raster_path: Option<String>,
    pub drawio_path: String,
    pub response_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticAction {
    SpecOnly,
    ConfigOnly,
    Both,
    Stop,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResponseDocument {
    /// Run and round of the request being answered.
    run: String,
    round: u32,
    action: CriticAction,
    reason: String,
    #[serde(default)]
    spec: Option<Value>,
    #[serde(default)]
    config: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum CriticVerdict {
    Stop {
        reason: String,
    },
    Continue {
        action: CriticAction,
        reason: String,
        spec: DiagramSpec,
        config: Config,
    },
}

pub fn write_request(dir: &Path, request: &CriticRequest) -> Result<PathBuf, EngineError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(REQUEST_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(request)?)?;
    Ok(path)
}

/// Reads and validates the critic's answer to round `round` of `run`
/// against the current state.
pub fn read_response(
    dir: &Path,
    run: &str,
    round: u32,
    spec: &DiagramSpec,
    config: &Config,
) -> Result<CriticVerdict, ExternalResponseError> {
    let path = dir.join(RESPONSE_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return Err(ExternalResponseError::Missing { path }),
    };
    let invalid = |reason: String| ExternalResponseError::Invalid {
        path: path.clone(),
        reason,
    };
    let document: ResponseDocument =
        serde_json::from_str(&raw).map_err(|err| invalid(err.to_string()))?;
    if document.run != run || document.round != round {
        return Err(ExternalResponseError::Stale {
            path,
            run: document.run,
            round: document.round,
        });
    }

    let (wants_spec, wants_config) = match document.action {
        CriticAction::SpecOnly => (true, false),
        CriticAction::ConfigOnly => (false, true),
        CriticAction::Both => (true, true),
        CriticAction::Stop => (false, false),
    };
    if wants_spec != document.spec.is_some() || wants_config != document.config.is_some() {
        return Err(invalid(format!(
            "action {:?} disagrees with the fields present (spec: {}, config: {})",
            document.action,
            document.spec.is_some(),
            document.config.is_some()
        )));
    }

    if document.action == CriticAction::Stop {
        return Ok(CriticVerdict::Stop {
            reason: document.reason,
        });
    }

    let next_spec = match &document.spec {
        Some(value) => {
            parse_spec(&value.to_string())
                .map_err(|err| invalid(format!("spec rejected: {err}")))?
                .spec
        }
        None => spec.clone(),
    };
    let next_config = match &document.config {
        Some(patch) => apply_override(config, patch)
            .map_err(|err| invalid(format!("config rejected: {err}")))?,
        None => config.clone(),
    };
    Ok(CriticVerdict::Continue {
        action: document.action,
        reason: document.reason,
        spec: next_spec,
        config: next_config,
    })
}

fn archive(dir: &Path, stem: &str, round: u32) -> Result<PathBuf, EngineError> {
    let from = dir.join(RESPONSE_FILE);
    let mut target = dir.join(format!("{stem}-{round:02}.json"));
    let mut n = 2;
    while target.exists() {
        target = dir.join(format!("{stem}-{round:02}-{n}.json"));
        n += 1;
    }
    std::fs::rename(&from, &target)?;
    Ok(target)
}

/// Moves an invalid response aside so the critic can try again.
pub fn reject_response(dir: &Path, round: u32) -> Result<PathBuf, EngineError> {
    archive(dir, "response.rejected", round)
}

/// Moves an applied response aside so it is never applied twice.
pub fn consume_response(dir: &Path, round: u32) -> Result<PathBuf, EngineError> {
    archive(dir, "response.applied", round)
}

/// Moves a response addressed to another run or round out of the way.
pub fn discard_stale_response(dir: &Path, round: u32) -> Result<PathBuf, EngineError> {
    archive(dir, "response.stale", round)
}

/// Polls until `path` exists. Returns false on timeout.
pub fn wait_for_file(path: &Path, interval: Duration, timeout: Duration) -> bool {
    let started = Instant::now();
    loop {
        if path.is_file() {
            return true;
        }
        if started.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(interval);
    }
}
