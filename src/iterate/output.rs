//! Sandboxed output root.
//!
//! ```text
//! <root>/
//!   config.local.json        optional whitelisted override
//!   critic/                  exchange directory
//!   runs/run-0001/
//!     state.json
//!     optimization_log.md
//!     round-01/ ...           complete rounds
//!     round-02.partial/       round in progress
//!   best/                    promoted round, stable file names
//! ```

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};

use crate::error::EngineError;
use crate::render::{DRAWIO_FILE, PDF_FILE, PNG_FILE, SVG_FILE};
use crate::snapshot::SNAPSHOT_FILE;

pub const RUNS_DIR: &str = "runs";
pub const EVALUATION_FILE: &str = "evaluation.json";
pub const SPEC_FILE: &str = "spec.json";
pub const CONFIG_FILE: &str = "config.json";
pub const LOG_FILE: &str = "optimization_log.md";

/// Files copied when a round is promoted to the best directory.
const PROMOTED_FILES: [&str; 8] = [
    DRAWIO_FILE,
    SVG_FILE,
    PNG_FILE,
    PDF_FILE,
    EVALUATION_FILE,
    SPEC_FILE,
    CONFIG_FILE,
    SNAPSHOT_FILE,
];

#[derive(Debug, Clone)]
pub struct OutputRoot {
    root: PathBuf,
}

impl OutputRoot {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Joins a relative path onto the root, refusing anything that could
    /// land outside it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, EngineError> {
        let candidate = Path::new(relative);
        if relative.trim().is_empty() {
            return Err(EngineError::PathEscape(relative.to_string()));
        }
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(EngineError::PathEscape(relative.to_string()));
                }
            }
        }
        Ok(self.root.join(candidate))
    }

    /// Path relative to the root, with `/` separators, for hand-off documents.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn run_dir(&self, run: &str) -> Result<PathBuf, EngineError> {
        self.resolve(&format!("{RUNS_DIR}/{run}"))
    }

    /// `run-NNNN` one past the highest existing run.
    pub fn next_run_id(&self) -> Result<String, EngineError> {
        Ok(format!("run-{:04}", self.latest_run_number()?.unwrap_or(0) + 1))
    }

    pub fn latest_run(&self) -> Result<Option<String>, EngineError> {
        Ok(self.latest_run_number()?.map(|n| format!("run-{n:04}")))
    }

    fn latest_run_number(&self) -> Result<Option<u32>, EngineError> {
        let runs = self.root.join(RUNS_DIR);
        if !runs.is_dir() {
            return Ok(None);
        }
        let mut latest = None;
        for entry in std::fs::read_dir(&runs)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(number) = name
                .to_str()
                .and_then(|n| n.strip_prefix("run-"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            latest = latest.max(Some(number));
        }
        Ok(latest)
    }

    /// Creates the in-progress directory for a round. A leftover partial
    /// directory from an interrupted round is discarded; a completed round
    /// directory is never reused.
    pub fn begin_round(&self, run: &str, round: u32) -> Result<RoundDir, EngineError> {
        let run_dir = self.run_dir(run)?;
        let done = run_dir.join(format!("round-{round:02}"));
        let partial = run_dir.join(format!("round-{round:02}.partial"));
        if done.exists() {
            return Err(EngineError::State(format!(
                "{} already exists",
                done.display()
            )));
        }
        if partial.exists() {
            std::fs::remove_dir_all(&partial)?;
        }
        std::fs::create_dir_all(&partial)?;
        Ok(RoundDir { partial, done })
    }

    /// Replaces the best directory with the files of `round_dir`.
    pub fn promote(&self, best_dir: &str, round_dir: &Path) -> Result<PathBuf, EngineError> {
        let best = self.resolve(best_dir)?;
        let staging = best.with_extension("partial");
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;
        for name in PROMOTED_FILES {
            let from = round_dir.join(name);
            if from.is_file() {
                std::fs::copy(&from, staging.join(name))?;
            }
        }
        if best.exists() {
            std::fs::remove_dir_all(&best)?;
        }
        std::fs::rename(&staging, &best)?;
        Ok(best)
    }
}

/// A round being written. Nothing is visible under the final name until
/// [`RoundDir::commit`].
#[derive(Debug)]
pub struct RoundDir {
    partial: PathBuf,
    done: PathBuf,
}

impl RoundDir {
    pub fn path(&self) -> &Path {
        &self.partial
    }

    pub fn commit(self) -> Result<PathBuf, EngineError> {
        std::fs::rename(&self.partial, &self.done)?;
        Ok(self.done)
    }
}

/// Appends one markdown table row per round, writing the header first.
pub fn append_log(run_dir: &Path, row: &LogRow<'_>) -> Result<(), EngineError> {
    let path = run_dir.join(LOG_FILE);
    let fresh = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if fresh {
        writeln!(file, "# Optimization log\n")?;
        writeln!(
            file,
            "| round | candidate | score | delta | P0 | P1 | P2 | raster | notes |"
        )?;
        writeln!(file, "|---|---|---|---|---|---|---|---|---|")?;
    }
    let delta = match row.previous_score {
        Some(prev) => format!("{:+.1}", row.score - prev),
        None => "-".to_string(),
    };
    let hash: String = row.raster_hash.chars().take(8).collect();
    writeln!(
        file,
        "| {} | {} | {:.1} | {} | {} | {} | {} | `{}` | {} |",
        row.round,
        row.candidate,
        row.score,
        delta,
        row.p0,
        row.p1,
        row.p2,
        hash,
        row.notes.replace('|', "\\|")
    )?;
    Ok(())
}

pub struct LogRow<'a> {
    pub round: u32,
    pub candidate: usize,
    pub score: f32,
    pub previous_score: Option<f32>,
    pub p0: usize,
    pub p1: usize,
    pub p2: usize,
    pub raster_hash: &'a str,
    pub notes: &'a str,
}
