use crate::config::{Config, LayeredConfig, load_layered};
use crate::evaluate::{EvaluationReport, MeasureInput, judge, measure};
use crate::iterate::output::EVALUATION_FILE;
use crate::iterate::{OutputRoot, RunOutcome, optimize, resume};
use crate::layout::{compute_layout, route_edges};
use crate::parser::{ParsedSpec, load_spec};
use crate::render::{RenderArtifacts, render_round};
use crate::snapshot::{SNAPSHOT_FILE, write_snapshot};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "schem",
    version,
    about = "Lay out, render and iteratively improve box-and-connector schematics"
)]
pub struct Args {
    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long = "log-level", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse and validate a spec document, printing warnings
    Validate {
        /// Spec file (JSON or JSON5)
        spec: PathBuf,
    },
    /// Render a single round without iterating
    Render {
        spec: PathBuf,
        /// Output directory
        #[arg(short = 'o', long = "out")]
        out: PathBuf,
        /// Config file (JSON or JSON5)
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// Start an optimization run under the output root
    Optimize {
        spec: PathBuf,
        #[arg(short = 'o', long = "out")]
        out: PathBuf,
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// Continue a suspended run
    Resume {
        #[arg(short = 'o', long = "out")]
        out: PathBuf,
        /// Run id (run-NNNN); defaults to the latest run
        #[arg(long = "run")]
        run: Option<String>,
    },
}

pub fn run(args: &Args) -> Result<()> {
    match &args.command {
        Command::Validate { spec } => {
            let parsed = read_spec(spec)?;
            println!(
                "ok: {} groups, {} boxes, {} edges",
                parsed.spec.groups.len(),
                parsed.spec.box_count(),
                parsed.spec.edges.len()
            );
        }
        Command::Render { spec, out, config } => {
            let parsed = read_spec(spec)?;
            let config = layered_config(config.as_deref(), out)?;
            let (artifacts, report) = render_once(&parsed, &config.config, out)?;
            println!(
                "rendered {} (score {:.1}, {}, renderer {:?})",
                artifacts.drawio.display(),
                report.score,
                report.severity_summary(),
                artifacts.renderer
            );
        }
        Command::Optimize { spec, out, config } => {
            let parsed = read_spec(spec)?;
            let config = layered_config(config.as_deref(), out)?;
            let root = OutputRoot::open(out)?;
            let outcome = optimize(&root, parsed.spec, config.config)?;
            print_outcome(&outcome)?;
        }
        Command::Resume { out, run } => {
            let root = OutputRoot::open(out)?;
            let outcome = resume(&root, run.as_deref())?;
            print_outcome(&outcome)?;
        }
    }
    Ok(())
}

fn read_spec(path: &Path) -> Result<ParsedSpec> {
    let parsed =
        load_spec(path).with_context(|| format!("failed to load spec {}", path.display()))?;
    for warning in &parsed.warnings {
        log::warn!(path = warning.path.as_str(); "{}", warning.message);
        eprintln!("warning: {}: {}", warning.path, warning.message);
    }
    Ok(parsed)
}

fn layered_config(base: Option<&Path>, out: &Path) -> Result<LayeredConfig> {
    let layered = load_layered(base, out).context("failed to load config")?;
    if let Some(err) = &layered.override_error {
        eprintln!("warning: local override ignored: {err}");
    }
    Ok(layered)
}

/// One layout/route/render/judge pass written straight into `out`.
fn render_once(
    parsed: &ParsedSpec,
    config: &Config,
    out: &Path,
) -> Result<(RenderArtifacts, EvaluationReport)> {
    let spec = &parsed.spec;
    let theme = config.theme();
    let layout = compute_layout(spec, &theme, config)?;
    let routes = route_edges(spec, &layout, &theme, config)?;
    let artifacts = render_round(spec, &layout, &routes, &theme, config, out)?;
    let measurements = measure(&MeasureInput {
        spec,
        layout: &layout,
        routes: &routes,
        theme: &theme,
        evaluation: &config.evaluation,
        raster_hash: Some(&artifacts.raster_hash),
    });
    let report = judge(&measurements, &config.evaluation);
    std::fs::write(
        out.join(EVALUATION_FILE),
        serde_json::to_string_pretty(&report)?,
    )?;
    write_snapshot(&out.join(SNAPSHOT_FILE), &layout, &routes)?;
    Ok((artifacts, report))
}

fn print_outcome(outcome: &RunOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}
