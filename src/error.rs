//! Error types shared across the pipeline.
//!
//! Structural problems (a spec that cannot be resolved, geometry that is not
//! finite, a generated document that is not well formed) are errors. Quality
//! problems never are: they become scored defects in the evaluator.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A spec validation failure, qualified with the path of the offending field
/// (for example `edges[2].to`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("non-finite geometry for {subject}")]
    NonFinite { subject: String },
    #[error("edge {edge} references box {id} missing from the layout")]
    MissingBox { edge: String, id: String },
}

/// The editable document failed its well-formedness preflight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("document preflight failed: {reason}")]
pub struct RenderIntegrityError {
    pub reason: String,
}

impl RenderIntegrityError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExternalToolError {
    #[error("external renderer `{tool}` is not available: {source}")]
    Unavailable {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("external renderer `{tool}` exceeded its {timeout:?} budget")]
    Timeout { tool: String, timeout: Duration },
    #[error("external renderer `{tool}` failed: {detail}")]
    Failed { tool: String, detail: String },
}

impl ExternalToolError {
    /// One-line hint printed next to the fallback warning.
    pub fn remediation(&self) -> &'static str {
        match self {
            ExternalToolError::Unavailable { .. } => {
                "install the draw.io desktop CLI or set render.external_tool to null"
            }
            ExternalToolError::Timeout { .. } => "raise render.timeout_secs",
            ExternalToolError::Failed { .. } => {
                "inspect the tool output or set render.prefer_external to false"
            }
        }
    }
}

/// Internal rasterizer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterError {
    #[error("failed to parse SVG: {0}")]
    SvgParse(String),
    #[error("failed to allocate a {width}x{height} pixmap")]
    PixmapAlloc { width: u32, height: u32 },
    #[error("failed to encode PNG")]
    PngEncode,
    #[error("failed to convert SVG to PDF")]
    PdfConvert,
}

#[derive(Debug, Error)]
pub enum ExternalResponseError {
    #[error("no response found at {}", path.display())]
    Missing { path: PathBuf },
    #[error("response at {} rejected: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
    #[error("response at {} answers {run} round {round}, not the pending request", path.display())]
    Stale {
        path: PathBuf,
        run: String,
        round: u32,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("field `{0}` is not in the override whitelist")]
    NotWhitelisted(String),
    #[error("invalid value for `{field}`: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    RenderIntegrity(#[from] RenderIntegrityError),
    #[error(transparent)]
    ExternalResponse(#[from] ExternalResponseError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("path `{0}` escapes the output root")]
    PathEscape(String),
    #[error("run state error: {0}")]
    State(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_displays_field_path() {
        let err = ValidationError::new("edges[2].to", "unknown box `groupX.nonexistent`");
        assert_eq!(
            err.to_string(),
            "edges[2].to: unknown box `groupX.nonexistent`"
        );
    }
}
