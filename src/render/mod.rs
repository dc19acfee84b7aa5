//! Round artifacts: the editable draw.io document, the SVG preview, and the
//! raster/PDF previews derived from them.

pub mod drawio;
pub mod raster;
pub mod svg;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::EngineError;
use crate::ir::DiagramSpec;
use crate::layout::{Layout, RoutedEdge};
use crate::theme::Theme;

pub use drawio::DocumentStats;
pub use raster::ExternalRenderer;

pub const DRAWIO_FILE: &str = "diagram.drawio";
pub const SVG_FILE: &str = "preview.svg";
pub const PNG_FILE: &str = "preview.png";
pub const PDF_FILE: &str = "preview.pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RendererKind {
    Internal,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderArtifacts {
    pub drawio: PathBuf,
    pub svg: PathBuf,
    pub png: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
    pub raster_hash: String,
    pub renderer: RendererKind,
    pub stats: DocumentStats,
    /// Set when the preferred renderer could not be used.
    pub degraded: Option<String>,
}

/// Encodes, preflights and renders one round into `dir`.
///
/// A preflight failure aborts the round before anything is rasterized. A
/// failing external renderer only downgrades to the internal one.
pub fn render_round(
    spec: &DiagramSpec,
    layout: &Layout,
    routes: &[RoutedEdge],
    theme: &Theme,
    config: &Config,
    dir: &Path,
) -> Result<RenderArtifacts, EngineError> {
    std::fs::create_dir_all(dir)?;

    let xml = drawio::encode(spec, layout, routes, theme);
    let stats = drawio::preflight(&xml)?;
    let drawio_path = dir.join(DRAWIO_FILE);
    std::fs::write(&drawio_path, &xml)?;

    let svg_text = svg::render_svg(layout, routes, theme, config.fonts.line_height);
    let svg_path = dir.join(SVG_FILE);
    std::fs::write(&svg_path, &svg_text)?;

    let png_path = dir.join(PNG_FILE);
    let mut degraded = None;
    let mut renderer = RendererKind::Internal;
    let mut png_bytes = None;

    if config.render.prefer_external
        && let Some(tool) = config.render.external_tool.as_deref()
    {
        let external =
            ExternalRenderer::new(tool, Duration::from_secs(config.render.timeout_secs));
        match external.render_png(&drawio_path, &png_path) {
            Ok(()) => {
                png_bytes = Some(std::fs::read(&png_path)?);
                renderer = RendererKind::External;
            }
            Err(err) => {
                log::warn!(
                    tool = tool, error:% = err;
                    "falling back to the internal renderer ({})",
                    err.remediation()
                );
                degraded = Some(err.to_string());
            }
        }
    }

    if png_bytes.is_none() {
        png_bytes = internal_png(&svg_text, theme, config, &png_path, &mut degraded)?;
    }

    let raster_hash = match &png_bytes {
        Some(bytes) => raster::raster_hash(bytes),
        None => raster::raster_hash(svg_text.as_bytes()),
    };

    let pdf = if config.render.pdf {
        write_pdf(&svg_text, &dir.join(PDF_FILE))?
    } else {
        None
    };

    log::debug!(
        dir:? = dir, cells = stats.cells, renderer:? = renderer;
        "round rendered"
    );

    Ok(RenderArtifacts {
        drawio: drawio_path,
        svg: svg_path,
        png: png_bytes.map(|_| png_path),
        pdf,
        raster_hash,
        renderer,
        stats,
        degraded,
    })
}

#[cfg(feature = "png")]
fn internal_png(
    svg_text: &str,
    theme: &Theme,
    config: &Config,
    path: &Path,
    _degraded: &mut Option<String>,
) -> Result<Option<Vec<u8>>, EngineError> {
    let bytes = raster::svg_to_png(svg_text, config.render.raster_scale, &theme.background)?;
    std::fs::write(path, &bytes)?;
    Ok(Some(bytes))
}

#[cfg(not(feature = "png"))]
fn internal_png(
    _svg_text: &str,
    _theme: &Theme,
    _config: &Config,
    _path: &Path,
    degraded: &mut Option<String>,
) -> Result<Option<Vec<u8>>, EngineError> {
    log::warn!("built without the `png` feature; no raster preview produced");
    degraded.get_or_insert_with(|| "internal rasterizer not compiled in".to_string());
    Ok(None)
}

#[cfg(feature = "png")]
fn write_pdf(svg_text: &str, path: &Path) -> Result<Option<PathBuf>, EngineError> {
    match raster::svg_to_pdf(svg_text) {
        Ok(bytes) => {
            std::fs::write(path, bytes)?;
            Ok(Some(path.to_path_buf()))
        }
        Err(err) => {
            log::warn!(error:% = err; "PDF preview skipped");
            Ok(None)
        }
    }
}

#[cfg(not(feature = "png"))]
fn write_pdf(_svg_text: &str, _path: &Path) -> Result<Option<PathBuf>, EngineError> {
    Ok(None)
}

pub(crate) fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Coordinate formatting: at most two decimals, no trailing zeros.
pub(crate) fn num(value: f32) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let mut text = format!("{rounded:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{compute_layout, route_edges};
    use crate::parser::parse_spec;

    #[test]
    fn numbers_are_trimmed() {
        assert_eq!(num(12.0), "12");
        assert_eq!(num(12.5), "12.5");
        assert_eq!(num(0.125), "0.13");
        assert_eq!(num(-0.001), "0");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_xml("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }

    #[test]
    fn missing_external_tool_falls_back_to_internal() {
        let raw = r#"{
            canvas: { width: 600, height: 300 },
            groups: [ { id: "g", label: "Only", boxes: [ { id: "a", label: "A" }, { id: "b", label: "B" } ] } ],
            edges: [ { from: "a", to: "b" } ],
        }"#;
        let mut config = Config::default();
        config.fonts.fast_text_metrics = true;
        config.render.external_tool = Some("schem-no-such-renderer".to_string());
        config.render.pdf = false;
        let spec = parse_spec(raw).unwrap().spec;
        let theme = config.theme();
        let layout = compute_layout(&spec, &theme, &config).unwrap();
        let routes = route_edges(&spec, &layout, &theme, &config).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let artifacts = render_round(&spec, &layout, &routes, &theme, &config, dir.path()).unwrap();
        assert_eq!(artifacts.renderer, RendererKind::Internal);
        assert!(artifacts.degraded.is_some());
        assert!(artifacts.drawio.is_file());
        assert!(artifacts.svg.is_file());
        assert_eq!(artifacts.stats.edges, 1);
        #[cfg(feature = "png")]
        assert!(artifacts.png.as_ref().is_some_and(|p| p.is_file()));
    }
}
