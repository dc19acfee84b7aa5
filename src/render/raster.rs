use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::ExternalToolError;
#[cfg(feature = "png")]
use crate::error::RasterError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Command-line renderer invoked as `<tool> -x -f png -o <out> <in>`.
#[derive(Debug, Clone)]
pub struct ExternalRenderer {
    tool: String,
    timeout: Duration,
}

impl ExternalRenderer {
    pub fn new(tool: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            timeout,
        }
    }

    pub fn render_png(&self, input: &Path, output: &Path) -> Result<(), ExternalToolError> {
        let mut child = Command::new(&self.tool)
            .arg("-x")
            .arg("-f")
            .arg("png")
            .arg("-o")
            .arg(output)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExternalToolError::Unavailable {
                tool: self.tool.clone(),
                source,
            })?;

        // Drained concurrently so a chatty tool never blocks on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExternalToolError::Timeout {
                        tool: self.tool.clone(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExternalToolError::Failed {
                        tool: self.tool.clone(),
                        detail: err.to_string(),
                    });
                }
            }
        };

        // A killed tool may leave descendants holding the pipe, so the reader
        // is only joined after a normal exit.
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            let detail = match stderr.lines().find(|l| !l.trim().is_empty()) {
                Some(line) => format!("{status}: {}", line.trim()),
                None => status.to_string(),
            };
            return Err(ExternalToolError::Failed {
                tool: self.tool.clone(),
                detail,
            });
        }
        if !output.is_file() {
            return Err(ExternalToolError::Failed {
                tool: self.tool.clone(),
                detail: format!("no output written to {}", output.display()),
            });
        }
        Ok(())
    }
}

/// Rasterizes the SVG preview at `scale`, on an opaque background.
#[cfg(feature = "png")]
pub fn svg_to_png(svg: &str, scale: f32, background: &str) -> Result<Vec<u8>, RasterError> {
    let mut opt = usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();
    opt.font_family = "Arial".to_string();
    let tree =
        usvg::Tree::from_str(svg, &opt).map_err(|err| RasterError::SvgParse(err.to_string()))?;

    let size = tree.size();
    let width = (size.width() * scale).ceil().max(1.0) as u32;
    let height = (size.height() * scale).ceil().max(1.0) as u32;
    let mut pixmap =
        tiny_skia::Pixmap::new(width, height).ok_or(RasterError::PixmapAlloc { width, height })?;
    if let Some((r, g, b)) = crate::theme::parse_color(background) {
        pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, 255));
    } else {
        pixmap.fill(tiny_skia::Color::WHITE);
    }
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );
    pixmap.encode_png().map_err(|_| RasterError::PngEncode)
}

#[cfg(feature = "png")]
pub fn svg_to_pdf(svg: &str) -> Result<Vec<u8>, RasterError> {
    let mut opt = svg2pdf::usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();
    opt.font_family = "Arial".to_string();
    let tree = svg2pdf::usvg::Tree::from_str(svg, &opt)
        .map_err(|err| RasterError::SvgParse(err.to_string()))?;
    svg2pdf::to_pdf(
        &tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    )
    .map_err(|_| RasterError::PdfConvert)
}

/// Hex digest of the decoded pixel data, so two PNG encodings of the same
/// image hash equally. Undecodable input is hashed as raw bytes.
pub fn raster_hash(png: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    hash_pixels(png, &mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(feature = "png")]
fn hash_pixels(png: &[u8], hasher: &mut DefaultHasher) {
    match tiny_skia::Pixmap::decode_png(png) {
        Ok(pixmap) => {
            pixmap.width().hash(hasher);
            pixmap.height().hash(hasher);
            pixmap.data().hash(hasher);
        }
        Err(_) => png.hash(hasher),
    }
}

#[cfg(not(feature = "png"))]
fn hash_pixels(png: &[u8], hasher: &mut DefaultHasher) {
    png.hash(hasher);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ExternalRenderer::new("schem-no-such-renderer", Duration::from_secs(1));
        let err = renderer
            .render_png(&dir.path().join("in.drawio"), &dir.path().join("out.png"))
            .unwrap_err();
        assert!(matches!(err, ExternalToolError::Unavailable { .. }));
        assert!(!err.remediation().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn slow_tool_is_killed_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let renderer = ExternalRenderer::new(
            script.to_string_lossy().into_owned(),
            Duration::from_millis(200),
        );
        let started = Instant::now();
        let err = renderer
            .render_png(&dir.path().join("in.drawio"), &dir.path().join("out.png"))
            .unwrap_err();
        assert!(matches!(err, ExternalToolError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn noisy_tool_does_not_stall_on_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("noisy.sh");
        // ~200 KiB of diagnostics, well past a pipe buffer, then a normal exit.
        std::fs::write(
            &script,
            "#!/bin/sh\ni=0\nwhile [ $i -lt 4000 ]; do\n  echo 'warning: font fallback engaged for glyph run xxxxxxxx' >&2\n  i=$((i+1))\ndone\n: > \"$5\"\n",
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let renderer = ExternalRenderer::new(
            script.to_string_lossy().into_owned(),
            Duration::from_secs(20),
        );
        let output = dir.path().join("out.png");
        let started = Instant::now();
        renderer
            .render_png(&dir.path().join("in.drawio"), &output)
            .expect("tool exits cleanly");
        assert!(output.is_file());
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_reports_first_stderr_line() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("broken.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'cannot open display' >&2\nexit 3\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let renderer = ExternalRenderer::new(
            script.to_string_lossy().into_owned(),
            Duration::from_secs(10),
        );
        let err = renderer
            .render_png(&dir.path().join("in.drawio"), &dir.path().join("out.png"))
            .unwrap_err();
        assert!(
            matches!(&err, ExternalToolError::Failed { detail, .. } if detail.contains("cannot open display"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ExternalRenderer::new("false", Duration::from_secs(5));
        let err = renderer
            .render_png(&dir.path().join("in.drawio"), &dir.path().join("out.png"))
            .unwrap_err();
        assert!(matches!(err, ExternalToolError::Failed { .. }));
    }

    #[cfg(feature = "png")]
    #[test]
    fn internal_png_and_pdf_have_signatures() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10" viewBox="0 0 10 10"><rect width="10" height="10" fill="black"/></svg>"#;
        let png = svg_to_png(svg, 1.0, "#ffffff").unwrap();
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
        let pdf = svg_to_pdf(svg).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[cfg(feature = "png")]
    #[test]
    fn hash_tracks_pixels() {
        let black = r#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"><rect width="4" height="4" fill="black"/></svg>"#;
        let red = r#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"><rect width="4" height="4" fill="red"/></svg>"#;
        let a = raster_hash(&svg_to_png(black, 1.0, "#fff").unwrap());
        let b = raster_hash(&svg_to_png(black, 1.0, "#fff").unwrap());
        let c = raster_hash(&svg_to_png(red, 1.0, "#fff").unwrap());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
