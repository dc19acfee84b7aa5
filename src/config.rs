use crate::error::ConfigError;
use crate::ir::BoxKind;
use crate::layout::LayoutTemplate;
use crate::theme::{Theme, parse_color};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Leaf paths a local override or a critic response may set. A trailing `*`
/// admits any leaf below that prefix. Nothing here names a filesystem path or
/// an executable.
pub const OVERRIDE_WHITELIST: &[&str] = &[
    "theme",
    "text_colors.*",
    "fonts.family",
    "fonts.box_size",
    "fonts.group_title_size",
    "fonts.edge_label_size",
    "fonts.title_size",
    "fonts.line_height",
    "canvas.margin",
    "canvas.shrink_to_content",
    "layout.template",
    "layout.box_min_width",
    "layout.box_min_height",
    "layout.box_max_width",
    "layout.padding_x",
    "layout.padding_y",
    "layout.box_gap_x",
    "layout.box_gap_y",
    "layout.group_gap",
    "layout.group_padding",
    "layout.max_columns",
    "routing.obstacle_padding",
    "routing.clearance",
    "routing.weights.*",
];

/// File name of the per-output-directory override document.
pub const LOCAL_OVERRIDE_FILE: &str = "config.local.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Palette preset name, see [`Theme::PRESETS`].
    pub theme: String,
    /// Per-kind box text colour overrides applied on top of the palette.
    pub text_colors: BTreeMap<BoxKind, String>,
    pub fonts: FontConfig,
    pub canvas: CanvasConfig,
    pub layout: LayoutConfig,
    pub routing: RoutingConfig,
    pub render: RenderConfig,
    pub evaluation: EvaluationConfig,
    pub iteration: IterationConfig,
    pub critic: CriticConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "academic".to_string(),
            text_colors: BTreeMap::new(),
            fonts: FontConfig::default(),
            canvas: CanvasConfig::default(),
            layout: LayoutConfig::default(),
            routing: RoutingConfig::default(),
            render: RenderConfig::default(),
            evaluation: EvaluationConfig::default(),
            iteration: IterationConfig::default(),
            critic: CriticConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontConfig {
    /// Overrides the palette's font stack when set.
    pub family: Option<String>,
    pub box_size: f32,
    pub group_title_size: f32,
    pub edge_label_size: f32,
    pub title_size: f32,
    pub line_height: f32,
    /// Skip system font lookup and use the calibrated width table.
    pub fast_text_metrics: bool,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: None,
            box_size: 16.0,
            group_title_size: 18.0,
            edge_label_size: 13.0,
            title_size: 24.0,
            line_height: 1.3,
            fast_text_metrics: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanvasConfig {
    pub margin: f32,
    /// For auto canvases, shrink to the tightest content box after layout.
    pub shrink_to_content: bool,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            margin: 32.0,
            shrink_to_content: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Template override; a template named in the diagram document wins.
    pub template: Option<LayoutTemplate>,
    pub box_min_width: f32,
    pub box_min_height: f32,
    pub box_max_width: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    pub box_gap_x: f32,
    pub box_gap_y: f32,
    pub group_gap: f32,
    pub group_padding: f32,
    pub max_columns: usize,
    /// Floor for gaps when a fixed canvas forces compression.
    pub min_gap: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            template: None,
            box_min_width: 120.0,
            box_min_height: 48.0,
            box_max_width: 260.0,
            padding_x: 14.0,
            padding_y: 10.0,
            box_gap_x: 28.0,
            box_gap_y: 22.0,
            group_gap: 40.0,
            group_padding: 16.0,
            max_columns: 4,
            min_gap: 8.0,
        }
    }
}

/// Named weights of the orthogonal routing cost function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteWeights {
    /// Cost per pixel of path length.
    pub length: f32,
    /// Cost per bend.
    pub turn: f32,
    /// Cost per unrelated obstacle a segment passes through.
    pub obstacle: f32,
    /// Cost per pixel of clearance deficit near an obstacle.
    pub proximity: f32,
    /// Cost per pixel travelled against the edge kind's preferred axis.
    pub corridor: f32,
}

impl Default for RouteWeights {
    fn default() -> Self {
        Self {
            length: 1.0,
            turn: 30.0,
            obstacle: 800.0,
            proximity: 4.0,
            corridor: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    pub obstacle_padding: f32,
    /// Distance below which passing an obstacle counts as crowding it.
    pub clearance: f32,
    pub weights: RouteWeights,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            obstacle_padding: 8.0,
            clearance: 12.0,
            weights: RouteWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Executable used for raster previews of the editable document.
    pub external_tool: Option<String>,
    pub prefer_external: bool,
    pub timeout_secs: u64,
    pub raster_scale: f32,
    pub pdf: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            external_tool: Some("drawio".to_string()),
            prefer_external: true,
            timeout_secs: 60,
            raster_scale: 1.0,
            pdf: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Box overlap ratio (of the smaller box) above which overlap is P0.
    pub overlap_ratio_p0: f32,
    pub min_font_px: f32,
    pub min_font_px_p0: f32,
    pub density_p1: f32,
    pub density_p0: f32,
    pub min_contrast: f32,
    pub min_contrast_p0: f32,
    pub min_margin_px: f32,
    pub crossings_p2: usize,
    pub crossings_p1: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            overlap_ratio_p0: 0.0,
            min_font_px: 12.0,
            min_font_px_p0: 8.0,
            density_p1: 0.6,
            density_p0: 0.85,
            min_contrast: 4.5,
            min_contrast_p0: 3.0,
            min_margin_px: 12.0,
            crossings_p2: 0,
            crossings_p1: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Penalties {
    pub p0: f32,
    pub p1: f32,
    pub p2: f32,
}

impl Default for Penalties {
    fn default() -> Self {
        Self {
            p0: 30.0,
            p1: 10.0,
            p2: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DimensionWeights {
    pub structure: f32,
    pub visual: f32,
    pub readability: f32,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            structure: 1.0,
            visual: 1.0,
            readability: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationConfig {
    pub score_base: f32,
    /// Target print width in px; canvases wider than this are scaled down
    /// and font sizes are judged after that scale.
    pub print_width: Option<f32>,
    pub thresholds: Thresholds,
    pub penalties: Penalties,
    pub weights: DimensionWeights,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            score_base: 100.0,
            print_width: None,
            thresholds: Thresholds::default(),
            penalties: Penalties::default(),
            weights: DimensionWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopStrategyKind {
    #[default]
    Plateau,
    ExternalCritic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OracleKind {
    #[default]
    Heuristic,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IterationConfig {
    pub strategy: StopStrategyKind,
    pub oracle: OracleKind,
    pub max_rounds: usize,
    pub min_rounds: usize,
    /// Rounds without improvement beyond `epsilon` before a plateau stop.
    pub patience: usize,
    pub epsilon: f32,
    /// Jittered candidates scored per round in addition to the base config.
    pub candidates: usize,
    pub seed: u64,
    pub auto_fix: bool,
    /// Score candidates on scoped threads.
    pub parallel: bool,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            strategy: StopStrategyKind::Plateau,
            oracle: OracleKind::Heuristic,
            max_rounds: 5,
            min_rounds: 2,
            patience: 2,
            epsilon: 0.5,
            candidates: 3,
            seed: 7,
            auto_fix: true,
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CriticConfig {
    /// Exchange directory, relative to the output root.
    pub dir: String,
    /// Block and poll for the response instead of suspending the run.
    pub wait: bool,
    pub poll_interval_ms: u64,
    pub wait_timeout_secs: u64,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            dir: "critic".to_string(),
            wait: false,
            poll_interval_ms: 500,
            wait_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory, relative to the output root, holding the promoted best round.
    pub best_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            best_dir: "best".to_string(),
        }
    }
}

impl Config {
    /// Palette with font and text colour overrides applied.
    pub fn theme(&self) -> Theme {
        let mut theme = Theme::preset(&self.theme).unwrap_or_default();
        if let Some(family) = &self.fonts.family {
            theme.font_family = family.clone();
        }
        for (kind, color) in &self.text_colors {
            theme.box_style_mut(*kind).text = color.clone();
        }
        theme
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Theme::preset(&self.theme).is_none() {
            return Err(invalid(
                "theme",
                format!(
                    "unknown palette \"{}\" (expected one of {})",
                    self.theme,
                    Theme::PRESETS.join(", ")
                ),
            ));
        }
        let positive = [
            ("fonts.box_size", self.fonts.box_size),
            ("fonts.group_title_size", self.fonts.group_title_size),
            ("fonts.edge_label_size", self.fonts.edge_label_size),
            ("fonts.title_size", self.fonts.title_size),
            ("fonts.line_height", self.fonts.line_height),
            ("layout.box_min_width", self.layout.box_min_width),
            ("layout.box_min_height", self.layout.box_min_height),
            ("layout.box_max_width", self.layout.box_max_width),
            ("render.raster_scale", self.render.raster_scale),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(field, format!("must be positive, got {value}")));
            }
        }
        let non_negative = [
            ("canvas.margin", self.canvas.margin),
            ("layout.padding_x", self.layout.padding_x),
            ("layout.padding_y", self.layout.padding_y),
            ("layout.box_gap_x", self.layout.box_gap_x),
            ("layout.box_gap_y", self.layout.box_gap_y),
            ("layout.group_gap", self.layout.group_gap),
            ("layout.group_padding", self.layout.group_padding),
            ("layout.min_gap", self.layout.min_gap),
            ("routing.obstacle_padding", self.routing.obstacle_padding),
            ("routing.clearance", self.routing.clearance),
            ("routing.weights.length", self.routing.weights.length),
            ("routing.weights.turn", self.routing.weights.turn),
            ("routing.weights.obstacle", self.routing.weights.obstacle),
            ("routing.weights.proximity", self.routing.weights.proximity),
            ("routing.weights.corridor", self.routing.weights.corridor),
            ("iteration.epsilon", self.iteration.epsilon),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("must be non-negative, got {value}")));
            }
        }
        if self.layout.box_max_width < self.layout.box_min_width {
            return Err(invalid(
                "layout.box_max_width",
                "must not be smaller than layout.box_min_width",
            ));
        }
        if self.layout.max_columns == 0 {
            return Err(invalid("layout.max_columns", "must be at least 1"));
        }
        if self.iteration.max_rounds == 0 {
            return Err(invalid("iteration.max_rounds", "must be at least 1"));
        }
        if self.iteration.min_rounds > self.iteration.max_rounds {
            return Err(invalid(
                "iteration.min_rounds",
                "must not exceed iteration.max_rounds",
            ));
        }
        for (kind, color) in &self.text_colors {
            if parse_color(color).is_none() {
                return Err(invalid(
                    &format!("text_colors.{}", kind.as_str()),
                    format!("\"{color}\" is not a colour (expected #rgb, #rrggbb or a named colour)"),
                ));
            }
        }
        if let Some(family) = &self.fonts.family
            && !is_safe_font_family(family)
        {
            return Err(invalid(
                "fonts.family",
                "may only contain letters, digits, spaces and , . - _",
            ));
        }
        for (field, value) in [
            ("critic.dir", &self.critic.dir),
            ("output.best_dir", &self.output.best_dir),
        ] {
            if !is_relative_inside(value) {
                return Err(invalid(
                    field,
                    format!("\"{value}\" must be a relative path inside the output root"),
                ));
            }
        }
        Ok(())
    }
}

/// Font stacks end up inside style strings and XML attributes, so only plain
/// name characters pass.
fn is_safe_font_family(family: &str) -> bool {
    !family.trim().is_empty()
        && family
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | ',' | '.' | '-' | '_'))
}

fn is_relative_inside(path: &str) -> bool {
    !path.trim().is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let config: Config = json5::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

/// Base config plus the outcome of layering a local override on top of it.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: Config,
    pub override_applied: bool,
    pub override_error: Option<String>,
}

/// Loads the base config, then layers `<dir>/config.local.json` when present.
/// A rejected override leaves the base config untouched.
pub fn load_layered(base: Option<&Path>, override_dir: &Path) -> Result<LayeredConfig, ConfigError> {
    let config = load_config(base)?;
    let override_path = override_dir.join(LOCAL_OVERRIDE_FILE);
    if !override_path.exists() {
        return Ok(LayeredConfig {
            config,
            override_applied: false,
            override_error: None,
        });
    }
    let result = std::fs::read_to_string(&override_path)
        .map_err(|source| ConfigError::Read {
            path: override_path.clone(),
            source,
        })
        .and_then(|raw| {
            json5::from_str::<Value>(&raw).map_err(|err| ConfigError::Parse(err.to_string()))
        })
        .and_then(|patch| apply_override(&config, &patch));
    match result {
        Ok(merged) => {
            log::info!(path:? = override_path; "Applied local config override");
            Ok(LayeredConfig {
                config: merged,
                override_applied: true,
                override_error: None,
            })
        }
        Err(err) => {
            log::warn!(path:? = override_path, error:% = err; "Rejected local config override; using base config");
            Ok(LayeredConfig {
                config,
                override_applied: false,
                override_error: Some(err.to_string()),
            })
        }
    }
}

/// Returns a new config with `patch` merged in. Every leaf of `patch` must be
/// whitelisted; the base config is never modified.
pub fn apply_override(base: &Config, patch: &Value) -> Result<Config, ConfigError> {
    let Value::Object(patch_map) = patch else {
        return Err(ConfigError::Parse(
            "override must be a JSON object".to_string(),
        ));
    };
    let mut leaves = Vec::new();
    collect_leaf_paths(patch_map, "", &mut leaves);
    for leaf in &leaves {
        if !is_whitelisted(leaf) {
            return Err(ConfigError::NotWhitelisted(leaf.clone()));
        }
    }
    let mut merged = serde_json::to_value(base).map_err(|err| ConfigError::Parse(err.to_string()))?;
    merge_values(&mut merged, patch);
    let config: Config =
        serde_json::from_value(merged).map_err(|err| ConfigError::Parse(err.to_string()))?;
    config.validate()?;
    Ok(config)
}

pub fn is_whitelisted(path: &str) -> bool {
    OVERRIDE_WHITELIST.iter().any(|allowed| match allowed.strip_suffix(".*") {
        Some(prefix) => path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1),
        None => path == *allowed,
    })
}

fn collect_leaf_paths(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => collect_leaf_paths(inner, &path, out),
            _ => out.push(path),
        }
    }
}

fn merge_values(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value)
                    }
                    _ => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().expect("defaults validate");
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config = parse_config(r#"{ theme: "modern", fonts: { box_size: 14 } }"#).unwrap();
        assert_eq!(config.theme, "modern");
        assert_eq!(config.fonts.box_size, 14.0);
        assert_eq!(config.fonts.title_size, FontConfig::default().title_size);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(parse_config(r#"{ fonts: { box_sise: 14 } }"#).is_err());
    }

    #[test]
    fn whitelisted_override_merges() {
        let base = Config::default();
        let merged = apply_override(
            &base,
            &json!({ "layout": { "box_gap_x": 40.0 }, "routing": { "weights": { "turn": 5.0 } } }),
        )
        .unwrap();
        assert_eq!(merged.layout.box_gap_x, 40.0);
        assert_eq!(merged.routing.weights.turn, 5.0);
        assert_eq!(merged.layout.box_gap_y, base.layout.box_gap_y);
    }

    #[test]
    fn override_outside_whitelist_is_rejected() {
        let base = Config::default();
        let err = apply_override(&base, &json!({ "output": { "best_dir": "/etc" } }))
            .expect_err("path field must be rejected");
        assert!(matches!(err, ConfigError::NotWhitelisted(path) if path == "output.best_dir"));
        let err = apply_override(&base, &json!({ "render": { "external_tool": "/bin/sh" } }))
            .expect_err("tool must be rejected");
        assert!(matches!(err, ConfigError::NotWhitelisted(_)));
    }

    #[test]
    fn partially_invalid_override_is_rejected_entirely() {
        let base = Config::default();
        let result = apply_override(
            &base,
            &json!({ "fonts": { "box_size": 20.0 }, "critic": { "dir": "../x" } }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn wildcard_requires_a_leaf_below_prefix() {
        assert!(is_whitelisted("routing.weights.turn"));
        assert!(!is_whitelisted("routing.weights"));
        assert!(!is_whitelisted("routing.weightsx"));
        assert!(is_whitelisted("text_colors.primary"));
    }

    #[test]
    fn text_color_overrides_reach_theme() {
        let base = Config::default();
        let merged = apply_override(&base, &json!({ "text_colors": { "primary": "#000000" } })).unwrap();
        assert_eq!(merged.theme().primary_box.text, "#000000");
    }

    #[test]
    fn style_breaking_text_colour_is_rejected() {
        let base = Config::default();
        let err = apply_override(
            &base,
            &json!({ "text_colors": { "primary": "#000;shape=image;image=http://host/x.png" } }),
        )
        .expect_err("colour with style keys must be rejected");
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "text_colors.primary"));
        assert!(apply_override(&base, &json!({ "text_colors": { "primary": "#abc" } })).is_ok());
    }

    #[test]
    fn unsafe_font_family_is_rejected() {
        let base = Config::default();
        for family in ["Arial;fontColor=#fff", "Arial\" onload=\"x", "<b>", "a=b", "   "] {
            let err = apply_override(&base, &json!({ "fonts": { "family": family } }))
                .expect_err("unsafe family must be rejected");
            assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "fonts.family"));
        }
        let merged = apply_override(
            &base,
            &json!({ "fonts": { "family": "Source Sans 3, Helvetica, sans-serif" } }),
        )
        .unwrap();
        assert_eq!(merged.theme().font_family, "Source Sans 3, Helvetica, sans-serif");
    }

    #[test]
    fn escaping_directories_fail_validation() {
        for raw in [
            r#"{ critic: { dir: "../shared" } }"#,
            r#"{ critic: { dir: "/tmp/critic" } }"#,
            r#"{ output: { best_dir: "best/../../x" } }"#,
            r#"{ output: { best_dir: "" } }"#,
        ] {
            assert!(
                matches!(parse_config(raw), Err(ConfigError::Invalid { .. })),
                "{raw} should fail validation"
            );
        }
        let config = parse_config(r#"{ critic: { dir: "exchange/critic" }, output: { best_dir: "./best" } }"#)
            .unwrap();
        assert_eq!(config.critic.dir, "exchange/critic");
    }

    #[test]
    fn override_with_invalid_value_is_rejected() {
        let base = Config::default();
        assert!(apply_override(&base, &json!({ "fonts": { "box_size": -3.0 } })).is_err());
        assert!(apply_override(&base, &json!({ "theme": "neon" })).is_err());
    }
}
