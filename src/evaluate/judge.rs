use std::collections::BTreeMap;

use crate::config::EvaluationConfig;

use super::{Defect, Dimension, EvaluationReport, Measurements, Severity};

/// Sub-pixel excess is layout rounding, not a defect.
const PX_TOLERANCE: f32 = 0.5;

struct Findings {
    defects: Vec<Defect>,
}

impl Findings {
    fn push(
        &mut self,
        dimension: Dimension,
        severity: Severity,
        code: &str,
        subject: Option<&str>,
        metric_value: f32,
        message: String,
    ) {
        self.defects.push(Defect {
            dimension,
            severity,
            code: code.to_string(),
            message,
            subject: subject.map(str::to_string),
            metric_value,
        });
    }
}

/// Maps measured facts to severity-tagged defects and a score.
pub fn judge(m: &Measurements, config: &EvaluationConfig) -> EvaluationReport {
    let t = &config.thresholds;
    let mut f = Findings {
        defects: Vec::new(),
    };

    for o in m.box_overlaps.iter().chain(&m.group_overlaps) {
        if o.ratio > t.overlap_ratio_p0 {
            f.push(
                Dimension::Structure,
                Severity::P0,
                "overlap",
                Some(format!("{}/{}", o.a, o.b).as_str()),
                o.ratio,
                format!(
                    "{} and {} overlap by {:.0}px² ({:.0}% of the smaller)",
                    o.a,
                    o.b,
                    o.area,
                    o.ratio * 100.0
                ),
            );
        }
    }

    for c in &m.containment {
        f.push(
            Dimension::Structure,
            Severity::P0,
            "containment",
            Some(c.subject.as_str()),
            c.excess,
            format!("{} extends {:.1}px outside {}", c.subject, c.excess, c.container),
        );
    }

    if m.canvas_overflow > PX_TOLERANCE {
        f.push(
            Dimension::Structure,
            Severity::P0,
            "canvas-overflow",
            None,
            m.canvas_overflow,
            format!(
                "content extends {:.1}px past the {}x{} canvas",
                m.canvas_overflow, m.canvas.width, m.canvas.height
            ),
        );
    }

    for edge in &m.non_orthogonal {
        f.push(
            Dimension::Structure,
            Severity::P0,
            "non-orthogonal",
            Some(edge.as_str()),
            1.0,
            format!("orthogonal edge {edge} has a diagonal segment"),
        );
    }

    let fonts = m
        .boxes
        .iter()
        .map(|b| (b.id.as_str(), b.font_px, b.effective_font_px, b.contrast))
        .chain(
            m.texts
                .iter()
                .map(|x| (x.subject.as_str(), x.font_px, x.effective_font_px, x.contrast)),
        );
    for (subject, font_px, effective, contrast) in fonts {
        let severity = if effective < t.min_font_px_p0 {
            Some(Severity::P0)
        } else if effective < t.min_font_px {
            Some(Severity::P1)
        } else {
            None
        };
        if let Some(severity) = severity {
            f.push(
                Dimension::Readability,
                severity,
                "font-too-small",
                Some(subject),
                effective,
                format!(
                    "{subject}: {font_px:.1}px text prints at {effective:.1}px (minimum {:.1}px)",
                    t.min_font_px
                ),
            );
        }
        if let Some(ratio) = contrast {
            let severity = if ratio < t.min_contrast_p0 {
                Some(Severity::P0)
            } else if ratio < t.min_contrast {
                Some(Severity::P1)
            } else {
                None
            };
            if let Some(severity) = severity {
                f.push(
                    Dimension::Readability,
                    severity,
                    "low-contrast",
                    Some(subject),
                    ratio,
                    format!(
                        "{subject}: contrast {ratio:.2}:1 below {:.1}:1",
                        t.min_contrast
                    ),
                );
            }
        }
    }

    for b in &m.boxes {
        let severity = if b.density > t.density_p0 {
            Some(Severity::P0)
        } else if b.density > t.density_p1 {
            Some(Severity::P1)
        } else {
            None
        };
        if let Some(severity) = severity {
            f.push(
                Dimension::Visual,
                severity,
                "crowding",
                Some(b.id.as_str()),
                b.density,
                format!("{}: text fills {:.0}% of the box", b.id, b.density * 100.0),
            );
        }
        if b.text_overflow > PX_TOLERANCE {
            f.push(
                Dimension::Readability,
                Severity::P1,
                "text-overflow",
                Some(b.id.as_str()),
                b.text_overflow,
                format!(
                    "{}: a word is {:.1}px wider than the box allows",
                    b.id, b.text_overflow
                ),
            );
        }
    }

    if let Some(margin) = m.min_margin
        && margin < t.min_margin_px
    {
        f.push(
            Dimension::Visual,
            Severity::P2,
            "margin",
            None,
            margin,
            format!(
                "content is {margin:.1}px from the canvas edge (minimum {:.1}px)",
                t.min_margin_px
            ),
        );
    }

    let crossings = m.total_crossings();
    let severity = if crossings > t.crossings_p1 {
        Some(Severity::P1)
    } else if crossings > t.crossings_p2 {
        Some(Severity::P2)
    } else {
        None
    };
    if let Some(severity) = severity {
        f.push(
            Dimension::Visual,
            severity,
            "crossings",
            None,
            crossings as f32,
            format!("{crossings} edge crossing(s)"),
        );
    }

    for hit in &m.edge_hits {
        f.push(
            Dimension::Readability,
            Severity::P1,
            "edge-through-box",
            Some(hit.edge.as_str()),
            hit.obstacles.len() as f32,
            format!("edge {} passes through {}", hit.edge, hit.obstacles.join(", ")),
        );
    }

    for o in &m.label_overlaps {
        f.push(
            Dimension::Readability,
            Severity::P2,
            "label-overlap",
            Some(o.edge.as_str()),
            o.area,
            format!("label of edge {} overlaps {}", o.edge, o.other),
        );
    }

    score(f.defects, m.clone(), config)
}

/// Builds a report from already-judged defects.
pub(crate) fn score(
    defects: Vec<Defect>,
    measurements: Measurements,
    config: &EvaluationConfig,
) -> EvaluationReport {
    let mut dimension_penalties: BTreeMap<Dimension, f32> = [
        (Dimension::Structure, 0.0),
        (Dimension::Visual, 0.0),
        (Dimension::Readability, 0.0),
    ]
    .into_iter()
    .collect();
    for d in &defects {
        let base = match d.severity {
            Severity::P0 => config.penalties.p0,
            Severity::P1 => config.penalties.p1,
            Severity::P2 => config.penalties.p2,
        };
        let weight = match d.dimension {
            Dimension::Structure => config.weights.structure,
            Dimension::Visual => config.weights.visual,
            Dimension::Readability => config.weights.readability,
        };
        *dimension_penalties.entry(d.dimension).or_default() += base * weight;
    }
    let total: f32 = dimension_penalties.values().sum();
    EvaluationReport {
        round: 0,
        oracle: "heuristic".to_string(),
        defects,
        dimension_penalties,
        score: config.score_base - total,
        measurements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::{
        BoxMeasure, Crossing, EdgeHit, LabelOverlap, Membership, OverlapMeasure, TextMeasure,
        TextRole,
    };
    use crate::geometry::Size;

    fn empty() -> Measurements {
        Measurements {
            canvas: Size::new(800.0, 600.0),
            canvas_fixed: false,
            canvas_expanded: false,
            print_scale: 1.0,
            content_bounds: None,
            min_margin: Some(40.0),
            canvas_overflow: 0.0,
            box_overlaps: Vec::new(),
            group_overlaps: Vec::new(),
            containment: Vec::new(),
            boxes: Vec::new(),
            texts: Vec::new(),
            crossings: Vec::new(),
            edge_hits: Vec::new(),
            label_overlaps: Vec::new(),
            non_orthogonal: Vec::new(),
            raster_hash: None,
        }
    }

    fn boxed(id: &str, font: f32, density: f32) -> BoxMeasure {
        BoxMeasure {
            id: id.to_string(),
            font_px: font,
            effective_font_px: font,
            density,
            text_overflow: 0.0,
            contrast: Some(10.0),
        }
    }

    #[test]
    fn clean_measurements_score_the_base() {
        let config = EvaluationConfig::default();
        let report = judge(&empty(), &config);
        assert!(report.defects.is_empty());
        assert_eq!(report.score, config.score_base);
    }

    #[test]
    fn overlap_is_p0_with_ratio_metric() {
        let mut m = empty();
        m.box_overlaps.push(OverlapMeasure {
            a: "a".into(),
            b: "b".into(),
            area: 7200.0,
            ratio: 1.0,
        });
        let report = judge(&m, &EvaluationConfig::default());
        let defect = report.defects_with_code("overlap").next().unwrap();
        assert_eq!(defect.severity, Severity::P0);
        assert!(defect.metric_value > 0.0);
        assert_eq!(report.score, 70.0);
    }

    #[test]
    fn font_and_crowding_tiers() {
        let mut m = empty();
        m.boxes.push(boxed("small", 10.0, 0.3));
        m.boxes.push(boxed("tiny", 6.0, 0.3));
        m.boxes.push(boxed("busy", 16.0, 0.7));
        m.boxes.push(boxed("packed", 16.0, 0.9));
        let report = judge(&m, &EvaluationConfig::default());
        let sev = |code: &str, subject: &str| {
            report
                .defects
                .iter()
                .find(|d| d.code == code && d.subject.as_deref() == Some(subject))
                .map(|d| d.severity)
        };
        assert_eq!(sev("font-too-small", "small"), Some(Severity::P1));
        assert_eq!(sev("font-too-small", "tiny"), Some(Severity::P0));
        assert_eq!(sev("crowding", "busy"), Some(Severity::P1));
        assert_eq!(sev("crowding", "packed"), Some(Severity::P0));
    }

    #[test]
    fn crossings_and_weights_shape_the_score() {
        let mut m = empty();
        m.crossings.push(Crossing {
            a: "e0".into(),
            b: "e1".into(),
            count: 1,
        });
        let mut config = EvaluationConfig::default();
        config.weights.visual = 2.0;
        let report = judge(&m, &config);
        assert_eq!(report.count(Severity::P2), 1);
        assert_eq!(report.dimension_penalties[&Dimension::Visual], 6.0);
        assert_eq!(report.score, 94.0);
    }

    fn severity_of(report: &EvaluationReport, code: &str) -> Vec<Severity> {
        report.defects_with_code(code).map(|d| d.severity).collect()
    }

    #[test]
    fn structural_failures_are_p0() {
        let mut m = empty();
        m.containment.push(Membership {
            subject: "a".into(),
            container: "g".into(),
            excess: 6.0,
        });
        m.canvas_overflow = 24.0;
        m.min_margin = Some(-24.0);
        let report = judge(&m, &EvaluationConfig::default());
        assert_eq!(severity_of(&report, "containment"), vec![Severity::P0]);
        assert_eq!(severity_of(&report, "canvas-overflow"), vec![Severity::P0]);
        assert_eq!(
            report.defects_with_code("canvas-overflow").next().unwrap().metric_value,
            24.0
        );
    }

    #[test]
    fn sub_pixel_overflow_is_tolerated() {
        let mut m = empty();
        m.canvas_overflow = 0.3;
        let mut b = boxed("a", 16.0, 0.3);
        b.text_overflow = 0.2;
        m.boxes.push(b);
        let report = judge(&m, &EvaluationConfig::default());
        assert!(!report.has_code("canvas-overflow"));
        assert!(!report.has_code("text-overflow"));
    }

    #[test]
    fn readability_defects_carry_their_tiers() {
        let mut m = empty();
        let mut wide = boxed("wide", 16.0, 0.3);
        wide.text_overflow = 14.0;
        m.boxes.push(wide);
        let mut faint = boxed("faint", 16.0, 0.3);
        faint.contrast = Some(3.8);
        m.boxes.push(faint);
        m.texts.push(TextMeasure {
            subject: "g#title".into(),
            role: TextRole::GroupTitle,
            font_px: 18.0,
            effective_font_px: 18.0,
            contrast: Some(1.6),
        });
        m.edge_hits.push(EdgeHit {
            edge: "e1".into(),
            obstacles: vec!["b".into(), "c".into()],
        });
        m.label_overlaps.push(LabelOverlap {
            edge: "e2".into(),
            other: "a".into(),
            area: 120.0,
        });
        let report = judge(&m, &EvaluationConfig::default());

        assert_eq!(severity_of(&report, "text-overflow"), vec![Severity::P1]);
        let contrast: Vec<_> = report
            .defects_with_code("low-contrast")
            .map(|d| (d.subject.clone().unwrap_or_default(), d.severity))
            .collect();
        assert_eq!(
            contrast,
            vec![
                ("faint".to_string(), Severity::P1),
                ("g#title".to_string(), Severity::P0),
            ]
        );
        let hit = report.defects_with_code("edge-through-box").next().unwrap();
        assert_eq!(hit.severity, Severity::P1);
        assert_eq!(hit.dimension, Dimension::Readability);
        assert_eq!(hit.metric_value, 2.0);
        assert_eq!(severity_of(&report, "label-overlap"), vec![Severity::P2]);
    }

    #[test]
    fn thin_margin_is_p2() {
        let mut m = empty();
        m.min_margin = Some(4.0);
        let report = judge(&m, &EvaluationConfig::default());
        assert_eq!(severity_of(&report, "margin"), vec![Severity::P2]);
        assert_eq!(report.score, 97.0);
    }
}
