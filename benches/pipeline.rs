use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use schematic_engine::config::Config;
use schematic_engine::evaluate::{MeasureInput, judge, measure};
use schematic_engine::layout::{compute_layout, route_edges};
use schematic_engine::parser::parse_spec;
use schematic_engine::render::{drawio, svg};
use std::hint::black_box;

/// `groups` groups of `per_group` boxes chained left to right, plus
/// `extra_edges` long edges skipping a group.
fn spec_source(groups: usize, per_group: usize, extra_edges: usize) -> String {
    let mut out = String::from("{ title: \"Bench\", canvas: { width: 1600, height: 900 }, groups: [");
    for g in 0..groups {
        out.push_str(&format!("{{ id: \"g{g}\", label: \"Stage {g}\", boxes: ["));
        for b in 0..per_group {
            out.push_str(&format!("{{ id: \"b{g}_{b}\", label: \"Step {g}.{b}\" }},"));
        }
        out.push_str("] },");
    }
    out.push_str("], edges: [");
    for g in 0..groups {
        for b in 0..per_group.saturating_sub(1) {
            out.push_str(&format!("{{ from: \"b{g}_{b}\", to: \"b{g}_{}\" }},", b + 1));
        }
        if g + 1 < groups {
            out.push_str(&format!(
                "{{ from: \"b{g}_{}\", to: \"b{}_0\" }},",
                per_group - 1,
                g + 1
            ));
        }
    }
    let mut count = 0;
    'outer: for g in 0..groups.saturating_sub(2) {
        for b in 0..per_group {
            if count >= extra_edges {
                break 'outer;
            }
            out.push_str(&format!(
                "{{ from: \"b{g}_{b}\", to: \"b{}_{b}\", kind: \"aux\" }},",
                g + 2
            ));
            count += 1;
        }
    }
    out.push_str("] }");
    out
}

const SIZES: [(&str, usize, usize, usize); 3] = [
    ("small", 2, 3, 0),
    ("medium", 3, 5, 4),
    ("large", 4, 8, 12),
];

fn bench_config() -> Config {
    let mut config = Config::default();
    config.fonts.fast_text_metrics = true;
    config
}

fn bench_layout_and_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_route");
    let config = bench_config();
    let theme = config.theme();
    for (name, groups, per_group, extra) in SIZES {
        let spec = parse_spec(&spec_source(groups, per_group, extra))
            .expect("parse failed")
            .spec;
        group.bench_with_input(BenchmarkId::from_parameter(name), &spec, |b, spec| {
            b.iter(|| {
                let layout = compute_layout(black_box(spec), &theme, &config).expect("layout");
                let routes = route_edges(spec, &layout, &theme, &config).expect("routes");
                black_box(routes.len());
            });
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let config = bench_config();
    let theme = config.theme();
    for (name, groups, per_group, extra) in SIZES {
        let spec = parse_spec(&spec_source(groups, per_group, extra))
            .expect("parse failed")
            .spec;
        let layout = compute_layout(&spec, &theme, &config).expect("layout");
        let routes = route_edges(&spec, &layout, &theme, &config).expect("routes");
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let xml = drawio::encode(black_box(&spec), &layout, &routes, &theme);
                let stats = drawio::preflight(&xml).expect("preflight");
                let svg = svg::render_svg(&layout, &routes, &theme, config.fonts.line_height);
                black_box((stats.cells, svg.len()));
            });
        });
    }
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let config = bench_config();
    let theme = config.theme();
    for (name, groups, per_group, extra) in SIZES {
        let spec = parse_spec(&spec_source(groups, per_group, extra))
            .expect("parse failed")
            .spec;
        let layout = compute_layout(&spec, &theme, &config).expect("layout");
        let routes = route_edges(&spec, &layout, &theme, &config).expect("routes");
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let m = measure(&MeasureInput {
                    spec: black_box(&spec),
                    layout: &layout,
                    routes: &routes,
                    theme: &theme,
                    evaluation: &config.evaluation,
                    raster_hash: None,
                });
                black_box(judge(&m, &config.evaluation).score);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_layout_and_routing, bench_render, bench_evaluate);
criterion_main!(benches);
