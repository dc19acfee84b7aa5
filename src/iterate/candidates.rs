use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Parameter offsets applied to the round's config.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Jitter {
    pub gap_scale: f32,
    pub margin_delta: f32,
    pub column_delta: i32,
}

impl Jitter {
    pub fn is_identity(&self) -> bool {
        (self.gap_scale - 1.0).abs() < f32::EPSILON
            && self.margin_delta == 0.0
            && self.column_delta == 0
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub index: usize,
    pub jitter: Jitter,
    pub config: Config,
}

/// Deterministic jittered variants of `base` for one round. Candidate 0 is
/// always `base` itself.
pub fn generate(base: &Config, round: u32) -> Vec<Candidate> {
    let seed = base.iteration.seed.wrapping_add(u64::from(round));
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = vec![Candidate {
        index: 0,
        jitter: Jitter {
            gap_scale: 1.0,
            ..Jitter::default()
        },
        config: base.clone(),
    }];
    for index in 1..=base.iteration.candidates {
        let jitter = Jitter {
            gap_scale: rng.random_range(0.8f32..=1.3),
            margin_delta: rng.random_range(-8i32..=16) as f32,
            column_delta: rng.random_range(-1i32..=1),
        };
        out.push(Candidate {
            index,
            jitter,
            config: apply(base, jitter),
        });
    }
    out
}

fn apply(base: &Config, jitter: Jitter) -> Config {
    let mut config = base.clone();
    let min_gap = config.layout.min_gap;
    let scale = |v: f32| (v * jitter.gap_scale).round().max(min_gap);
    config.layout.box_gap_x = scale(config.layout.box_gap_x);
    config.layout.box_gap_y = scale(config.layout.box_gap_y);
    config.layout.group_gap = scale(config.layout.group_gap);
    config.canvas.margin = (config.canvas.margin + jitter.margin_delta).max(min_gap);
    let columns = config.layout.max_columns as i64 + i64::from(jitter.column_delta);
    config.layout.max_columns = columns.max(1) as usize;
    config
}

/// Index of the best candidate: highest score, lowest index on ties.
pub fn select_best(scores: &[(usize, f32)]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for &(index, score) in scores {
        best = match best {
            Some((bi, bs)) if bs > score || (bs == score && bi < index) => Some((bi, bs)),
            _ => Some((index, score)),
        };
    }
    best.map(|(index, _)| index)
}
