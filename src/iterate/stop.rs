use serde::{Deserialize, Serialize};

use crate::config::IterationConfig;

/// Per-round facts the stop strategies look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub score: f32,
    pub raster_hash: String,
    pub p0: usize,
    pub p1: usize,
    pub p2: usize,
    /// Jittered candidate promoted for this round (0 is the unjittered config).
    pub candidate: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// The raster did not change from the previous round.
    HashStable,
    /// The best score stopped improving by more than epsilon.
    ScorePlateau,
    RoundBudget,
    /// The critic answered `stop`.
    CriticStop,
}

impl StopReason {
    pub fn describe(self) -> &'static str {
        match self {
            StopReason::HashStable => "raster hash unchanged from the previous round",
            StopReason::ScorePlateau => "best score plateaued",
            StopReason::RoundBudget => "round budget exhausted",
            StopReason::CriticStop => "critic requested stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop(StopReason),
    /// Hand the round to the critic and wait for a response.
    Suspend,
}

pub trait StopStrategy {
    fn name(&self) -> &'static str;
    fn decide(&self, history: &[RoundSummary]) -> Decision;
}

#[derive(Debug, Clone)]
pub struct PlateauStop {
    pub min_rounds: usize,
    pub max_rounds: usize,
    pub patience: usize,
    pub epsilon: f32,
}

impl PlateauStop {
    pub fn from_config(config: &IterationConfig) -> Self {
        Self {
            min_rounds: config.min_rounds,
            max_rounds: config.max_rounds,
            patience: config.patience.max(1),
            epsilon: config.epsilon,
        }
    }
}

fn best_score(history: &[RoundSummary]) -> Option<f32> {
    history.iter().map(|r| r.score).reduce(f32::max)
}

impl StopStrategy for PlateauStop {
    fn name(&self) -> &'static str {
        "plateau"
    }

    fn decide(&self, history: &[RoundSummary]) -> Decision {
        let rounds = history.len();
        if rounds >= self.min_rounds {
            if let [.., previous, last] = history
                && previous.raster_hash == last.raster_hash
            {
                return Decision::Stop(StopReason::HashStable);
            }
            if rounds > self.patience
                && let (Some(before), Some(now)) = (
                    best_score(&history[..rounds - self.patience]),
                    best_score(history),
                )
                && now - before <= self.epsilon
            {
                return Decision::Stop(StopReason::ScorePlateau);
            }
        }
        if rounds >= self.max_rounds {
            return Decision::Stop(StopReason::RoundBudget);
        }
        Decision::Continue
    }
}

/// Suspends after every round so the critic drives the next step.
#[derive(Debug, Clone)]
pub struct CriticStop {
    pub max_rounds: usize,
}

impl StopStrategy for CriticStop {
    fn name(&self) -> &'static str {
        "external-critic"
    }

    fn decide(&self, history: &[RoundSummary]) -> Decision {
        if history.len() >= self.max_rounds {
            Decision::Stop(StopReason::RoundBudget)
        } else {
            Decision::Suspend
        }
    }
}
