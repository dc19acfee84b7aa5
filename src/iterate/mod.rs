//! Round-based optimization: jittered candidates, stop strategies,
//! deterministic auto-fix and the external critic hand-off.

pub mod autofix;
pub mod candidates;
pub mod controller;
pub mod critic;
pub mod output;
pub mod state;
pub mod stop;

pub use controller::{RunOutcome, optimize, resume};
pub use output::OutputRoot;
pub use state::{RunState, RunStatus};
pub use stop::{Decision, RoundSummary, StopReason, StopStrategy};
