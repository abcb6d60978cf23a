pub mod artifacts;
pub mod orchestrator;
pub mod report;

use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

pub use artifacts::ArtifactStore;
pub use orchestrator::{Pipeline, PipelineSettings, RunOutcome};
pub use report::{BatchReport, RunSummary, Skipped};

/// The four stages of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Vectorize,
    Group,
    Synthesize,
    Reconcile,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Vectorize,
        Stage::Group,
        Stage::Synthesize,
        Stage::Reconcile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Vectorize => "vectorize",
            Stage::Group => "group",
            Stage::Synthesize => "synthesize",
            Stage::Reconcile => "reconcile",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

/// Where a run currently stands.
///
/// `Init -> Running(vectorize) -> ... -> Running(reconcile) -> Done`, or
/// `Failed` from any running stage. A failed run executes nothing further.
#[derive(Debug)]
pub enum PipelineState {
    Init,
    Running(Stage),
    Done,
    Failed { stage: Stage, error: PipelineError },
}

impl PipelineState {
    pub fn is_done(&self) -> bool {
        matches!(self, PipelineState::Done)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PipelineState::Failed { .. })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Init => f.write_str("init"),
            PipelineState::Running(stage) => write!(f, "running {}", stage),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed { stage, error } => write!(f, "failed at {}: {}", stage, error),
        }
    }
}
