use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

/// Stage-level failures that halt a pipeline run.
///
/// Anything that only affects a single article or cluster is reported through
/// `pipeline::report::BatchReport` instead and never surfaces here.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Required credentials or endpoints are not configured.
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingEnvironment(Vec<String>),

    /// An intermediate artifact that a stage depends on does not exist.
    #[error("Missing artifact: {} (run the previous stage first)", .path.display())]
    MissingArtifact { path: PathBuf },

    /// An intermediate artifact exists but could not be read or parsed.
    #[error("Unreadable artifact {}: {reason}", .path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    /// Clustering parameters outside their valid range.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Unexpected error inside a stage.
    #[error("Stage {stage} failed: {reason}")]
    StageFailed { stage: Stage, reason: String },
}
