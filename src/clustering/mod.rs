// Module declarations
pub mod dbscan;
pub mod diagnostics;
pub mod grouper;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

// Re-export key functions from modules
pub use dbscan::dbscan;
pub use diagnostics::{
    elbow_index, grid_search, grid_table, k_distance_profile, label_counts, silhouette_score,
    write_k_distance_csv, GridCandidate,
};
pub use grouper::{analyze_clusters, build_assignments, ClusterStats, Grouper, Grouping};

/// Default neighbourhood radius in cosine distance.
pub const DEFAULT_EPS: f64 = 0.15;

/// Default number of *other* points a core point needs within `eps`.
pub const DEFAULT_MIN_SAMPLES: usize = 4;

/// Radii tried by the grid search when `GRID_EPS` is unset.
pub const DEFAULT_GRID_EPS: [f64; 4] = [0.10, 0.15, 0.20, 0.25];

/// Neighbour thresholds tried by the grid search when `GRID_MIN_SAMPLES` is unset.
pub const DEFAULT_GRID_MIN_SAMPLES: [usize; 3] = [2, 4, 6];

/// Number of representative titles shown per cluster.
pub const SAMPLE_TITLES: usize = 3;

/// Density clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DbscanParams {
    pub eps: f64,
    pub min_samples: usize,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            eps: DEFAULT_EPS,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

impl DbscanParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(PipelineError::InvalidParameters(format!(
                "eps must be a positive number, got {}",
                self.eps
            )));
        }
        if self.min_samples == 0 {
            return Err(PipelineError::InvalidParameters(
                "min_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
