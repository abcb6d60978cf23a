use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::types::{ClusterAssignment, ClusterIssueMapping, EmbeddingRecord};
use crate::TARGET_PIPELINE;

pub const EMBEDDINGS_FILE: &str = "article_embeddings.json";
pub const CLUSTERS_FILE: &str = "cluster_results.json";
pub const MAPPING_FILE: &str = "cluster_issue_mapping.json";
pub const REPORTS_DIR: &str = "reports";

/// File-based hand-off between stages.
///
/// Each artifact is a JSON array of flat records. Writes go through a
/// temporary file and a rename so a crash never leaves a half-written
/// artifact behind for the next stage.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.join(REPORTS_DIR)
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, PipelineError> {
        let path = self.path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::MissingArtifact { path });
            }
            Err(e) => {
                return Err(PipelineError::InvalidArtifact {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        let items: Vec<T> =
            serde_json::from_str(&raw).map_err(|e| PipelineError::InvalidArtifact {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        debug!(target: TARGET_PIPELINE, "Loaded {} records from {}", items.len(), path.display());
        Ok(items)
    }

    fn save<T: Serialize>(&self, name: &str, items: &[T]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating artifact directory {}", self.dir.display()))?;

        let path = self.path(name);
        let tmp = self.path(&format!("{}.tmp", name));
        let json = serde_json::to_string_pretty(items)?;
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;

        info!(target: TARGET_PIPELINE, "Saved {} records to {}", items.len(), path.display());
        Ok(path)
    }

    pub fn load_embeddings(&self) -> Result<Vec<EmbeddingRecord>, PipelineError> {
        self.load(EMBEDDINGS_FILE)
    }

    pub fn save_embeddings(&self, records: &[EmbeddingRecord]) -> Result<PathBuf> {
        self.save(EMBEDDINGS_FILE, records)
    }

    pub fn load_clusters(&self) -> Result<Vec<ClusterAssignment>, PipelineError> {
        self.load(CLUSTERS_FILE)
    }

    pub fn save_clusters(&self, assignments: &[ClusterAssignment]) -> Result<PathBuf> {
        self.save(CLUSTERS_FILE, assignments)
    }

    pub fn load_mapping(&self) -> Result<Vec<ClusterIssueMapping>, PipelineError> {
        self.load(MAPPING_FILE)
    }

    pub fn save_mapping(&self, mapping: &[ClusterIssueMapping]) -> Result<PathBuf> {
        self.save(MAPPING_FILE, mapping)
    }

    /// Deletes every intermediate artifact, returning the files removed.
    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for name in [EMBEDDINGS_FILE, CLUSTERS_FILE, MAPPING_FILE] {
            let path = self.path(name);
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(target: TARGET_PIPELINE, "Removed {}", path.display());
                    removed.push(path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("removing {}", path.display()));
                }
            }
        }
        Ok(removed)
    }
}
