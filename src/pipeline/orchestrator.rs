use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info, warn};

use super::artifacts::ArtifactStore;
use super::report::RunSummary;
use super::{PipelineState, Stage};
use crate::clustering::{DbscanParams, Grouper};
use crate::config::{PipelineConfig, RequestLimits};
use crate::error::PipelineError;
use crate::issue::IssueSynthesizer;
use crate::reconcile::Reconciler;
use crate::traits::{ArticleStore, EmbeddingProvider, IssueStore, TextGenerator};
use crate::types::NOISE_LABEL;
use crate::vector::{Vectorizer, MAX_EMBED_CHARS};
use crate::TARGET_PIPELINE;

/// Knobs for a run, usually derived from `PipelineConfig`.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub dbscan: DbscanParams,
    pub max_embed_chars: usize,
    pub embed_limits: RequestLimits,
    pub generation_limits: RequestLimits,
    /// Environment variables each stage needs but doesn't have.
    pub missing_credentials: BTreeMap<Stage, Vec<String>>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            dbscan: DbscanParams::default(),
            max_embed_chars: MAX_EMBED_CHARS,
            embed_limits: RequestLimits::default(),
            generation_limits: RequestLimits::default(),
            missing_credentials: BTreeMap::new(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let missing_credentials = Stage::ALL
            .into_iter()
            .map(|stage| (stage, config.missing_credentials(stage)))
            .filter(|(_, missing)| !missing.is_empty())
            .collect();

        Self {
            dbscan: config.dbscan,
            max_embed_chars: config.max_embed_chars,
            embed_limits: config.request_limits(),
            generation_limits: config.generation_limits(),
            missing_credentials,
        }
    }
}

/// What a run did and how it ended.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub state: PipelineState,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.state.is_done()
    }
}

/// Sequences the stages over a shared store and artifact directory.
pub struct Pipeline<'a, S, E, G> {
    store: &'a S,
    embedder: &'a E,
    generator: &'a G,
    artifacts: ArtifactStore,
    settings: PipelineSettings,
}

impl<'a, S, E, G> Pipeline<'a, S, E, G>
where
    S: ArticleStore + IssueStore,
    E: EmbeddingProvider,
    G: TextGenerator,
{
    pub fn new(
        store: &'a S,
        embedder: &'a E,
        generator: &'a G,
        artifacts: ArtifactStore,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            artifacts,
            settings,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs all four stages in order.
    pub async fn run_all(&self) -> RunOutcome {
        self.run(&Stage::ALL).await
    }

    /// Runs the given stages in order, stopping at the first failure.
    pub async fn run(&self, stages: &[Stage]) -> RunOutcome {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut state = PipelineState::Init;

        for &stage in stages {
            state = PipelineState::Running(stage);
            info!(target: TARGET_PIPELINE, "Stage {} started", stage);
            let stage_started = Instant::now();

            if let Err(error) = self.run_stage(stage, &mut summary).await {
                error!(target: TARGET_PIPELINE, "Stage {} failed: {}", stage, error);
                state = PipelineState::Failed { stage, error };
                break;
            }
            info!(target: TARGET_PIPELINE, "Stage {} finished in {:.2}s", stage, stage_started.elapsed().as_secs_f64());
        }

        if !state.is_failed() {
            state = PipelineState::Done;
        }
        summary.elapsed = started.elapsed();
        info!(target: TARGET_PIPELINE, "Run {} after {:.2}s", state, summary.elapsed.as_secs_f64());

        RunOutcome { summary, state }
    }

    fn check_preconditions(&self, stage: Stage) -> Result<(), PipelineError> {
        match self.settings.missing_credentials.get(&stage) {
            Some(missing) if !missing.is_empty() => {
                Err(PipelineError::MissingEnvironment(missing.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Runs one stage against the artifacts left by the previous one.
    pub async fn run_stage(
        &self,
        stage: Stage,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        self.check_preconditions(stage)?;
        let failed = |e: anyhow::Error| match e.downcast::<PipelineError>() {
            Ok(pipeline_error) => pipeline_error,
            Err(other) => PipelineError::StageFailed {
                stage,
                reason: format!("{:#}", other),
            },
        };

        match stage {
            Stage::Vectorize => {
                let report = Vectorizer::new(
                    self.store,
                    self.embedder,
                    self.settings.max_embed_chars,
                    self.settings.embed_limits,
                )
                .produce_embeddings()
                .await
                .map_err(failed)?;

                if report.items.is_empty() {
                    warn!(target: TARGET_PIPELINE, "No articles were embedded");
                }
                self.artifacts
                    .save_embeddings(&report.items)
                    .map_err(failed)?;

                summary.articles_considered = report.attempted();
                summary.embedded = report.succeeded();
                summary.embed_skipped = report.skipped.len();
            }
            Stage::Group => {
                let records = self.artifacts.load_embeddings()?;
                let grouping = Grouper::new(self.settings.dbscan)
                    .group(&records)
                    .map_err(failed)?;
                self.artifacts
                    .save_clusters(&grouping.report.items)
                    .map_err(failed)?;

                summary.clustered = grouping
                    .report
                    .items
                    .iter()
                    .filter(|a| a.cluster_id != NOISE_LABEL)
                    .count();
                summary.clusters = grouping.stats.clusters;
                summary.noise = grouping.stats.noise;
                summary.silhouette = grouping.stats.silhouette;
            }
            Stage::Synthesize => {
                let assignments = self.artifacts.load_clusters()?;
                let report = IssueSynthesizer::new(
                    self.store,
                    self.generator,
                    self.settings.generation_limits,
                )
                .synthesize_all(&assignments)
                .await;
                self.artifacts
                    .save_mapping(&report.items)
                    .map_err(failed)?;

                summary.issues_created = report.succeeded();
                summary.synth_skipped = report.skipped.len();
            }
            Stage::Reconcile => {
                let mapping = self.artifacts.load_mapping()?;
                let assignments = self.artifacts.load_clusters()?;
                let report = Reconciler::new(self.store)
                    .reconcile(&mapping, &assignments)
                    .await;

                summary.articles_reconciled = report.updated;
                summary.articles_to_reconcile = report.total;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::traits::CompletionRequest;
    use anyhow::Result;

    struct NoEmbedder;
    impl EmbeddingProvider for NoEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    struct NoGenerator;
    impl TextGenerator for NoGenerator {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_running() {
        let db = Database::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut settings = PipelineSettings::default();
        settings
            .missing_credentials
            .insert(Stage::Vectorize, vec!["OPENAI_API_KEY".to_string()]);

        let pipeline = Pipeline::new(
            &db,
            &NoEmbedder,
            &NoGenerator,
            ArtifactStore::new(dir.path()),
            settings,
        );
        let outcome = pipeline.run_all().await;

        assert!(!outcome.succeeded());
        match outcome.state {
            PipelineState::Failed { stage, error } => {
                assert_eq!(stage, Stage::Vectorize);
                assert!(matches!(error, PipelineError::MissingEnvironment(_)));
            }
            other => panic!("unexpected state {}", other),
        }
        // Nothing ran, so nothing was written
        assert!(!pipeline.artifacts().path(crate::pipeline::artifacts::EMBEDDINGS_FILE).exists());
    }

    #[tokio::test]
    async fn test_single_stage_without_artifact_fails() {
        let db = Database::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            &db,
            &NoEmbedder,
            &NoGenerator,
            ArtifactStore::new(dir.path()),
            PipelineSettings::default(),
        );

        let outcome = pipeline.run(&[Stage::Reconcile]).await;
        assert!(matches!(
            outcome.state,
            PipelineState::Failed {
                stage: Stage::Reconcile,
                error: PipelineError::MissingArtifact { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_backlog_completes_as_noop() {
        let db = Database::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            &db,
            &NoEmbedder,
            &NoGenerator,
            ArtifactStore::new(dir.path()),
            PipelineSettings::default(),
        );

        let outcome = pipeline.run_all().await;
        assert!(outcome.succeeded(), "state: {}", outcome.state);
        assert_eq!(outcome.summary.embedded, 0);
        assert_eq!(outcome.summary.issues_created, 0);
        assert_eq!(outcome.summary.articles_to_reconcile, 0);
    }

    #[tokio::test]
    async fn test_invalid_params_surface_as_invalid_parameters() {
        let db = Database::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());
        artifacts.save_embeddings(&[]).unwrap();
        let settings = PipelineSettings {
            dbscan: DbscanParams { eps: 0.2, min_samples: 0 },
            ..Default::default()
        };

        let pipeline = Pipeline::new(&db, &NoEmbedder, &NoGenerator, artifacts, settings);
        let outcome = pipeline.run(&[Stage::Group]).await;
        assert!(matches!(
            outcome.state,
            PipelineState::Failed { error: PipelineError::InvalidParameters(_), .. }
        ));
    }
}
