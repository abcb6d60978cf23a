use anyhow::Result;
use prettytable::{Cell, Row as PrettyRow, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::diagnostics::{label_counts, silhouette_score};
use super::{dbscan, DbscanParams, SAMPLE_TITLES};
use crate::pipeline::report::BatchReport;
use crate::types::{ClusterAssignment, EmbeddingRecord, NOISE_LABEL};
use crate::vector::distance_matrix;
use crate::TARGET_PIPELINE;

const TITLE_PREVIEW_CHARS: usize = 50;

/// Quality figures for one clustering run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterStats {
    pub points: usize,
    pub clusters: usize,
    pub noise: usize,
    pub noise_ratio: f64,
    /// `None` when the labelling has fewer than two groups or one per point.
    pub silhouette: Option<f64>,
}

/// Result of grouping one batch of embeddings.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub report: BatchReport<ClusterAssignment>,
    pub stats: ClusterStats,
}

/// Partitions embedded articles into clusters of near-duplicate coverage.
#[derive(Debug, Clone, Copy)]
pub struct Grouper {
    params: DbscanParams,
}

impl Grouper {
    pub fn new(params: DbscanParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DbscanParams {
        &self.params
    }

    /// One label per input vector, in input order. `NOISE_LABEL` marks outliers.
    pub fn cluster(&self, vectors: &[Vec<f32>]) -> Result<Vec<i64>> {
        self.params.validate()?;
        let distances = distance_matrix(vectors)?;
        Ok(dbscan(&distances, &self.params))
    }

    /// Clusters the records and attaches each article's label.
    ///
    /// Records without a vector, or whose dimension disagrees with the most
    /// common one, are skipped rather than failing the batch.
    pub fn group(&self, records: &[EmbeddingRecord]) -> Result<Grouping> {
        self.params.validate()?;

        let mut report = BatchReport::new();
        let dimension = majority_dimension(records);

        let mut usable = Vec::with_capacity(records.len());
        for record in records {
            if record.embedding.is_empty() {
                warn!(target: TARGET_PIPELINE, "Article {} has no embedding, skipping", record.article_id);
                report.skip(format!("article {}", record.article_id), "missing embedding");
            } else if Some(record.embedding.len()) != dimension {
                warn!(
                    target: TARGET_PIPELINE,
                    "Article {} has a {}-dimensional embedding, expected {:?}",
                    record.article_id,
                    record.embedding.len(),
                    dimension
                );
                report.skip(
                    format!("article {}", record.article_id),
                    format!("embedding dimension {}", record.embedding.len()),
                );
            } else {
                usable.push(record);
            }
        }

        let vectors: Vec<Vec<f32>> = usable.iter().map(|r| r.embedding.clone()).collect();
        let distances = distance_matrix(&vectors)?;
        let labels = dbscan(&distances, &self.params);

        for assignment in build_assignments(&usable, &labels) {
            report.push(assignment);
        }

        let (clusters, noise) = label_counts(&labels);
        let stats = ClusterStats {
            points: labels.len(),
            clusters,
            noise,
            noise_ratio: if labels.is_empty() {
                0.0
            } else {
                noise as f64 / labels.len() as f64
            },
            silhouette: silhouette_score(&distances, &labels),
        };

        info!(
            target: TARGET_PIPELINE,
            "Grouped {} articles into {} clusters ({} noise, eps={}, min_samples={})",
            stats.points, stats.clusters, stats.noise, self.params.eps, self.params.min_samples
        );
        Ok(Grouping { report, stats })
    }
}

/// Most common non-zero embedding length. Ties go to the length seen first.
fn majority_dimension(records: &[EmbeddingRecord]) -> Option<usize> {
    let mut counts: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    for (position, record) in records.iter().enumerate() {
        if record.embedding.is_empty() {
            continue;
        }
        counts.entry(record.embedding.len()).or_insert((0, position)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(dimension, _)| dimension)
}

/// Pairs each record with its label. Both slices must be in the same order.
pub fn build_assignments(records: &[&EmbeddingRecord], labels: &[i64]) -> Vec<ClusterAssignment> {
    records
        .iter()
        .zip(labels)
        .map(|(record, &cluster_id)| ClusterAssignment {
            article_id: record.article_id,
            title: record.title.clone(),
            cluster_id,
            text_length: record.text_length,
        })
        .collect()
}

fn preview(title: &str) -> String {
    let mut chars = title.chars();
    let head: String = chars.by_ref().take(TITLE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Per-cluster sizes with a few representative titles. Noise comes last.
pub fn analyze_clusters(assignments: &[ClusterAssignment]) -> Table {
    let mut by_cluster: BTreeMap<i64, Vec<&str>> = BTreeMap::new();
    for assignment in assignments {
        by_cluster
            .entry(assignment.cluster_id)
            .or_default()
            .push(&assignment.title);
    }
    let noise = by_cluster.remove(&NOISE_LABEL);

    let mut table = Table::new();
    table.add_row(PrettyRow::new(vec![
        Cell::new("Cluster"),
        Cell::new("Articles"),
        Cell::new("Sample titles"),
    ]));

    for (cluster_id, titles) in &by_cluster {
        let mut samples: Vec<String> = titles
            .iter()
            .take(SAMPLE_TITLES)
            .map(|t| format!("- {}", preview(t)))
            .collect();
        if titles.len() > SAMPLE_TITLES {
            samples.push(format!("... and {} more", titles.len() - SAMPLE_TITLES));
        }
        table.add_row(PrettyRow::new(vec![
            Cell::new(&cluster_id.to_string()),
            Cell::new(&titles.len().to_string()),
            Cell::new(&samples.join("\n")),
        ]));
    }

    if let Some(noise) = noise {
        table.add_row(PrettyRow::new(vec![
            Cell::new("noise"),
            Cell::new(&noise.len().to_string()),
            Cell::new(""),
        ]));
    }

    table
}
