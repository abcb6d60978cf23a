//! Tuning aids for the density clustering: silhouette scoring, a parameter
//! grid search and the k-distance profile used to eyeball a good `eps`.

use anyhow::{Context, Result};
use prettytable::{Cell, Row as PrettyRow, Table};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::{dbscan, DbscanParams};
use crate::types::NOISE_LABEL;
use crate::TARGET_PIPELINE;

/// Silhouette coefficient over a precomputed distance matrix.
///
/// Noise is scored as a label of its own. Points alone in their label score
/// 0. Returns `None` when the score is undefined, i.e. fewer than two labels
/// or one label per point.
pub fn silhouette_score(distances: &[Vec<f64>], labels: &[i64]) -> Option<f64> {
    let n = labels.len();
    let mut members: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        members.entry(label).or_default().push(i);
    }

    if members.len() < 2 || members.len() >= n {
        return None;
    }

    let mean_distance = |i: usize, group: &[usize]| -> f64 {
        let (sum, count) = group
            .iter()
            .filter(|&&j| j != i)
            .fold((0.0, 0usize), |(sum, count), &j| (sum + distances[i][j], count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    };

    let total: f64 = (0..n)
        .map(|i| {
            let own = &members[&labels[i]];
            if own.len() == 1 {
                return 0.0;
            }
            let a = mean_distance(i, own);
            let b = members
                .iter()
                .filter(|(&label, _)| label != labels[i])
                .map(|(_, group)| mean_distance(i, group))
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .sum();

    Some(total / n as f64)
}

/// Number of real clusters (noise excluded) and noise points in a labelling.
pub fn label_counts(labels: &[i64]) -> (usize, usize) {
    let clusters: BTreeSet<i64> = labels.iter().copied().filter(|&l| l != NOISE_LABEL).collect();
    let noise = labels.iter().filter(|&&l| l == NOISE_LABEL).count();
    (clusters.len(), noise)
}

/// One evaluated parameter combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCandidate {
    pub params: DbscanParams,
    pub clusters: usize,
    pub noise: usize,
    pub silhouette: f64,
}

/// Scores every `(eps, min_samples)` pair, best silhouette first.
///
/// Combinations producing fewer than two clusters, or one cluster per point,
/// are dropped since their silhouette means nothing.
pub fn grid_search(
    distances: &[Vec<f64>],
    eps_values: &[f64],
    min_samples_values: &[usize],
) -> Vec<GridCandidate> {
    let n = distances.len();
    let mut candidates = Vec::new();

    for &eps in eps_values {
        for &min_samples in min_samples_values {
            let params = DbscanParams { eps, min_samples };
            if params.validate().is_err() {
                debug!(target: TARGET_PIPELINE, "Skipping invalid grid point {:?}", params);
                continue;
            }

            let labels = dbscan(distances, &params);
            let (clusters, noise) = label_counts(&labels);
            if clusters < 2 || clusters == n {
                debug!(target: TARGET_PIPELINE, "eps={} min_samples={}: {} clusters, skipped", eps, min_samples, clusters);
                continue;
            }

            let silhouette = silhouette_score(distances, &labels).unwrap_or(-1.0);
            info!(target: TARGET_PIPELINE, "eps={} min_samples={}: {} clusters, {} noise, silhouette {:.3}", eps, min_samples, clusters, noise, silhouette);
            candidates.push(GridCandidate {
                params,
                clusters,
                noise,
                silhouette,
            });
        }
    }

    candidates.sort_by(|a, b| b.silhouette.total_cmp(&a.silhouette));
    candidates
}

pub fn grid_table(candidates: &[GridCandidate]) -> Table {
    let mut table = Table::new();
    table.add_row(PrettyRow::new(vec![
        Cell::new("eps"),
        Cell::new("min_samples"),
        Cell::new("Clusters"),
        Cell::new("Noise"),
        Cell::new("Silhouette"),
    ]));
    for candidate in candidates {
        table.add_row(PrettyRow::new(vec![
            Cell::new(&format!("{:.2}", candidate.params.eps)),
            Cell::new(&candidate.params.min_samples.to_string()),
            Cell::new(&candidate.clusters.to_string()),
            Cell::new(&candidate.noise.to_string()),
            Cell::new(&format!("{:.4}", candidate.silhouette)),
        ]));
    }
    table
}

/// Sorted distance from every point to its k-th nearest neighbour.
///
/// `k` is clamped to `1..=n-1`; fewer than two points give an empty profile.
pub fn k_distance_profile(distances: &[Vec<f64>], k: usize) -> Vec<f64> {
    let n = distances.len();
    if n < 2 {
        return Vec::new();
    }
    let k = k.clamp(1, n - 1);

    let mut profile: Vec<f64> = (0..n)
        .map(|i| {
            let mut row: Vec<f64> = (0..n).filter(|&j| j != i).map(|j| distances[i][j]).collect();
            row.sort_by(f64::total_cmp);
            row[k - 1]
        })
        .collect();
    profile.sort_by(f64::total_cmp);
    profile
}

/// Index of the knee of a sorted profile: the point farthest from the chord
/// joining its first and last values.
pub fn elbow_index(profile: &[f64]) -> Option<usize> {
    if profile.len() < 3 {
        return None;
    }
    let last = profile.len() - 1;
    let (x1, y1) = (0.0, profile[0]);
    let (x2, y2) = (last as f64, profile[last]);
    let chord = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
    if chord == 0.0 {
        return None;
    }

    (1..last)
        .map(|i| {
            let (x0, y0) = (i as f64, profile[i]);
            let d = ((y2 - y1) * x0 - (x2 - x1) * y0 + x2 * y1 - y2 * x1).abs() / chord;
            (i, d)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .filter(|(_, d)| *d > 0.0)
        .map(|(i, _)| i)
}

/// Writes the profile as `rank,k_distance` rows, creating parent directories.
pub fn write_k_distance_csv(path: &Path, profile: &[f64]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }

    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["rank", "k_distance"])?;
    for (rank, distance) in profile.iter().enumerate() {
        writer.write_record([rank.to_string(), format!("{:.6}", distance)])?;
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))?;
    info!(target: TARGET_PIPELINE, "Wrote {} k-distance rows to {}", profile.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two tight pairs far apart from each other
    fn two_pairs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.01, 0.9, 0.9],
            vec![0.01, 0.0, 0.9, 0.9],
            vec![0.9, 0.9, 0.0, 0.01],
            vec![0.9, 0.9, 0.01, 0.0],
        ]
    }

    #[test]
    fn test_silhouette_of_well_separated_clusters_is_high() {
        let score = silhouette_score(&two_pairs(), &[0, 0, 1, 1]).unwrap();
        assert!(score > 0.9, "score was {}", score);
    }

    #[test]
    fn test_silhouette_undefined_cases() {
        let d = two_pairs();
        assert_eq!(silhouette_score(&d, &[0, 0, 0, 0]), None);
        assert_eq!(silhouette_score(&d, &[0, 1, 2, 3]), None);
    }

    #[test]
    fn test_silhouette_scores_singletons_as_zero() {
        // Noise point 3 forms a label of its own and contributes 0
        let d = two_pairs();
        let with_noise = silhouette_score(&d, &[0, 0, 1, NOISE_LABEL]).unwrap();
        let pairs = silhouette_score(&d, &[0, 0, 1, 1]).unwrap();
        assert!(with_noise < pairs);
    }

    #[test]
    fn test_grid_search_skips_degenerate_combinations() {
        let d = two_pairs();
        // eps 0.95 merges everything into one cluster and is dropped
        let candidates = grid_search(&d, &[0.05, 0.95], &[1, 0]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].params, DbscanParams { eps: 0.05, min_samples: 1 });
        assert_eq!(candidates[0].clusters, 2);
        assert_eq!(candidates[0].noise, 0);
    }

    #[test]
    fn test_k_distance_profile_is_sorted() {
        let d = vec![
            vec![0.0, 0.1, 0.4],
            vec![0.1, 0.0, 0.2],
            vec![0.4, 0.2, 0.0],
        ];
        assert_eq!(k_distance_profile(&d, 1), vec![0.1, 0.1, 0.2]);
        // k larger than n-1 is clamped
        assert_eq!(k_distance_profile(&d, 10), vec![0.2, 0.4, 0.4]);
        assert!(k_distance_profile(&[vec![0.0]], 3).is_empty());
    }

    #[test]
    fn test_elbow_finds_the_knee() {
        let profile = vec![0.05, 0.06, 0.07, 0.08, 0.09, 0.5, 0.9];
        assert_eq!(elbow_index(&profile), Some(4));
        assert_eq!(elbow_index(&[0.1, 0.2]), None);
        assert_eq!(elbow_index(&[0.3, 0.3, 0.3]), None);
    }

    #[test]
    fn test_k_distance_csv_written_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("k_distance_k4.csv");
        write_k_distance_csv(&path, &[0.1, 0.25]).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "rank,k_distance\n0,0.100000\n1,0.250000\n");
    }

    #[test]
    fn test_k_distance_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k_distance_k2.csv");
        let profile = k_distance_profile(&two_pairs(), 2);
        write_k_distance_csv(&path, &profile).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, vec!["rank", "k_distance"]);
        let distances: Vec<f64> = reader
            .records()
            .map(|r| r.unwrap()[1].parse().unwrap())
            .collect();
        assert_eq!(distances.len(), 4);
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }
}
