use std::collections::VecDeque;

use super::DbscanParams;
use crate::types::NOISE_LABEL;

const UNVISITED: i64 = -2;

/// Density-based clustering over a precomputed distance matrix.
///
/// A point is a core point when at least `min_samples` *other* points lie
/// within `eps`. Clusters grow transitively through core points; border points
/// join the first cluster that reaches them. Everything else is `NOISE_LABEL`.
///
/// Labels come back in input order and are numbered from 0 in order of each
/// cluster's first core point, so the result is deterministic.
pub fn dbscan(distances: &[Vec<f64>], params: &DbscanParams) -> Vec<i64> {
    let n = distances.len();
    if n == 0 {
        return Vec::new();
    }
    if n <= params.min_samples {
        // Nobody can have enough neighbours
        return vec![NOISE_LABEL; n];
    }

    let neighbours: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| j != i && distances[i][j] <= params.eps)
                .collect()
        })
        .collect();
    let is_core = |i: usize| neighbours[i].len() >= params.min_samples;

    let mut labels = vec![UNVISITED; n];
    let mut next_label = 0;

    for start in 0..n {
        if labels[start] != UNVISITED {
            continue;
        }
        if !is_core(start) {
            labels[start] = NOISE_LABEL;
            continue;
        }

        let cluster = next_label;
        next_label += 1;
        labels[start] = cluster;

        let mut frontier: VecDeque<usize> = neighbours[start].iter().copied().collect();
        while let Some(point) = frontier.pop_front() {
            match labels[point] {
                // Previously judged noise, but reachable: becomes a border point
                NOISE_LABEL => labels[point] = cluster,
                UNVISITED => {
                    labels[point] = cluster;
                    if is_core(point) {
                        frontier.extend(neighbours[point].iter().copied());
                    }
                }
                _ => {}
            }
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::distance_matrix;

    fn params(eps: f64, min_samples: usize) -> DbscanParams {
        DbscanParams { eps, min_samples }
    }

    fn near(base: [f32; 3], jitter: f32) -> Vec<f32> {
        vec![base[0] + jitter, base[1], base[2] + jitter / 2.0]
    }

    #[test]
    fn test_empty_input_yields_no_labels() {
        assert!(dbscan(&[], &params(0.2, 2)).is_empty());
    }

    #[test]
    fn test_single_vector_is_noise() {
        let m = distance_matrix(&[vec![1.0, 0.0]]).unwrap();
        assert_eq!(dbscan(&m, &params(0.2, 1)), vec![NOISE_LABEL]);
    }

    #[test]
    fn test_fewer_points_than_min_samples_is_all_noise() {
        let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.01], vec![1.0, 0.02]];
        let m = distance_matrix(&vectors).unwrap();
        assert_eq!(dbscan(&m, &params(0.5, 5)), vec![NOISE_LABEL; 3]);
    }

    #[test]
    fn test_five_near_duplicates_and_one_outlier() {
        let mut vectors: Vec<Vec<f32>> = (0..5)
            .map(|i| near([1.0, 0.2, 0.1], i as f32 * 0.01))
            .collect();
        vectors.insert(3, vec![-0.2, 1.0, -0.5]);

        let m = distance_matrix(&vectors).unwrap();
        let labels = dbscan(&m, &params(0.15, 2));

        assert_eq!(labels.len(), 6);
        assert_eq!(labels[3], NOISE_LABEL);
        let members: Vec<i64> = labels.iter().copied().filter(|&l| l != NOISE_LABEL).collect();
        assert_eq!(members, vec![0; 5]);
    }

    #[test]
    fn test_two_separate_groups_get_distinct_labels() {
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.99, 0.01, 0.0],
            vec![0.01, 0.99, 0.0],
            vec![0.98, 0.02, 0.0],
            vec![0.02, 0.98, 0.0],
        ];
        let m = distance_matrix(&vectors).unwrap();
        let labels = dbscan(&m, &params(0.05, 2));
        assert_eq!(labels, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_chain_is_reached_transitively() {
        // Each step is within eps of the next but the ends are far apart
        let distances = vec![
            vec![0.0, 0.1, 0.2, 0.3],
            vec![0.1, 0.0, 0.1, 0.2],
            vec![0.2, 0.1, 0.0, 0.1],
            vec![0.3, 0.2, 0.1, 0.0],
        ];
        assert_eq!(dbscan(&distances, &params(0.1, 1)), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // 0,1,2 form a dense core; 3 is only close to 2
        let distances = vec![
            vec![0.0, 0.05, 0.05, 0.5],
            vec![0.05, 0.0, 0.05, 0.5],
            vec![0.05, 0.05, 0.0, 0.08],
            vec![0.5, 0.5, 0.08, 0.0],
        ];
        assert_eq!(dbscan(&distances, &params(0.1, 2)), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_labels_are_noise_or_non_negative() {
        let vectors: Vec<Vec<f32>> = (0..12)
            .map(|i| vec![(i as f32).cos(), (i as f32).sin(), (i % 3) as f32])
            .collect();
        let m = distance_matrix(&vectors).unwrap();
        let labels = dbscan(&m, &params(0.2, 2));
        assert_eq!(labels.len(), vectors.len());
        assert!(labels.iter().all(|&l| l == NOISE_LABEL || l >= 0));
    }
}
