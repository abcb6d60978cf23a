use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::pipeline::report::{BatchReport, Skipped};
use crate::traits::{ArticleStore, IssueStore};
use crate::types::{
    article_ids_for_cluster, ClusterAssignment, ClusterIssueMapping, NOISE_LABEL,
};
use crate::TARGET_PIPELINE;

/// Outcome of writing one cluster's issue back onto its articles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledCluster {
    pub cluster_id: i64,
    pub issue_id: String,
    pub updated: u64,
    pub total: u64,
}

/// Per-cluster results plus the totals across all mappings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub clusters: BatchReport<ReconciledCluster>,
    pub updated: u64,
    pub total: u64,
}

impl ReconcileReport {
    fn record_skip(&mut self, mapping: &ClusterIssueMapping, articles: u64, reason: String) {
        self.total += articles;
        self.clusters.skipped.push(Skipped {
            item: format!("cluster {} -> issue {}", mapping.cluster_id, mapping.issue_id),
            reason,
        });
    }
}

/// Links articles to the issues created for their clusters.
pub struct Reconciler<'a, S> {
    store: &'a S,
}

impl<'a, S> Reconciler<'a, S>
where
    S: ArticleStore + IssueStore,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Applies every mapping, one batch update per cluster.
    ///
    /// Mappings to issues that do not exist, mappings for the noise label,
    /// and store failures skip that cluster only; its articles still count
    /// towards `total`.
    #[instrument(target = "pipeline", level = "info", skip_all, fields(mappings = mapping.len()))]
    pub async fn reconcile(
        &self,
        mapping: &[ClusterIssueMapping],
        assignments: &[ClusterAssignment],
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for pair in mapping {
            let ids = article_ids_for_cluster(assignments, pair.cluster_id);
            let total = ids.len() as u64;

            if pair.cluster_id == NOISE_LABEL {
                warn!(
                    target: TARGET_PIPELINE,
                    "Mapping links noise to issue {}, skipping {} articles",
                    pair.issue_id,
                    total
                );
                report.record_skip(pair, total, "noise is never linked to an issue".to_string());
                continue;
            }

            match self.store.issue_exists(&pair.issue_id).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        target: TARGET_PIPELINE,
                        "Issue {} for cluster {} does not exist, skipping",
                        pair.issue_id,
                        pair.cluster_id
                    );
                    report.record_skip(pair, total, "issue not found".to_string());
                    continue;
                }
                Err(e) => {
                    error!(target: TARGET_PIPELINE, "Could not check issue {}: {}", pair.issue_id, e);
                    report.record_skip(pair, total, e.to_string());
                    continue;
                }
            }

            if ids.is_empty() {
                warn!(target: TARGET_PIPELINE, "Cluster {} has no articles to link", pair.cluster_id);
            }

            match self.store.assign_issue(&ids, &pair.issue_id).await {
                Ok(updated) => {
                    info!(target: TARGET_PIPELINE, "Cluster {}: linked {}/{} articles to issue {}", pair.cluster_id, updated, total, pair.issue_id);
                    report.updated += updated;
                    report.total += total;
                    report.clusters.push(ReconciledCluster {
                        cluster_id: pair.cluster_id,
                        issue_id: pair.issue_id.clone(),
                        updated,
                        total,
                    });
                }
                Err(e) => {
                    error!(target: TARGET_PIPELINE, "Failed to link cluster {} to issue {}: {}", pair.cluster_id, pair.issue_id, e);
                    report.record_skip(pair, total, e.to_string());
                }
            }
        }

        info!(target: TARGET_PIPELINE, "Reconciled {}/{} articles", report.updated, report.total);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewArticle};
    use crate::types::{Bias, Issue};

    fn issue(id: &str) -> Issue {
        Issue {
            id: id.to_string(),
            title: "t".to_string(),
            summary: "s".to_string(),
            image_url: None,
            bias_left_pct: 0.0,
            bias_center_pct: 1.0,
            bias_right_pct: 0.0,
            dominant_bias: Bias::Center,
            source_count: 2,
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn assignment(article_id: i64, cluster_id: i64) -> ClusterAssignment {
        ClusterAssignment {
            article_id,
            title: String::new(),
            cluster_id,
            text_length: 0,
        }
    }

    async fn seeded(n: usize) -> (Database, Vec<i64>) {
        let db = Database::in_memory().await.unwrap();
        let mut ids = Vec::new();
        for i in 0..n {
            let article = NewArticle {
                title: format!("Article {}", i),
                url: format!("https://news/{}", i),
                ..Default::default()
            };
            ids.push(db.add_article(&article).await.unwrap().unwrap());
        }
        (db, ids)
    }

    #[tokio::test]
    async fn test_all_mappings_applied() {
        let (db, ids) = seeded(3).await;
        db.insert_issue(&issue("i-0")).await.unwrap();
        db.insert_issue(&issue("i-1")).await.unwrap();
        let assignments = vec![
            assignment(ids[0], 0),
            assignment(ids[1], 1),
            assignment(ids[2], 0),
        ];
        let mapping = vec![
            ClusterIssueMapping { cluster_id: 0, issue_id: "i-0".to_string() },
            ClusterIssueMapping { cluster_id: 1, issue_id: "i-1".to_string() },
        ];

        let report = Reconciler::new(&db).reconcile(&mapping, &assignments).await;
        assert_eq!((report.updated, report.total), (3, 3));
        assert_eq!(db.count_unclustered_articles().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_issue_counts_as_not_updated() {
        let (db, ids) = seeded(3).await;
        db.insert_issue(&issue("present")).await.unwrap();
        let assignments = vec![
            assignment(ids[0], 0),
            assignment(ids[1], 1),
            assignment(ids[2], 1),
        ];
        let mapping = vec![
            ClusterIssueMapping { cluster_id: 0, issue_id: "present".to_string() },
            ClusterIssueMapping { cluster_id: 1, issue_id: "vanished".to_string() },
        ];

        let report = Reconciler::new(&db).reconcile(&mapping, &assignments).await;
        assert_eq!((report.updated, report.total), (1, 3));
        assert_eq!(report.clusters.skipped.len(), 1);
        assert_eq!(db.count_unclustered_articles().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_noise_mapping_is_never_applied() {
        let (db, ids) = seeded(3).await;
        db.insert_issue(&issue("x")).await.unwrap();
        let assignments = vec![
            assignment(ids[0], NOISE_LABEL),
            assignment(ids[1], NOISE_LABEL),
            assignment(ids[2], 0),
        ];
        let mapping = vec![
            ClusterIssueMapping { cluster_id: NOISE_LABEL, issue_id: "x".to_string() },
            ClusterIssueMapping { cluster_id: 0, issue_id: "x".to_string() },
        ];

        let report = Reconciler::new(&db).reconcile(&mapping, &assignments).await;
        assert_eq!((report.updated, report.total), (1, 3));
        assert_eq!(report.clusters.skipped.len(), 1);

        let noise = db.get_articles_by_ids(&ids[..2]).await.unwrap();
        assert!(noise.iter().all(|a| a.issue_id.is_none()));
        assert_eq!(db.count_unclustered_articles().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_cluster_is_noop() {
        let (db, _) = seeded(1).await;
        db.insert_issue(&issue("lonely")).await.unwrap();
        let mapping = vec![ClusterIssueMapping { cluster_id: 7, issue_id: "lonely".to_string() }];

        let report = Reconciler::new(&db).reconcile(&mapping, &[]).await;
        assert_eq!((report.updated, report.total), (0, 0));
        assert!(report.clusters.skipped.is_empty());
    }
}
