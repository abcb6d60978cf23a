use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::seq::IndexedRandom;
use std::collections::BTreeSet;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::bias::BiasComposition;
use super::prompts::{
    fallback_summary, fallback_title, summary_request, tidy_generated, title_request,
};
use crate::config::RequestLimits;
use crate::pipeline::report::{BatchReport, Skipped};
use crate::traits::{ArticleStore, CompletionRequest, IssueStore, TextGenerator};
use crate::types::{
    article_ids_for_cluster, Article, ClusterAssignment, ClusterIssueMapping, Issue, NOISE_LABEL,
};
use crate::{TARGET_LLM_REQUEST, TARGET_PIPELINE};

/// Uniformly picks one non-empty image URL, if any article has one.
pub fn representative_image(articles: &[Article]) -> Option<String> {
    let candidates: Vec<&str> = articles
        .iter()
        .filter_map(|a| a.image_url.as_deref())
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .collect();
    candidates.choose(&mut rand::rng()).map(|url| url.to_string())
}

/// Distinct non-noise cluster labels, ascending.
pub fn cluster_ids(assignments: &[ClusterAssignment]) -> Vec<i64> {
    assignments
        .iter()
        .map(|a| a.cluster_id)
        .filter(|&id| id != NOISE_LABEL)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Turns clusters into persisted issues.
pub struct IssueSynthesizer<'a, S, G> {
    store: &'a S,
    generator: &'a G,
    limits: RequestLimits,
}

impl<'a, S, G> IssueSynthesizer<'a, S, G>
where
    S: ArticleStore + IssueStore,
    G: TextGenerator,
{
    pub fn new(store: &'a S, generator: &'a G, limits: RequestLimits) -> Self {
        Self {
            store,
            generator,
            limits,
        }
    }

    /// Runs one generation call, falling back to `fallback` on error, timeout
    /// or empty output.
    async fn generate(&self, request: CompletionRequest, fallback: String, what: &str) -> String {
        match timeout(self.limits.timeout, self.generator.complete(&request)).await {
            Ok(Ok(text)) => match tidy_generated(&text) {
                Some(text) => text,
                None => {
                    warn!(target: TARGET_LLM_REQUEST, "Empty {} generated, using fallback", what);
                    fallback
                }
            },
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "Failed to generate {}: {}", what, e);
                fallback
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "Generating {} timed out after {:?}", what, self.limits.timeout);
                fallback
            }
        }
    }

    /// Builds an issue from a cluster's articles. Never fails: generation
    /// problems degrade to templated text.
    pub async fn build_issue(&self, articles: &[Article]) -> Issue {
        let composition = BiasComposition::from_articles(articles);
        let image_url = representative_image(articles);
        let count = articles.len();

        let (summary, title) = tokio::join!(
            self.generate(summary_request(articles), fallback_summary(count), "summary"),
            self.generate(title_request(articles), fallback_title(count), "title"),
        );

        Issue {
            id: Uuid::new_v4().to_string(),
            title,
            summary,
            image_url,
            bias_left_pct: composition.left,
            bias_center_pct: composition.center,
            bias_right_pct: composition.right,
            dominant_bias: composition.dominant(),
            source_count: count as i64,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    /// Creates and stores the issue for one cluster.
    ///
    /// Returns `Ok(None)` for the noise label and for clusters whose articles
    /// cannot be found. Store errors propagate so the caller can skip the cluster.
    #[instrument(target = "pipeline", level = "info", skip(self, assignments))]
    pub async fn synthesize(
        &self,
        cluster_id: i64,
        assignments: &[ClusterAssignment],
    ) -> Result<Option<Issue>> {
        if cluster_id == NOISE_LABEL {
            return Ok(None);
        }

        let ids = article_ids_for_cluster(assignments, cluster_id);
        if ids.is_empty() {
            warn!(target: TARGET_PIPELINE, "Cluster {} has no articles", cluster_id);
            return Ok(None);
        }

        let articles = self.store.articles_by_ids(&ids).await?;
        if articles.is_empty() {
            warn!(target: TARGET_PIPELINE, "None of the {} articles in cluster {} were found", ids.len(), cluster_id);
            return Ok(None);
        }
        debug!(target: TARGET_PIPELINE, "Cluster {}: {} of {} articles found", cluster_id, articles.len(), ids.len());

        let issue = self.build_issue(&articles).await;
        self.store.create_issue(&issue).await?;

        info!(target: TARGET_PIPELINE, "Issue {} created for cluster {}: {}", issue.id, cluster_id, issue.title);
        Ok(Some(issue))
    }

    /// Synthesizes every non-noise cluster, a bounded number at a time.
    pub async fn synthesize_all(
        &self,
        assignments: &[ClusterAssignment],
    ) -> BatchReport<ClusterIssueMapping> {
        let clusters = cluster_ids(assignments);
        info!(target: TARGET_PIPELINE, "Synthesizing issues for {} clusters", clusters.len());

        let outcomes: Vec<Result<ClusterIssueMapping, Skipped>> = stream::iter(clusters)
            .map(|cluster_id| async move {
                let skipped = |reason: String| Skipped {
                    item: format!("cluster {}", cluster_id),
                    reason,
                };
                match self.synthesize(cluster_id, assignments).await {
                    Ok(Some(issue)) => Ok(ClusterIssueMapping {
                        cluster_id,
                        issue_id: issue.id,
                    }),
                    Ok(None) => Err(skipped("no articles found".to_string())),
                    Err(e) => {
                        error!(target: TARGET_PIPELINE, "Skipping cluster {}: {}", cluster_id, e);
                        Err(skipped(e.to_string()))
                    }
                }
            })
            .buffered(self.limits.concurrency.max(1))
            .collect()
            .await;

        let report: BatchReport<ClusterIssueMapping> = outcomes.into_iter().collect();
        info!(target: TARGET_PIPELINE, "Created {} issues ({} clusters skipped)", report.succeeded(), report.skipped.len());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::prompts::TITLE_MAX_TOKENS;
    use crate::types::Bias;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves a fixed set of articles; `create_issue` fails when `broken` is set.
    struct MemoryStore {
        articles: Vec<Article>,
        broken: bool,
        created: Mutex<Vec<Issue>>,
    }

    impl MemoryStore {
        fn new(articles: Vec<Article>, broken: bool) -> Self {
            Self {
                articles,
                broken,
                created: Mutex::new(Vec::new()),
            }
        }
    }

    impl ArticleStore for MemoryStore {
        async fn unclustered_articles(&self) -> Result<Vec<Article>> {
            Ok(self.articles.clone())
        }
        async fn articles_by_ids(&self, ids: &[i64]) -> Result<Vec<Article>> {
            Ok(self
                .articles
                .iter()
                .filter(|a| ids.contains(&a.id))
                .cloned()
                .collect())
        }
        async fn assign_issue(&self, _ids: &[i64], _issue_id: &str) -> Result<u64> {
            Ok(0)
        }
    }

    impl IssueStore for MemoryStore {
        async fn create_issue(&self, issue: &Issue) -> Result<()> {
            if self.broken {
                return Err(anyhow!("database disk image is malformed"));
            }
            self.created.lock().unwrap().push(issue.clone());
            Ok(())
        }
        async fn issue_exists(&self, issue_id: &str) -> Result<bool> {
            Ok(self.created.lock().unwrap().iter().any(|i| i.id == issue_id))
        }
    }

    struct FixedGenerator(&'static str);

    impl TextGenerator for FixedGenerator {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Errors on summary requests and stalls on title requests.
    struct FlakyGenerator {
        stall: Duration,
    }

    impl TextGenerator for FlakyGenerator {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            if request.max_tokens == TITLE_MAX_TOKENS {
                tokio::time::sleep(self.stall).await;
                Ok("Too late".to_string())
            } else {
                Err(anyhow!("service unavailable"))
            }
        }
    }

    fn limits(timeout: Duration) -> RequestLimits {
        RequestLimits {
            concurrency: 2,
            timeout,
        }
    }

    fn article(id: i64, image: Option<&str>) -> Article {
        Article {
            id,
            title: format!("Article {}", id),
            content: String::new(),
            category: None,
            outlet_id: None,
            bias: Bias::Center,
            image_url: image.map(str::to_string),
            issue_id: None,
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

    #[test]
    fn test_representative_image_comes_from_candidates() {
        let articles = vec![
            article(1, None),
            article(2, Some("https://img/a.jpg")),
            article(3, Some("  ")),
            article(4, Some("https://img/b.jpg")),
        ];
        for _ in 0..20 {
            let picked = representative_image(&articles).unwrap();
            assert!(picked == "https://img/a.jpg" || picked == "https://img/b.jpg");
        }
    }

    #[test]
    fn test_no_images_means_none() {
        assert_eq!(representative_image(&[article(1, None), article(2, Some(""))]), None);
        assert_eq!(representative_image(&[]), None);
    }

    #[test]
    fn test_cluster_ids_exclude_noise() {
        let assignments = vec![
            assignment(1, 2),
            assignment(2, -1),
            assignment(3, 0),
            assignment(4, 2),
        ];
        assert_eq!(cluster_ids(&assignments), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_failed_persistence_skips_cluster() {
        let store = MemoryStore::new(vec![article(1, None), article(2, None)], true);
        let generator = FixedGenerator("Bridge closed");
        let synthesizer = IssueSynthesizer::new(&store, &generator, limits(Duration::from_secs(5)));

        let report = synthesizer
            .synthesize_all(&[assignment(1, 0), assignment(2, 0)])
            .await;

        assert!(report.items.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].item, "cluster 0");
        assert!(report.skipped[0].reason.contains("malformed"));
    }

    #[tokio::test]
    async fn test_generator_errors_and_timeouts_fall_back() {
        let store = MemoryStore::new(vec![article(1, None), article(2, None)], false);
        let generator = FlakyGenerator {
            stall: Duration::from_secs(5),
        };
        let synthesizer =
            IssueSynthesizer::new(&store, &generator, limits(Duration::from_millis(50)));

        let report = synthesizer
            .synthesize_all(&[assignment(1, 0), assignment(2, 0), assignment(3, NOISE_LABEL)])
            .await;

        assert_eq!(report.items.len(), 1);
        let created = store.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].id, report.items[0].issue_id);
        assert_eq!(created[0].title, fallback_title(2));
        assert_eq!(created[0].summary, fallback_summary(2));
        assert_eq!(created[0].source_count, 2);
    }

    #[tokio::test]
    async fn test_noise_label_is_never_synthesized() {
        let store = MemoryStore::new(vec![article(1, None)], false);
        let generator = FixedGenerator("Anything");
        let synthesizer = IssueSynthesizer::new(&store, &generator, limits(Duration::from_secs(5)));

        let issue = synthesizer
            .synthesize(NOISE_LABEL, &[assignment(1, NOISE_LABEL)])
            .await
            .unwrap();
        assert!(issue.is_none());
        assert!(store.created.lock().unwrap().is_empty());
    }
}
