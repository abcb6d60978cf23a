//! Seams between the pipeline and its external collaborators.
//!
//! Stages are generic over these traits so the production SQLite store and
//! OpenAI/Ollama clients can be swapped for in-process fakes in tests.

use anyhow::Result;
use std::future::Future;

use crate::types::{Article, Issue};

/// Read/write access to scraped articles.
pub trait ArticleStore: Send + Sync {
    /// Articles that have not been linked to an issue yet.
    fn unclustered_articles(&self) -> impl Future<Output = Result<Vec<Article>>> + Send;

    /// Full records for the given ids. Unknown ids are silently absent.
    fn articles_by_ids(&self, ids: &[i64]) -> impl Future<Output = Result<Vec<Article>>> + Send;

    /// Links every listed article to `issue_id` in one batch.
    ///
    /// Returns the number of articles that now carry `issue_id`. Re-applying
    /// the same issue is harmless; articles linked to a different issue are
    /// left alone.
    fn assign_issue(
        &self,
        ids: &[i64],
        issue_id: &str,
    ) -> impl Future<Output = Result<u64>> + Send;
}

/// Persistence for synthesized issues.
pub trait IssueStore: Send + Sync {
    fn create_issue(&self, issue: &Issue) -> impl Future<Output = Result<()>> + Send;

    fn issue_exists(&self, issue_id: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// Turns text into a fixed-length vector.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

/// Parameters for a single generation call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Black-box text generation. Output may be empty and is never deterministic.
pub trait TextGenerator: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> impl Future<Output = Result<String>> + Send;
}
