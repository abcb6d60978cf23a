use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::RequestLimits;
use crate::pipeline::report::{BatchReport, Skipped};
use crate::traits::{ArticleStore, EmbeddingProvider};
use crate::types::{Article, EmbeddingRecord};
use crate::TARGET_VECTOR;

/// The text an article is embedded from: title and body separated by a blank line.
pub fn embedding_text(article: &Article) -> String {
    format!("{}\n\n{}", article.title, article.content)
        .trim()
        .to_string()
}

/// Truncates to at most `max_chars` characters, never splitting a code point.
fn truncate_chars(text: &str, max_chars: usize) -> Option<String> {
    text.char_indices()
        .nth(max_chars)
        .map(|(byte_idx, _)| text[..byte_idx].to_string())
}

/// Embeds every article that has not been linked to an issue yet.
pub struct Vectorizer<'a, S, E> {
    store: &'a S,
    embedder: &'a E,
    max_chars: usize,
    limits: RequestLimits,
}

impl<'a, S, E> Vectorizer<'a, S, E>
where
    S: ArticleStore,
    E: EmbeddingProvider,
{
    pub fn new(store: &'a S, embedder: &'a E, max_chars: usize, limits: RequestLimits) -> Self {
        Self {
            store,
            embedder,
            max_chars,
            limits,
        }
    }

    /// Produces one record per embeddable article.
    ///
    /// Only reading the backlog can fail the call. Empty articles, failed and
    /// timed-out requests end up in `skipped`.
    #[instrument(target = "article-embeddings", level = "info", skip(self))]
    pub async fn produce_embeddings(&self) -> Result<BatchReport<EmbeddingRecord>> {
        let articles = self.store.unclustered_articles().await?;
        info!(target: TARGET_VECTOR, "Vectorizing {} unclustered articles", articles.len());

        let report: BatchReport<EmbeddingRecord> = stream::iter(articles)
            .map(|article| self.embed_article(article))
            .buffered(self.limits.concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();

        info!(
            target: TARGET_VECTOR,
            "Embedded {}/{} articles ({} skipped)",
            report.succeeded(),
            report.attempted(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn embed_article(&self, article: Article) -> Result<EmbeddingRecord, Skipped> {
        let skipped = |reason: String| Skipped {
            item: format!("article {}", article.id),
            reason,
        };

        let mut text = embedding_text(&article);
        if text.is_empty() {
            debug!(target: TARGET_VECTOR, "Article {} has no text, skipping", article.id);
            return Err(skipped("no title or content".to_string()));
        }

        let text_length = text.chars().count();
        if let Some(truncated) = truncate_chars(&text, self.max_chars) {
            info!(target: TARGET_VECTOR, "Article {}: truncated text from {} to {} chars", article.id, text_length, self.max_chars);
            text = truncated;
        }

        match timeout(self.limits.timeout, self.embedder.embed(&text)).await {
            Ok(Ok(embedding)) if !embedding.is_empty() => Ok(EmbeddingRecord {
                article_id: article.id,
                title: article.title,
                embedding,
                text_length,
            }),
            Ok(Ok(_)) => {
                warn!(target: TARGET_VECTOR, "Empty embedding returned for article {}", article.id);
                Err(skipped("empty embedding".to_string()))
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_VECTOR, "Error generating embedding for article {}: {}", article.id, e);
                Err(skipped(e.to_string()))
            }
            Err(_) => {
                warn!(target: TARGET_VECTOR, "Embedding request for article {} timed out after {:?}", article.id, self.limits.timeout);
                Err(skipped(format!("timed out after {:?}", self.limits.timeout)))
            }
        }
    }
}
