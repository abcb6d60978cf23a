use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::db::{Database, NewArticle};
use crate::pipeline::report::BatchReport;
use crate::types::Bias;
use crate::TARGET_DB;

/// One article as produced by an outlet scraper.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedArticle {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "content_full")]
    pub content: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Outlet name. Unknown outlets are registered on first sight.
    #[serde(default, alias = "media")]
    pub outlet: Option<String>,
    /// Explicit lean for this article, overriding the outlet's.
    #[serde(default)]
    pub bias: Option<Bias>,
}

/// Parses a JSON array of scraped articles.
pub fn parse_scraped(json: &str) -> Result<Vec<ScrapedArticle>> {
    serde_json::from_str(json).context("scraped articles must be a JSON array of objects")
}

/// Stores scraped articles, skipping blank records and URLs already known.
///
/// Returns the ids of newly stored articles.
pub async fn ingest_articles(
    db: &Database,
    scraped: &[ScrapedArticle],
) -> Result<BatchReport<i64>> {
    let mut report = BatchReport::new();
    let mut outlets: HashMap<String, i64> = HashMap::new();

    for article in scraped {
        let url = article.url.trim();
        if url.is_empty() || article.title.trim().is_empty() {
            warn!(target: TARGET_DB, "Skipping scraped article without url or title: {:?}", article.title);
            report.skip(url, "missing url or title");
            continue;
        }

        let media_id = match article.outlet.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => match outlets.get(name) {
                Some(id) => Some(*id),
                None => {
                    let outlet = db.get_or_create_outlet(name).await?;
                    outlets.insert(name.to_string(), outlet.id);
                    Some(outlet.id)
                }
            },
            _ => None,
        };

        let new_article = NewArticle {
            title: article.title.trim().to_string(),
            url: url.to_string(),
            category: article.category.clone(),
            content: article.content.clone(),
            published_at: article.published_at.clone(),
            author: article.author.clone(),
            image_url: article.image_url.clone(),
            bias: article.bias,
            media_id,
        };

        match db.add_article(&new_article).await? {
            Some(id) => report.push(id),
            None => report.skip(url, "already stored"),
        }
    }

    info!(target: TARGET_DB, "Ingested {} new articles ({} skipped)", report.succeeded(), report.skipped.len());
    Ok(report)
}

/// Reads and ingests a scraper output file.
pub async fn ingest_file(db: &Database, path: &Path) -> Result<BatchReport<i64>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let scraped = parse_scraped(&raw)?;
    info!(target: TARGET_DB, "Loaded {} scraped articles from {}", scraped.len(), path.display());
    ingest_articles(db, &scraped).await
}
