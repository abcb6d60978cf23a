use chrono::Utc;
use rand::Rng;
use sqlx::{QueryBuilder, Row, Sqlite};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, instrument, warn};

use super::core::{Database, DbLockErrorExt};
use crate::types::{Article, Bias};
use crate::TARGET_DB;

// Keeps every statement well under SQLite's bound-parameter limit
const ID_CHUNK_SIZE: usize = 500;

const ARTICLE_COLUMNS: &str = r#"
    SELECT a.id, a.title, a.content_full, a.category, a.media_id, a.image_url, a.issue_id,
           COALESCE(a.bias, m.bias) AS bias
    FROM articles a
    LEFT JOIN media_outlets m ON a.media_id = m.id
"#;

/// A scraped article ready to be stored.
#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub title: String,
    pub url: String,
    pub category: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<String>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub bias: Option<Bias>,
    pub media_id: Option<i64>,
}

fn article_from_row(row: &sqlx::sqlite::SqliteRow) -> Article {
    let bias: Option<String> = row.get("bias");
    Article {
        id: row.get("id"),
        title: row.get("title"),
        content: row
            .get::<Option<String>, _>("content_full")
            .unwrap_or_default(),
        category: row.get("category"),
        outlet_id: row.get("media_id"),
        bias: Bias::from_label(bias.as_deref()),
        image_url: row.get("image_url"),
        issue_id: row.get("issue_id"),
    }
}

impl Database {
    /// Stores a scraped article. Returns `None` if the URL is already known.
    #[instrument(target = "db", level = "debug", skip(self, article), fields(url = %article.url))]
    pub async fn add_article(&self, article: &NewArticle) -> Result<Option<i64>, sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();

        let row = sqlx::query(
            r#"
            INSERT INTO articles (title, url, category, content_full, published_at, author, image_url, bias, media_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&article.title)
        .bind(&article.url)
        .bind(&article.category)
        .bind(&article.content)
        .bind(&article.published_at)
        .bind(&article.author)
        .bind(&article.image_url)
        .bind(article.bias.map(|b| b.as_str()))
        .bind(article.media_id)
        .bind(&created_at)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => {
                let id: i64 = row.get("id");
                debug!(target: TARGET_DB, "Article added: {} with id {}", article.url, id);
                Ok(Some(id))
            }
            None => {
                debug!(target: TARGET_DB, "Article already stored: {}", article.url);
                Ok(None)
            }
        }
    }

    /// Fetches every article that has not been linked to an issue yet.
    pub async fn fetch_unclustered_articles(&self) -> Result<Vec<Article>, sqlx::Error> {
        let query = format!("{} WHERE a.issue_id IS NULL ORDER BY a.id", ARTICLE_COLUMNS);
        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;

        debug!(target: TARGET_DB, "Found {} unclustered articles", rows.len());
        Ok(rows.iter().map(article_from_row).collect())
    }

    /// Fetches full article records for the given ids, ordered by id.
    pub async fn get_articles_by_ids(&self, ids: &[i64]) -> Result<Vec<Article>, sqlx::Error> {
        let mut articles = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(ARTICLE_COLUMNS);
            builder.push(" WHERE a.id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") ORDER BY a.id");

            let rows = builder.build().fetch_all(self.pool()).await?;
            articles.extend(rows.iter().map(article_from_row));
        }

        Ok(articles)
    }

    /// Links the listed articles to an issue inside a single transaction.
    ///
    /// Articles already linked to a different issue are not touched. Returns
    /// the number of rows now carrying `issue_id`.
    #[instrument(target = "db", level = "info", skip(self, ids), fields(count = ids.len()))]
    pub async fn set_issue_for_articles(
        &self,
        ids: &[i64],
        issue_id: &str,
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut backoff = 100; // initial delay in milliseconds
        let max_retries = 5;

        for attempt in 1..=max_retries {
            match self.try_set_issue_for_articles(ids, issue_id).await {
                Ok(updated) => {
                    info!(target: TARGET_DB, "Linked {}/{} articles to issue {}", updated, ids.len(), issue_id);
                    return Ok(updated);
                }
                Err(err) if err.is_database_lock_error() && attempt < max_retries => {
                    warn!(target: TARGET_DB, "Database is locked, waiting {}ms before retrying attempt {}/{}", backoff, attempt, max_retries);
                    // Jitter keeps concurrent writers from retrying in lockstep
                    let jitter = rand::rng().random_range(0..50);
                    sleep(Duration::from_millis(backoff + jitter)).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => {
                    error!(target: TARGET_DB, "Failed to link articles to issue {}: {}", issue_id, err);
                    return Err(err);
                }
            }
        }

        Err(sqlx::Error::Protocol(
            "Maximum retries exceeded for linking articles".into(),
        ))
    }

    async fn try_set_issue_for_articles(
        &self,
        ids: &[i64],
        issue_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        let mut updated = 0;

        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE articles SET issue_id = ");
            builder.push_bind(issue_id);
            builder.push(" WHERE (issue_id IS NULL OR issue_id = ");
            builder.push_bind(issue_id);
            builder.push(") AND id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            updated += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Counts articles still waiting for an issue.
    pub async fn count_unclustered_articles(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE issue_id IS NULL")
            .fetch_one(self.pool())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Issue;

    fn article(url: &str, bias: Option<Bias>) -> NewArticle {
        NewArticle {
            title: format!("Title for {}", url),
            url: url.to_string(),
            content: Some("Body".to_string()),
            bias,
            ..Default::default()
        }
    }

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
            source_count: 1,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_url_is_skipped() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.add_article(&article("https://a", None)).await.unwrap().is_some());
        assert!(db.add_article(&article("https://a", None)).await.unwrap().is_none());
        assert_eq!(db.count_unclustered_articles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bias_falls_back_to_outlet_then_center() {
        let db = Database::in_memory().await.unwrap();
        let outlet = db.get_or_create_outlet("Daily Left").await.unwrap();
        db.set_outlet_bias(outlet.id, Bias::Left).await.unwrap();

        let mut from_outlet = article("https://outlet", None);
        from_outlet.media_id = Some(outlet.id);
        let own = article("https://own", Some(Bias::Right));
        let none = article("https://none", None);

        let a = db.add_article(&from_outlet).await.unwrap().unwrap();
        let b = db.add_article(&own).await.unwrap().unwrap();
        let c = db.add_article(&none).await.unwrap().unwrap();

        let fetched = db.get_articles_by_ids(&[c, a, b]).await.unwrap();
        let biases: Vec<Bias> = fetched.iter().map(|a| a.bias).collect();
        assert_eq!(biases, vec![Bias::Left, Bias::Right, Bias::Center]);
    }

    #[tokio::test]
    async fn test_assignment_excludes_from_unclustered() {
        let db = Database::in_memory().await.unwrap();
        let a = db.add_article(&article("https://a", None)).await.unwrap().unwrap();
        let b = db.add_article(&article("https://b", None)).await.unwrap().unwrap();
        db.insert_issue(&issue("issue-1")).await.unwrap();

        assert_eq!(db.set_issue_for_articles(&[a], "issue-1").await.unwrap(), 1);
        // Re-applying the same link is harmless
        assert_eq!(db.set_issue_for_articles(&[a], "issue-1").await.unwrap(), 1);

        let remaining = db.fetch_unclustered_articles().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b);
    }

    #[tokio::test]
    async fn test_existing_link_is_not_overwritten() {
        let db = Database::in_memory().await.unwrap();
        let a = db.add_article(&article("https://a", None)).await.unwrap().unwrap();
        db.insert_issue(&issue("first")).await.unwrap();
        db.insert_issue(&issue("second")).await.unwrap();

        db.set_issue_for_articles(&[a], "first").await.unwrap();
        assert_eq!(db.set_issue_for_articles(&[a], "second").await.unwrap(), 0);

        let stored = db.get_articles_by_ids(&[a]).await.unwrap();
        assert_eq!(stored[0].issue_id.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(db.set_issue_for_articles(&[], "nothing").await.unwrap(), 0);
        assert!(db.get_articles_by_ids(&[]).await.unwrap().is_empty());
    }
}
