use sqlx::Row;
use tracing::{debug, info, instrument};

use super::core::Database;
use crate::types::{Bias, Issue};
use crate::TARGET_DB;

impl Database {
    /// Inserts a freshly synthesized issue. The caller supplies the id.
    #[instrument(target = "db", level = "info", skip(self, issue), fields(issue_id = %issue.id))]
    pub async fn insert_issue(&self, issue: &Issue) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO issues (id, title, summary, image_url, bias_left_pct, bias_center_pct,
                                bias_right_pct, dominant_bias, source_count, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&issue.id)
        .bind(&issue.title)
        .bind(&issue.summary)
        .bind(&issue.image_url)
        .bind(issue.bias_left_pct)
        .bind(issue.bias_center_pct)
        .bind(issue.bias_right_pct)
        .bind(issue.dominant_bias.as_str())
        .bind(issue.source_count)
        .bind(&issue.updated_at)
        .execute(self.pool())
        .await?;

        info!(target: TARGET_DB, "Issue stored: {} ({})", issue.id, issue.title);
        Ok(())
    }

    pub async fn has_issue(&self, issue_id: &str) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM issues WHERE id = ?)")
            .bind(issue_id)
            .fetch_one(self.pool())
            .await?;

        debug!(target: TARGET_DB, "Issue {} exists: {}", issue_id, exists);
        Ok(exists)
    }

    pub async fn get_issue(&self, issue_id: &str) -> Result<Option<Issue>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, title, summary, image_url, bias_left_pct, bias_center_pct, bias_right_pct,
                   dominant_bias, source_count, updated_at
            FROM issues
            WHERE id = ?
            "#,
        )
        .bind(issue_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| {
            let dominant: String = row.get("dominant_bias");
            Issue {
                id: row.get("id"),
                title: row.get("title"),
                summary: row.get("summary"),
                image_url: row.get("image_url"),
                bias_left_pct: row.get("bias_left_pct"),
                bias_center_pct: row.get("bias_center_pct"),
                bias_right_pct: row.get("bias_right_pct"),
                dominant_bias: Bias::from_label(Some(&dominant)),
                source_count: row.get("source_count"),
                updated_at: row.get("updated_at"),
            }
        }))
    }

    pub async fn count_issues(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM issues")
            .fetch_one(self.pool())
            .await
    }
}
