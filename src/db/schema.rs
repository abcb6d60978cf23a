use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS media_outlets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                bias TEXT NOT NULL DEFAULT 'center',
                logo_url TEXT
            );

            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                category TEXT,
                content_full TEXT,
                published_at TEXT,
                author TEXT,
                image_url TEXT,
                bias TEXT,
                media_id INTEGER,
                issue_id TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (media_id) REFERENCES media_outlets (id) ON DELETE SET NULL,
                FOREIGN KEY (issue_id) REFERENCES issues (id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_articles_issue_id ON articles (issue_id);
            CREATE INDEX IF NOT EXISTS idx_articles_category ON articles (category);

            CREATE TABLE IF NOT EXISTS issues (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                image_url TEXT,
                bias_left_pct REAL NOT NULL,
                bias_center_pct REAL NOT NULL,
                bias_right_pct REAL NOT NULL,
                dominant_bias TEXT NOT NULL,
                source_count INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_issues_updated_at ON issues (updated_at);
            "#,
        )
        .execute(&mut *conn)
        .await?;
        info!(target: TARGET_DB, "Tables ensured to exist");

        Ok(())
    }
}
