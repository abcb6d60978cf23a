mod article;
pub mod core;
mod issue;
mod outlet;
mod schema;

// Re-export Database and essential types
pub use self::article::NewArticle;
pub use self::core::Database;
pub use self::core::DbLockErrorExt;
pub use self::outlet::Outlet;

use anyhow::Result;

use crate::traits::{ArticleStore, IssueStore};
use crate::types::{Article, Issue};

impl ArticleStore for Database {
    async fn unclustered_articles(&self) -> Result<Vec<Article>> {
        Ok(self.fetch_unclustered_articles().await?)
    }

    async fn articles_by_ids(&self, ids: &[i64]) -> Result<Vec<Article>> {
        Ok(self.get_articles_by_ids(ids).await?)
    }

    async fn assign_issue(&self, ids: &[i64], issue_id: &str) -> Result<u64> {
        Ok(self.set_issue_for_articles(ids, issue_id).await?)
    }
}

impl IssueStore for Database {
    async fn create_issue(&self, issue: &Issue) -> Result<()> {
        Ok(self.insert_issue(issue).await?)
    }

    async fn issue_exists(&self, issue_id: &str) -> Result<bool> {
        Ok(self.has_issue(issue_id).await?)
    }
}
