use sqlx::Row;
use tracing::{info, instrument};

use super::core::Database;
use crate::types::Bias;
use crate::TARGET_DB;

/// A media outlet and the editorial lean its articles inherit.
#[derive(Debug, Clone, PartialEq)]
pub struct Outlet {
    pub id: i64,
    pub name: String,
    pub bias: Bias,
}

impl Database {
    /// Looks an outlet up by name, registering it with the default bias if unknown.
    ///
    /// New outlets always start as `Bias::default()` (center) until someone
    /// classifies them with `set_outlet_bias`.
    #[instrument(target = "db", level = "debug", skip(self))]
    pub async fn get_or_create_outlet(&self, name: &str) -> Result<Outlet, sqlx::Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO media_outlets (name, bias)
            VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET name = excluded.name
            RETURNING id, name, bias
            "#,
        )
        .bind(name)
        .bind(Bias::default().as_str())
        .fetch_one(self.pool())
        .await?;

        let bias: String = row.get("bias");
        Ok(Outlet {
            id: row.get("id"),
            name: row.get("name"),
            bias: Bias::from_label(Some(&bias)),
        })
    }

    pub async fn set_outlet_bias(&self, outlet_id: i64, bias: Bias) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE media_outlets SET bias = ? WHERE id = ?")
            .bind(bias.as_str())
            .bind(outlet_id)
            .execute(self.pool())
            .await?;
        info!(target: TARGET_DB, "Outlet {} classified as {}", outlet_id, bias);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_outlet_defaults_to_center() {
        let db = Database::in_memory().await.unwrap();
        let outlet = db.get_or_create_outlet("Morning Post").await.unwrap();
        assert_eq!(outlet.bias, Bias::Center);
    }

    #[tokio::test]
    async fn test_existing_outlet_keeps_its_bias() {
        let db = Database::in_memory().await.unwrap();
        let first = db.get_or_create_outlet("Evening Star").await.unwrap();
        db.set_outlet_bias(first.id, Bias::Right).await.unwrap();

        let again = db.get_or_create_outlet("Evening Star").await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.bias, Bias::Right);
    }
}
