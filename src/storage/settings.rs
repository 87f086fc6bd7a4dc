use anyhow::Result;
use std::collections::BTreeMap;

use super::schema::Database;

impl Database {
    // ========================================================================
    // User Settings Operations
    // ========================================================================

    /// Get a boolean setting, `None` if never set.
    pub async fn get_setting(&self, key: &str) -> Result<Option<bool>> {
        let row: Option<(bool,)> = sqlx::query_as("SELECT value FROM user_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a boolean setting (UPSERT).
    pub async fn set_setting(&self, key: &str, value: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every stored setting, keyed and ordered by name.
    pub async fn get_settings(&self) -> Result<BTreeMap<String, bool>> {
        let rows: Vec<(String, bool)> =
            sqlx::query_as("SELECT key, value FROM user_settings ORDER BY key")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_setting_missing() {
        let db = test_db().await;
        assert_eq!(db.get_setting("show-tray-icon").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_setting_upsert() {
        let db = test_db().await;
        db.set_setting("launch-at-login", true).await.unwrap();
        db.set_setting("launch-at-login", false).await.unwrap();

        assert_eq!(db.get_setting("launch-at-login").await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_get_settings_ordered() {
        let db = test_db().await;
        db.set_setting("verbose-logging", true).await.unwrap();
        db.set_setting("auto-updates", false).await.unwrap();

        let settings = db.get_settings().await.unwrap();
        assert_eq!(
            settings.into_iter().collect::<Vec<_>>(),
            vec![
                ("auto-updates".to_string(), false),
                ("verbose-logging".to_string(), true),
            ]
        );
    }
}
