// SQLite-backed warnings, used when Supabase is not configured.
//
// Table:
// - warnings: one row per warning, newest found by created_at

use crate::core::moderation::{NewWarning, Warning, WarningStore, WarningStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteWarningStore {
    pool: Pool<Sqlite>,
}

impl SqliteWarningStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), WarningStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS warnings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                moderator_id INTEGER NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_warnings_user
                ON warnings(user_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(e: sqlx::Error) -> WarningStoreError {
    WarningStoreError::Unavailable(e.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, WarningStoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| WarningStoreError::Malformed(format!("bad created_at {:?}: {}", raw, e)))
}

#[async_trait]
impl WarningStore for SqliteWarningStore {
    async fn insert(&self, warning: NewWarning) -> Result<Warning, WarningStoreError> {
        let result = sqlx::query(
            "INSERT INTO warnings (user_id, moderator_id, reason, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(warning.user_id as i64)
        .bind(warning.moderator_id as i64)
        .bind(&warning.reason)
        .bind(warning.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(Warning {
            id: result.last_insert_rowid(),
            user_id: warning.user_id,
            moderator_id: warning.moderator_id,
            reason: warning.reason,
            created_at: warning.created_at,
        })
    }

    async fn query(&self, user_id: u64) -> Result<Vec<Warning>, WarningStoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, moderator_id, reason, created_at FROM warnings \
             WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                Ok(Warning {
                    id: row.get("id"),
                    user_id: row.get::<i64, _>("user_id") as u64,
                    moderator_id: row.get::<i64, _>("moderator_id") as u64,
                    reason: row.get("reason"),
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    async fn delete_all(&self, user_id: u64) -> Result<u64, WarningStoreError> {
        let result = sqlx::query("DELETE FROM warnings WHERE user_id = ?")
            .bind(user_id as i64)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteWarningStore {
        // One connection, otherwise every connection gets its own in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteWarningStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn warning(user_id: u64, reason: &str, minutes_ago: i64) -> NewWarning {
        NewWarning {
            user_id,
            moderator_id: 9,
            reason: reason.to_string(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = store().await;
        let a = store.insert(warning(1, "first", 5)).await.unwrap();
        let b = store.insert(warning(1, "second", 1)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(b.reason, "second");
    }

    #[tokio::test]
    async fn test_query_is_newest_first_and_per_user() {
        let store = store().await;
        store.insert(warning(1, "old", 30)).await.unwrap();
        store.insert(warning(1, "new", 1)).await.unwrap();
        store.insert(warning(2, "other", 2)).await.unwrap();

        let found = store.query(1).await.unwrap();
        let reasons: Vec<&str> = found.iter().map(|w| w.reason.as_str()).collect();
        assert_eq!(reasons, vec!["new", "old"]);
        assert_eq!(found[0].moderator_id, 9);
    }

    #[tokio::test]
    async fn test_delete_all_reports_count() {
        let store = store().await;
        store.insert(warning(1, "a", 3)).await.unwrap();
        store.insert(warning(1, "b", 2)).await.unwrap();
        store.insert(warning(2, "c", 1)).await.unwrap();

        assert_eq!(store.delete_all(1).await.unwrap(), 2);
        assert!(store.query(1).await.unwrap().is_empty());
        assert_eq!(store.query(2).await.unwrap().len(), 1);
        assert_eq!(store.delete_all(1).await.unwrap(), 0);
    }
}
