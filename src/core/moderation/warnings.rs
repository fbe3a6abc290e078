// Warnings port - records live in an external datastore, never cached here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Most warnings shown by the `warnings` command.
pub const WARNINGS_SHOWN: usize = 10;

#[derive(Debug, Error)]
pub enum WarningStoreError {
    #[error("warnings database is not configured")]
    NotConfigured,

    #[error("warnings database unreachable: {0}")]
    Unavailable(String),

    #[error("unexpected response from warnings database: {0}")]
    Malformed(String),
}

/// A stored warning. `id` is assigned by the datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub id: i64,
    pub user_id: u64,
    pub moderator_id: u64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWarning {
    pub user_id: u64,
    pub moderator_id: u64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait WarningStore: Send + Sync {
    async fn insert(&self, warning: NewWarning) -> Result<Warning, WarningStoreError>;

    /// Newest first.
    async fn query(&self, user_id: u64) -> Result<Vec<Warning>, WarningStoreError>;

    /// Returns how many rows were removed.
    async fn delete_all(&self, user_id: u64) -> Result<u64, WarningStoreError>;
}

/// Total count plus the newest `WARNINGS_SHOWN` warnings for a user.
pub async fn recent_warnings(
    store: &dyn WarningStore,
    user_id: u64,
) -> Result<(usize, Vec<Warning>), WarningStoreError> {
    let mut all = store.query(user_id).await?;
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = all.len();
    all.truncate(WARNINGS_SHOWN);
    Ok((total, all))
}

/// Used when neither Supabase nor the local database could be set up.
pub struct UnconfiguredWarningStore;

#[async_trait]
impl WarningStore for UnconfiguredWarningStore {
    async fn insert(&self, _warning: NewWarning) -> Result<Warning, WarningStoreError> {
        Err(WarningStoreError::NotConfigured)
    }

    async fn query(&self, _user_id: u64) -> Result<Vec<Warning>, WarningStoreError> {
        Err(WarningStoreError::NotConfigured)
    }

    async fn delete_all(&self, _user_id: u64) -> Result<u64, WarningStoreError> {
        Err(WarningStoreError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::MemoryWarningStore;
    use chrono::Duration;

    #[tokio::test]
    async fn test_recent_warnings_caps_and_orders() {
        let store = MemoryWarningStore::default();
        let base = Utc::now();
        for i in 0..12 {
            store
                .insert(NewWarning {
                    user_id: 1,
                    moderator_id: 2,
                    reason: format!("warning {}", i),
                    created_at: base + Duration::seconds(i),
                })
                .await
                .unwrap();
        }

        let (total, shown) = recent_warnings(&store, 1).await.unwrap();
        assert_eq!(total, 12);
        assert_eq!(shown.len(), WARNINGS_SHOWN);
        assert_eq!(shown[0].reason, "warning 11");
    }

    #[tokio::test]
    async fn test_unconfigured_store_reports_not_configured() {
        let err = UnconfiguredWarningStore.query(1).await.unwrap_err();
        assert!(matches!(err, WarningStoreError::NotConfigured));
    }
}
