use super::security_settings::SecuritySettings;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid setting: {0}")]
    Invalid(String),
    #[error("Settings store error: {0}")]
    Store(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Durable home of the settings document.
///
/// `save` rewrites the guild's whole document; there is no partial patch.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self, guild_id: u64) -> Result<Option<SecuritySettings>, SettingsError>;
    async fn save(&self, guild_id: u64, settings: &SecuritySettings) -> Result<(), SettingsError>;
}

// ============================================================================
// SERVICE
// ============================================================================

/// Read-mostly settings cache.
///
/// Readers get an `Arc` of a complete document. Writers build a new document
/// and swap it in, so a reader never sees half an update.
pub struct SettingsService<S: SettingsStore> {
    store: S,
    cache: DashMap<u64, Arc<SecuritySettings>>,
    writer: Mutex<()>,
}

impl<S: SettingsStore> SettingsService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            writer: Mutex::new(()),
        }
    }

    /// Settings for a guild. A guild without a stored document gets the
    /// defaults, which are written back so the file reflects what is in force.
    pub async fn current(&self, guild_id: u64) -> Arc<SecuritySettings> {
        if let Some(settings) = self.cache.get(&guild_id) {
            return Arc::clone(settings.value());
        }

        let _guard = self.writer.lock().await;
        if let Some(settings) = self.cache.get(&guild_id) {
            return Arc::clone(settings.value());
        }

        match self.store.load(guild_id).await {
            Ok(Some(settings)) => self.install(guild_id, settings),
            Ok(None) => {
                let settings = SecuritySettings::default();
                if let Err(e) = self.store.save(guild_id, &settings).await {
                    tracing::warn!(guild_id, error = %e, "Failed to persist default security settings");
                }
                self.install(guild_id, settings)
            }
            Err(e) => {
                // Not cached, the next read retries the store.
                tracing::error!(guild_id, error = %e, "Failed to load security settings, using defaults");
                Arc::new(SecuritySettings::default())
            }
        }
    }

    /// Apply `change` to a copy of the current settings, validate it, persist
    /// the full document and only then make it visible.
    pub async fn update<F>(
        &self,
        guild_id: u64,
        change: F,
    ) -> Result<Arc<SecuritySettings>, SettingsError>
    where
        F: FnOnce(&mut SecuritySettings),
    {
        let base = self.current(guild_id).await;

        let _guard = self.writer.lock().await;
        // Another writer may have swapped since `current` returned.
        let base = self
            .cache
            .get(&guild_id)
            .map(|s| Arc::clone(s.value()))
            .unwrap_or(base);

        let mut next = (*base).clone();
        change(&mut next);
        next.validate().map_err(SettingsError::Invalid)?;

        self.store.save(guild_id, &next).await?;
        tracing::info!(guild_id, "Security settings updated");
        Ok(self.install(guild_id, next))
    }

    pub async fn set_min_account_age(
        &self,
        guild_id: u64,
        days: u32,
    ) -> Result<Arc<SecuritySettings>, SettingsError> {
        self.update(guild_id, |s| s.min_account_age_days = days).await
    }

    fn install(&self, guild_id: u64, settings: SecuritySettings) -> Arc<SecuritySettings> {
        let settings = Arc::new(settings);
        self.cache.insert(guild_id, Arc::clone(&settings));
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct MockSettingsStore {
        docs: DashMap<u64, SecuritySettings>,
        saves: AtomicU32,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl SettingsStore for MockSettingsStore {
        async fn load(&self, guild_id: u64) -> Result<Option<SecuritySettings>, SettingsError> {
            Ok(self.docs.get(&guild_id).map(|d| d.clone()))
        }

        async fn save(
            &self,
            guild_id: u64,
            settings: &SecuritySettings,
        ) -> Result<(), SettingsError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(SettingsError::Store("disk full".into()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.docs.insert(guild_id, settings.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_document_gets_defaults_and_is_persisted() {
        let service = SettingsService::new(MockSettingsStore::default());
        let settings = service.current(1).await;
        assert_eq!(*settings, SecuritySettings::default());
        assert!(service.store.docs.contains_key(&1));
    }

    #[tokio::test]
    async fn test_update_persists_and_swaps() {
        let service = SettingsService::new(MockSettingsStore::default());
        let before = service.current(1).await;

        service
            .update(1, |s| s.link_spam_threshold = 10)
            .await
            .unwrap();

        // Earlier readers keep their complete snapshot.
        assert_eq!(before.link_spam_threshold, 3);
        assert_eq!(service.current(1).await.link_spam_threshold, 10);
        assert_eq!(service.store.docs.get(&1).unwrap().link_spam_threshold, 10);
    }

    #[tokio::test]
    async fn test_invalid_update_is_rejected_without_side_effects() {
        let service = SettingsService::new(MockSettingsStore::default());
        service.current(1).await;
        let saves = service.store.saves.load(Ordering::SeqCst);

        let err = service.set_min_account_age(1, 400).await.unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
        assert_eq!(service.current(1).await.min_account_age_days, 7);
        assert_eq!(service.store.saves.load(Ordering::SeqCst), saves);
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_old_settings() {
        let service = SettingsService::new(MockSettingsStore::default());
        service.current(1).await;
        service.store.fail_saves.store(true, Ordering::SeqCst);

        let err = service.set_min_account_age(1, 30).await.unwrap_err();
        assert!(matches!(err, SettingsError::Store(_)));
        assert_eq!(service.current(1).await.min_account_age_days, 7);
    }

    #[tokio::test]
    async fn test_guilds_are_independent() {
        let service = SettingsService::new(MockSettingsStore::default());
        service.set_min_account_age(1, 30).await.unwrap();
        assert_eq!(service.current(2).await.min_account_age_days, 7);
    }
}
