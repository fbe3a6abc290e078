use crate::core::config::{SecuritySettings, SettingsError, SettingsStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// Every guild's settings in one JSON object keyed by guild id:
/// `{ "123": { "min_account_age_days": 7, ... } }`
type SettingsDocument = BTreeMap<String, SecuritySettings>;

/// JSON-file settings store. The whole document is rewritten on every save,
/// through a temporary file and a rename so a crash never leaves half a file.
pub struct JsonSettingsStore {
    path: PathBuf,
    cache: RwLock<Option<SettingsDocument>>,
}

impl JsonSettingsStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: RwLock::new(None),
        }
    }

    async fn read_document(&self) -> Result<SettingsDocument, SettingsError> {
        if !self.path.exists() {
            return Ok(SettingsDocument::new());
        }
        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|e| SettingsError::Store(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(SettingsDocument::new());
        }
        serde_json::from_str(&text).map_err(|e| {
            SettingsError::Store(format!("{} is not valid JSON: {}", self.path.display(), e))
        })
    }

    async fn write_document(&self, doc: &SettingsDocument) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SettingsError::Store(e.to_string()))?;
        }

        let text =
            serde_json::to_string_pretty(doc).map_err(|e| SettingsError::Store(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)
            .await
            .map_err(|e| SettingsError::Store(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SettingsError::Store(e.to_string()))
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn load(&self, guild_id: u64) -> Result<Option<SecuritySettings>, SettingsError> {
        if let Some(doc) = self.cache.read().await.as_ref() {
            return Ok(doc.get(&guild_id.to_string()).cloned());
        }

        let mut cache = self.cache.write().await;
        if cache.is_none() {
            *cache = Some(self.read_document().await?);
        }
        Ok(cache
            .as_ref()
            .and_then(|doc| doc.get(&guild_id.to_string()).cloned()))
    }

    async fn save(&self, guild_id: u64, settings: &SecuritySettings) -> Result<(), SettingsError> {
        let mut cache = self.cache.write().await;
        let mut doc = match cache.take() {
            Some(doc) => doc,
            None => self.read_document().await?,
        };
        doc.insert(guild_id.to_string(), settings.clone());

        let result = self.write_document(&doc).await;
        *cache = Some(doc);
        result
    }
}
