use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::core::lockdown::{GuildSnapshots, SnapshotStore, SnapshotStoreError};

/// Active lockdown and invite-pause snapshots for every guild, in one JSON file.
///
/// Guilds with nothing active are dropped from the file.
pub struct JsonSnapshotStore {
    path: PathBuf,
    // Serialises read-modify-write of the file.
    lock: Mutex<()>,
}

impl JsonSnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<HashMap<u64, GuildSnapshots>, SnapshotStoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|e| SnapshotStoreError(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&text).map_err(|e| SnapshotStoreError(e.to_string()))
    }

    async fn write_all(
        &self,
        all: &HashMap<u64, GuildSnapshots>,
    ) -> Result<(), SnapshotStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SnapshotStoreError(e.to_string()))?;
        }

        let text =
            serde_json::to_string_pretty(all).map_err(|e| SnapshotStoreError(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)
            .await
            .map_err(|e| SnapshotStoreError(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SnapshotStoreError(e.to_string()))
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self, guild_id: u64) -> Result<GuildSnapshots, SnapshotStoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        Ok(all.remove(&guild_id).unwrap_or_default())
    }

    async fn save(
        &self,
        guild_id: u64,
        snapshots: &GuildSnapshots,
    ) -> Result<(), SnapshotStoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        if snapshots.is_empty() {
            all.remove(&guild_id);
        } else {
            all.insert(guild_id, snapshots.clone());
        }
        self.write_all(&all).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lockdown::{OverwriteSnapshot, SnapshotEntry};
    use crate::core::moderation::Actor;
    use crate::core::platform::PermissionOverwrite;
    use chrono::Utc;

    fn active() -> GuildSnapshots {
        GuildSnapshots {
            lockdown: Some(OverwriteSnapshot {
                reason: "raid".into(),
                actor: Actor::Moderator(7),
                taken_at: Utc::now(),
                entries: vec![
                    SnapshotEntry {
                        channel_id: 10,
                        role_id: 1,
                        prior: None,
                        bits: 1 << 11,
                    },
                    SnapshotEntry {
                        channel_id: 11,
                        role_id: 1,
                        prior: Some(PermissionOverwrite { allow: 1024, deny: 0 }),
                        bits: 1 << 11,
                    },
                ],
            }),
            invite_pause: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockdown_state.json");

        let snapshots = active();
        JsonSnapshotStore::new(&path)
            .save(1, &snapshots)
            .await
            .unwrap();

        let reopened = JsonSnapshotStore::new(&path);
        assert_eq!(reopened.load(1).await.unwrap(), snapshots);
        assert!(reopened.load(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleared_guild_is_removed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockdown_state.json");
        let store = JsonSnapshotStore::new(&path);

        store.save(1, &active()).await.unwrap();
        store.save(2, &active()).await.unwrap();
        store.save(1, &GuildSnapshots::default()).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let all: HashMap<u64, GuildSnapshots> = serde_json::from_str(&text).unwrap();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockdown_state.json");
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(JsonSnapshotStore::new(&path).load(1).await.is_err());
    }
}
