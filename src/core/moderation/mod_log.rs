use super::moderation_models::ModLogEntry;
use crate::core::platform::{CallPolicy, GuildPlatform};
use std::sync::Arc;

/// Best-effort writer for the mod-log channel.
///
/// A failed write is logged and swallowed; it never fails the action that
/// produced the entry.
pub struct ModLog<P: GuildPlatform> {
    platform: Arc<P>,
    channel_id: Option<u64>,
    policy: CallPolicy,
}

impl<P: GuildPlatform> ModLog<P> {
    pub fn new(platform: Arc<P>, channel_id: Option<u64>, policy: CallPolicy) -> Self {
        Self {
            platform,
            channel_id,
            policy,
        }
    }

    /// Returns whether the entry reached the channel.
    pub async fn write(&self, guild_id: u64, entry: &ModLogEntry) -> bool {
        let Some(channel_id) = self.channel_id else {
            tracing::debug!(guild_id, "No mod-log channel configured, entry dropped");
            return false;
        };

        let platform = &self.platform;
        match self
            .policy
            .run(move || platform.send_log(guild_id, channel_id, entry))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(guild_id, channel_id, error = %e, "Failed to write mod-log entry");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{Actor, NoticeKind, SecurityNotice};
    use crate::core::test_support::FakePlatform;

    fn notice() -> ModLogEntry {
        ModLogEntry::Security(SecurityNotice::new(NoticeKind::Lockdown, Actor::Bot, "raid"))
    }

    #[tokio::test]
    async fn test_write_reaches_channel() {
        let platform = Arc::new(FakePlatform::new());
        let log = ModLog::new(platform.clone(), Some(99), CallPolicy::default());

        assert!(log.write(1, &notice()).await);
        assert_eq!(platform.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_channel_drops_entry() {
        let platform = Arc::new(FakePlatform::new());
        let log = ModLog::new(platform.clone(), None, CallPolicy::default());

        assert!(!log.write(1, &notice()).await);
        assert!(platform.logs().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_unreachable(true);
        let log = ModLog::new(platform.clone(), Some(99), CallPolicy::default());

        assert!(!log.write(1, &notice()).await);
    }
}
