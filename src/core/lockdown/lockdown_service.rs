use super::snapshot::{
    plan_overlay, GuildSnapshots, Overlay, OverwriteSnapshot, PlannedEdit, SnapshotEntry,
    SnapshotStore,
};
use crate::core::moderation::{Actor, ModLog, ModLogEntry, NoticeKind, SecurityNotice};
use crate::core::platform::{CallPolicy, GuildPlatform, PermissionOverwrite, PlatformError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LockdownError {
    #[error("There is no active lockdown to lift.")]
    NoActiveLockdown,

    #[error("Invites are already paused.")]
    InvitesAlreadyPaused,

    #[error("Invites are not paused.")]
    InvitesNotPaused,

    #[error("The server is already silenced.")]
    AlreadySilenced,

    #[error("The server is not silenced.")]
    NotSilenced,

    #[error("No mute role is configured. Set one with /security first.")]
    MuteRoleNotConfigured,

    #[error("Could not read the server state: {0}")]
    Unreachable(PlatformError),

    #[error("Lockdown state could not be loaded: {0}")]
    Store(String),
}

// ============================================================================
// REQUESTS AND REPORTS
// ============================================================================

#[derive(Debug, Clone)]
pub struct OverlayRequest {
    pub guild_id: u64,
    pub actor: Actor,
    pub reason: String,
    /// Roles whose overwrites are edited. Defaults to @everyone.
    pub baseline_roles: Vec<u64>,
}

impl OverlayRequest {
    pub fn new(guild_id: u64, actor: Actor, reason: impl Into<String>) -> Self {
        Self {
            guild_id,
            actor,
            reason: reason.into(),
            // The @everyone role shares the guild's id.
            baseline_roles: vec![guild_id],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelFailure {
    pub channel_id: u64,
    pub error: PlatformError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayReport {
    pub changed: usize,
    pub failures: Vec<ChannelFailure>,
    /// Only set by invite pauses.
    pub invites_deleted: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockdownOutcome {
    Locked(OverlayReport),
    /// Lockdown was already active; nothing was changed.
    AlreadyLocked {
        since: DateTime<Utc>,
        age: chrono::Duration,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    pub restored: usize,
    /// Channels deleted since the snapshot was taken.
    pub skipped_missing: usize,
    /// These stay in the snapshot so the restore can be retried.
    pub failures: Vec<ChannelFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockdownStatus {
    pub locked_since: Option<DateTime<Utc>>,
    pub invites_paused_since: Option<DateTime<Utc>>,
}

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Default)]
struct GuildState {
    loaded: bool,
    snapshots: GuildSnapshots,
}

/// Snapshot, overlay and restore of channel permissions.
///
/// Each guild's state sits behind its own async mutex, so a second lockdown
/// arriving during a restore waits for it. Guilds never block each other.
pub struct LockdownService<P: GuildPlatform, S: SnapshotStore> {
    platform: Arc<P>,
    store: S,
    mod_log: Arc<ModLog<P>>,
    policy: CallPolicy,
    guilds: DashMap<u64, Arc<Mutex<GuildState>>>,
}

impl<P: GuildPlatform, S: SnapshotStore> LockdownService<P, S> {
    pub fn new(platform: Arc<P>, store: S, mod_log: Arc<ModLog<P>>, policy: CallPolicy) -> Self {
        Self {
            platform,
            store,
            mod_log,
            policy,
            guilds: DashMap::new(),
        }
    }

    fn guild(&self, guild_id: u64) -> Arc<Mutex<GuildState>> {
        // Clone out so the map shard isn't locked across an await.
        Arc::clone(self.guilds.entry(guild_id).or_default().value())
    }

    async fn ensure_loaded(&self, guild_id: u64, state: &mut GuildState) -> Result<(), LockdownError> {
        if !state.loaded {
            state.snapshots = self
                .store
                .load(guild_id)
                .await
                .map_err(|e| LockdownError::Store(e.to_string()))?;
            state.loaded = true;
        }
        Ok(())
    }

    async fn persist(&self, guild_id: u64, snapshots: &GuildSnapshots) {
        if let Err(e) = self.store.save(guild_id, snapshots).await {
            tracing::error!(guild_id, error = %e, "Failed to persist lockdown state");
        }
    }

    /// Deny sending in every text channel and speaking in every voice channel.
    ///
    /// Fails as a whole only when the channel list can't be read. Past that
    /// point each channel is best-effort.
    pub async fn lockdown(&self, request: OverlayRequest) -> Result<LockdownOutcome, LockdownError> {
        let guild_id = request.guild_id;
        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;
        self.ensure_loaded(guild_id, &mut state).await?;

        if let Some(active) = &state.snapshots.lockdown {
            return Ok(LockdownOutcome::AlreadyLocked {
                since: active.taken_at,
                age: Utc::now() - active.taken_at,
            });
        }

        let (snapshot, plan) = self.capture(&request, Overlay::Lockdown).await?;
        // Persist before touching channels so a crash mid-way can still restore.
        state.snapshots.lockdown = Some(snapshot);
        self.persist(guild_id, &state.snapshots).await;
        let report = self.apply(&request, &plan).await;
        drop(state);

        tracing::warn!(
            guild_id,
            changed = report.changed,
            failed = report.failures.len(),
            "Server locked down"
        );

        let notice = SecurityNotice::new(NoticeKind::Lockdown, request.actor, &request.reason)
            .detail("Channels locked", report.changed)
            .detail("Failures", report.failures.len());
        self.mod_log
            .write(guild_id, &ModLogEntry::Security(notice))
            .await;

        Ok(LockdownOutcome::Locked(report))
    }

    /// Put back every overwrite recorded by `lockdown`.
    ///
    /// Channels created during the lockdown aren't in the snapshot and are
    /// left alone. Entries that fail to restore are kept for a retry.
    pub async fn unlock(
        &self,
        guild_id: u64,
        actor: Actor,
        reason: &str,
    ) -> Result<RestoreReport, LockdownError> {
        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;
        self.ensure_loaded(guild_id, &mut state).await?;

        let Some(snapshot) = state.snapshots.lockdown.clone() else {
            return Err(LockdownError::NoActiveLockdown);
        };

        let (remaining, report) = self.restore(guild_id, &snapshot.entries, reason).await?;
        state.snapshots.lockdown = if remaining.is_empty() {
            None
        } else {
            Some(OverwriteSnapshot {
                entries: remaining,
                ..snapshot
            })
        };
        self.persist(guild_id, &state.snapshots).await;
        drop(state);

        tracing::info!(
            guild_id,
            restored = report.restored,
            failed = report.failures.len(),
            "Lockdown lifted"
        );

        let notice = SecurityNotice::new(NoticeKind::Unlock, actor, reason)
            .detail("Channels restored", report.restored)
            .detail("Channels gone", report.skipped_missing)
            .detail("Failures", report.failures.len());
        self.mod_log
            .write(guild_id, &ModLogEntry::Security(notice))
            .await;

        Ok(report)
    }

    /// Delete every invite and deny invite creation until `resume_invites`.
    pub async fn pause_invites(&self, request: OverlayRequest) -> Result<OverlayReport, LockdownError> {
        let guild_id = request.guild_id;
        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;
        self.ensure_loaded(guild_id, &mut state).await?;

        if state.snapshots.invite_pause.is_some() {
            return Err(LockdownError::InvitesAlreadyPaused);
        }

        let (snapshot, plan) = self.capture(&request, Overlay::InvitePause).await?;
        state.snapshots.invite_pause = Some(snapshot);
        self.persist(guild_id, &state.snapshots).await;
        let mut report = self.apply(&request, &plan).await;
        drop(state);

        report.invites_deleted = self.delete_all_invites(guild_id, &request.reason).await;

        tracing::warn!(
            guild_id,
            invites_deleted = report.invites_deleted,
            "Invites paused"
        );

        let notice =
            SecurityNotice::new(NoticeKind::InvitesPaused, request.actor, &request.reason)
                .detail("Invites deleted", report.invites_deleted)
                .detail("Channels changed", report.changed)
                .detail("Failures", report.failures.len());
        self.mod_log
            .write(guild_id, &ModLogEntry::Security(notice))
            .await;

        Ok(report)
    }

    pub async fn resume_invites(
        &self,
        guild_id: u64,
        actor: Actor,
        reason: &str,
    ) -> Result<RestoreReport, LockdownError> {
        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;
        self.ensure_loaded(guild_id, &mut state).await?;

        let Some(snapshot) = state.snapshots.invite_pause.clone() else {
            return Err(LockdownError::InvitesNotPaused);
        };

        let (remaining, report) = self.restore(guild_id, &snapshot.entries, reason).await?;
        state.snapshots.invite_pause = if remaining.is_empty() {
            None
        } else {
            Some(OverwriteSnapshot {
                entries: remaining,
                ..snapshot
            })
        };
        self.persist(guild_id, &state.snapshots).await;
        drop(state);

        tracing::info!(guild_id, restored = report.restored, "Invites resumed");

        let notice = SecurityNotice::new(NoticeKind::InvitesResumed, actor, reason)
            .detail("Channels restored", report.restored)
            .detail("Failures", report.failures.len());
        self.mod_log
            .write(guild_id, &ModLogEntry::Security(notice))
            .await;

        Ok(report)
    }

    pub async fn invites_paused(&self, guild_id: u64) -> bool {
        self.status(guild_id)
            .await
            .map(|s| s.invites_paused_since.is_some())
            .unwrap_or(false)
    }

    /// Remove an invite created while invites are paused.
    pub async fn enforce_invite_pause(&self, guild_id: u64, code: &str) -> bool {
        if !self.invites_paused(guild_id).await {
            return false;
        }
        let platform = &self.platform;
        match self
            .policy
            .run(move || platform.delete_invite(guild_id, code, "Invites are paused"))
            .await
        {
            Ok(()) => {
                tracing::info!(guild_id, code, "Deleted invite created while paused");
                true
            }
            Err(e) => {
                tracing::warn!(guild_id, code, error = %e, "Failed to delete invite while paused");
                false
            }
        }
    }

    pub async fn status(&self, guild_id: u64) -> Result<LockdownStatus, LockdownError> {
        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;
        self.ensure_loaded(guild_id, &mut state).await?;
        Ok(LockdownStatus {
            locked_since: state.snapshots.lockdown.as_ref().map(|s| s.taken_at),
            invites_paused_since: state.snapshots.invite_pause.as_ref().map(|s| s.taken_at),
        })
    }

    async fn capture(
        &self,
        request: &OverlayRequest,
        overlay: Overlay,
    ) -> Result<(OverwriteSnapshot, Vec<PlannedEdit>), LockdownError> {
        let guild_id = request.guild_id;
        let platform = &self.platform;
        let channels = self
            .policy
            .run(move || platform.list_channels(guild_id))
            .await
            .map_err(LockdownError::Unreachable)?;

        let plan = plan_overlay(&channels, &request.baseline_roles, overlay);
        let snapshot = OverwriteSnapshot {
            reason: request.reason.clone(),
            actor: request.actor,
            taken_at: Utc::now(),
            entries: plan.iter().map(|edit| edit.entry()).collect(),
        };
        Ok((snapshot, plan))
    }

    async fn apply(&self, request: &OverlayRequest, plan: &[PlannedEdit]) -> OverlayReport {
        let guild_id = request.guild_id;
        let platform = &self.platform;
        let mut report = OverlayReport::default();
        for edit in plan {
            let reason = request.reason.as_str();
            let (channel_id, role_id, next) = (edit.channel_id, edit.role_id, Some(edit.next));
            match self
                .policy
                .run(move || platform.set_channel_overwrite(guild_id, channel_id, role_id, next, reason))
                .await
            {
                Ok(()) => report.changed += 1,
                Err(error) => {
                    tracing::warn!(guild_id, channel_id, error = %error, "Failed to apply overlay");
                    report.failures.push(ChannelFailure { channel_id, error });
                }
            }
        }
        report
    }

    /// Returns the entries that still need restoring.
    async fn restore(
        &self,
        guild_id: u64,
        entries: &[SnapshotEntry],
        reason: &str,
    ) -> Result<(Vec<SnapshotEntry>, RestoreReport), LockdownError> {
        let platform = &self.platform;
        let channels = self
            .policy
            .run(move || platform.list_channels(guild_id))
            .await
            .map_err(LockdownError::Unreachable)?;

        let mut remaining = Vec::new();
        let mut report = RestoreReport::default();

        for entry in entries {
            let Some(channel) = channels.iter().find(|c| c.id == entry.channel_id) else {
                report.skipped_missing += 1;
                continue;
            };
            let current: Option<PermissionOverwrite> =
                channel.overwrites.get(&entry.role_id).copied();
            let target = entry.restored(current);
            let (channel_id, role_id) = (entry.channel_id, entry.role_id);

            match self
                .policy
                .run(move || platform.set_channel_overwrite(guild_id, channel_id, role_id, target, reason))
                .await
            {
                Ok(()) => report.restored += 1,
                // Deleted between the listing and the edit.
                Err(PlatformError::NotFound(_)) => report.skipped_missing += 1,
                Err(error) => {
                    tracing::warn!(guild_id, channel_id, error = %error, "Failed to restore overwrite");
                    report.failures.push(ChannelFailure { channel_id, error });
                    remaining.push(entry.clone());
                }
            }
        }

        Ok((remaining, report))
    }

    async fn delete_all_invites(&self, guild_id: u64, reason: &str) -> usize {
        let platform = &self.platform;
        let invites = match self.policy.run(move || platform.list_invites(guild_id)).await {
            Ok(invites) => invites,
            Err(e) => {
                tracing::warn!(guild_id, error = %e, "Could not list invites");
                return 0;
            }
        };

        let mut deleted = 0;
        for code in &invites {
            let code = code.as_str();
            match self
                .policy
                .run(move || platform.delete_invite(guild_id, code, reason))
                .await
            {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!(guild_id, code, error = %e, "Failed to delete invite"),
            }
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{permission_bits, ChannelKind};
    use crate::core::test_support::{FakePlatform, MemorySnapshotStore, PlatformCall};
    use std::time::Duration;

    const GUILD: u64 = 1;
    const EVERYONE: u64 = GUILD;

    type Service = LockdownService<FakePlatform, MemorySnapshotStore>;

    fn service(platform: Arc<FakePlatform>) -> (Service, MemorySnapshotStore) {
        let policy = CallPolicy {
            timeout: Duration::from_millis(500),
            default_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(10),
        };
        let store = MemorySnapshotStore::default();
        let mod_log = Arc::new(ModLog::new(platform.clone(), Some(500), policy));
        (
            LockdownService::new(platform, store.clone(), mod_log, policy),
            store,
        )
    }

    fn raid() -> OverlayRequest {
        OverlayRequest::new(GUILD, Actor::Moderator(7), "raid")
    }

    /// Five text channels with distinct @everyone overwrites.
    fn five_channels(platform: &FakePlatform) -> Vec<(u64, Option<PermissionOverwrite>)> {
        let priors = vec![
            (10, None),
            (
                11,
                Some(PermissionOverwrite {
                    allow: permission_bits::SEND_MESSAGES,
                    deny: 0,
                }),
            ),
            (
                12,
                Some(PermissionOverwrite {
                    allow: 0,
                    deny: permission_bits::SEND_MESSAGES,
                }),
            ),
            (13, Some(PermissionOverwrite::default())),
            (
                14,
                Some(PermissionOverwrite {
                    allow: permission_bits::CREATE_INSTANT_INVITE,
                    deny: permission_bits::CONNECT,
                }),
            ),
        ];
        for (id, prior) in &priors {
            platform.add_channel(*id, ChannelKind::Text, EVERYONE, *prior);
        }
        priors
    }

    #[tokio::test]
    async fn test_lockdown_then_unlock_restores_exactly() {
        let platform = Arc::new(FakePlatform::new());
        let priors = five_channels(&platform);
        let (service, _) = service(platform.clone());

        let outcome = service.lockdown(raid()).await.unwrap();
        let LockdownOutcome::Locked(report) = outcome else {
            panic!("expected a fresh lockdown");
        };
        assert_eq!(report.changed, 5);
        for (id, _) in &priors {
            let ow = platform.overwrite(*id, EVERYONE).unwrap();
            assert_ne!(ow.deny & permission_bits::SEND_MESSAGES, 0);
        }

        // Created mid-lockdown, must survive the unlock untouched.
        let fresh = PermissionOverwrite {
            allow: 0,
            deny: permission_bits::SEND_MESSAGES,
        };
        platform.add_channel(15, ChannelKind::Text, EVERYONE, Some(fresh));

        let restore = service
            .unlock(GUILD, Actor::Moderator(7), "raid over")
            .await
            .unwrap();
        assert_eq!(restore.restored, 5);
        assert!(restore.failures.is_empty());

        for (id, prior) in &priors {
            assert_eq!(platform.overwrite(*id, EVERYONE), *prior, "channel {}", id);
        }
        assert_eq!(platform.overwrite(15, EVERYONE), Some(fresh));
        assert!(!platform
            .calls()
            .iter()
            .any(|c| matches!(c, PlatformCall::SetOverwrite { channel_id: 15, .. })));
    }

    #[tokio::test]
    async fn test_lockdown_with_no_channels_round_trips() {
        let platform = Arc::new(FakePlatform::new());
        let (service, _) = service(platform.clone());

        service.lockdown(raid()).await.unwrap();
        let report = service.unlock(GUILD, Actor::Bot, "done").await.unwrap();
        assert_eq!(report.restored, 0);
        assert!(service.status(GUILD).await.unwrap().locked_since.is_none());
    }

    #[tokio::test]
    async fn test_unlock_without_lockdown_mutates_nothing() {
        let platform = Arc::new(FakePlatform::new());
        five_channels(&platform);
        let (service, _) = service(platform.clone());

        let err = service
            .unlock(GUILD, Actor::Moderator(7), "oops")
            .await
            .unwrap_err();
        assert!(matches!(err, LockdownError::NoActiveLockdown));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_lockdown_is_a_noop() {
        let platform = Arc::new(FakePlatform::new());
        five_channels(&platform);
        let (service, _) = service(platform.clone());

        service.lockdown(raid()).await.unwrap();
        let calls_after_first = platform.calls().len();

        let outcome = service.lockdown(raid()).await.unwrap();
        assert!(matches!(outcome, LockdownOutcome::AlreadyLocked { .. }));
        assert_eq!(platform.calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn test_unreachable_platform_fails_whole_lockdown() {
        let platform = Arc::new(FakePlatform::new());
        five_channels(&platform);
        platform.set_unreachable(true);
        let (service, store) = service(platform.clone());

        let err = service.lockdown(raid()).await.unwrap_err();
        assert!(matches!(err, LockdownError::Unreachable(_)));
        assert!(store.snapshot(GUILD).is_empty());
    }

    #[tokio::test]
    async fn test_per_channel_failures_are_collected() {
        let platform = Arc::new(FakePlatform::new());
        five_channels(&platform);
        platform.fail_channel(12);
        let (service, _) = service(platform.clone());

        let LockdownOutcome::Locked(report) = service.lockdown(raid()).await.unwrap() else {
            panic!("expected a fresh lockdown");
        };
        assert_eq!(report.changed, 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].channel_id, 12);
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_entry_for_retry() {
        let platform = Arc::new(FakePlatform::new());
        let priors = five_channels(&platform);
        let (service, _) = service(platform.clone());
        service.lockdown(raid()).await.unwrap();

        platform.fail_channel(11);
        let first = service.unlock(GUILD, Actor::Bot, "over").await.unwrap();
        assert_eq!(first.restored, 4);
        assert_eq!(first.failures.len(), 1);
        assert!(service.status(GUILD).await.unwrap().locked_since.is_some());

        platform.heal_channel(11);
        let second = service.unlock(GUILD, Actor::Bot, "over").await.unwrap();
        assert_eq!(second.restored, 1);
        assert_eq!(platform.overwrite(11, EVERYONE), priors[1].1);
        assert!(service.status(GUILD).await.unwrap().locked_since.is_none());
    }

    #[tokio::test]
    async fn test_deleted_channel_is_skipped_on_unlock() {
        let platform = Arc::new(FakePlatform::new());
        five_channels(&platform);
        let (service, _) = service(platform.clone());
        service.lockdown(raid()).await.unwrap();

        platform.remove_channel(13);
        let report = service.unlock(GUILD, Actor::Bot, "over").await.unwrap();
        assert_eq!(report.restored, 4);
        assert_eq!(report.skipped_missing, 1);
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let platform = Arc::new(FakePlatform::new());
        let priors = five_channels(&platform);
        let (first, store) = service(platform.clone());
        first.lockdown(raid()).await.unwrap();
        assert!(store.snapshot(GUILD).lockdown.is_some());

        // A new service over the same store picks the lockdown back up.
        let policy = CallPolicy::default();
        let mod_log = Arc::new(ModLog::new(platform.clone(), None, policy));
        let second = LockdownService::new(platform.clone(), store.clone(), mod_log, policy);
        second.unlock(GUILD, Actor::Bot, "restart").await.unwrap();

        for (id, prior) in &priors {
            assert_eq!(platform.overwrite(*id, EVERYONE), *prior);
        }
    }

    #[tokio::test]
    async fn test_voice_channels_lose_connect_and_speak() {
        let platform = Arc::new(FakePlatform::new());
        platform.add_channel(20, ChannelKind::Voice, EVERYONE, None);
        platform.add_channel(21, ChannelKind::Category, EVERYONE, None);
        let (service, _) = service(platform.clone());

        service.lockdown(raid()).await.unwrap();
        let ow = platform.overwrite(20, EVERYONE).unwrap();
        assert_eq!(ow.deny, permission_bits::CONNECT | permission_bits::SPEAK);
        assert_eq!(platform.overwrite(21, EVERYONE), None);
    }

    #[tokio::test]
    async fn test_concurrent_lockdowns_take_one_snapshot() {
        let platform = Arc::new(FakePlatform::new());
        five_channels(&platform);
        let (service, _) = service(platform.clone());
        let service = Arc::new(service);

        let a = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.lockdown(raid()).await.unwrap() }
        });
        let b = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.lockdown(raid()).await.unwrap() }
        });
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let fresh = outcomes
            .iter()
            .filter(|o| matches!(o, LockdownOutcome::Locked(_)))
            .count();
        assert_eq!(fresh, 1);
    }

    #[tokio::test]
    async fn test_pause_and_resume_invites() {
        let platform = Arc::new(FakePlatform::new());
        let priors = five_channels(&platform);
        platform.add_invite("abc");
        platform.add_invite("def");
        let (service, _) = service(platform.clone());

        let report = service.pause_invites(raid()).await.unwrap();
        assert_eq!(report.invites_deleted, 2);
        assert!(platform.invites().is_empty());
        assert!(service.invites_paused(GUILD).await);
        let ow = platform.overwrite(10, EVERYONE).unwrap();
        assert_eq!(ow.deny, permission_bits::CREATE_INSTANT_INVITE);

        let err = service.pause_invites(raid()).await.unwrap_err();
        assert!(matches!(err, LockdownError::InvitesAlreadyPaused));

        platform.add_invite("ghi");
        assert!(service.enforce_invite_pause(GUILD, "ghi").await);
        assert!(platform.invites().is_empty());

        service
            .resume_invites(GUILD, Actor::Moderator(7), "calm")
            .await
            .unwrap();
        for (id, prior) in &priors {
            assert_eq!(platform.overwrite(*id, EVERYONE), *prior);
        }
        assert!(!service.enforce_invite_pause(GUILD, "new").await);
    }

    #[tokio::test]
    async fn test_resume_without_pause_fails() {
        let platform = Arc::new(FakePlatform::new());
        let (service, _) = service(platform);
        let err = service
            .resume_invites(GUILD, Actor::Bot, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, LockdownError::InvitesNotPaused));
    }

    #[tokio::test]
    async fn test_lockdown_and_invite_pause_overlap() {
        let platform = Arc::new(FakePlatform::new());
        let priors = five_channels(&platform);
        let (service, _) = service(platform.clone());

        service.lockdown(raid()).await.unwrap();
        service.pause_invites(raid()).await.unwrap();
        service.unlock(GUILD, Actor::Bot, "over").await.unwrap();

        let ow = platform.overwrite(10, EVERYONE).unwrap();
        assert_eq!(ow.deny, permission_bits::CREATE_INSTANT_INVITE);

        service.resume_invites(GUILD, Actor::Bot, "over").await.unwrap();
        // Same permissions; an emptied overwrite may stand in for a missing one.
        for (id, prior) in &priors {
            assert_eq!(
                platform.overwrite(*id, EVERYONE).unwrap_or_default(),
                prior.unwrap_or_default()
            );
        }
    }

    #[tokio::test]
    async fn test_lockdown_and_unlock_are_logged() {
        let platform = Arc::new(FakePlatform::new());
        five_channels(&platform);
        let (service, _) = service(platform.clone());

        service.lockdown(raid()).await.unwrap();
        service.unlock(GUILD, Actor::Bot, "over").await.unwrap();

        let kinds: Vec<NoticeKind> = platform
            .logs()
            .into_iter()
            .filter_map(|(_, entry)| match entry {
                ModLogEntry::Security(notice) => Some(notice.kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![NoticeKind::Lockdown, NoticeKind::Unlock]);
    }
}
