use super::lockdown_service::LockdownError;
use crate::core::config::BotConfig;
use crate::core::moderation::{Actor, ModLog, ModLogEntry, NoticeKind, SecurityNotice};
use crate::core::platform::{CallPolicy, GuildPlatform, PlatformError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

#[derive(Debug, Clone)]
pub struct SilenceRequest {
    pub guild_id: u64,
    pub actor: Actor,
    pub reason: String,
    /// Zero keeps the silence until `unsilence`.
    pub duration: Duration,
    pub mute_role: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SilenceReport {
    pub muted: usize,
    /// Bots, staff, immune members and members who already had the role.
    pub skipped: usize,
    pub failures: Vec<(u64, PlatformError)>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnsilenceReport {
    pub unmuted: usize,
    /// Members who left while silenced.
    pub gone: usize,
    pub failures: Vec<(u64, PlatformError)>,
}

struct ActiveSilence {
    id: u64,
    role_id: u64,
    /// Only the members this silence muted get unmuted.
    muted: Vec<u64>,
    timer: Option<AbortHandle>,
}

/// Mutes every regular member with the configured mute role.
pub struct SilenceService<P: GuildPlatform> {
    platform: Arc<P>,
    config: Arc<BotConfig>,
    mod_log: Arc<ModLog<P>>,
    policy: CallPolicy,
    guilds: DashMap<u64, Arc<Mutex<Option<ActiveSilence>>>>,
    next_id: AtomicU64,
}

impl<P: GuildPlatform + 'static> SilenceService<P> {
    pub fn new(
        platform: Arc<P>,
        config: Arc<BotConfig>,
        mod_log: Arc<ModLog<P>>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            platform,
            config,
            mod_log,
            policy,
            guilds: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn guild(&self, guild_id: u64) -> Arc<Mutex<Option<ActiveSilence>>> {
        Arc::clone(self.guilds.entry(guild_id).or_default().value())
    }

    pub async fn is_silenced(&self, guild_id: u64) -> bool {
        let guild = self.guild(guild_id);
        let state = guild.lock().await;
        state.is_some()
    }

    pub async fn silence(
        self: &Arc<Self>,
        request: SilenceRequest,
    ) -> Result<SilenceReport, LockdownError> {
        let guild_id = request.guild_id;
        let role_id = request
            .mute_role
            .ok_or(LockdownError::MuteRoleNotConfigured)?;

        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;
        if state.is_some() {
            return Err(LockdownError::AlreadySilenced);
        }

        let platform = &self.platform;
        let members = self
            .policy
            .run(move || platform.list_members(guild_id))
            .await
            .map_err(LockdownError::Unreachable)?;

        let mut report = SilenceReport::default();
        let mut muted = Vec::new();
        let reason = request.reason.as_str();

        for member in members {
            if member.bot
                || self.config.is_staff(&member.roles)
                || self.config.is_immune(&member.roles)
                || member.roles.contains(&role_id)
            {
                report.skipped += 1;
                continue;
            }

            let user_id = member.user_id;
            match self
                .policy
                .run(move || platform.add_role(guild_id, user_id, role_id, reason))
                .await
            {
                Ok(()) => muted.push(user_id),
                Err(e) => {
                    tracing::warn!(guild_id, user_id, error = %e, "Failed to mute member");
                    report.failures.push((user_id, e));
                }
            }
        }
        report.muted = muted.len();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timer = if request.duration.is_zero() {
            None
        } else {
            report.until = chrono::Duration::from_std(request.duration)
                .ok()
                .map(|d| Utc::now() + d);
            let this = Arc::clone(self);
            let duration = request.duration;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                this.expire(guild_id, id).await;
            });
            Some(handle.abort_handle())
        };

        *state = Some(ActiveSilence {
            id,
            role_id,
            muted,
            timer,
        });
        drop(state);

        tracing::warn!(guild_id, muted = report.muted, "Server silenced");

        let mut notice = SecurityNotice::new(NoticeKind::Silence, request.actor, &request.reason)
            .detail("Members muted", report.muted)
            .detail("Skipped", report.skipped);
        if let Some(until) = report.until {
            notice = notice.detail("Until", until.format("%Y-%m-%d %H:%M UTC"));
        }
        self.mod_log
            .write(guild_id, &ModLogEntry::Security(notice))
            .await;

        Ok(report)
    }

    /// Manual override. Cancels the pending timer.
    pub async fn unsilence(
        &self,
        guild_id: u64,
        actor: Actor,
        reason: &str,
    ) -> Result<UnsilenceReport, LockdownError> {
        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;
        let active = state.take().ok_or(LockdownError::NotSilenced)?;
        if let Some(timer) = &active.timer {
            timer.abort();
        }

        let report = self.lift(guild_id, &active, reason).await;
        drop(state);

        self.log_lift(guild_id, actor, reason, &report).await;
        Ok(report)
    }

    async fn expire(&self, guild_id: u64, id: u64) {
        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;
        // A newer silence replaced the one this timer belonged to.
        if state.as_ref().map(|a| a.id) != Some(id) {
            return;
        }
        let Some(active) = state.take() else {
            return;
        };

        let reason = "Silence duration expired";
        let report = self.lift(guild_id, &active, reason).await;
        drop(state);

        self.log_lift(guild_id, Actor::Bot, reason, &report).await;
    }

    async fn lift(&self, guild_id: u64, active: &ActiveSilence, reason: &str) -> UnsilenceReport {
        let platform = &self.platform;
        let role_id = active.role_id;
        let mut report = UnsilenceReport::default();

        for &user_id in &active.muted {
            match self
                .policy
                .run(move || platform.remove_role(guild_id, user_id, role_id, reason))
                .await
            {
                Ok(()) => report.unmuted += 1,
                Err(PlatformError::NotFound(_)) => report.gone += 1,
                Err(e) => {
                    tracing::warn!(guild_id, user_id, error = %e, "Failed to unmute member");
                    report.failures.push((user_id, e));
                }
            }
        }
        report
    }

    async fn log_lift(&self, guild_id: u64, actor: Actor, reason: &str, report: &UnsilenceReport) {
        tracing::info!(guild_id, unmuted = report.unmuted, "Silence lifted");
        let notice = SecurityNotice::new(NoticeKind::Unsilence, actor, reason)
            .detail("Members unmuted", report.unmuted)
            .detail("Failures", report.failures.len());
        self.mod_log
            .write(guild_id, &ModLogEntry::Security(notice))
            .await;
    }
}
