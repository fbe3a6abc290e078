// Anti-nuke monitor - watches bursts of destructive staff actions.
//
// Each staff member gets a sliding window of recent privileged actions. When
// the window fills up to the configured threshold the member is treated as a
// compromised account: their roles are stripped and the mod-log is alerted.
// Actions already taken are not undone.

use crate::core::config::{BotConfig, SecuritySettings};
use crate::core::moderation::{Actor, ModLog, ModLogEntry, NoticeKind, SecurityNotice};
use crate::core::platform::{CallPolicy, GuildPlatform, PlatformError};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivilegedActionKind {
    ChannelDelete,
    MemberBan,
    MemberKick,
    RoleDelete,
    WebhookDelete,
    /// Role permissions raised or roles handed out.
    PermissionEscalation,
}

impl fmt::Display for PrivilegedActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivilegedActionKind::ChannelDelete => write!(f, "channel delete"),
            PrivilegedActionKind::MemberBan => write!(f, "ban"),
            PrivilegedActionKind::MemberKick => write!(f, "kick"),
            PrivilegedActionKind::RoleDelete => write!(f, "role delete"),
            PrivilegedActionKind::WebhookDelete => write!(f, "webhook delete"),
            PrivilegedActionKind::PermissionEscalation => write!(f, "permission change"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaffActionEvent {
    pub guild_id: u64,
    pub actor_id: u64,
    pub actor_roles: Vec<u64>,
    pub actor_is_bot: bool,
    pub kind: PrivilegedActionKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NukeVerdict {
    Ok,
    Suspicious { reason: String, count: usize },
}

/// Recent privileged actions of one moderator, oldest first.
#[derive(Debug, Default, Clone)]
pub struct StaffActionWindow {
    entries: VecDeque<(DateTime<Utc>, PrivilegedActionKind)>,
}

impl StaffActionWindow {
    /// Drop everything older than `horizon` before `now`.
    pub fn decay(&mut self, now: DateTime<Utc>, horizon: Duration) {
        while let Some((at, _)) = self.entries.front() {
            if now - *at > horizon {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record(&mut self, at: DateTime<Utc>, kind: PrivilegedActionKind) {
        self.entries.push_back((at, kind));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// "3x ban, 2x channel delete"
    fn describe(&self) -> String {
        let mut counts: Vec<(PrivilegedActionKind, usize)> = Vec::new();
        for (_, kind) in &self.entries {
            match counts.iter_mut().find(|(k, _)| k == kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((*kind, 1)),
            }
        }
        counts
            .iter()
            .map(|(kind, n)| format!("{}x {}", n, kind))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub struct AntiNukeMonitor {
    windows: DashMap<(u64, u64), StaffActionWindow>,
    bot_user_id: u64,
}

impl AntiNukeMonitor {
    pub fn new(bot_user_id: u64) -> Self {
        Self {
            windows: DashMap::new(),
            bot_user_id,
        }
    }

    /// Record one privileged action and judge the actor's recent burst.
    ///
    /// Only staff are tracked. Bots and immune members are ignored. The window
    /// is cleared once it fires, so one burst raises one alert.
    pub fn observe(
        &self,
        config: &BotConfig,
        settings: &SecuritySettings,
        event: &StaffActionEvent,
    ) -> NukeVerdict {
        if !settings.anti_nuke_enabled
            || event.actor_is_bot
            || event.actor_id == self.bot_user_id
            || config.is_immune(&event.actor_roles)
            || !config.is_staff(&event.actor_roles)
        {
            return NukeVerdict::Ok;
        }

        let horizon = Duration::seconds(settings.anti_nuke_window_secs as i64);
        let mut window = self
            .windows
            .entry((event.guild_id, event.actor_id))
            .or_default();
        window.decay(event.at, horizon);
        window.record(event.at, event.kind);

        let count = window.len();
        if count < settings.anti_nuke_threshold as usize {
            return NukeVerdict::Ok;
        }

        let reason = format!(
            "{} privileged actions within {}s ({})",
            count,
            settings.anti_nuke_window_secs,
            window.describe()
        );
        *window = StaffActionWindow::default();

        tracing::warn!(
            guild_id = event.guild_id,
            actor_id = event.actor_id,
            count,
            "Anti-nuke triggered"
        );
        NukeVerdict::Suspicious { reason, count }
    }

    /// Forget windows with nothing inside `horizon`.
    pub fn prune(&self, now: DateTime<Utc>, horizon: Duration) {
        self.windows.retain(|_, window| {
            window.decay(now, horizon);
            !window.is_empty()
        });
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevocationReport {
    pub removed: Vec<u64>,
    pub failures: Vec<(u64, PlatformError)>,
}

/// Strips a flagged staff member's roles and alerts the mod-log.
pub struct AntiNukeResponder<P: GuildPlatform> {
    platform: Arc<P>,
    mod_log: Arc<ModLog<P>>,
    policy: CallPolicy,
}

impl<P: GuildPlatform> AntiNukeResponder<P> {
    pub fn new(platform: Arc<P>, mod_log: Arc<ModLog<P>>, policy: CallPolicy) -> Self {
        Self {
            platform,
            mod_log,
            policy,
        }
    }

    /// The alert is written even when revoking fails.
    pub async fn respond(&self, event: &StaffActionEvent, reason: &str) -> RevocationReport {
        let guild_id = event.guild_id;
        let user_id = event.actor_id;
        let platform = &self.platform;
        let audit_reason = "Anti-nuke: suspicious activity detected";
        let mut report = RevocationReport::default();

        // The @everyone role shares the guild's id and can't be removed.
        for &role_id in event.actor_roles.iter().filter(|r| **r != guild_id) {
            match self
                .policy
                .run(move || platform.remove_role(guild_id, user_id, role_id, audit_reason))
                .await
            {
                Ok(()) => report.removed.push(role_id),
                Err(e) => {
                    tracing::error!(guild_id, user_id, role_id, error = %e, "Failed to revoke role");
                    report.failures.push((role_id, e));
                }
            }
        }

        let mut notice = SecurityNotice::new(NoticeKind::AntiNuke, Actor::Bot, reason)
            .detail("Staff member", format!("<@{}> ({})", user_id, user_id))
            .detail("Roles removed", report.removed.len());
        if !report.failures.is_empty() {
            notice = notice.detail(
                "Could not remove",
                report
                    .failures
                    .iter()
                    .map(|(role, e)| format!("<@&{}>: {}", role, e))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        self.mod_log
            .write(guild_id, &ModLogEntry::Security(notice))
            .await;

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::bot_config::{ChannelIds, RoleIds};
    use crate::core::test_support::FakePlatform;

    const GUILD: u64 = 1;
    const STAFF: u64 = 20;
    const IMMUNE: u64 = 21;
    const BOT: u64 = 999;

    fn config() -> BotConfig {
        BotConfig {
            guild_id: GUILD,
            roles: RoleIds {
                staff: STAFF,
                immune: Some(IMMUNE),
            },
            channels: ChannelIds::default(),
        }
    }

    fn event(actor_id: u64, kind: PrivilegedActionKind, at: DateTime<Utc>) -> StaffActionEvent {
        StaffActionEvent {
            guild_id: GUILD,
            actor_id,
            actor_roles: vec![GUILD, STAFF],
            actor_is_bot: false,
            kind,
            at,
        }
    }

    #[test]
    fn test_fires_on_the_action_that_reaches_threshold() {
        let monitor = AntiNukeMonitor::new(BOT);
        let settings = SecuritySettings::default();
        let start = Utc::now();

        for i in 0..4 {
            let verdict = monitor.observe(
                &config(),
                &settings,
                &event(5, PrivilegedActionKind::ChannelDelete, start + Duration::seconds(i)),
            );
            assert_eq!(verdict, NukeVerdict::Ok, "action {}", i);
        }

        let verdict = monitor.observe(
            &config(),
            &settings,
            &event(5, PrivilegedActionKind::MemberBan, start + Duration::seconds(4)),
        );
        let NukeVerdict::Suspicious { count, reason } = verdict else {
            panic!("fifth action should be suspicious");
        };
        assert_eq!(count, 5);
        assert!(reason.contains("4x channel delete"));
        assert!(reason.contains("1x ban"));
    }

    #[test]
    fn test_actions_outside_window_decay() {
        let monitor = AntiNukeMonitor::new(BOT);
        let settings = SecuritySettings::default();
        let start = Utc::now();

        for i in 0..10 {
            let verdict = monitor.observe(
                &config(),
                &settings,
                &event(5, PrivilegedActionKind::MemberKick, start + Duration::seconds(i * 20)),
            );
            assert_eq!(verdict, NukeVerdict::Ok);
        }
    }

    #[test]
    fn test_window_resets_after_firing() {
        let monitor = AntiNukeMonitor::new(BOT);
        let settings = SecuritySettings {
            anti_nuke_threshold: 2,
            ..Default::default()
        };
        let now = Utc::now();
        let ban = |m: &AntiNukeMonitor| {
            m.observe(&config(), &settings, &event(5, PrivilegedActionKind::MemberBan, now))
        };

        assert_eq!(ban(&monitor), NukeVerdict::Ok);
        assert!(matches!(ban(&monitor), NukeVerdict::Suspicious { .. }));
        assert_eq!(ban(&monitor), NukeVerdict::Ok);
    }

    #[test]
    fn test_moderators_are_tracked_separately() {
        let monitor = AntiNukeMonitor::new(BOT);
        let settings = SecuritySettings {
            anti_nuke_threshold: 2,
            ..Default::default()
        };
        let now = Utc::now();

        let a = monitor.observe(&config(), &settings, &event(5, PrivilegedActionKind::RoleDelete, now));
        let b = monitor.observe(&config(), &settings, &event(6, PrivilegedActionKind::RoleDelete, now));
        assert_eq!((a, b), (NukeVerdict::Ok, NukeVerdict::Ok));
        assert_eq!(monitor.tracked(), 2);
    }

    #[test]
    fn test_ignored_actors() {
        let monitor = AntiNukeMonitor::new(BOT);
        let settings = SecuritySettings {
            anti_nuke_threshold: 1,
            ..Default::default()
        };
        let now = Utc::now();

        let mut immune = event(5, PrivilegedActionKind::MemberBan, now);
        immune.actor_roles.push(IMMUNE);
        let mut bot = event(6, PrivilegedActionKind::MemberBan, now);
        bot.actor_is_bot = true;
        let ourselves = event(BOT, PrivilegedActionKind::MemberBan, now);
        let mut not_staff = event(7, PrivilegedActionKind::MemberBan, now);
        not_staff.actor_roles = vec![GUILD];

        for e in [immune, bot, ourselves, not_staff] {
            assert_eq!(monitor.observe(&config(), &settings, &e), NukeVerdict::Ok);
        }

        let disabled = SecuritySettings {
            anti_nuke_enabled: false,
            anti_nuke_threshold: 1,
            ..Default::default()
        };
        assert_eq!(
            monitor.observe(&config(), &disabled, &event(5, PrivilegedActionKind::MemberBan, now)),
            NukeVerdict::Ok
        );
    }

    #[test]
    fn test_prune_drops_stale_windows() {
        let monitor = AntiNukeMonitor::new(BOT);
        let settings = SecuritySettings::default();
        let then = Utc::now() - Duration::minutes(10);
        monitor.observe(&config(), &settings, &event(5, PrivilegedActionKind::MemberKick, then));
        assert_eq!(monitor.tracked(), 1);

        monitor.prune(Utc::now(), Duration::seconds(60));
        assert_eq!(monitor.tracked(), 0);
    }

    #[tokio::test]
    async fn test_responder_strips_roles_and_logs() {
        let platform = Arc::new(FakePlatform::new());
        platform.add_member(5, vec![GUILD, STAFF, 30], false);
        let policy = CallPolicy::default();
        let mod_log = Arc::new(ModLog::new(platform.clone(), Some(500), policy));
        let responder = AntiNukeResponder::new(platform.clone(), mod_log, policy);

        let mut e = event(5, PrivilegedActionKind::ChannelDelete, Utc::now());
        e.actor_roles = vec![GUILD, STAFF, 30];
        let report = responder.respond(&e, "burst").await;

        assert_eq!(report.removed, vec![STAFF, 30]);
        assert_eq!(platform.member_roles(5), vec![GUILD]);
        assert_eq!(platform.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_responder_logs_even_when_revoke_fails() {
        let platform = Arc::new(FakePlatform::new());
        platform.add_member(5, vec![STAFF], false);
        platform.forbid_user(5);
        let policy = CallPolicy::default();
        let mod_log = Arc::new(ModLog::new(platform.clone(), Some(500), policy));
        let responder = AntiNukeResponder::new(platform.clone(), mod_log, policy);

        let report = responder
            .respond(&event(5, PrivilegedActionKind::MemberBan, Utc::now()), "burst")
            .await;

        assert!(report.removed.is_empty());
        assert_eq!(report.failures.len(), 1);
        let logs = platform.logs();
        assert_eq!(logs.len(), 1);
        let ModLogEntry::Security(notice) = &logs[0].1 else {
            panic!("expected a security notice");
        };
        assert_eq!(notice.kind, NoticeKind::AntiNuke);
        assert!(notice.details.iter().any(|(name, _)| name == "Could not remove"));
    }
}
