// Moderation domain models - actions, audit records and mod-log entries.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer turns records into embeds and actions into API calls.

use crate::core::platform::PermissionOverwrite;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest timeout the platform accepts.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(28 * 24 * 60 * 60);

pub const MIN_PURGE: u8 = 1;
pub const MAX_PURGE: u8 = 100;

/// Who asked for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    /// Automated response from a classifier or the anti-nuke monitor.
    Bot,
    /// A moderator running a command.
    Moderator(u64),
}

/// Every action the executor knows how to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum ModAction {
    Warn {
        user_id: u64,
        reason: String,
    },
    Kick {
        user_id: u64,
        reason: String,
    },
    Ban {
        user_id: u64,
        reason: String,
    },
    Unban {
        user_id: u64,
        reason: String,
    },
    Timeout {
        user_id: u64,
        duration: Duration,
        reason: String,
    },
    Purge {
        channel_id: u64,
        limit: u8,
        reason: String,
    },
    DeleteMessage {
        channel_id: u64,
        message_id: u64,
        author_id: u64,
        reason: String,
    },
    /// `None` removes the role's overwrite.
    PermissionEdit {
        channel_id: u64,
        role_id: u64,
        overwrite: Option<PermissionOverwrite>,
        reason: String,
    },
    AddRole {
        user_id: u64,
        role_id: u64,
        reason: String,
    },
    RemoveRole {
        user_id: u64,
        role_id: u64,
        reason: String,
    },
    ClearWarnings {
        user_id: u64,
        reason: String,
    },
}

impl ModAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            ModAction::Warn { .. } => ActionKind::Warn,
            ModAction::Kick { .. } => ActionKind::Kick,
            ModAction::Ban { .. } => ActionKind::Ban,
            ModAction::Unban { .. } => ActionKind::Unban,
            ModAction::Timeout { .. } => ActionKind::Timeout,
            ModAction::Purge { .. } => ActionKind::Purge,
            ModAction::DeleteMessage { .. } => ActionKind::DeleteMessage,
            ModAction::PermissionEdit { .. } => ActionKind::PermissionEdit,
            ModAction::AddRole { .. } => ActionKind::AddRole,
            ModAction::RemoveRole { .. } => ActionKind::RemoveRole,
            ModAction::ClearWarnings { .. } => ActionKind::ClearWarnings,
        }
    }

    pub fn target(&self) -> ActionTarget {
        match self {
            ModAction::Warn { user_id, .. }
            | ModAction::Kick { user_id, .. }
            | ModAction::Ban { user_id, .. }
            | ModAction::Unban { user_id, .. }
            | ModAction::Timeout { user_id, .. }
            | ModAction::AddRole { user_id, .. }
            | ModAction::RemoveRole { user_id, .. }
            | ModAction::ClearWarnings { user_id, .. } => ActionTarget::User(*user_id),
            ModAction::DeleteMessage { author_id, .. } => ActionTarget::User(*author_id),
            ModAction::Purge { channel_id, .. } | ModAction::PermissionEdit { channel_id, .. } => {
                ActionTarget::Channel(*channel_id)
            }
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            ModAction::Warn { reason, .. }
            | ModAction::Kick { reason, .. }
            | ModAction::Ban { reason, .. }
            | ModAction::Unban { reason, .. }
            | ModAction::Timeout { reason, .. }
            | ModAction::Purge { reason, .. }
            | ModAction::DeleteMessage { reason, .. }
            | ModAction::PermissionEdit { reason, .. }
            | ModAction::AddRole { reason, .. }
            | ModAction::RemoveRole { reason, .. }
            | ModAction::ClearWarnings { reason, .. } => reason,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            ModAction::Timeout { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    /// Checks that need no platform round trip.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ModAction::Timeout { duration, .. } => {
                if duration.is_zero() {
                    Err("timeout duration must be greater than zero".to_string())
                } else if *duration > MAX_TIMEOUT {
                    Err("timeout duration cannot exceed 28 days".to_string())
                } else {
                    Ok(())
                }
            }
            ModAction::Purge { limit, .. } => {
                if (MIN_PURGE..=MAX_PURGE).contains(limit) {
                    Ok(())
                } else {
                    Err(format!(
                        "purge amount must be between {} and {}",
                        MIN_PURGE, MAX_PURGE
                    ))
                }
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Warn,
    Kick,
    Ban,
    Unban,
    Timeout,
    Purge,
    DeleteMessage,
    PermissionEdit,
    AddRole,
    RemoveRole,
    ClearWarnings,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Warn => "Warn",
            ActionKind::Kick => "Kick",
            ActionKind::Ban => "Ban",
            ActionKind::Unban => "Unban",
            ActionKind::Timeout => "Timeout",
            ActionKind::Purge => "Purge",
            ActionKind::DeleteMessage => "Delete Message",
            ActionKind::PermissionEdit => "Permission Edit",
            ActionKind::AddRole => "Add Role",
            ActionKind::RemoveRole => "Remove Role",
            ActionKind::ClearWarnings => "Clear Warnings",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionTarget {
    User(u64),
    Channel(u64),
}

impl ActionTarget {
    pub fn user_id(&self) -> Option<u64> {
        match self {
            ActionTarget::User(id) => Some(*id),
            ActionTarget::Channel(_) => None,
        }
    }
}

/// Whether a warn made it into the warnings store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningStatus {
    Saved { id: i64 },
    Unsaved { reason: String },
}

/// Audit entry for one executed action. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Strictly increasing per guild.
    pub case_id: u64,
    pub guild_id: u64,
    pub kind: ActionKind,
    pub target: ActionTarget,
    pub moderator_id: u64,
    pub automated: bool,
    pub reason: String,
    pub duration: Option<Duration>,
    /// What the classifier matched, for automated actions.
    pub evidence: Option<String>,
    /// Messages removed by a purge, warnings removed by a clear.
    pub affected: Option<u64>,
    pub warning: Option<WarningStatus>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// MOD-LOG ENTRIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    Lockdown,
    Unlock,
    Silence,
    Unsilence,
    InvitesPaused,
    InvitesResumed,
    AntiNuke,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NoticeKind::Lockdown => "Server Lockdown",
            NoticeKind::Unlock => "Lockdown Lifted",
            NoticeKind::Silence => "Server Silenced",
            NoticeKind::Unsilence => "Silence Lifted",
            NoticeKind::InvitesPaused => "Invites Paused",
            NoticeKind::InvitesResumed => "Invites Resumed",
            NoticeKind::AntiNuke => "Anti-Nuke Triggered",
        };
        write!(f, "{}", label)
    }
}

/// Server-wide security event that is not tied to a single case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityNotice {
    pub kind: NoticeKind,
    pub actor: Actor,
    pub reason: String,
    /// Extra name/value lines shown under the notice.
    pub details: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityNotice {
    pub fn new(kind: NoticeKind, actor: Actor, reason: impl Into<String>) -> Self {
        Self {
            kind,
            actor,
            reason: reason.into(),
            details: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn detail(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.details.push((name.into(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModLogEntry {
    Action(ActionRecord),
    Security(SecurityNotice),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_bounds() {
        let ok = ModAction::Timeout {
            user_id: 1,
            duration: MAX_TIMEOUT,
            reason: "r".into(),
        };
        assert!(ok.validate().is_ok());

        let too_long = ModAction::Timeout {
            user_id: 1,
            duration: MAX_TIMEOUT + Duration::from_secs(1),
            reason: "r".into(),
        };
        assert!(too_long.validate().is_err());

        let zero = ModAction::Timeout {
            user_id: 1,
            duration: Duration::ZERO,
            reason: "r".into(),
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_purge_bounds() {
        for (limit, valid) in [(0u8, false), (1, true), (100, true), (101, false)] {
            let action = ModAction::Purge {
                channel_id: 5,
                limit,
                reason: "r".into(),
            };
            assert_eq!(action.validate().is_ok(), valid, "limit {}", limit);
        }
    }

    #[test]
    fn test_delete_message_targets_author() {
        let action = ModAction::DeleteMessage {
            channel_id: 10,
            message_id: 11,
            author_id: 12,
            reason: "spam".into(),
        };
        assert_eq!(action.target(), ActionTarget::User(12));
        assert_eq!(action.kind(), ActionKind::DeleteMessage);
        assert_eq!(action.reason(), "spam");
    }
}
