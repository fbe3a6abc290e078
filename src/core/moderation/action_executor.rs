// Action executor - the single place moderation actions hit the platform.
//
// Every action goes through `execute`: validate, perform the platform call
// under the call policy, assign the next case id, record the warning if any,
// and write the audit entry to the mod-log.

use super::mod_log::ModLog;
use super::moderation_models::{
    ActionRecord, Actor, ModAction, ModLogEntry, WarningStatus, MAX_TIMEOUT,
};
use super::warnings::{NewWarning, WarningStore, WarningStoreError};
use crate::core::platform::{CallPolicy, GuildPlatform, PlatformError};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("I don't have permission to do that ({0})")]
    Forbidden(String),

    #[error("Target not found ({0})")]
    NotFound(String),

    #[error("Discord is rate limiting me, try again shortly")]
    RateLimited,

    #[error("Discord did not answer within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Invalid(String),

    #[error("Discord is unavailable ({0})")]
    Unavailable(String),

    #[error("Warnings data could not be reached: {0}")]
    Persistence(#[from] WarningStoreError),
}

impl From<PlatformError> for ActionError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Forbidden(what) => ActionError::Forbidden(what),
            PlatformError::NotFound(what) => ActionError::NotFound(what),
            PlatformError::RateLimited { .. } => ActionError::RateLimited,
            PlatformError::Timeout(after) => ActionError::Timeout(after),
            PlatformError::Unavailable(why) => ActionError::Unavailable(why),
        }
    }
}

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub guild_id: u64,
    pub actor: Actor,
    pub action: ModAction,
    pub evidence: Option<String>,
}

impl ActionRequest {
    pub fn new(guild_id: u64, actor: Actor, action: ModAction) -> Self {
        Self {
            guild_id,
            actor,
            action,
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

// ============================================================================
// CASE IDS
// ============================================================================

/// Guild-scoped case counter. Lives in memory only, so numbering restarts at
/// 1 after a process restart.
#[derive(Default)]
pub struct CaseCounter {
    counters: DashMap<u64, u64>,
}

impl CaseCounter {
    pub fn next(&self, guild_id: u64) -> u64 {
        // The entry guard holds the shard lock, so concurrent callers for the
        // same guild are serialized.
        let mut counter = self.counters.entry(guild_id).or_insert(0);
        *counter += 1;
        *counter
    }
}

// ============================================================================
// EXECUTOR
// ============================================================================

struct Outcome {
    affected: Option<u64>,
    warning: Option<WarningStatus>,
}

impl Outcome {
    fn plain() -> Self {
        Self {
            affected: None,
            warning: None,
        }
    }
}

pub struct ActionExecutor<P: GuildPlatform> {
    platform: Arc<P>,
    warnings: Arc<dyn WarningStore>,
    mod_log: Arc<ModLog<P>>,
    cases: CaseCounter,
    policy: CallPolicy,
    bot_user_id: u64,
}

impl<P: GuildPlatform> ActionExecutor<P> {
    pub fn new(
        platform: Arc<P>,
        warnings: Arc<dyn WarningStore>,
        mod_log: Arc<ModLog<P>>,
        policy: CallPolicy,
        bot_user_id: u64,
    ) -> Self {
        Self {
            platform,
            warnings,
            mod_log,
            cases: CaseCounter::default(),
            policy,
            bot_user_id,
        }
    }

    pub fn warnings(&self) -> &Arc<dyn WarningStore> {
        &self.warnings
    }

    /// Perform one action and return its audit record.
    ///
    /// A case id is only consumed when the platform call succeeds.
    pub async fn execute(&self, request: ActionRequest) -> Result<ActionRecord, ActionError> {
        let ActionRequest {
            guild_id,
            actor,
            action,
            evidence,
        } = request;

        action.validate().map_err(ActionError::Invalid)?;
        if let Some(target) = action.target().user_id() {
            ensure_not_self(actor, self.bot_user_id, target)?;
        }

        let moderator_id = match actor {
            Actor::Bot => self.bot_user_id,
            Actor::Moderator(id) => id,
        };

        let outcome = match self.perform(guild_id, moderator_id, &action).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    guild_id,
                    kind = %action.kind(),
                    error = %e,
                    "Moderation action failed"
                );
                return Err(e);
            }
        };

        let record = ActionRecord {
            case_id: self.cases.next(guild_id),
            guild_id,
            kind: action.kind(),
            target: action.target(),
            moderator_id,
            automated: actor == Actor::Bot,
            reason: action.reason().to_string(),
            duration: action.duration(),
            evidence,
            affected: outcome.affected,
            warning: outcome.warning,
            timestamp: Utc::now(),
        };

        tracing::info!(
            guild_id,
            case_id = record.case_id,
            kind = %record.kind,
            moderator_id,
            "Moderation action executed"
        );

        self.mod_log
            .write(guild_id, &ModLogEntry::Action(record.clone()))
            .await;

        Ok(record)
    }

    /// Run a planned response in order. Each action reports its own result.
    pub async fn execute_all(
        &self,
        guild_id: u64,
        actor: Actor,
        actions: Vec<ModAction>,
        evidence: Option<String>,
    ) -> Vec<Result<ActionRecord, ActionError>> {
        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            let mut request = ActionRequest::new(guild_id, actor, action);
            request.evidence = evidence.clone();
            results.push(self.execute(request).await);
        }
        results
    }

    async fn perform(
        &self,
        guild_id: u64,
        moderator_id: u64,
        action: &ModAction,
    ) -> Result<Outcome, ActionError> {
        let platform = &self.platform;

        match action {
            ModAction::Warn { user_id, reason } => {
                let warning = NewWarning {
                    user_id: *user_id,
                    moderator_id,
                    reason: reason.clone(),
                    created_at: Utc::now(),
                };
                let status = match self.warnings.insert(warning).await {
                    Ok(saved) => WarningStatus::Saved { id: saved.id },
                    Err(e) => {
                        tracing::error!(guild_id, user_id, error = %e, "Warning was not saved");
                        WarningStatus::Unsaved {
                            reason: e.to_string(),
                        }
                    }
                };
                Ok(Outcome {
                    affected: None,
                    warning: Some(status),
                })
            }
            ModAction::Kick { user_id, reason } => {
                let (user_id, reason) = (*user_id, reason.as_str());
                self.policy
                    .run(move || platform.kick_member(guild_id, user_id, reason))
                    .await?;
                Ok(Outcome::plain())
            }
            ModAction::Ban { user_id, reason } => {
                let (user_id, reason) = (*user_id, reason.as_str());
                self.policy
                    .run(move || platform.ban_member(guild_id, user_id, reason))
                    .await?;
                Ok(Outcome::plain())
            }
            ModAction::Unban { user_id, reason } => {
                let (user_id, reason) = (*user_id, reason.as_str());
                self.policy
                    .run(move || platform.unban_member(guild_id, user_id, reason))
                    .await?;
                Ok(Outcome::plain())
            }
            ModAction::Timeout {
                user_id,
                duration,
                reason,
            } => {
                let (user_id, reason) = (*user_id, reason.as_str());
                let span = chrono::Duration::from_std(*duration)
                    .map_err(|e| ActionError::Invalid(e.to_string()))?;
                let until = Utc::now() + span;
                self.policy
                    .run(move || platform.timeout_member(guild_id, user_id, until, reason))
                    .await?;
                Ok(Outcome::plain())
            }
            ModAction::Purge {
                channel_id, limit, ..
            } => {
                let (channel_id, limit) = (*channel_id, *limit);
                let removed = self
                    .policy
                    .run(move || platform.purge_messages(guild_id, channel_id, limit))
                    .await?;
                Ok(Outcome {
                    affected: Some(removed as u64),
                    warning: None,
                })
            }
            ModAction::DeleteMessage {
                channel_id,
                message_id,
                reason,
                ..
            } => {
                let (channel_id, message_id, reason) = (*channel_id, *message_id, reason.as_str());
                self.policy
                    .run(move || platform.delete_message(guild_id, channel_id, message_id, reason))
                    .await?;
                Ok(Outcome::plain())
            }
            ModAction::PermissionEdit {
                channel_id,
                role_id,
                overwrite,
                reason,
            } => {
                let (channel_id, role_id, overwrite, reason) =
                    (*channel_id, *role_id, *overwrite, reason.as_str());
                self.policy
                    .run(move || {
                        platform.set_channel_overwrite(guild_id, channel_id, role_id, overwrite, reason)
                    })
                    .await?;
                Ok(Outcome::plain())
            }
            ModAction::AddRole {
                user_id,
                role_id,
                reason,
            } => {
                let (user_id, role_id, reason) = (*user_id, *role_id, reason.as_str());
                self.policy
                    .run(move || platform.add_role(guild_id, user_id, role_id, reason))
                    .await?;
                Ok(Outcome::plain())
            }
            ModAction::RemoveRole {
                user_id,
                role_id,
                reason,
            } => {
                let (user_id, role_id, reason) = (*user_id, *role_id, reason.as_str());
                self.policy
                    .run(move || platform.remove_role(guild_id, user_id, role_id, reason))
                    .await?;
                Ok(Outcome::plain())
            }
            ModAction::ClearWarnings { user_id, .. } => {
                let removed = self.warnings.delete_all(*user_id).await?;
                Ok(Outcome {
                    affected: Some(removed),
                    warning: None,
                })
            }
        }
    }
}

// ============================================================================
// PURE CHECKS
// ============================================================================

/// Where a member sits in the role hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRank {
    pub user_id: u64,
    /// Position of the member's highest role; 0 for @everyone only.
    pub top_role_position: u16,
}

/// Nobody acts on themselves, and only the owner acts on equal or higher roles.
pub fn check_hierarchy(
    invoker: MemberRank,
    target: MemberRank,
    owner_id: u64,
) -> Result<(), ActionError> {
    if invoker.user_id == target.user_id {
        return Err(ActionError::Invalid(
            "You cannot use this command on yourself.".to_string(),
        ));
    }
    if target.user_id == owner_id {
        return Err(ActionError::Forbidden(
            "the server owner cannot be moderated".to_string(),
        ));
    }
    if invoker.user_id == owner_id {
        return Ok(());
    }
    if target.top_role_position >= invoker.top_role_position {
        return Err(ActionError::Forbidden(
            "target has an equal or higher role".to_string(),
        ));
    }
    Ok(())
}

/// Refuse actions aimed at the bot or at the moderator running them.
pub fn ensure_not_self(actor: Actor, bot_user_id: u64, target: u64) -> Result<(), ActionError> {
    if target == bot_user_id {
        return Err(ActionError::Invalid(
            "I can't take moderation action against myself.".to_string(),
        ));
    }
    if actor == Actor::Moderator(target) {
        return Err(ActionError::Invalid(
            "You cannot use this command on yourself.".to_string(),
        ));
    }
    Ok(())
}

/// Parse `45s`, `30m`, `1h`, `2d`, `1w`. A bare number is minutes.
pub fn parse_duration(input: &str) -> Result<Duration, ActionError> {
    let raw = input.trim().to_lowercase();
    let invalid = || {
        ActionError::Invalid(format!(
            "Invalid duration `{}`. Use formats like 30s, 10m, 1h, 2d, 1w.",
            input.trim()
        ))
    };

    let (number, unit_secs) = match raw.chars().last() {
        Some(c) if c.is_ascii_digit() => (raw.as_str(), 60),
        Some('s') => (&raw[..raw.len() - 1], 1),
        Some('m') => (&raw[..raw.len() - 1], 60),
        Some('h') => (&raw[..raw.len() - 1], 60 * 60),
        Some('d') => (&raw[..raw.len() - 1], 24 * 60 * 60),
        Some('w') => (&raw[..raw.len() - 1], 7 * 24 * 60 * 60),
        _ => return Err(invalid()),
    };

    let amount: u64 = number.trim().parse().map_err(|_| invalid())?;
    let secs = amount.checked_mul(unit_secs).ok_or_else(invalid)?;
    let duration = Duration::from_secs(secs);

    if duration.is_zero() {
        return Err(ActionError::Invalid(
            "Duration must be greater than zero.".to_string(),
        ));
    }
    if duration > MAX_TIMEOUT {
        return Err(ActionError::Invalid(
            "Duration cannot exceed 28 days.".to_string(),
        ));
    }
    Ok(duration)
}
