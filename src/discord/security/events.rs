// Gateway event translation - serenity events become core events, and the
// core services decide what happens.

use crate::core::anti_nuke::{NukeVerdict, PrivilegedActionKind, StaffActionEvent};
use crate::core::lockdown::{LockdownOutcome, OverlayRequest};
use crate::core::moderation::Actor;
use crate::core::security::{MemberJoinEvent, MessageEvent};
use crate::discord::{Data, Error};
use ::serenity::model::guild::audit_log::{
    Action, AuditLogEntry, ChannelAction, MemberAction, RoleAction, WebhookAction,
};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

fn to_utc(ts: serenity::Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

pub async fn handle_message(data: &Data, message: &serenity::Message) -> Result<(), Error> {
    let Some(guild_id) = message.guild_id else {
        return Ok(());
    };
    if message.author.bot {
        return Ok(());
    }

    let event = MessageEvent {
        guild_id: guild_id.get(),
        channel_id: message.channel_id.get(),
        message_id: message.id.get(),
        author_id: message.author.id.get(),
        author_is_bot: message.author.bot,
        author_roles: message
            .member
            .as_ref()
            .map(|m| m.roles.iter().map(|r| r.get()).collect())
            .unwrap_or_default(),
        content: message.content.clone(),
        mentioned_user_ids: message.mentions.iter().map(|u| u.id.get()).collect(),
        mentioned_role_ids: message.mention_roles.iter().map(|r| r.get()).collect(),
    };

    let outcome = data.security.on_message(&event).await;
    if !outcome.verdict.is_clean() {
        tracing::info!(
            guild_id = event.guild_id,
            channel_id = event.channel_id,
            user_id = event.author_id,
            "Removed message flagged by security filters"
        );
    }
    Ok(())
}

pub async fn handle_member_join(data: &Data, member: &serenity::Member) -> Result<(), Error> {
    let event = MemberJoinEvent {
        guild_id: member.guild_id.get(),
        user_id: member.user.id.get(),
        is_bot: member.user.bot,
        roles: member.roles.iter().map(|r| r.get()).collect(),
        account_created_at: to_utc(member.user.created_at()),
        has_avatar: member.user.avatar.is_some(),
        joined_at: member.joined_at.map(to_utc).unwrap_or_else(Utc::now),
    };

    let outcome = data.security.on_member_join(&event).await;
    if outcome.plan.underage.is_some() {
        tracing::info!(
            guild_id = event.guild_id,
            user_id = event.user_id,
            "Removed underage account on join"
        );
    }
    Ok(())
}

fn privileged_kind(action: &Action) -> Option<PrivilegedActionKind> {
    match action {
        Action::Channel(ChannelAction::Delete) => Some(PrivilegedActionKind::ChannelDelete),
        Action::Member(MemberAction::BanAdd) => Some(PrivilegedActionKind::MemberBan),
        Action::Member(MemberAction::Kick) => Some(PrivilegedActionKind::MemberKick),
        Action::Role(RoleAction::Delete) => Some(PrivilegedActionKind::RoleDelete),
        Action::Webhook(WebhookAction::Delete) => Some(PrivilegedActionKind::WebhookDelete),
        Action::Role(RoleAction::Update) | Action::Member(MemberAction::RoleUpdate) => {
            Some(PrivilegedActionKind::PermissionEscalation)
        }
        _ => None,
    }
}

/// Feeds audit-log entries to the anti-nuke monitor and responds to a burst.
pub async fn handle_audit_log_entry(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: serenity::GuildId,
    entry: &AuditLogEntry,
) -> Result<(), Error> {
    let Some(kind) = privileged_kind(&entry.action) else {
        return Ok(());
    };

    // Non-members (already gone, or webhooks acting on their own) can't be tracked.
    let member = match guild_id.member(ctx, entry.user_id).await {
        Ok(member) => member,
        Err(e) => {
            tracing::debug!(guild_id = guild_id.get(), user_id = entry.user_id.get(), error = %e, "Audit actor not found");
            return Ok(());
        }
    };

    let event = StaffActionEvent {
        guild_id: guild_id.get(),
        actor_id: member.user.id.get(),
        actor_roles: member.roles.iter().map(|r| r.get()).collect(),
        actor_is_bot: member.user.bot,
        kind,
        at: Utc::now(),
    };

    let settings = data.settings.current(event.guild_id).await;
    let NukeVerdict::Suspicious { reason, .. } =
        data.anti_nuke.observe(&data.config, &settings, &event)
    else {
        return Ok(());
    };

    let report = data.anti_nuke_responder.respond(&event, &reason).await;
    tracing::warn!(
        guild_id = event.guild_id,
        actor_id = event.actor_id,
        removed = report.removed.len(),
        failed = report.failures.len(),
        "Anti-nuke response finished"
    );

    if settings.anti_nuke_auto_lockdown {
        let request = OverlayRequest::new(
            event.guild_id,
            Actor::Bot,
            format!("Anti-nuke: {}", reason),
        );
        match data.lockdown.lockdown(request).await {
            Ok(LockdownOutcome::Locked(report)) => tracing::warn!(
                guild_id = event.guild_id,
                changed = report.changed,
                "Automatic lockdown applied"
            ),
            Ok(LockdownOutcome::AlreadyLocked { .. }) => {}
            Err(e) => tracing::error!(guild_id = event.guild_id, error = %e, "Automatic lockdown failed"),
        }
    }
    Ok(())
}

pub async fn handle_invite_create(
    data: &Data,
    invite: &serenity::InviteCreateEvent,
) -> Result<(), Error> {
    let Some(guild_id) = invite.guild_id else {
        return Ok(());
    };
    data.lockdown
        .enforce_invite_pause(guild_id.get(), &invite.code)
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_audit_actions_are_mapped() {
        assert_eq!(
            privileged_kind(&Action::Channel(ChannelAction::Delete)),
            Some(PrivilegedActionKind::ChannelDelete)
        );
        assert_eq!(
            privileged_kind(&Action::Member(MemberAction::BanAdd)),
            Some(PrivilegedActionKind::MemberBan)
        );
        assert_eq!(
            privileged_kind(&Action::Member(MemberAction::RoleUpdate)),
            Some(PrivilegedActionKind::PermissionEscalation)
        );
        assert_eq!(privileged_kind(&Action::Channel(ChannelAction::Create)), None);
    }
}
