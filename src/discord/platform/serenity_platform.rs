// GuildPlatform on top of serenity's HTTP client.
//
// Translation only: ids in and out are plain u64, serenity errors are mapped
// onto PlatformError so the core can decide what a failure means.

use crate::core::moderation::ModLogEntry;
use crate::core::platform::{
    ChannelInfo, ChannelKind, GuildPlatform, MemberInfo, PermissionOverwrite, PlatformError,
};
use crate::discord::formatter::format_mod_log_entry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::collections::HashMap;
use std::sync::Arc;

/// Members fetched per page when listing a guild.
const MEMBER_PAGE: u64 = 1000;

pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

fn map_err(err: serenity::Error, what: &str) -> PlatformError {
    if let serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) = &err {
        return match response.status_code.as_u16() {
            403 => PlatformError::Forbidden(what.to_string()),
            404 => PlatformError::NotFound(what.to_string()),
            429 => PlatformError::RateLimited { retry_after: None },
            _ => PlatformError::Unavailable(format!("{}: {}", what, err)),
        };
    }
    PlatformError::Unavailable(format!("{}: {}", what, err))
}

fn channel_kind(kind: serenity::ChannelType) -> ChannelKind {
    match kind {
        serenity::ChannelType::Text
        | serenity::ChannelType::News
        | serenity::ChannelType::Forum => ChannelKind::Text,
        serenity::ChannelType::Voice | serenity::ChannelType::Stage => ChannelKind::Voice,
        serenity::ChannelType::Category => ChannelKind::Category,
        _ => ChannelKind::Other,
    }
}

fn role_overwrites(channel: &serenity::GuildChannel) -> HashMap<u64, PermissionOverwrite> {
    channel
        .permission_overwrites
        .iter()
        .filter_map(|ow| match ow.kind {
            serenity::PermissionOverwriteType::Role(role_id) => Some((
                role_id.get(),
                PermissionOverwrite {
                    allow: ow.allow.bits(),
                    deny: ow.deny.bits(),
                },
            )),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl GuildPlatform for SerenityPlatform {
    async fn delete_message(
        &self,
        _guild_id: u64,
        channel_id: u64,
        message_id: u64,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.http
            .delete_message(
                serenity::ChannelId::new(channel_id),
                serenity::MessageId::new(message_id),
                Some(reason),
            )
            .await
            .map_err(|e| map_err(e, "message"))
    }

    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), PlatformError> {
        let until = serenity::Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|e| PlatformError::Unavailable(e.to_string()))?;
        serenity::GuildId::new(guild_id)
            .edit_member(
                &self.http,
                serenity::UserId::new(user_id),
                serenity::EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(reason),
            )
            .await
            .map(|_| ())
            .map_err(|e| map_err(e, "member"))
    }

    async fn kick_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<(), PlatformError> {
        serenity::GuildId::new(guild_id)
            .kick_with_reason(&self.http, serenity::UserId::new(user_id), reason)
            .await
            .map_err(|e| map_err(e, "member"))
    }

    async fn ban_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<(), PlatformError> {
        serenity::GuildId::new(guild_id)
            .ban_with_reason(&self.http, serenity::UserId::new(user_id), 0, reason)
            .await
            .map_err(|e| map_err(e, "user"))
    }

    async fn unban_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.http
            .remove_ban(
                serenity::GuildId::new(guild_id),
                serenity::UserId::new(user_id),
                Some(reason),
            )
            .await
            .map_err(|e| map_err(e, "ban"))
    }

    async fn purge_messages(
        &self,
        _guild_id: u64,
        channel_id: u64,
        limit: u8,
    ) -> Result<usize, PlatformError> {
        let channel = serenity::ChannelId::new(channel_id);
        let messages = channel
            .messages(&self.http, serenity::GetMessages::new().limit(limit))
            .await
            .map_err(|e| map_err(e, "channel"))?;
        let ids: Vec<serenity::MessageId> = messages.iter().map(|m| m.id).collect();

        match ids.as_slice() {
            [] => {}
            [single] => channel
                .delete_message(&self.http, *single)
                .await
                .map_err(|e| map_err(e, "message"))?,
            _ => channel
                .delete_messages(&self.http, &ids)
                .await
                .map_err(|e| map_err(e, "messages"))?,
        }
        Ok(ids.len())
    }

    async fn add_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.http
            .add_member_role(
                serenity::GuildId::new(guild_id),
                serenity::UserId::new(user_id),
                serenity::RoleId::new(role_id),
                Some(reason),
            )
            .await
            .map_err(|e| map_err(e, "member or role"))
    }

    async fn remove_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.http
            .remove_member_role(
                serenity::GuildId::new(guild_id),
                serenity::UserId::new(user_id),
                serenity::RoleId::new(role_id),
                Some(reason),
            )
            .await
            .map_err(|e| map_err(e, "member or role"))
    }

    async fn list_members(&self, guild_id: u64) -> Result<Vec<MemberInfo>, PlatformError> {
        let guild = serenity::GuildId::new(guild_id);
        let mut members = Vec::new();
        let mut after: Option<serenity::UserId> = None;

        loop {
            let page = guild
                .members(&self.http, Some(MEMBER_PAGE), after)
                .await
                .map_err(|e| map_err(e, "guild"))?;
            let full = page.len() as u64 == MEMBER_PAGE;
            after = page.last().map(|m| m.user.id);

            members.extend(page.into_iter().map(|m| MemberInfo {
                user_id: m.user.id.get(),
                roles: m.roles.iter().map(|r| r.get()).collect(),
                bot: m.user.bot,
            }));

            if !full {
                break;
            }
        }
        Ok(members)
    }

    async fn list_channels(&self, guild_id: u64) -> Result<Vec<ChannelInfo>, PlatformError> {
        let channels = serenity::GuildId::new(guild_id)
            .channels(&self.http)
            .await
            .map_err(|e| map_err(e, "guild"))?;

        let mut infos: Vec<ChannelInfo> = channels
            .values()
            .map(|c| ChannelInfo {
                id: c.id.get(),
                name: c.name.clone(),
                kind: channel_kind(c.kind),
                overwrites: role_overwrites(c),
            })
            .collect();
        infos.sort_by_key(|c| c.id);
        Ok(infos)
    }

    async fn set_channel_overwrite(
        &self,
        _guild_id: u64,
        channel_id: u64,
        role_id: u64,
        overwrite: Option<PermissionOverwrite>,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        let channel = serenity::ChannelId::new(channel_id);
        let target = serenity::PermissionOverwriteType::Role(serenity::RoleId::new(role_id));

        match overwrite {
            Some(ow) => channel
                .create_permission(
                    &self.http,
                    serenity::PermissionOverwrite {
                        allow: serenity::Permissions::from_bits_truncate(ow.allow),
                        deny: serenity::Permissions::from_bits_truncate(ow.deny),
                        kind: target,
                    },
                )
                .await
                .map_err(|e| map_err(e, "channel")),
            None => channel
                .delete_permission(&self.http, target)
                .await
                .map_err(|e| map_err(e, "channel")),
        }
    }

    async fn list_invites(&self, guild_id: u64) -> Result<Vec<String>, PlatformError> {
        let invites = serenity::GuildId::new(guild_id)
            .invites(&self.http)
            .await
            .map_err(|e| map_err(e, "guild"))?;
        Ok(invites.into_iter().map(|i| i.code).collect())
    }

    async fn delete_invite(
        &self,
        _guild_id: u64,
        code: &str,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.http
            .delete_invite(code, Some(reason))
            .await
            .map(|_| ())
            .map_err(|e| map_err(e, "invite"))
    }

    async fn send_log(
        &self,
        _guild_id: u64,
        channel_id: u64,
        entry: &ModLogEntry,
    ) -> Result<(), PlatformError> {
        serenity::ChannelId::new(channel_id)
            .send_message(
                &self.http,
                serenity::CreateMessage::new().embed(format_mod_log_entry(entry)),
            )
            .await
            .map(|_| ())
            .map_err(|e| map_err(e, "mod-log channel"))
    }
}
