// Security slash commands - lockdown, silence, invite pause and the per-guild
// security settings.

use crate::core::config::SecuritySettings;
use crate::core::lockdown::{
    ChannelFailure, LockdownOutcome, OverlayRequest, RestoreReport, SilenceRequest,
};
use crate::core::moderation::parse_duration;
use crate::core::security::user_risk_profile;
use crate::discord::commands::checks::{guild_id, moderator, reply_error};
use crate::discord::formatter::format_duration;
use crate::discord::{Context, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{self as serenity, Mentionable};
use std::time::Duration;

/// Failures listed in a reply before the rest are summarised.
const FAILURES_SHOWN: usize = 5;

fn failure_lines(failures: &[ChannelFailure]) -> String {
    let mut lines: Vec<String> = failures
        .iter()
        .take(FAILURES_SHOWN)
        .map(|f| format!("<#{}>: {}", f.channel_id, f.error))
        .collect();
    if failures.len() > FAILURES_SHOWN {
        lines.push(format!("...and {} more", failures.len() - FAILURES_SHOWN));
    }
    lines.join("\n")
}

fn restore_embed(title: &str, report: &RestoreReport) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(title)
        .color(serenity::Color::DARK_GREEN)
        .field("Channels restored", report.restored.to_string(), true)
        .timestamp(serenity::Timestamp::now());
    if report.skipped_missing > 0 {
        embed = embed.field("Channels gone", report.skipped_missing.to_string(), true);
    }
    if !report.failures.is_empty() {
        embed = embed
            .color(serenity::Color::from_rgb(255, 165, 0))
            .field(
                "⚠️ Not restored (run the command again to retry)",
                failure_lines(&report.failures),
                false,
            );
    }
    embed
}

fn relative(at: DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

/// Lock down all channels to stop a raid.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn lockdown(
    ctx: Context<'_>,
    #[description = "Reason for the lockdown"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.defer().await?;

    let reason = reason.unwrap_or_else(|| "Emergency lockdown".to_string());
    let request = OverlayRequest::new(guild_id, moderator(ctx), reason.clone());
    let outcome = match ctx.data().lockdown.lockdown(request).await {
        Ok(outcome) => outcome,
        Err(e) => return reply_error(ctx, e).await,
    };

    let embed = match outcome {
        LockdownOutcome::Locked(report) => {
            let mut embed = serenity::CreateEmbed::new()
                .title("🔒 Server Locked Down")
                .description("Members can no longer send messages or join voice channels.")
                .color(serenity::Color::RED)
                .field("Reason", reason, false)
                .field("Channels locked", report.changed.to_string(), true)
                .timestamp(serenity::Timestamp::now());
            if !report.failures.is_empty() {
                embed = embed.field("⚠️ Could not lock", failure_lines(&report.failures), false);
            }
            embed
        }
        LockdownOutcome::AlreadyLocked { since, .. } => serenity::CreateEmbed::new()
            .title("🔒 Already Locked Down")
            .description(format!(
                "The server has been locked since {}. Use /unlock to lift it.",
                relative(since)
            ))
            .color(serenity::Color::from_rgb(255, 165, 0)),
    };

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Lift a lockdown and restore every channel's permissions.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn unlock(
    ctx: Context<'_>,
    #[description = "Reason for lifting the lockdown"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.defer().await?;

    let reason = reason.unwrap_or_else(|| "Lockdown lifted".to_string());
    match ctx
        .data()
        .lockdown
        .unlock(guild_id, moderator(ctx), &reason)
        .await
    {
        Ok(report) => {
            ctx.send(
                poise::CreateReply::default().embed(restore_embed("🔓 Server Unlocked", &report)),
            )
            .await?;
            Ok(())
        }
        Err(e) => reply_error(ctx, e).await,
    }
}

/// Temporarily mute all members except staff.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn silence(
    ctx: Context<'_>,
    #[description = "How long, e.g. 10m or 1h (leave empty to silence until /unsilence)"]
    duration: Option<String>,
    #[description = "Reason for the silence"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let duration = match duration.as_deref().map(parse_duration).transpose() {
        Ok(d) => d.unwrap_or(Duration::ZERO),
        Err(e) => return reply_error(ctx, e).await,
    };
    ctx.defer().await?;

    let settings = ctx.data().settings.current(guild_id).await;
    let request = SilenceRequest {
        guild_id,
        actor: moderator(ctx),
        reason: reason.unwrap_or_else(|| "Server silenced".to_string()),
        duration,
        mute_role: settings.mute_role(),
    };
    let report = match ctx.data().silence.silence(request).await {
        Ok(report) => report,
        Err(e) => return reply_error(ctx, e).await,
    };

    let until = report
        .until
        .map(relative)
        .unwrap_or_else(|| "until /unsilence".to_string());
    let mut embed = serenity::CreateEmbed::new()
        .title("🔇 Server Silenced")
        .color(serenity::Color::from_rgb(255, 165, 0))
        .field("Members muted", report.muted.to_string(), true)
        .field("Skipped", report.skipped.to_string(), true)
        .field("Ends", until, true)
        .field(
            "Duration",
            if duration.is_zero() {
                "Until lifted".to_string()
            } else {
                format_duration(duration)
            },
            true,
        )
        .timestamp(serenity::Timestamp::now());
    if !report.failures.is_empty() {
        embed = embed.field("⚠️ Could not mute", report.failures.len().to_string(), true);
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Lift a silence early.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn unsilence(
    ctx: Context<'_>,
    #[description = "Reason for lifting the silence"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.defer().await?;

    let reason = reason.unwrap_or_else(|| "Silence lifted".to_string());
    let report = match ctx
        .data()
        .silence
        .unsilence(guild_id, moderator(ctx), &reason)
        .await
    {
        Ok(report) => report,
        Err(e) => return reply_error(ctx, e).await,
    };

    let mut embed = serenity::CreateEmbed::new()
        .title("🔊 Silence Lifted")
        .color(serenity::Color::DARK_GREEN)
        .field("Members unmuted", report.unmuted.to_string(), true)
        .timestamp(serenity::Timestamp::now());
    if !report.failures.is_empty() {
        embed = embed.field("⚠️ Still muted", report.failures.len().to_string(), true);
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Delete all invite links and prevent new ones.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn pause_invites(
    ctx: Context<'_>,
    #[description = "Reason for pausing invites"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.defer().await?;

    let reason = reason.unwrap_or_else(|| "Invites paused".to_string());
    let request = OverlayRequest::new(guild_id, moderator(ctx), reason);
    let report = match ctx.data().lockdown.pause_invites(request).await {
        Ok(report) => report,
        Err(e) => return reply_error(ctx, e).await,
    };

    let mut embed = serenity::CreateEmbed::new()
        .title("⏸️ Invites Paused")
        .description("New invites will be deleted until /resume_invites.")
        .color(serenity::Color::from_rgb(255, 165, 0))
        .field("Invites deleted", report.invites_deleted.to_string(), true)
        .field("Channels changed", report.changed.to_string(), true)
        .timestamp(serenity::Timestamp::now());
    if !report.failures.is_empty() {
        embed = embed.field("⚠️ Could not change", failure_lines(&report.failures), false);
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Allow invite links again.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn resume_invites(
    ctx: Context<'_>,
    #[description = "Reason for resuming invites"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.defer().await?;

    let reason = reason.unwrap_or_else(|| "Invites resumed".to_string());
    match ctx
        .data()
        .lockdown
        .resume_invites(guild_id, moderator(ctx), &reason)
        .await
    {
        Ok(report) => {
            ctx.send(
                poise::CreateReply::default().embed(restore_embed("▶️ Invites Resumed", &report)),
            )
            .await?;
            Ok(())
        }
        Err(e) => reply_error(ctx, e).await,
    }
}

/// Set the minimum account age (in days) required to stay in the server.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn set_min_age(
    ctx: Context<'_>,
    #[description = "Minimum account age in days (0-365)"] days: u32,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    match ctx.data().settings.set_min_account_age(guild_id, days).await {
        Ok(settings) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!(
                        "✅ Minimum account age set to **{}** day(s).",
                        settings.min_account_age_days
                    ))
                    .ephemeral(true),
            )
            .await?;
            Ok(())
        }
        Err(e) => reply_error(ctx, e).await,
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum SecurityFeature {
    #[name = "Auto-quarantine"]
    AutoQuarantine,
    #[name = "Account age check"]
    AgeCheck,
    #[name = "Link filter"]
    LinkFilter,
    #[name = "Mention filter"]
    MentionFilter,
    #[name = "Anti-nuke"]
    AntiNuke,
    #[name = "Anti-nuke lockdown"]
    AntiNukeLockdown,
}

impl SecurityFeature {
    fn set(self, settings: &mut SecuritySettings, enabled: bool) {
        match self {
            SecurityFeature::AutoQuarantine => settings.auto_quarantine_enabled = enabled,
            SecurityFeature::AgeCheck => settings.auto_age_check_enabled = enabled,
            SecurityFeature::LinkFilter => settings.link_filter_enabled = enabled,
            SecurityFeature::MentionFilter => settings.mention_filter_enabled = enabled,
            SecurityFeature::AntiNuke => settings.anti_nuke_enabled = enabled,
            SecurityFeature::AntiNukeLockdown => settings.anti_nuke_auto_lockdown = enabled,
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "✅"
    } else {
        "❌"
    }
}

fn role_or_unset(role: Option<u64>) -> String {
    role.map(|id| format!("<@&{}>", id))
        .unwrap_or_else(|| "Not set".to_string())
}

/// View or change the server's security settings.
///
/// Run without options to see the current settings.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn security(
    ctx: Context<'_>,
    #[description = "Role given to new members"] quarantine_role: Option<serenity::Role>,
    #[description = "Role used by /silence"] mute_role: Option<serenity::Role>,
    #[description = "Links per message before it counts as spam"] link_threshold: Option<u32>,
    #[description = "Mentions per message before it counts as spam"] mention_threshold: Option<u32>,
    #[description = "Staff actions in the window that trigger anti-nuke"] anti_nuke_threshold: Option<u32>,
    #[description = "Anti-nuke window in seconds"] anti_nuke_window: Option<u64>,
    #[description = "Add a scam domain"] add_scam_domain: Option<String>,
    #[description = "Remove a scam domain"] remove_scam_domain: Option<String>,
    #[description = "Feature to switch on or off"] feature: Option<SecurityFeature>,
    #[description = "Whether the feature is enabled"] enabled: Option<bool>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let data = ctx.data();

    let changing = quarantine_role.is_some()
        || mute_role.is_some()
        || link_threshold.is_some()
        || mention_threshold.is_some()
        || anti_nuke_threshold.is_some()
        || anti_nuke_window.is_some()
        || add_scam_domain.is_some()
        || remove_scam_domain.is_some()
        || feature.is_some();
    if feature.is_some() != enabled.is_some() {
        return reply_error(ctx, "Pick both a feature and whether it is enabled.").await;
    }

    let settings = if changing {
        let result = data
            .settings
            .update(guild_id, |s| {
                if let Some(role) = &quarantine_role {
                    s.quarantine_role_id = Some(role.id.get());
                }
                if let Some(role) = &mute_role {
                    s.mute_role_id = Some(role.id.get());
                }
                if let Some(v) = link_threshold {
                    s.link_spam_threshold = v;
                }
                if let Some(v) = mention_threshold {
                    s.mention_spam_threshold = v;
                }
                if let Some(v) = anti_nuke_threshold {
                    s.anti_nuke_threshold = v;
                }
                if let Some(v) = anti_nuke_window {
                    s.anti_nuke_window_secs = v;
                }
                if let Some(domain) = &add_scam_domain {
                    let domain = domain.trim().to_lowercase();
                    if !domain.is_empty() && !s.scam_domains.contains(&domain) {
                        s.scam_domains.push(domain);
                    }
                }
                if let Some(domain) = &remove_scam_domain {
                    let domain = domain.trim().to_lowercase();
                    s.scam_domains.retain(|d| *d != domain);
                }
                if let (Some(feature), Some(enabled)) = (feature, enabled) {
                    feature.set(s, enabled);
                }
            })
            .await;
        match result {
            Ok(settings) => settings,
            Err(e) => return reply_error(ctx, e).await,
        }
    } else {
        data.settings.current(guild_id).await
    };

    let status = data.lockdown.status(guild_id).await.unwrap_or_default();
    let silenced = data.silence.is_silenced(guild_id).await;

    let embed = serenity::CreateEmbed::new()
        .title(if changing {
            "🛡️ Security Settings Updated"
        } else {
            "🛡️ Security Settings"
        })
        .color(serenity::Color::BLUE)
        .field(
            "Features",
            format!(
                "{} Auto-quarantine\n{} Account age check\n{} Link filter\n{} Mention filter\n{} Anti-nuke\n{} Anti-nuke lockdown",
                on_off(settings.auto_quarantine_enabled),
                on_off(settings.auto_age_check_enabled),
                on_off(settings.link_filter_enabled),
                on_off(settings.mention_filter_enabled),
                on_off(settings.anti_nuke_enabled),
                on_off(settings.anti_nuke_auto_lockdown),
            ),
            true,
        )
        .field(
            "Thresholds",
            format!(
                "Minimum account age: {} day(s)\nLinks per message: {}\nMentions per message: {}\nAnti-nuke: {} actions / {}s",
                settings.min_account_age_days,
                settings.link_spam_threshold,
                settings.mention_spam_threshold,
                settings.anti_nuke_threshold,
                settings.anti_nuke_window_secs,
            ),
            true,
        )
        .field(
            "Roles",
            format!(
                "Quarantine: {}\nMute: {}",
                role_or_unset(settings.quarantine_role()),
                role_or_unset(settings.mute_role()),
            ),
            false,
        )
        .field(
            "Scam domains",
            if settings.scam_domains.is_empty() {
                "None".to_string()
            } else {
                settings.scam_domains.join(", ")
            },
            false,
        )
        .field(
            "State",
            format!(
                "Lockdown: {}\nInvites paused: {}\nSilenced: {}",
                status
                    .locked_since
                    .map(|t| format!("since {}", relative(t)))
                    .unwrap_or_else(|| "no".to_string()),
                status
                    .invites_paused_since
                    .map(|t| format!("since {}", relative(t)))
                    .unwrap_or_else(|| "no".to_string()),
                if silenced { "yes" } else { "no" },
            ),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// View a detailed security profile for a user.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn view_user_info(
    ctx: Context<'_>,
    #[description = "The user to check"] user: serenity::Member,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.defer_ephemeral().await?;

    let now = Utc::now();
    let created_at =
        DateTime::from_timestamp(user.user.created_at().unix_timestamp(), 0).unwrap_or(now);
    let joined_at = user
        .joined_at
        .and_then(|t| DateTime::from_timestamp(t.unix_timestamp(), 0));

    let warning_count = match ctx.data().executor.warnings().query(user.user.id.get()).await {
        Ok(found) => Some(found.len()),
        Err(e) => {
            tracing::debug!(user_id = user.user.id.get(), error = %e, "Could not fetch warnings");
            None
        }
    };

    let settings = ctx.data().settings.current(guild_id).await;
    let profile = user_risk_profile(
        &settings,
        created_at,
        user.user.avatar.is_some(),
        warning_count,
        now,
    );

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("👤 User Security Profile: {}", user.display_name()))
        .color(if profile.is_suspicious() {
            serenity::Color::from_rgb(255, 165, 0)
        } else {
            serenity::Color::BLUE
        })
        .thumbnail(user.face())
        .field("User ID", user.user.id.to_string(), true)
        .field("Account Created", relative(created_at), true)
        .field(
            "Account Age",
            format!("{} days", profile.account_age_days),
            true,
        )
        .field(
            "Joined Server",
            joined_at.map(relative).unwrap_or_else(|| "Unknown".to_string()),
            true,
        )
        .field(
            "Join Age",
            joined_at
                .map(|j| format!("{} days", (now - j).num_days()))
                .unwrap_or_else(|| "Unknown".to_string()),
            true,
        )
        .field(
            "Warnings",
            profile
                .warning_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "Unavailable".to_string()),
            true,
        )
        .field("Roles", format!("{} roles", user.roles.len()), true)
        .field("Bot", if user.user.bot { "Yes" } else { "No" }, true)
        .timestamp(serenity::Timestamp::now());

    if profile.is_suspicious() {
        embed = embed.field(
            "⚠️ Suspicious Indicators",
            profile.indicators.join("\n"),
            false,
        );
    }
    if let Some(quarantine) = settings.quarantine_role() {
        if user.roles.iter().any(|r| r.get() == quarantine) {
            embed = embed.field(
                "Quarantine",
                serenity::RoleId::new(quarantine).mention().to_string(),
                true,
            );
        }
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
