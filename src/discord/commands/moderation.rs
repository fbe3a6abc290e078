// Moderation slash commands.
//
// Each command checks the hierarchy, hands a ModAction to the executor and
// turns the resulting record (or error) into a reply. The executor does the
// validation, the platform call and the mod-log entry.

use crate::core::moderation::{
    parse_duration, recent_warnings, ActionError, ActionRecord, ModAction, WarningStatus,
    WarningStoreError, MAX_PURGE, MIN_PURGE,
};
use crate::discord::commands::checks::{
    ensure_can_act, execute, guild_id, reply_error, DEFAULT_REASON,
};
use crate::discord::formatter::format_duration;
use crate::discord::{Context, Error};
use poise::serenity_prelude::{self as serenity, Mentionable};

/// Success embed with the fields every moderation reply shares.
fn record_embed(title: &str, description: String, record: &ActionRecord) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(title)
        .description(description)
        .color(serenity::Color::BLUE)
        .field("Reason", record.reason.clone(), false)
        .field("Case ID", format!("#{}", record.case_id), true)
        .timestamp(serenity::Timestamp::now());

    if let Some(duration) = record.duration {
        embed = embed.field("Duration", format_duration(duration), true);
    }
    embed
}

async fn reply_record(
    ctx: Context<'_>,
    result: Result<ActionRecord, ActionError>,
    title: &str,
    description: String,
) -> Result<(), Error> {
    match result {
        Ok(record) => {
            ctx.send(poise::CreateReply::default().embed(record_embed(title, description, &record)))
                .await?;
            Ok(())
        }
        Err(e) => reply_error(ctx, e).await,
    }
}

/// Permanently ban a user from the server.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "The user to ban"] user: serenity::User,
    #[description = "Reason for the ban"] reason: Option<String>,
) -> Result<(), Error> {
    if let Err(e) = ensure_can_act(ctx, &user).await {
        return reply_error(ctx, e).await;
    }
    let action = ModAction::Ban {
        user_id: user.id.get(),
        reason: reason.unwrap_or_else(|| DEFAULT_REASON.to_string()),
    };
    let result = execute(ctx, action).await;
    reply_record(
        ctx,
        result,
        "🔨 User Banned",
        format!("{} has been banned from the server.", user.mention()),
    )
    .await
}

/// Unban a user from the server.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "The user to unban (ID works too)"] user: serenity::User,
    #[description = "Reason for the unban"] reason: Option<String>,
) -> Result<(), Error> {
    let action = ModAction::Unban {
        user_id: user.id.get(),
        reason: reason.unwrap_or_else(|| DEFAULT_REASON.to_string()),
    };
    let result = execute(ctx, action).await;
    reply_record(
        ctx,
        result,
        "✅ User Unbanned",
        format!("{} has been unbanned.", user.mention()),
    )
    .await
}

/// Kick a user from the server.
#[poise::command(slash_command, guild_only, required_permissions = "KICK_MEMBERS")]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "The user to kick"] user: serenity::User,
    #[description = "Reason for the kick"] reason: Option<String>,
) -> Result<(), Error> {
    if let Err(e) = ensure_can_act(ctx, &user).await {
        return reply_error(ctx, e).await;
    }
    let action = ModAction::Kick {
        user_id: user.id.get(),
        reason: reason.unwrap_or_else(|| DEFAULT_REASON.to_string()),
    };
    let result = execute(ctx, action).await;
    reply_record(
        ctx,
        result,
        "👢 User Kicked",
        format!("{} has been kicked from the server.", user.mention()),
    )
    .await
}

/// Place a user in timeout.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn timeout(
    ctx: Context<'_>,
    #[description = "The user to timeout"] user: serenity::User,
    #[description = "Duration: 30s, 10m, 1h, 2d, 1w (a bare number is minutes)"] duration: String,
    #[description = "Reason for the timeout"] reason: Option<String>,
) -> Result<(), Error> {
    let duration = match parse_duration(&duration) {
        Ok(d) => d,
        Err(e) => return reply_error(ctx, e).await,
    };
    if let Err(e) = ensure_can_act(ctx, &user).await {
        return reply_error(ctx, e).await;
    }
    let action = ModAction::Timeout {
        user_id: user.id.get(),
        duration,
        reason: reason.unwrap_or_else(|| DEFAULT_REASON.to_string()),
    };
    let result = execute(ctx, action).await;
    reply_record(
        ctx,
        result,
        "⏰ User Timed Out",
        format!("{} has been placed in timeout.", user.mention()),
    )
    .await
}

/// Issue a formal warning to a user.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "The user to warn"] user: serenity::User,
    #[description = "Reason for the warning"] reason: String,
) -> Result<(), Error> {
    if let Err(e) = ensure_can_act(ctx, &user).await {
        return reply_error(ctx, e).await;
    }
    let action = ModAction::Warn {
        user_id: user.id.get(),
        reason,
    };
    let record = match execute(ctx, action).await {
        Ok(record) => record,
        Err(e) => return reply_error(ctx, e).await,
    };

    let mut embed = record_embed(
        "⚠️ Warning Issued",
        format!("{} has been warned.", user.mention()),
        &record,
    )
    .color(serenity::Color::from_rgb(255, 215, 0));
    match &record.warning {
        Some(WarningStatus::Saved { id }) => {
            embed = embed.field("Warning ID", id.to_string(), true);
        }
        Some(WarningStatus::Unsaved { reason }) => {
            embed = embed.field(
                "⚠️ Not saved",
                format!("The warning was logged but not stored: {}", reason),
                false,
            );
        }
        None => {}
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// View all warnings for a user.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn warnings(
    ctx: Context<'_>,
    #[description = "The user to check warnings for"] user: serenity::User,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    let store = ctx.data().executor.warnings();
    let (total, shown) = match recent_warnings(store.as_ref(), user.id.get()).await {
        Ok(found) => found,
        Err(WarningStoreError::NotConfigured) => {
            return reply_error(
                ctx,
                "Warning system is not available (warnings database not configured).",
            )
            .await;
        }
        Err(e) => {
            tracing::error!(user_id = user.id.get(), error = %e, "Failed to fetch warnings");
            return reply_error(ctx, format!("Could not fetch warnings: {}", e)).await;
        }
    };

    if total == 0 {
        let embed = serenity::CreateEmbed::new()
            .title("📋 User Warnings")
            .description(format!("{} has no warnings.", user.mention()))
            .color(serenity::Color::DARK_GREEN);
        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("📋 Warnings for {}", user.name))
        .description(format!("Total warnings: {}", total))
        .color(serenity::Color::from_rgb(255, 165, 0));
    for (i, warning) in shown.iter().enumerate() {
        embed = embed.field(
            format!("Warning #{}", i + 1),
            format!(
                "**Reason:** {}\n**Moderator:** <@{}>\n**Date:** <t:{}:f>",
                warning.reason,
                warning.moderator_id,
                warning.created_at.timestamp()
            ),
            false,
        );
    }
    if total > shown.len() {
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "Showing {} of {} warnings",
            shown.len(),
            total
        )));
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Clear all warnings for a user.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn clear_warnings(
    ctx: Context<'_>,
    #[description = "The user to clear warnings for"] user: serenity::User,
) -> Result<(), Error> {
    let action = ModAction::ClearWarnings {
        user_id: user.id.get(),
        reason: "All warnings cleared".to_string(),
    };
    let record = match execute(ctx, action).await {
        Ok(record) => record,
        Err(e) => return reply_error(ctx, e).await,
    };

    let embed = record_embed(
        "✅ Warnings Cleared",
        format!(
            "Cleared {} warning(s) for {}.",
            record.affected.unwrap_or(0),
            user.mention()
        ),
        &record,
    )
    .color(serenity::Color::DARK_GREEN);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Delete a number of recent messages in this channel.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "Number of messages to delete (1-100)"]
    #[min = 1]
    #[max = 100]
    amount: u8,
) -> Result<(), Error> {
    guild_id(ctx)?;
    if !(MIN_PURGE..=MAX_PURGE).contains(&amount) {
        return reply_error(ctx, "Amount must be between 1 and 100!").await;
    }
    ctx.defer_ephemeral().await?;

    let action = ModAction::Purge {
        channel_id: ctx.channel_id().get(),
        limit: amount,
        reason: format!("Purge of up to {} message(s)", amount),
    };
    let record = match execute(ctx, action).await {
        Ok(record) => record,
        Err(e) => return reply_error(ctx, e).await,
    };

    let embed = serenity::CreateEmbed::new()
        .title("✅ Messages Purged")
        .description(format!(
            "Deleted {} message(s) from {}",
            record.affected.unwrap_or(0),
            ctx.channel_id().mention()
        ))
        .color(serenity::Color::BLUE)
        .field("Case ID", format!("#{}", record.case_id), true);
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
