// Staff update posts for the website and app channels.

use crate::core::github::{manual_update_note, UpdateKind, UpdateNote};
use crate::discord::commands::checks::{is_staff_or_admin, reply_error};
use crate::discord::formatter::format_update_note;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

fn update_channel(ctx: Context<'_>, kind: UpdateKind) -> Option<serenity::ChannelId> {
    let config = &ctx.data().config;
    let id = match kind {
        UpdateKind::Web => config.web_updates_channel(),
        UpdateKind::App => config.app_updates_channel(),
    };
    id.map(serenity::ChannelId::new)
}

async fn post_update(ctx: Context<'_>, note: UpdateNote) -> Result<(), Error> {
    let Some(channel) = update_channel(ctx, note.kind) else {
        return reply_error(
            ctx,
            format!(
                "No channel is configured for {} posts. Set it in config.toml.",
                note.kind.label().to_lowercase()
            ),
        )
        .await;
    };

    let message = serenity::CreateMessage::new().embed(format_update_note(&note));
    if let Err(e) = channel.send_message(ctx, message).await {
        tracing::error!(channel_id = channel.get(), error = %e, "Failed to post update");
        return reply_error(ctx, format!("Could not post the update: {}", e)).await;
    }

    tracing::info!(
        channel_id = channel.get(),
        user_id = ctx.author().id.get(),
        kind = note.kind.label(),
        "Posted update"
    );
    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Update posted to <#{}>", channel.get()))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Post a website update.
#[poise::command(slash_command, guild_only, check = "is_staff_or_admin")]
pub async fn update_web(
    ctx: Context<'_>,
    #[description = "What changed on the website"] message: String,
) -> Result<(), Error> {
    let note = manual_update_note(UpdateKind::Web, &message, &ctx.author().name);
    post_update(ctx, note).await
}

/// Post an app update.
#[poise::command(slash_command, guild_only, check = "is_staff_or_admin")]
pub async fn update_app(
    ctx: Context<'_>,
    #[description = "What changed in the app"] message: String,
) -> Result<(), Error> {
    let note = manual_update_note(UpdateKind::App, &message, &ctx.author().name);
    post_update(ctx, note).await
}

/// Post an app update from the latest commit on a GitHub branch.
#[poise::command(slash_command, guild_only, check = "is_staff_or_admin")]
pub async fn update_app_github(
    ctx: Context<'_>,
    #[description = "Repository owner (user or org)"] owner: String,
    #[description = "Repository name"] repo: String,
    #[description = "Branch (defaults to main)"] branch: Option<String>,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    let branch = branch.unwrap_or_else(|| "main".to_string());
    let note = match ctx
        .data()
        .updates
        .latest_update(UpdateKind::App, &owner, &repo, &branch)
        .await
    {
        Ok(note) => note,
        Err(e) => {
            tracing::warn!(owner, repo, branch, error = %e, "Could not fetch latest commit");
            return reply_error(ctx, e).await;
        }
    };
    post_update(ctx, note).await
}
