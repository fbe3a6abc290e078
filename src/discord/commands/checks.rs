// Helpers shared by the command modules: permission checks, hierarchy lookups
// and error replies.

use crate::core::moderation::{
    check_hierarchy, ActionError, ActionRecord, ActionRequest, Actor, MemberRank, ModAction,
};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

pub const DEFAULT_REASON: &str = "No reason provided";

/// Ephemeral `❌ ...` reply. Errors the moderator can act on end here instead
/// of bubbling up to the framework.
pub async fn reply_error(ctx: Context<'_>, err: impl std::fmt::Display) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(format!("❌ {}", err))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

pub fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    Ok(ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get())
}

pub fn moderator(ctx: Context<'_>) -> Actor {
    Actor::Moderator(ctx.author().id.get())
}

/// Run one moderator action through the executor.
pub async fn execute(ctx: Context<'_>, action: ModAction) -> Result<ActionRecord, ActionError> {
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| ActionError::Invalid("This command only works in servers".to_string()))?
        .get();
    ctx.data()
        .executor
        .execute(ActionRequest::new(guild_id, moderator(ctx), action))
        .await
}

/// `None` when the user isn't a member of the guild.
async fn member_rank(ctx: Context<'_>, user_id: serenity::UserId) -> Option<MemberRank> {
    let guild_id = ctx.guild_id()?;
    let member = guild_id
        .member(ctx.serenity_context(), user_id)
        .await
        .ok()?;
    let position = ctx
        .guild()
        .and_then(|g| g.member_highest_role(&member).map(|r| r.position))
        .unwrap_or(0);
    Some(MemberRank {
        user_id: user_id.get(),
        top_role_position: position,
    })
}

/// Role hierarchy check between the invoker and a target member. Targets who
/// aren't in the guild (a ban by id) pass.
pub async fn ensure_can_act(ctx: Context<'_>, target: &serenity::User) -> Result<(), ActionError> {
    let Some(target_rank) = member_rank(ctx, target.id).await else {
        return Ok(());
    };
    let invoker = member_rank(ctx, ctx.author().id)
        .await
        .unwrap_or(MemberRank {
            user_id: ctx.author().id.get(),
            top_role_position: 0,
        });
    let owner_id = ctx.guild().map(|g| g.owner_id.get()).unwrap_or(0);
    check_hierarchy(invoker, target_rank, owner_id)
}

/// Staff role holders and administrators.
pub async fn is_staff_or_admin(ctx: Context<'_>) -> Result<bool, Error> {
    let allowed = match ctx.author_member().await {
        Some(member) => {
            let is_admin = member.permissions.is_some_and(|p| p.administrator());
            let roles: Vec<u64> = member.roles.iter().map(|r| r.get()).collect();
            is_admin || ctx.data().config.is_staff(&roles)
        }
        None => false,
    };

    if !allowed {
        reply_error(
            ctx,
            "You don't have permission to use this command! This command is restricted to staff.",
        )
        .await?;
    }
    Ok(allowed)
}
