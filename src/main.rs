// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (files, databases, APIs)
// - `discord/` = Discord-specific adapters (commands, events, the platform port)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Route gateway events to the security handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::anti_nuke::{AntiNukeMonitor, AntiNukeResponder};
use crate::core::config::SettingsService;
use crate::core::github::GithubService;
use crate::core::lockdown::{LockdownService, SilenceService};
use crate::core::moderation::{ActionExecutor, ModLog, UnconfiguredWarningStore, WarningStore};
use crate::core::platform::CallPolicy;
use crate::core::security::SecurityService;
use crate::discord::events;
use crate::discord::platform::SerenityPlatform;
use crate::discord::{Data, Error};
use crate::infra::config::{config_path, load_bot_config, JsonSettingsStore};
use crate::infra::github::GithubApiClient;
use crate::infra::lockdown::JsonSnapshotStore;
use crate::infra::moderation::{SqliteWarningStore, SupabaseWarningStore};
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing_subscriber::EnvFilter;

/// How often idle anti-nuke windows are dropped.
const PRUNE_INTERVAL: StdDuration = StdDuration::from_secs(300);

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = events::handle_message(data, new_message).await {
                tracing::error!("Error checking message: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = events::handle_member_join(data, new_member).await {
                tracing::error!("Error checking new member: {}", e);
            }
        }
        serenity::FullEvent::GuildAuditLogEntryCreate { entry, guild_id } => {
            if let Err(e) = events::handle_audit_log_entry(ctx, data, *guild_id, entry).await {
                tracing::error!("Error handling audit log entry: {}", e);
            }
        }
        serenity::FullEvent::InviteCreate { data: invite } => {
            if let Err(e) = events::handle_invite_create(data, invite).await {
                tracing::error!("Error handling new invite: {}", e);
            }
        }
        _ => {}
    }

    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(command = %ctx.command().qualified_name, "Command failed: {}", error);
            let _ = ctx
                .send(
                    poise::CreateReply::default()
                        .content("❌ Something went wrong while running that command.")
                        .ephemeral(true),
                )
                .await;
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Supabase when both variables are set, otherwise a local SQLite file. If
/// neither works the bot runs with warnings disabled.
async fn open_warning_store(data_dir: &str) -> Arc<dyn WarningStore> {
    if let (Ok(url), Ok(key)) = (std::env::var("SUPABASE_URL"), std::env::var("SUPABASE_KEY")) {
        match SupabaseWarningStore::new(&url, &key) {
            Ok(store) => {
                tracing::info!("Warnings are stored in Supabase");
                return Arc::new(store);
            }
            Err(e) => tracing::warn!("Supabase warning store unavailable: {}", e),
        }
    }

    let url = format!("sqlite://{}/warnings.db?mode=rwc", data_dir);
    let pool = match sqlx::sqlite::SqlitePoolOptions::new().connect(&url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!("Warnings database unavailable, warnings are disabled: {}", e);
            return Arc::new(UnconfiguredWarningStore);
        }
    };
    let store = SqliteWarningStore::new(pool);
    if let Err(e) = store.migrate().await {
        tracing::warn!("Failed to migrate warnings database, warnings are disabled: {}", e);
        return Arc::new(UnconfiguredWarningStore);
    }
    tracing::info!("Warnings are stored in {}/warnings.db", data_dir);
    Arc::new(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_BOT_TOKEN").context(
        "Missing DISCORD_BOT_TOKEN environment variable! Create a .env file with your bot token.",
    )?;

    // Keep runtime state in a dedicated folder so the repo root stays tidy.
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    let config = Arc::new(
        load_bot_config(config_path())
            .await
            .context("Failed to load bot configuration")?,
    );
    let guild_id = serenity::GuildId::new(config.guild_id);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Services that don't need the HTTP client are created here; the rest are
    // wired in `setup` once the gateway is connected.

    let warnings = open_warning_store(&data_dir).await;
    let settings = Arc::new(SettingsService::new(JsonSettingsStore::new(format!(
        "{}/security_settings.json",
        data_dir
    ))));
    let snapshots = JsonSnapshotStore::new(format!("{}/lockdown_state.json", data_dir));
    let github_client = GithubApiClient::new(std::env::var("GITHUB_TOKEN").ok())
        .context("Failed to create GitHub API client")?;
    let updates = Arc::new(GithubService::new(github_client));

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILD_MODERATION // Audit log entries
        | serenity::GatewayIntents::GUILD_INVITES;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: discord::commands::all(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!(user = %ready.user.name, "Bot is starting up");

                let policy = CallPolicy::default();
                let platform = Arc::new(SerenityPlatform::new(ctx.http.clone()));
                let mod_log = Arc::new(ModLog::new(
                    Arc::clone(&platform),
                    config.mod_log_channel(),
                    policy,
                ));
                let executor = Arc::new(ActionExecutor::new(
                    Arc::clone(&platform),
                    warnings,
                    Arc::clone(&mod_log),
                    policy,
                    ready.user.id.get(),
                ));
                let security = Arc::new(SecurityService::new(
                    Arc::clone(&config),
                    Arc::clone(&settings),
                    Arc::clone(&executor),
                ));
                let lockdown = Arc::new(LockdownService::new(
                    Arc::clone(&platform),
                    snapshots,
                    Arc::clone(&mod_log),
                    policy,
                ));
                let silence = Arc::new(SilenceService::new(
                    Arc::clone(&platform),
                    Arc::clone(&config),
                    Arc::clone(&mod_log),
                    policy,
                ));
                let anti_nuke = Arc::new(AntiNukeMonitor::new(ready.user.id.get()));
                let anti_nuke_responder = Arc::new(AntiNukeResponder::new(
                    Arc::clone(&platform),
                    Arc::clone(&mod_log),
                    policy,
                ));

                // Guild registration shows changes immediately.
                poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id)
                    .await?;
                tracing::info!(guild_id = guild_id.get(), "Commands registered");

                // Drop anti-nuke windows for moderators who went quiet.
                let monitor = Arc::clone(&anti_nuke);
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
                    loop {
                        interval.tick().await;
                        monitor.prune(chrono::Utc::now(), chrono::Duration::hours(1));
                        tracing::debug!(tracked = monitor.tracked(), "Pruned anti-nuke windows");
                    }
                });

                tracing::info!("Bot is ready");
                Ok(Data {
                    config,
                    settings,
                    executor,
                    security,
                    lockdown,
                    silence,
                    anti_nuke,
                    anti_nuke_responder,
                    updates,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
