// Discord layer - commands, event translation and the serenity-backed platform.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "platform/serenity_platform.rs"]
pub mod platform;

#[path = "logging/formatter.rs"]
pub mod formatter;

#[path = "security/events.rs"]
pub mod events;

use crate::core::anti_nuke::{AntiNukeMonitor, AntiNukeResponder};
use crate::core::config::{BotConfig, SettingsService};
use crate::core::github::GithubService;
use crate::core::lockdown::{LockdownService, SilenceService};
use crate::core::moderation::ActionExecutor;
use crate::core::security::SecurityService;
use crate::infra::config::JsonSettingsStore;
use crate::infra::github::GithubApiClient;
use crate::infra::lockdown::JsonSnapshotStore;
use platform::SerenityPlatform;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub config: Arc<BotConfig>,
    pub settings: Arc<SettingsService<JsonSettingsStore>>,
    pub executor: Arc<ActionExecutor<SerenityPlatform>>,
    pub security: Arc<SecurityService<SerenityPlatform, JsonSettingsStore>>,
    pub lockdown: Arc<LockdownService<SerenityPlatform, JsonSnapshotStore>>,
    pub silence: Arc<SilenceService<SerenityPlatform>>,
    pub anti_nuke: Arc<AntiNukeMonitor>,
    pub anti_nuke_responder: Arc<AntiNukeResponder<SerenityPlatform>>,
    pub updates: Arc<GithubService<GithubApiClient>>,
}
