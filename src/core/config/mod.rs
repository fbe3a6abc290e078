// Config store - static bot config plus the mutable per-guild security settings.

pub mod bot_config;
pub mod security_settings;
pub mod settings_service;

pub use bot_config::{BotConfig, ConfigError};
pub use security_settings::SecuritySettings;
pub use settings_service::{SettingsError, SettingsService, SettingsStore};
