// Config infra layer.
// - `toml_loader.rs` reads the static bot config.
// - `json_settings_store.rs` persists per-guild security settings.

#[path = "toml_loader.rs"]
pub mod toml_loader;

#[path = "json_settings_store.rs"]
pub mod json_settings_store;

pub use json_settings_store::JsonSettingsStore;
pub use toml_loader::{config_path, load_bot_config};
