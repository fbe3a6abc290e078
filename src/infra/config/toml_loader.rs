use crate::core::config::{BotConfig, ConfigError};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// `BOT_CONFIG_PATH`, or `config.toml` in the working directory.
pub fn config_path() -> PathBuf {
    std::env::var("BOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Reads the bot config. When the file does not exist a commented template is
/// written in its place and an error is returned, so the operator can fill it
/// in and start again.
pub async fn load_bot_config(path: impl AsRef<Path>) -> Result<BotConfig, ConfigError> {
    let path = path.as_ref();

    if !fs::try_exists(path)
        .await
        .map_err(|e| ConfigError::Io(e.to_string()))?
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        fs::write(path, BotConfig::template())
            .await
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        tracing::error!(path = %path.display(), "Config file missing, wrote a template");
        return Err(ConfigError::Io(format!(
            "{} did not exist; a template was written, fill in the ids and restart",
            path.display()
        )));
    }

    let text = fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Io(e.to_string()))?;
    let config = BotConfig::from_toml_str(&text)?;

    for warning in config.feature_warnings() {
        tracing::warn!("{}", warning);
    }
    tracing::info!(guild_id = config.guild_id, path = %path.display(), "Loaded bot config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_writes_template_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let err = load_bot_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, BotConfig::template());
    }

    #[tokio::test]
    async fn test_template_alone_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let _ = load_bot_config(&path).await;

        // The template ships with guild_id = 0.
        let err = load_bot_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("guild_id")));
    }

    #[tokio::test]
    async fn test_loads_filled_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "guild_id = 10\n[roles]\nstaff = 20\n[channels]\nmod_log = 30\n",
        )
        .unwrap();

        let config = load_bot_config(&path).await.unwrap();
        assert_eq!(config.guild_id, 10);
        assert_eq!(config.staff_role(), Some(20));
        assert_eq!(config.mod_log_channel(), Some(30));
    }

    #[tokio::test]
    async fn test_malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "guild_id = [").unwrap();

        let err = load_bot_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }
}
