// Static bot configuration - guild, role and channel ids.
//
// Loaded once at startup from config.toml. A zero id means "not configured":
// the feature that needs it is switched off and a warning is logged, the rest
// of the bot keeps running.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Malformed config: {0}")]
    Malformed(String),

    #[error("Missing required config key: {0}")]
    MissingKey(&'static str),

    #[error("Config file error: {0}")]
    Io(String),
}

// ============================================================================
// MODELS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleIds {
    #[serde(default)]
    pub staff: u64,
    #[serde(default)]
    pub immune: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelIds {
    #[serde(default)]
    pub mod_log: u64,
    #[serde(default)]
    pub web_updates: Option<u64>,
    #[serde(default)]
    pub app_updates: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotConfig {
    #[serde(default)]
    pub guild_id: u64,
    #[serde(default)]
    pub roles: RoleIds,
    #[serde(default)]
    pub channels: ChannelIds,
}

fn configured(id: u64) -> Option<u64> {
    (id != 0).then_some(id)
}

impl BotConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: BotConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Only the guild id is fatal. Everything else disables a single feature.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.guild_id == 0 {
            return Err(ConfigError::MissingKey("guild_id"));
        }
        Ok(())
    }

    /// Written next to the binary when no config file exists yet.
    pub fn template() -> &'static str {
        r#"# Gearshift Guard configuration. Replace the zeros with real ids.
guild_id = 0

[roles]
staff = 0
# immune = 0

[channels]
mod_log = 0
# web_updates = 0
# app_updates = 0
"#
    }

    pub fn staff_role(&self) -> Option<u64> {
        configured(self.roles.staff)
    }

    pub fn immune_role(&self) -> Option<u64> {
        self.roles.immune.and_then(configured)
    }

    pub fn mod_log_channel(&self) -> Option<u64> {
        configured(self.channels.mod_log)
    }

    pub fn web_updates_channel(&self) -> Option<u64> {
        self.channels.web_updates.and_then(configured)
    }

    pub fn app_updates_channel(&self) -> Option<u64> {
        self.channels.app_updates.and_then(configured)
    }

    pub fn is_immune(&self, roles: &[u64]) -> bool {
        self.immune_role().is_some_and(|r| roles.contains(&r))
    }

    pub fn is_staff(&self, roles: &[u64]) -> bool {
        self.staff_role().is_some_and(|r| roles.contains(&r))
    }

    /// One line per feature that is switched off by a missing id.
    pub fn feature_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.staff_role().is_none() {
            warnings.push(
                "roles.staff not set: staff exemptions and staff-only commands are limited to administrators"
                    .to_string(),
            );
        }
        if self.mod_log_channel().is_none() {
            warnings.push("channels.mod_log not set: mod-log output disabled".to_string());
        }
        if self.web_updates_channel().is_none() {
            warnings.push("channels.web_updates not set: /update_web disabled".to_string());
        }
        if self.app_updates_channel().is_none() {
            warnings.push(
                "channels.app_updates not set: /update_app and /update_app_github disabled"
                    .to_string(),
            );
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_full_config() {
        let raw = r#"
            guild_id = 42
            [roles]
            staff = 7
            immune = 8
            [channels]
            mod_log = 100
            app_updates = 101
        "#;
        let config = BotConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.guild_id, 42);
        assert_eq!(config.staff_role(), Some(7));
        assert_eq!(config.immune_role(), Some(8));
        assert_eq!(config.mod_log_channel(), Some(100));
        assert_eq!(config.web_updates_channel(), None);
        assert_eq!(config.app_updates_channel(), Some(101));
    }

    #[test]
    fn test_missing_guild_id_is_fatal() {
        let err = BotConfig::from_toml_str("[roles]\nstaff = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("guild_id")));
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let err = BotConfig::from_toml_str("guild_id = \"abc\"").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_zero_ids_disable_features() {
        let config = BotConfig::from_toml_str("guild_id = 1").unwrap();
        assert_eq!(config.mod_log_channel(), None);
        assert!(!config.is_staff(&[0]));
        assert_eq!(config.feature_warnings().len(), 4);
    }

    #[test]
    fn test_template_parses_but_needs_guild_id() {
        let err = BotConfig::from_toml_str(BotConfig::template()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(_)));
    }

    #[test]
    fn test_immunity_checks_role_membership() {
        let config = BotConfig {
            guild_id: 1,
            roles: RoleIds {
                staff: 2,
                immune: Some(3),
            },
            channels: ChannelIds::default(),
        };
        assert!(config.is_immune(&[5, 3]));
        assert!(!config.is_immune(&[2]));
        assert!(config.is_staff(&[2]));
    }
}
