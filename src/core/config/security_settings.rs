// Per-guild security settings document.

use serde::{Deserialize, Serialize};

pub const MAX_MIN_ACCOUNT_AGE_DAYS: u32 = 365;

fn default_scam_domains() -> Vec<String> {
    [
        "discord-nitro.com",
        "discordgift.com",
        "discord-app.com",
        "steamcommunlty.com",
        "steamcornmunity.com",
    ]
    .iter()
    .map(|d| d.to_string())
    .collect()
}

/// Thresholds and toggles read by the classifiers and the anti-nuke monitor.
///
/// Missing fields in the stored document fall back to the defaults, so older
/// files keep loading after new settings are added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub quarantine_role_id: Option<u64>,
    pub mute_role_id: Option<u64>,
    pub min_account_age_days: u32,
    pub link_spam_threshold: u32,
    pub mention_spam_threshold: u32,

    pub auto_quarantine_enabled: bool,
    pub auto_age_check_enabled: bool,
    pub link_filter_enabled: bool,
    pub mention_filter_enabled: bool,
    pub anti_nuke_enabled: bool,

    /// Privileged actions by one moderator inside the window that count as a nuke.
    pub anti_nuke_threshold: u32,
    pub anti_nuke_window_secs: u64,
    /// Also lock the server down when anti-nuke fires.
    pub anti_nuke_auto_lockdown: bool,

    pub scam_domains: Vec<String>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            quarantine_role_id: None,
            mute_role_id: None,
            min_account_age_days: 7,
            link_spam_threshold: 3,
            mention_spam_threshold: 5,
            auto_quarantine_enabled: true,
            auto_age_check_enabled: true,
            link_filter_enabled: true,
            mention_filter_enabled: true,
            anti_nuke_enabled: true,
            anti_nuke_threshold: 5,
            anti_nuke_window_secs: 60,
            anti_nuke_auto_lockdown: false,
            scam_domains: default_scam_domains(),
        }
    }
}

impl SecuritySettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_account_age_days > MAX_MIN_ACCOUNT_AGE_DAYS {
            return Err(format!(
                "min_account_age_days must be between 0 and {}",
                MAX_MIN_ACCOUNT_AGE_DAYS
            ));
        }
        if self.link_spam_threshold == 0 {
            return Err("link_spam_threshold must be at least 1".to_string());
        }
        if self.mention_spam_threshold == 0 {
            return Err("mention_spam_threshold must be at least 1".to_string());
        }
        if self.anti_nuke_threshold == 0 {
            return Err("anti_nuke_threshold must be at least 1".to_string());
        }
        if self.anti_nuke_window_secs == 0 {
            return Err("anti_nuke_window_secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Scam domains this link contains, case-insensitive.
    pub fn matches_scam<'a>(&'a self, link: &str) -> Option<&'a str> {
        let lowered = link.to_lowercase();
        self.scam_domains
            .iter()
            .find(|d| !d.is_empty() && lowered.contains(&d.to_lowercase()))
            .map(String::as_str)
    }

    /// Zero ids from older documents count as unset.
    pub fn quarantine_role(&self) -> Option<u64> {
        self.quarantine_role_id.filter(|id| *id != 0)
    }

    pub fn mute_role(&self) -> Option<u64> {
        self.mute_role_id.filter(|id| *id != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = SecuritySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.min_account_age_days, 7);
        assert_eq!(settings.link_spam_threshold, 3);
        assert_eq!(settings.mention_spam_threshold, 5);
        assert_eq!(settings.scam_domains.len(), 5);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let settings: SecuritySettings =
            serde_json::from_str(r#"{"link_spam_threshold": 9, "mute_role_id": 55}"#).unwrap();
        assert_eq!(settings.link_spam_threshold, 9);
        assert_eq!(settings.mute_role(), Some(55));
        assert_eq!(settings.mention_spam_threshold, 5);
        assert!(settings.anti_nuke_enabled);
    }

    #[test]
    fn test_zero_threshold_is_invalid() {
        let settings = SecuritySettings {
            mention_spam_threshold: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_account_age_upper_bound() {
        let mut settings = SecuritySettings {
            min_account_age_days: 365,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
        settings.min_account_age_days = 366;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_scam_match_is_case_insensitive() {
        let settings = SecuritySettings::default();
        assert_eq!(
            settings.matches_scam("https://FREE.Discord-Nitro.com/claim"),
            Some("discord-nitro.com")
        );
        assert_eq!(settings.matches_scam("https://discord.com/invite/x"), None);
    }
}
