// Event classifiers - pure checks of one event against the guild's settings.
//
// NO Discord dependencies here. Each classifier has its own toggle, and a
// disabled classifier always allows.

use super::security_models::{
    Decision, Evidence, JoinPlan, MemberJoinEvent, MessageEvent, MessageVerdict, RiskProfile,
    Violation, ViolationKind,
};
use crate::core::config::{BotConfig, SecuritySettings};
use crate::core::moderation::ModAction;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

/// Timeout applied on top of delete + warn when a scam link is posted.
pub const SCAM_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Prior warnings at which `view_user_info` flags a member.
const WARNING_INDICATOR_THRESHOLD: usize = 3;

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"https?://[^\s<>]+").expect("Valid URL regex"))
}

/// Every URL-like substring, in order of appearance.
pub fn extract_links(content: &str) -> Vec<String> {
    url_regex()
        .find_iter(content)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '\'', '"'])
                .to_string()
        })
        .collect()
}

// ============================================================================
// CLASSIFIERS
// ============================================================================

/// Fires on `link_spam_threshold` links, or on any scam domain regardless of count.
pub fn classify_links(settings: &SecuritySettings, content: &str) -> Decision {
    if !settings.link_filter_enabled {
        return Decision::Allow;
    }

    let links = extract_links(content);
    if links.is_empty() {
        return Decision::Allow;
    }

    let scam_matches: Vec<String> = links
        .iter()
        .filter_map(|link| settings.matches_scam(link))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if scam_matches.is_empty() && (links.len() as u32) < settings.link_spam_threshold {
        return Decision::Allow;
    }

    Decision::Violation(Violation {
        kind: ViolationKind::LinkSpam,
        evidence: Evidence::Links {
            links,
            scam_matches,
        },
    })
}

/// Counts unique user and role mentions together.
pub fn classify_mentions(
    settings: &SecuritySettings,
    user_ids: &[u64],
    role_ids: &[u64],
) -> Decision {
    if !settings.mention_filter_enabled {
        return Decision::Allow;
    }

    let users: BTreeSet<u64> = user_ids.iter().copied().collect();
    let roles: BTreeSet<u64> = role_ids.iter().copied().collect();
    let count = users.len() + roles.len();

    if (count as u32) < settings.mention_spam_threshold {
        return Decision::Allow;
    }

    Decision::Violation(Violation {
        kind: ViolationKind::MentionSpam,
        evidence: Evidence::Mentions {
            user_ids: users.into_iter().collect(),
            role_ids: roles.into_iter().collect(),
            count,
        },
    })
}

/// Fires when the account is younger than `min_account_age_days` whole days.
pub fn classify_account_age(
    settings: &SecuritySettings,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Decision {
    if !settings.auto_age_check_enabled {
        return Decision::Allow;
    }

    let age_days = (now - created_at).num_days();
    if age_days >= i64::from(settings.min_account_age_days) {
        return Decision::Allow;
    }

    Decision::Violation(Violation {
        kind: ViolationKind::UnderageAccount,
        evidence: Evidence::AccountAge {
            age_days,
            minimum_days: settings.min_account_age_days,
        },
    })
}

// ============================================================================
// PIPELINES
// ============================================================================

/// Run the message classifiers. Bots and immune members always pass.
pub fn inspect_message(
    config: &BotConfig,
    settings: &SecuritySettings,
    event: &MessageEvent,
) -> MessageVerdict {
    if event.author_is_bot || config.is_immune(&event.author_roles) {
        return MessageVerdict::default();
    }

    let violations = [
        classify_links(settings, &event.content),
        classify_mentions(
            settings,
            &event.mentioned_user_ids,
            &event.mentioned_role_ids,
        ),
    ]
    .into_iter()
    .filter_map(Decision::violation)
    .collect();

    MessageVerdict { violations }
}

/// Actions for a message verdict. The most severe violation decides:
/// link spam is deleted and warned, mention spam is only deleted.
pub fn plan_response(event: &MessageEvent, verdict: &MessageVerdict) -> Vec<ModAction> {
    let Some(worst) = verdict.most_severe() else {
        return Vec::new();
    };

    let delete = |reason: String| ModAction::DeleteMessage {
        channel_id: event.channel_id,
        message_id: event.message_id,
        author_id: event.author_id,
        reason,
    };

    match (&worst.kind, &worst.evidence) {
        (ViolationKind::LinkSpam, Evidence::Links { links, .. }) => {
            let reason = if worst.is_scam() {
                "Scam/phishing link detected".to_string()
            } else {
                format!("Link spam detected ({} links)", links.len())
            };
            let mut actions = vec![
                delete(reason.clone()),
                ModAction::Warn {
                    user_id: event.author_id,
                    reason: reason.clone(),
                },
            ];
            if worst.is_scam() {
                actions.push(ModAction::Timeout {
                    user_id: event.author_id,
                    duration: SCAM_TIMEOUT,
                    reason,
                });
            }
            actions
        }
        (ViolationKind::MentionSpam, Evidence::Mentions { count, .. }) => {
            vec![delete(format!("Mass mention spam detected ({} mentions)", count))]
        }
        _ => Vec::new(),
    }
}

/// Quarantine and account-age checks for a new member.
///
/// An underage account is kicked, so it isn't quarantined as well.
pub fn inspect_join(
    config: &BotConfig,
    settings: &SecuritySettings,
    event: &MemberJoinEvent,
) -> JoinPlan {
    if event.is_bot || config.is_immune(&event.roles) {
        return JoinPlan::default();
    }

    let mut plan = JoinPlan {
        underage: classify_account_age(settings, event.account_created_at, event.joined_at)
            .violation(),
        actions: Vec::new(),
    };

    if let Some(violation) = &plan.underage {
        plan.actions.push(ModAction::Kick {
            user_id: event.user_id,
            reason: format!("Account too new: {}", violation.evidence),
        });
        return plan;
    }

    if settings.auto_quarantine_enabled {
        if let Some(role_id) = settings.quarantine_role() {
            plan.actions.push(ModAction::AddRole {
                user_id: event.user_id,
                role_id,
                reason: "Auto-quarantine on join".to_string(),
            });
        }
    }

    plan
}

pub fn user_risk_profile(
    settings: &SecuritySettings,
    account_created_at: DateTime<Utc>,
    has_avatar: bool,
    warning_count: Option<usize>,
    now: DateTime<Utc>,
) -> RiskProfile {
    let account_age_days = (now - account_created_at).num_days();
    let mut indicators = Vec::new();

    if account_age_days < i64::from(settings.min_account_age_days) {
        indicators.push(format!(
            "Account is only {} day(s) old (minimum {})",
            account_age_days, settings.min_account_age_days
        ));
    }
    if !has_avatar {
        indicators.push("Using the default avatar".to_string());
    }
    if let Some(count) = warning_count {
        if count >= WARNING_INDICATOR_THRESHOLD {
            indicators.push(format!("{} prior warnings", count));
        }
    }

    RiskProfile {
        account_age_days,
        indicators,
        warning_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::bot_config::{ChannelIds, RoleIds};
    use chrono::Duration as ChronoDuration;

    const IMMUNE: u64 = 77;

    fn config() -> BotConfig {
        BotConfig {
            guild_id: 1,
            roles: RoleIds {
                staff: 2,
                immune: Some(IMMUNE),
            },
            channels: ChannelIds::default(),
        }
    }

    fn message(content: &str) -> MessageEvent {
        MessageEvent {
            guild_id: 1,
            channel_id: 10,
            message_id: 11,
            author_id: 42,
            content: content.to_string(),
            ..Default::default()
        }
    }

    fn links(n: usize) -> String {
        (0..n)
            .map(|i| format!("https://example{}.com/page", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_links_below_threshold_allowed() {
        let settings = SecuritySettings::default();
        for n in 0..3 {
            assert_eq!(classify_links(&settings, &links(n)), Decision::Allow, "{} links", n);
        }
    }

    #[test]
    fn test_links_at_threshold_fire_with_all_links_as_evidence() {
        let settings = SecuritySettings::default();
        for n in 3..6 {
            let Decision::Violation(v) = classify_links(&settings, &links(n)) else {
                panic!("{} links should fire", n);
            };
            assert_eq!(v.kind, ViolationKind::LinkSpam);
            let Evidence::Links { links: found, .. } = v.evidence else {
                panic!("expected link evidence");
            };
            assert_eq!(found.len(), n);
            for i in 0..n {
                assert!(found.contains(&format!("https://example{}.com/page", i)));
            }
        }
    }

    #[test]
    fn test_single_scam_link_fires() {
        let settings = SecuritySettings::default();
        let Decision::Violation(v) =
            classify_links(&settings, "free nitro https://discord-nitro.com/claim")
        else {
            panic!("scam link should fire");
        };
        assert!(v.is_scam());
    }

    #[test]
    fn test_disabled_link_filter_allows() {
        let settings = SecuritySettings {
            link_filter_enabled: false,
            ..Default::default()
        };
        assert_eq!(
            classify_links(&settings, "https://discord-nitro.com/x"),
            Decision::Allow
        );
    }

    #[test]
    fn test_extract_links_trims_trailing_punctuation() {
        let found = extract_links("see (https://a.com/x), then http://b.org.");
        assert_eq!(found, vec!["https://a.com/x", "http://b.org"]);
    }

    #[test]
    fn test_mentions_count_unique_users_and_roles() {
        let settings = SecuritySettings::default();
        assert_eq!(
            classify_mentions(&settings, &[1, 1, 2, 2], &[9]),
            Decision::Allow
        );

        let Decision::Violation(v) = classify_mentions(&settings, &[1, 2, 3], &[8, 9]) else {
            panic!("five mentions should fire");
        };
        assert_eq!(
            v.evidence,
            Evidence::Mentions {
                user_ids: vec![1, 2, 3],
                role_ids: vec![8, 9],
                count: 5
            }
        );
    }

    #[test]
    fn test_account_age_boundary() {
        let settings = SecuritySettings::default();
        let now = Utc::now();
        let min = i64::from(settings.min_account_age_days);

        let young = now - ChronoDuration::days(min - 1);
        assert!(matches!(
            classify_account_age(&settings, young, now),
            Decision::Violation(_)
        ));

        let exact = now - ChronoDuration::days(min);
        assert_eq!(classify_account_age(&settings, exact, now), Decision::Allow);
    }

    #[test]
    fn test_link_spam_outranks_mention_spam() {
        let settings = SecuritySettings::default();
        let mut event = message(&links(3));
        event.mentioned_user_ids = vec![1, 2, 3, 4, 5];

        let verdict = inspect_message(&config(), &settings, &event);
        assert_eq!(verdict.violations.len(), 2);
        assert_eq!(
            verdict.most_severe().map(|v| v.kind),
            Some(ViolationKind::LinkSpam)
        );

        let actions = plan_response(&event, &verdict);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], ModAction::DeleteMessage { .. }));
        assert!(matches!(actions[1], ModAction::Warn { user_id: 42, .. }));
    }

    #[test]
    fn test_mention_spam_only_deletes() {
        let settings = SecuritySettings::default();
        let mut event = message("hi all");
        event.mentioned_user_ids = vec![1, 2, 3, 4, 5];

        let verdict = inspect_message(&config(), &settings, &event);
        let actions = plan_response(&event, &verdict);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ModAction::DeleteMessage { .. }));
    }

    #[test]
    fn test_scam_link_adds_timeout() {
        let settings = SecuritySettings::default();
        let event = message("https://steamcommunlty.com/gift");
        let verdict = inspect_message(&config(), &settings, &event);
        let actions = plan_response(&event, &verdict);

        assert_eq!(actions.len(), 3);
        assert!(matches!(
            actions[2],
            ModAction::Timeout { duration, .. } if duration == SCAM_TIMEOUT
        ));
    }

    #[test]
    fn test_immune_and_bot_authors_pass() {
        let settings = SecuritySettings::default();
        let mut event = message(&links(5));
        event.author_roles = vec![IMMUNE];
        assert!(inspect_message(&config(), &settings, &event).is_clean());

        let mut event = message(&links(5));
        event.author_is_bot = true;
        assert!(inspect_message(&config(), &settings, &event).is_clean());
    }

    fn join(age_days: i64) -> MemberJoinEvent {
        let now = Utc::now();
        MemberJoinEvent {
            guild_id: 1,
            user_id: 42,
            is_bot: false,
            roles: vec![],
            account_created_at: now - ChronoDuration::days(age_days),
            has_avatar: true,
            joined_at: now,
        }
    }

    #[test]
    fn test_underage_join_is_kicked_not_quarantined() {
        let settings = SecuritySettings {
            quarantine_role_id: Some(300),
            ..Default::default()
        };
        let plan = inspect_join(&config(), &settings, &join(1));
        assert!(plan.underage.is_some());
        assert_eq!(plan.actions.len(), 1);
        assert!(matches!(plan.actions[0], ModAction::Kick { user_id: 42, .. }));
    }

    #[test]
    fn test_old_enough_join_is_quarantined() {
        let settings = SecuritySettings {
            quarantine_role_id: Some(300),
            ..Default::default()
        };
        let plan = inspect_join(&config(), &settings, &join(30));
        assert!(plan.underage.is_none());
        assert_eq!(
            plan.actions,
            vec![ModAction::AddRole {
                user_id: 42,
                role_id: 300,
                reason: "Auto-quarantine on join".to_string()
            }]
        );
    }

    #[test]
    fn test_join_without_quarantine_role_does_nothing() {
        let plan = inspect_join(&config(), &SecuritySettings::default(), &join(30));
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn test_risk_profile_indicators() {
        let settings = SecuritySettings::default();
        let now = Utc::now();
        let profile =
            user_risk_profile(&settings, now - ChronoDuration::days(2), false, Some(4), now);
        assert_eq!(profile.account_age_days, 2);
        assert_eq!(profile.indicators.len(), 3);

        let clean =
            user_risk_profile(&settings, now - ChronoDuration::days(400), true, Some(0), now);
        assert!(!clean.is_suspicious());
    }
}
