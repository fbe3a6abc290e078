// Security domain models - incoming events and classifier verdicts.

use crate::core::moderation::ModAction;
use chrono::{DateTime, Utc};
use std::fmt;

/// A guild message, reduced to what the classifiers read.
#[derive(Debug, Clone, Default)]
pub struct MessageEvent {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_is_bot: bool,
    pub author_roles: Vec<u64>,
    pub content: String,
    pub mentioned_user_ids: Vec<u64>,
    pub mentioned_role_ids: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct MemberJoinEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub is_bot: bool,
    pub roles: Vec<u64>,
    pub account_created_at: DateTime<Utc>,
    pub has_avatar: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    LinkSpam,
    MentionSpam,
    UnderageAccount,
}

impl ViolationKind {
    /// Higher wins when one message trips several classifiers.
    pub fn severity(self) -> u8 {
        match self {
            ViolationKind::MentionSpam => 1,
            ViolationKind::LinkSpam => 2,
            ViolationKind::UnderageAccount => 3,
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::LinkSpam => write!(f, "Link Spam"),
            ViolationKind::MentionSpam => write!(f, "Mention Spam"),
            ViolationKind::UnderageAccount => write!(f, "Underage Account"),
        }
    }
}

/// What a classifier matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    Links {
        links: Vec<String>,
        scam_matches: Vec<String>,
    },
    Mentions {
        user_ids: Vec<u64>,
        role_ids: Vec<u64>,
        count: usize,
    },
    AccountAge {
        age_days: i64,
        minimum_days: u32,
    },
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evidence::Links {
                links,
                scam_matches,
            } => {
                write!(f, "{} link(s): {}", links.len(), links.join(", "))?;
                if !scam_matches.is_empty() {
                    write!(f, " | scam domains: {}", scam_matches.join(", "))?;
                }
                Ok(())
            }
            Evidence::Mentions { count, .. } => write!(f, "{} unique mention(s)", count),
            Evidence::AccountAge {
                age_days,
                minimum_days,
            } => write!(
                f,
                "account is {} day(s) old, minimum is {}",
                age_days, minimum_days
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub evidence: Evidence,
}

impl Violation {
    pub fn is_scam(&self) -> bool {
        matches!(&self.evidence, Evidence::Links { scam_matches, .. } if !scam_matches.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Violation(Violation),
}

impl Decision {
    pub fn violation(self) -> Option<Violation> {
        match self {
            Decision::Allow => None,
            Decision::Violation(v) => Some(v),
        }
    }
}

/// Every violation a message tripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageVerdict {
    pub violations: Vec<Violation>,
}

impl MessageVerdict {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn most_severe(&self) -> Option<&Violation> {
        self.violations.iter().max_by_key(|v| v.kind.severity())
    }

    /// All evidence joined for the audit entry.
    pub fn evidence_summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.kind, v.evidence))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What to do with a member who just joined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinPlan {
    pub underage: Option<Violation>,
    pub actions: Vec<ModAction>,
}

/// Suspicious-indicator summary shown by `view_user_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskProfile {
    pub account_age_days: i64,
    pub indicators: Vec<String>,
    /// `None` when the warnings store couldn't be reached.
    pub warning_count: Option<usize>,
}

impl RiskProfile {
    pub fn is_suspicious(&self) -> bool {
        !self.indicators.is_empty()
    }
}
