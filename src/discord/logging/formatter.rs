use crate::core::github::{UpdateKind, UpdateNote};
use crate::core::moderation::{
    ActionKind, ActionRecord, ActionTarget, Actor, ModLogEntry, NoticeKind, SecurityNotice,
    WarningStatus,
};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{self as serenity, CreateEmbed, CreateEmbedFooter};
use std::time::Duration;

/// Embed field values are capped at 1024 characters.
const FIELD_LIMIT: usize = 1024;

pub fn format_mod_log_entry(entry: &ModLogEntry) -> CreateEmbed {
    match entry {
        ModLogEntry::Action(record) => format_action(record),
        ModLogEntry::Security(notice) => format_notice(notice),
    }
}

fn timestamp(at: DateTime<Utc>) -> serenity::Timestamp {
    serenity::Timestamp::from_unix_timestamp(at.timestamp())
        .unwrap_or_else(|_| serenity::Timestamp::now())
}

fn clip(text: &str) -> String {
    if text.chars().count() <= FIELD_LIMIT {
        text.to_string()
    } else {
        text.chars().take(FIELD_LIMIT - 1).collect::<String>() + "…"
    }
}

fn action_color(kind: ActionKind) -> serenity::Color {
    match kind {
        ActionKind::Ban | ActionKind::Kick => serenity::Color::RED,
        ActionKind::Timeout | ActionKind::Warn => serenity::Color::from_rgb(255, 165, 0), // Orange
        ActionKind::Unban | ActionKind::ClearWarnings => serenity::Color::DARK_GREEN,
        _ => serenity::Color::BLUE,
    }
}

/// `1d 2h`, `30m`, `45s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
    );

    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m"), (seconds, "s")]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{}{}", n, unit))
        .collect();
    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

fn format_actor(actor: Actor) -> String {
    match actor {
        Actor::Bot => "Automated".to_string(),
        Actor::Moderator(id) => format!("<@{}>", id),
    }
}

fn format_action(record: &ActionRecord) -> CreateEmbed {
    let target = match record.target {
        ActionTarget::User(id) => format!("<@{}> (`{}`)", id, id),
        ActionTarget::Channel(id) => format!("<#{}>", id),
    };
    let moderator = if record.automated {
        "Automated".to_string()
    } else {
        format!("<@{}>", record.moderator_id)
    };

    let mut embed = CreateEmbed::default()
        .title(format!("{} | Case #{}", record.kind, record.case_id))
        .color(action_color(record.kind))
        .field("Target", target, true)
        .field("Moderator", moderator, true)
        .field("Reason", clip(&record.reason), false)
        .footer(CreateEmbedFooter::new(format!("Guild ID: {}", record.guild_id)))
        .timestamp(timestamp(record.timestamp));

    if let Some(duration) = record.duration {
        embed = embed.field("Duration", format_duration(duration), true);
    }
    if let Some(affected) = record.affected {
        embed = embed.field("Affected", affected.to_string(), true);
    }
    match &record.warning {
        Some(WarningStatus::Saved { id }) => {
            embed = embed.field("Warning ID", id.to_string(), true);
        }
        Some(WarningStatus::Unsaved { reason }) => {
            embed = embed.field("⚠️ Not saved", clip(reason), false);
        }
        None => {}
    }
    if let Some(evidence) = &record.evidence {
        embed = embed.field("Evidence", clip(evidence), false);
    }
    embed
}

fn notice_color(kind: NoticeKind) -> serenity::Color {
    match kind {
        NoticeKind::Lockdown | NoticeKind::AntiNuke => serenity::Color::RED,
        NoticeKind::Silence | NoticeKind::InvitesPaused => serenity::Color::from_rgb(255, 165, 0),
        NoticeKind::Unlock | NoticeKind::Unsilence | NoticeKind::InvitesResumed => {
            serenity::Color::DARK_GREEN
        }
    }
}

fn notice_icon(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Lockdown => "🔒",
        NoticeKind::Unlock => "🔓",
        NoticeKind::Silence => "🔇",
        NoticeKind::Unsilence => "🔊",
        NoticeKind::InvitesPaused => "⏸️",
        NoticeKind::InvitesResumed => "▶️",
        NoticeKind::AntiNuke => "🚨",
    }
}

fn format_notice(notice: &SecurityNotice) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("{} {}", notice_icon(notice.kind), notice.kind))
        .color(notice_color(notice.kind))
        .field("By", format_actor(notice.actor), true)
        .field("Reason", clip(&notice.reason), false)
        .timestamp(timestamp(notice.timestamp));

    for (name, value) in &notice.details {
        embed = embed.field(name.as_str(), clip(value), false);
    }
    embed
}

pub fn format_update_note(note: &UpdateNote) -> CreateEmbed {
    let (icon, color) = match note.kind {
        UpdateKind::Web => ("🌐", serenity::Color::BLUE),
        UpdateKind::App => ("📱", serenity::Color::from_rgb(88, 101, 242)),
    };

    let mut embed = CreateEmbed::default()
        .title(format!("{} {}", icon, note.title))
        .description(note.description.clone())
        .color(color)
        .timestamp(timestamp(note.timestamp));

    if let Some(url) = &note.url {
        embed = embed.url(url);
    }
    for (name, value) in &note.fields {
        embed = embed.field(name.as_str(), clip(value), true);
    }
    embed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(30 * 60)), "30m");
        assert_eq!(format_duration(Duration::from_secs(26 * 3600)), "1d 2h");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_clip_respects_field_limit() {
        let long = "a".repeat(FIELD_LIMIT + 50);
        assert_eq!(clip(&long).chars().count(), FIELD_LIMIT);
        assert_eq!(clip("short"), "short");
    }
}
