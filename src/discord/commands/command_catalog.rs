// Discord commands module.
// Each feature gets its own command file.

pub mod checks;

pub mod moderation;

pub mod security;

// Website and app update posts
pub mod updates;

use crate::discord::{Data, Error};

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        moderation::ban(),
        moderation::unban(),
        moderation::kick(),
        moderation::timeout(),
        moderation::warn(),
        moderation::warnings(),
        moderation::clear_warnings(),
        moderation::purge(),
        security::lockdown(),
        security::unlock(),
        security::silence(),
        security::unsilence(),
        security::pause_invites(),
        security::resume_invites(),
        security::set_min_age(),
        security::security(),
        security::view_user_info(),
        updates::update_web(),
        updates::update_app(),
        updates::update_app_github(),
    ]
}
