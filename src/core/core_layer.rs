// The core module contains all business logic.
// Each feature gets its own submodule. Nothing in here knows about serenity;
// the Discord layer implements the ports declared below.

#[path = "config/mod.rs"]
pub mod config;

#[path = "platform/platform_port.rs"]
pub mod platform;

#[path = "security/mod.rs"]
pub mod security;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "lockdown/mod.rs"]
pub mod lockdown;

#[path = "anti_nuke/anti_nuke_monitor.rs"]
pub mod anti_nuke;

#[path = "github/github_service.rs"]
pub mod github;

#[cfg(test)]
#[path = "test_support.rs"]
pub mod test_support;
