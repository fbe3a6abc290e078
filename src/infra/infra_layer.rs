// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "config/mod.rs"]
pub mod config;

#[path = "lockdown/mod.rs"]
pub mod lockdown;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "github/mod.rs"]
pub mod github;
