// Core moderation module - the action executor, its audit records, the
// warnings port and the mod-log writer.

pub mod action_executor;
pub mod mod_log;
pub mod moderation_models;
pub mod warnings;

pub use action_executor::*;
pub use mod_log::*;
pub use moderation_models::*;
pub use warnings::*;
